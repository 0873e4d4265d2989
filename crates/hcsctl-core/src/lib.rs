//! Signed API dispatch for HCS-style private clouds
//!
//! This crate talks to the REST APIs of a Huawei-Cloud-Stack-style private
//! cloud. It signs requests (access key or password token), routes them to
//! the right product endpoint, walks every page of list calls and waits on
//! the asynchronous jobs mutating calls return.
//!
//! ## Usage
//!
//! ```no_run
//! use hcsctl_core::{ApiRequest, Credentials, HcsClient};
//!
//! # async fn example() -> hcsctl_core::Result<()> {
//! let credentials = Credentials::access_key("AK", "SK", "hcs.example.com")?
//!     .with_project("0123456789abcdef");
//! let client = HcsClient::builder(credentials).region("region-1").build()?;
//!
//! // Every server, across all pages
//! let servers = client.list_servers(None).await?;
//!
//! // Any other call
//! let flavors = client
//!     .list(&ApiRequest::get("ecs", "cloudservers/flavors").version("v1"), Some("flavors"))
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`signer`] and [`token`]: request authentication
//! - [`endpoint`]: product and region to URL
//! - [`transport`]: read-only guard, retries and error classification
//! - [`paginate`]: offset, page-number, marker and single-shot listings
//! - [`job`]: bounded polling of vendor jobs
//! - [`client`]: the [`HcsClient`] handle over all of the above

pub mod action;
pub mod client;
pub mod config;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod job;
pub mod paginate;
pub mod request;
pub mod resources;
pub mod signer;
pub mod token;
pub mod transport;

pub use action::{Action, StopMode};
pub use client::{Call, Expect, HcsClient, HcsClientBuilder, Payload};
pub use credentials::{AuthMethod, Credentials};
pub use endpoint::{EndpointResolver, PageStyle, ProductEndpoint};
pub use error::{CoreError, ErrorClassification, ErrorKind, Result, ResultExt};
pub use job::{
    JobHandle, JobOutcome, JobPoller, JobState, JobStatus, JobStatusCheck, ProgressCallback,
    ProgressEvent,
};
pub use paginate::{PageSource, Paginator};
pub use request::ApiRequest;
pub use signer::{AkSkSigner, SignedRequest};
pub use transport::{ApiResponse, USER_AGENT};

pub use reqwest::Method;
