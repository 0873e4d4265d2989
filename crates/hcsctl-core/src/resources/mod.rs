//! Typed adapters for a handful of vendor resources
//!
//! Each adapter builds [`ApiRequest`](crate::request::ApiRequest)s and lets
//! [`HcsClient`](crate::client::HcsClient) do the rest.

pub mod jobs;
pub mod regions;
pub mod servers;
pub mod volumes;
pub mod vpcs;

pub use jobs::{EcsJobChecker, RdsJobChecker, checker_for};
pub use regions::Region;
pub use servers::{AttachedVolume, Flavor, Server};
pub use volumes::{Volume, VolumeAttachment};
pub use vpcs::{Subnet, Vpc};
