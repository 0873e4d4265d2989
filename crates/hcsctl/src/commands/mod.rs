pub mod api;
pub mod job;
pub mod profile;
pub mod region;
pub mod server;
