//! Object-storage HTTP plumbing for recording uploads: a pluggable
//! [`HttpTransport`], the reqwest-backed implementation, and the retry
//! policies shared by everything that talks to the network.

mod default_client;
mod error;
mod request;
mod retry;
mod transport;

pub use crate::default_client::build_reqwest_client;
pub use crate::default_client::default_user_agent;
pub use crate::default_client::redact_query;
pub use crate::error::TransportError;
pub use crate::request::FileRange;
pub use crate::request::Request;
pub use crate::request::Response;
pub use crate::retry::Backoff;
pub use crate::retry::RetryPolicy;
pub use crate::retry::run_with_retry;
pub use crate::transport::HttpTransport;
pub use crate::transport::ReqwestTransport;
