//! HTTP plumbing
//!
//! - [`request`]: request descriptors and response values
//! - [`transport`]: the pure transport and its `reqwest` implementation
//! - [`client`]: the authenticating pipeline used by application code

pub mod client;
pub mod request;
pub mod transport;

pub use client::ApiClient;
pub use request::{HttpResponse, PendingRequest, RequestDescriptor, RequestId};
pub use transport::{HttpTransport, Transport};
