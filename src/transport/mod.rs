//! Reference transports for [`ServiceClient`](crate::client::ServiceClient).

pub mod http;

pub use http::{resolve_api_key, HttpServiceClient};
