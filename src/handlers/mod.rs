//! HTTP and server-push request handlers.

pub mod http;
pub mod stream;

pub use http::*;
pub use stream::*;
