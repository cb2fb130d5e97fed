pub mod endpoint;
pub use endpoint::{EndpointError, compose_endpoint, fixup_url};
