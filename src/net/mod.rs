pub mod error_boundary;
pub mod headers_middleware;
pub mod http_adapter;
pub mod request;
pub mod response;
