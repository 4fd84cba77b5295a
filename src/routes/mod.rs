pub mod pattern;
pub mod pipe;
pub mod router;

pub use pipe::{Next, Pipe, pipe};
pub use router::{Route, RouteGroup, Router};
