//! Pipes shipped with the framework.
pub mod view;

pub use view::ViewPipe;
