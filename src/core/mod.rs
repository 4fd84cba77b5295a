pub mod cli;
pub mod configuration;
pub mod container;
pub mod events;
pub mod failure;
pub mod log;
