pub mod app;
pub mod auth;
pub mod bootstrap;
pub mod core;
pub mod database;
pub mod environment;
pub mod kernel;
pub mod net;
pub mod pipes;
pub mod routes;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;
