//! Application-level definitions: the route table and the event listeners.
pub mod events;
pub mod routes;
