use serde_json::json;

use crate::{
    core::{
        container::{Container, ContainerError},
        events::{EventManager, Priority, Propagation},
        log::Logger,
    },
    kernel::{
        REQUEST_FAILED, REQUEST_HANDLED, REQUEST_RECEIVED, RequestFailed, RequestHandled,
        RequestReceived,
    },
};

/// Registers the application's event listeners.
pub struct EventServiceProvider;

impl EventServiceProvider {
    pub fn register(container: &Container, events: &EventManager) -> Result<(), ContainerError> {
        let logger = container.get::<dyn Logger>()?;

        let received = logger.clone();
        events.on::<RequestReceived, _>(REQUEST_RECEIVED, Priority::Normal, move |event| {
            received.debug(
                "{method} {path} received",
                &json!({"method": event.method, "path": event.path}),
            );
            Propagation::Continue
        });

        let handled = logger.clone();
        events.on::<RequestHandled, _>(REQUEST_HANDLED, Priority::Normal, move |event| {
            handled.debug(
                "{method} {path} -> {status} in {elapsed_ms}ms",
                &json!({
                    "method": event.method,
                    "path": event.path,
                    "status": event.status,
                    "elapsed_ms": event.elapsed.as_millis() as u64,
                }),
            );
            Propagation::Continue
        });

        events.on::<RequestFailed, _>(REQUEST_FAILED, Priority::Normal, move |event| {
            logger.error(
                "{method} {path} failed: {message}",
                &json!({
                    "method": event.method,
                    "path": event.path,
                    "type": event.kind,
                    "message": event.message,
                    "file": event.file,
                    "line": event.line,
                }),
            );
            Propagation::Continue
        });

        tracing::debug!("event listeners registered");
        Ok(())
    }
}
