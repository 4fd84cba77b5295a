use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

use actix_web::{HttpRequest, web::Bytes};

use crate::{
    app::routes,
    bootstrap::App,
    core::{
        container::{Container, ContainerError},
        events::{Event, EventManager},
        failure::Failure,
    },
    net::{error_boundary::ErrorBoundary, request::Request, response::Response},
    routes::Router,
};

pub const REQUEST_RECEIVED: &str = "kernel.request.received";
pub const REQUEST_HANDLED: &str = "kernel.request.handled";
pub const REQUEST_FAILED: &str = "kernel.request.failed";

#[derive(Debug, Clone)]
pub struct RequestReceived {
    pub method: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct RequestHandled {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub elapsed: Duration,
}

/// Dispatched when the pipeline returns an error or panics, before the error
/// response is rendered.
#[derive(Debug, Clone)]
pub struct RequestFailed {
    pub method: String,
    pub path: String,
    pub kind: String,
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}

macro_rules! kernel_event {
    ($event:ty, $name:expr) => {
        impl Event for $event {
            fn name(&self) -> &'static str {
                $name
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

kernel_event!(RequestReceived, REQUEST_RECEIVED);
kernel_event!(RequestHandled, REQUEST_HANDLED);
kernel_event!(RequestFailed, REQUEST_FAILED);

/// The request kernel: turns an HTTP request into a response by running the
/// router inside the error boundary.
///
/// ``` rust,no_run
/// use handlr::{bootstrap, kernel::Kernel};
///
/// let app = bootstrap::app()?;
/// let kernel = Kernel::boot(app)?;
/// println!("{} routes", kernel.router().routes().len());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Kernel {
    container: Arc<Container>,
    router: Router,
    events: Arc<EventManager>,
    boundary: ErrorBoundary,
}

impl Kernel {
    pub fn new(
        container: Arc<Container>,
        router: Router,
        boundary: ErrorBoundary,
    ) -> Result<Self, ContainerError> {
        let events = container.get::<EventManager>()?;
        Ok(Self {
            container,
            router,
            events,
            boundary,
        })
    }

    /// Kernel for the bootstrapped application with its registered routes.
    pub fn boot(app: &App) -> Result<Self, ContainerError> {
        let mut router = Router::new();
        routes::register(&mut router);
        Self::new(
            app.container().clone(),
            router,
            ErrorBoundary::from_environment(app.environment()),
        )
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn boundary(&self) -> &ErrorBoundary {
        &self.boundary
    }

    /// Every failure is rendered through the boundary, including panics raised by
    /// event listeners.
    pub async fn handle(&self, http: &HttpRequest, body: Bytes) -> Response {
        let started = Instant::now();
        let method = http.method().to_string();
        let path = http.path().to_string();

        let result = self
            .boundary
            .catch(async {
                self.emit(&RequestReceived {
                    method: method.clone(),
                    path: path.clone(),
                })?;
                let mut request = Request::from_http(http, body, self.container.clone())?;
                self.router.dispatch(&mut request, Response::new()).await
            })
            .await;

        let mut response = match result {
            Ok(response) => response,
            Err(failure) => self.fail(&method, &path, failure),
        };

        let elapsed = started.elapsed();
        tracing::info!(
            %method,
            %path,
            status = response.status().as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "request handled"
        );
        let handled = RequestHandled {
            method: method.clone(),
            path: path.clone(),
            status: response.status().as_u16(),
            elapsed,
        };
        if let Err(failure) = self.emit(&handled) {
            response = self.fail(&method, &path, failure);
        }
        response
    }

    /// Dispatches `event`, turning a panicking listener into a [`Failure`].
    fn emit(&self, event: &dyn Event) -> Result<(), Failure> {
        panic::catch_unwind(AssertUnwindSafe(|| self.events.dispatch(event)))
            .map(|_| ())
            .map_err(Failure::from_panic)
    }

    fn fail(&self, method: &str, path: &str, failure: Failure) -> Response {
        tracing::error!(%method, %path, kind = failure.kind(), "{failure}");
        let failed = RequestFailed {
            method: method.to_string(),
            path: path.to_string(),
            kind: failure.kind().to_string(),
            message: failure.message().to_string(),
            file: failure.file(),
            line: failure.line(),
        };
        if let Err(listener) = self.emit(&failed) {
            tracing::error!(%method, %path, "request.failed listener panicked: {listener}");
        }
        self.boundary.render(&failure)
    }
}
