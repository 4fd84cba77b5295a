use std::{future::Future, panic::AssertUnwindSafe};

use futures_util::FutureExt;
use serde_json::{Value, json};

use crate::{
    core::{configuration::PRODUCTION_ENV, failure::Failure},
    environment::Environment,
    net::response::{HTTP_SERVER_ERROR, Response},
};

/// Turns uncaught failures into JSON error responses.
///
/// Debug detail (type, file, line, trace) is only included outside production.
/// The boundary reads `APP_ENV` from the environment itself and treats an unset
/// value as production, so it does not depend on the configuration having loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBoundary {
    production: bool,
}

impl ErrorBoundary {
    pub fn new(app_env: &str) -> Self {
        Self {
            production: app_env == PRODUCTION_ENV,
        }
    }

    pub fn from_environment(environment: &Environment) -> Self {
        Self::new(environment.get_or("APP_ENV", PRODUCTION_ENV))
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    pub fn body(&self, failure: &Failure) -> Value {
        let mut body = json!({
            "status": "error",
            "message": failure.message(),
        });
        if !self.production {
            body["debug"] = json!({
                "type": failure.kind(),
                "file": failure.file(),
                "line": failure.line(),
                "trace": failure.trace(),
            });
        }
        body
    }

    pub fn render(&self, failure: &Failure) -> Response {
        Response::new().with_json(&self.body(failure), HTTP_SERVER_ERROR)
    }

    /// Awaits `future`, turning a panic into a [`Failure`].
    pub async fn catch<F>(&self, future: F) -> Result<Response, Failure>
    where
        F: Future<Output = Result<Response, Failure>>,
    {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(Failure::from_panic(payload)),
        }
    }

    /// Awaits `future` and renders any failure or panic.
    pub async fn guard<F>(&self, future: F) -> Response
    where
        F: Future<Output = Result<Response, Failure>>,
    {
        match self.catch(future).await {
            Ok(response) => response,
            Err(failure) => {
                tracing::error!(kind = failure.kind(), "uncaught failure: {failure}");
                self.render(&failure)
            }
        }
    }
}
