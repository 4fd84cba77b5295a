use std::{any::type_name, sync::Arc};

use async_trait::async_trait;

use crate::{
    core::failure::Failure,
    net::{request::Request, response::Response},
};

/// A single-responsibility request handler composed into a route's pipeline.
///
/// A pipe receives the response built so far and either passes it on through
/// `next` or returns early to end the pipeline.
///
/// ``` rust
/// use async_trait::async_trait;
/// use actix_web::http::header::{HeaderName, HeaderValue};
/// use handlr::core::failure::Failure;
/// use handlr::net::{request::Request, response::Response};
/// use handlr::routes::pipe::{Next, Pipe};
///
/// struct PoweredBy;
///
/// #[async_trait(?Send)]
/// impl Pipe for PoweredBy {
///     async fn handle(
///         &self,
///         request: &mut Request,
///         response: Response,
///         next: Next<'_>,
///     ) -> Result<Response, Failure> {
///         let response = next.run(request, response).await?;
///         Ok(response.with_header(
///             HeaderName::from_static("x-powered-by"),
///             HeaderValue::from_static("handlr"),
///         ))
///     }
/// }
/// ```
#[async_trait(?Send)]
pub trait Pipe: Send + Sync {
    async fn handle(
        &self,
        request: &mut Request,
        response: Response,
        next: Next<'_>,
    ) -> Result<Response, Failure>;

    fn name(&self) -> &'static str {
        let full = type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// The remainder of the pipeline after the current pipe.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    pipes: &'a [Arc<dyn Pipe>],
}

impl<'a> Next<'a> {
    pub fn new(pipes: &'a [Arc<dyn Pipe>]) -> Self {
        Self { pipes }
    }

    /// Number of pipes still to run.
    pub fn remaining(&self) -> usize {
        self.pipes.len()
    }

    /// Runs the next pipe, or returns `response` when the pipeline is exhausted.
    pub async fn run(self, request: &mut Request, response: Response) -> Result<Response, Failure> {
        match self.pipes.split_first() {
            Some((pipe, rest)) => pipe.handle(request, response, Next::new(rest)).await,
            None => Ok(response),
        }
    }
}

/// Wraps a pipe for use in a route definition.
pub fn pipe<P: Pipe + 'static>(pipe: P) -> Arc<dyn Pipe> {
    Arc::new(pipe)
}
