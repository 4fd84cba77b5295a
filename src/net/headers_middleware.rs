use std::{
    collections::BTreeMap,
    future::{Ready, ready},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    error::Error,
    http::header::{HeaderName, HeaderValue},
};

/// Adds the configured `server.headers` to every response.
#[derive(Debug, Clone, Default)]
pub struct HeadersMiddleware {
    headers: Rc<Vec<(HeaderName, HeaderValue)>>,
}

impl HeadersMiddleware {
    /// Invalid names or values are skipped with a warning.
    pub fn new(headers: &BTreeMap<String, String>) -> Self {
        let mut valid = Vec::with_capacity(headers.len());
        for (key, value) in headers {
            match (
                HeaderName::try_from(key.trim()),
                HeaderValue::try_from(value.trim()),
            ) {
                (Ok(name), Ok(value)) if !value.is_empty() => valid.push((name, value)),
                _ => tracing::warn!(header = %key, value = %value, "skipping invalid header"),
            }
        }
        Self {
            headers: Rc::new(valid),
        }
    }

    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }
}

pub struct HeadersMiddlewareService<S> {
    service: S,
    headers: Rc<Vec<(HeaderName, HeaderValue)>>,
}

impl<S, B> Transform<S, ServiceRequest> for HeadersMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse;
    type Error = Error;
    type Transform = HeadersMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(HeadersMiddlewareService {
            service,
            headers: self.headers.clone(),
        }))
    }
}

impl<S, B> Service<ServiceRequest> for HeadersMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse;
    type Error = Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let headers = self.headers.clone();
        let fut = self.service.call(req);

        Box::pin(async move {
            let mut res = fut.await?;
            for (name, value) in headers.iter() {
                res.headers_mut().insert(name.clone(), value.clone());
            }
            Ok(res.map_into_boxed_body())
        })
    }
}
