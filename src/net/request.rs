use std::{any::Any, collections::HashMap, net::SocketAddr, sync::Arc};

use actix_web::{
    HttpRequest,
    http::{Method, header::HeaderMap},
    web::{self, Bytes},
};
use serde::de::DeserializeOwned;

use crate::{
    auth::AuthContext,
    core::container::{Container, ContainerError},
};

/// An incoming request as seen by pipes.
///
/// Carries the container so pipes can resolve services, the route parameters
/// captured by the router, and the auth context of this request.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: String,
    headers: HeaderMap,
    peer: Option<SocketAddr>,
    body: Bytes,
    params: HashMap<String, String>,
    container: Arc<Container>,
    auth: Arc<AuthContext>,
}

impl Request {
    /// Builds a request from the actix request and its collected body.
    pub fn from_http(
        http: &HttpRequest,
        body: Bytes,
        container: Arc<Container>,
    ) -> Result<Self, ContainerError> {
        let auth = container.get::<AuthContext>()?;
        Ok(Self {
            method: http.method().clone(),
            path: http.path().to_string(),
            query: http.query_string().to_string(),
            headers: http.headers().clone(),
            peer: http.peer_addr(),
            body,
            params: HashMap::new(),
            container,
            auth,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_string(&self) -> &str {
        &self.query
    }

    /// A decoded query string value.
    pub fn query(&self, key: &str) -> Option<String> {
        web::Query::<HashMap<String, String>>::from_query(&self.query)
            .ok()
            .and_then(|query| query.into_inner().remove(key))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// A route parameter captured by the matched pattern.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// The auth context of this request, built once when the request was created.
    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Resolves a service from the container.
    ///
    /// `AuthContext` is bound per resolution, so asking for it here returns this
    /// request's context, the same one as [`Request::auth`], instead of a new one.
    pub fn resolve<T>(&self) -> Result<Arc<T>, ContainerError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let auth: &dyn Any = &self.auth;
        if let Some(auth) = auth.downcast_ref::<Arc<T>>() {
            return Ok(auth.clone());
        }
        self.container.get::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use actix_web::test::TestRequest;
    use serde::Deserialize;

    fn container() -> Arc<Container> {
        let mut container = Container::new();
        container.bind::<AuthContext, _>(|_| Ok(Arc::new(AuthContext::new())));
        Arc::new(container)
    }

    #[test]
    fn test_from_http_copies_request_state() {
        let http = TestRequest::post()
            .uri("/users?page=2&name=ada%20l")
            .insert_header(("x-request-id", "abc"))
            .to_http_request();

        let request = Request::from_http(&http, Bytes::from_static(b"{}"), container()).unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.path(), "/users");
        assert_eq!(request.query("page").as_deref(), Some("2"));
        assert_eq!(request.query("name").as_deref(), Some("ada l"));
        assert_eq!(request.query("missing"), None);
        assert_eq!(request.header("x-request-id"), Some("abc"));
        assert!(!request.auth().check());
    }

    #[test]
    fn test_json_body() {
        #[derive(Deserialize)]
        struct Payload {
            name: String,
        }

        let http = TestRequest::post().uri("/").to_http_request();
        let body = Bytes::from_static(br#"{"name":"ada"}"#);
        let request = Request::from_http(&http, body, container()).unwrap();
        assert_eq!(request.json::<Payload>().unwrap().name, "ada");
    }

    #[test]
    fn test_requires_auth_binding() {
        let http = TestRequest::get().to_http_request();
        let err = Request::from_http(&http, Bytes::new(), Arc::new(Container::new())).unwrap_err();
        assert!(matches!(err, ContainerError::NotBound { .. }));
    }

    #[test]
    fn test_resolving_auth_returns_the_request_context() {
        let http = TestRequest::get().to_http_request();
        let request = Request::from_http(&http, Bytes::new(), container()).unwrap();
        request.auth().login(AuthUser::new("1", "ada"));

        let resolved = request.resolve::<AuthContext>().unwrap();
        assert!(resolved.check());
        assert!(std::ptr::eq(resolved.as_ref(), request.auth()));

        let fresh = request.container().get::<AuthContext>().unwrap();
        assert!(!fresh.check());
    }
}
