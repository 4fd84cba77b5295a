use std::sync::Arc;

use actix_web::http::{
    Method, StatusCode,
    header::{self, HeaderValue},
};
use serde_json::json;

use crate::{
    core::failure::Failure,
    net::{request::Request, response::Response},
    routes::{
        pattern::RoutePattern,
        pipe::{Next, Pipe},
    },
};

/// A registered route: method, pattern and the pipes that handle it.
pub struct Route {
    method: Method,
    source: String,
    pattern: RoutePattern,
    pipes: Vec<Arc<dyn Pipe>>,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The pattern as it was registered, group prefix included.
    pub fn path(&self) -> &str {
        &self.source
    }

    pub fn pipes(&self) -> &[Arc<dyn Pipe>] {
        &self.pipes
    }

    fn accepts(&self, method: &Method) -> bool {
        self.method == method || (self.method == Method::GET && method == Method::HEAD)
    }
}

/// Route table dispatching requests to pipe pipelines.
///
/// ``` rust
/// use handlr::routes::{router::Router, pipe::pipe};
/// use handlr::pipes::view::ViewPipe;
///
/// let mut router = Router::new();
/// router.get("/", vec![pipe(ViewPipe::new("home"))]);
/// router
///     .group("/admin", vec![])
///     .get("/dashboard", vec![pipe(ViewPipe::new("dashboard"))])
///     .end();
/// assert_eq!(router.routes().len(), 2);
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route.
    ///
    /// # Panics
    ///
    /// Panics when `path` is not a valid route pattern.
    pub fn add(&mut self, method: Method, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> &mut Self {
        let pattern = match RoutePattern::parse(path) {
            Ok(pattern) => pattern,
            Err(err) => panic!("invalid route {method} {path}: {err}"),
        };
        tracing::trace!(%method, path, pipes = pipes.len(), "route registered");
        self.routes.push(Route {
            method,
            source: pattern.to_string(),
            pattern,
            pipes,
        });
        self
    }

    pub fn get(&mut self, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> &mut Self {
        self.add(Method::GET, path, pipes)
    }

    pub fn post(&mut self, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> &mut Self {
        self.add(Method::POST, path, pipes)
    }

    pub fn put(&mut self, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> &mut Self {
        self.add(Method::PUT, path, pipes)
    }

    pub fn patch(&mut self, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> &mut Self {
        self.add(Method::PATCH, path, pipes)
    }

    pub fn delete(&mut self, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> &mut Self {
        self.add(Method::DELETE, path, pipes)
    }

    /// Starts a group of routes sharing a path prefix and leading pipes.
    pub fn group(&mut self, prefix: &str, pipes: Vec<Arc<dyn Pipe>>) -> RouteGroup<'_> {
        RouteGroup {
            router: self,
            prefix: prefix.to_string(),
            pipes,
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Runs the pipeline of the first route matching the request.
    ///
    /// Answers 404 when no pattern matches the path and 405 when patterns match
    /// but none accepts the method.
    pub async fn dispatch(
        &self,
        request: &mut Request,
        response: Response,
    ) -> Result<Response, Failure> {
        let mut allowed: Vec<&Method> = Vec::new();
        for route in &self.routes {
            let Some(params) = route.pattern.matches(request.path()) else {
                continue;
            };
            if !route.accepts(request.method()) {
                if !allowed.contains(&&route.method) {
                    allowed.push(&route.method);
                }
                continue;
            }
            tracing::debug!(method = %request.method(), route = %route.source, "route matched");
            request.set_params(params);
            return Next::new(&route.pipes).run(request, response).await;
        }

        if allowed.is_empty() {
            return Ok(response.with_json(
                &json!({"status": "error", "message": "Not Found"}),
                StatusCode::NOT_FOUND,
            ));
        }
        let allow = allowed
            .iter()
            .map(|method| method.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let response = response.with_json(
            &json!({"status": "error", "message": "Method Not Allowed"}),
            StatusCode::METHOD_NOT_ALLOWED,
        );
        Ok(match HeaderValue::from_str(&allow) {
            Ok(value) => response.with_header(header::ALLOW, value),
            Err(_) => response,
        })
    }
}

/// Builder returned by [`Router::group`].
pub struct RouteGroup<'a> {
    router: &'a mut Router,
    prefix: String,
    pipes: Vec<Arc<dyn Pipe>>,
}

impl<'a> RouteGroup<'a> {
    pub fn add(self, method: Method, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> Self {
        let path = RoutePattern::join(&self.prefix, path);
        let chain = self.pipes.iter().cloned().chain(pipes).collect();
        self.router.add(method, &path, chain);
        self
    }

    pub fn get(self, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> Self {
        self.add(Method::GET, path, pipes)
    }

    pub fn post(self, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> Self {
        self.add(Method::POST, path, pipes)
    }

    pub fn put(self, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> Self {
        self.add(Method::PUT, path, pipes)
    }

    pub fn patch(self, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> Self {
        self.add(Method::PATCH, path, pipes)
    }

    pub fn delete(self, path: &str, pipes: Vec<Arc<dyn Pipe>>) -> Self {
        self.add(Method::DELETE, path, pipes)
    }

    /// Closes the group and hands the router back.
    pub fn end(self) -> &'a mut Router {
        self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::AuthContext, core::container::Container, routes::pipe::pipe};
    use actix_web::{http::header::HeaderName, test::TestRequest, web::Bytes};
    use async_trait::async_trait;

    /// Appends its label to the body and continues.
    struct Mark(&'static str);

    #[async_trait(?Send)]
    impl Pipe for Mark {
        async fn handle(
            &self,
            request: &mut Request,
            response: Response,
            next: Next<'_>,
        ) -> Result<Response, Failure> {
            let body = format!("{}{}>", response.body_text(), self.0);
            next.run(request, response.with_text(body)).await
        }
    }

    /// Ends the pipeline with 401.
    struct Deny;

    #[async_trait(?Send)]
    impl Pipe for Deny {
        async fn handle(
            &self,
            _request: &mut Request,
            response: Response,
            _next: Next<'_>,
        ) -> Result<Response, Failure> {
            Ok(response.with_status(StatusCode::UNAUTHORIZED))
        }
    }

    /// Echoes the `id` route parameter into a header.
    struct EchoId;

    #[async_trait(?Send)]
    impl Pipe for EchoId {
        async fn handle(
            &self,
            request: &mut Request,
            response: Response,
            next: Next<'_>,
        ) -> Result<Response, Failure> {
            let id = request.param("id").unwrap_or_default().to_string();
            let response = response.with_header(
                HeaderName::from_static("x-id"),
                HeaderValue::from_str(&id).map_err(Failure::from)?,
            );
            next.run(request, response).await
        }
    }

    fn request(method: Method, uri: &str) -> Request {
        let mut container = Container::new();
        container.bind::<AuthContext, _>(|_| Ok(Arc::new(AuthContext::new())));
        let http = TestRequest::default()
            .method(method)
            .uri(uri)
            .to_http_request();
        Request::from_http(&http, Bytes::new(), Arc::new(container)).unwrap()
    }

    #[actix_web::test]
    async fn test_pipes_run_in_order() {
        let mut router = Router::new();
        router.get("/", vec![pipe(Mark("a")), pipe(Mark("b")), pipe(Mark("c"))]);

        let mut req = request(Method::GET, "/");
        let response = router.dispatch(&mut req, Response::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body_text(), "a>b>c>");
    }

    #[actix_web::test]
    async fn test_pipe_can_short_circuit() {
        let mut router = Router::new();
        router.get("/private", vec![pipe(Mark("a")), pipe(Deny), pipe(Mark("never"))]);

        let mut req = request(Method::GET, "/private");
        let response = router.dispatch(&mut req, Response::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.body_text(), "a>");
    }

    #[actix_web::test]
    async fn test_group_prefix_and_pipes() {
        let mut router = Router::new();
        router
            .group("/admin", vec![pipe(Mark("auth"))])
            .get("/users/{id:int}", vec![pipe(EchoId), pipe(Mark("list"))])
            .post("/users", vec![pipe(Mark("create"))])
            .end()
            .get("/", vec![pipe(Mark("home"))]);

        let paths: Vec<&str> = router.routes().iter().map(Route::path).collect();
        assert_eq!(paths, vec!["/admin/users/{id:int}", "/admin/users", "/"]);

        let mut req = request(Method::GET, "/admin/users/7");
        let response = router.dispatch(&mut req, Response::new()).await.unwrap();
        assert_eq!(response.body_text(), "auth>list>");
        assert_eq!(response.header("x-id"), Some("7"));
        assert_eq!(req.param("id"), Some("7"));
    }

    #[actix_web::test]
    async fn test_not_found() {
        let mut router = Router::new();
        router.get("/", vec![pipe(Mark("home"))]);

        let mut req = request(Method::GET, "/missing");
        let response = router.dispatch(&mut req, Response::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.json().unwrap(),
            json!({"status": "error", "message": "Not Found"})
        );
    }

    #[actix_web::test]
    async fn test_method_not_allowed_lists_allowed_methods() {
        let mut router = Router::new();
        router
            .get("/items", vec![pipe(Mark("list"))])
            .post("/items", vec![pipe(Mark("create"))]);

        let mut req = request(Method::DELETE, "/items");
        let response = router.dispatch(&mut req, Response::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.header("allow"), Some("GET, POST"));
    }

    #[actix_web::test]
    async fn test_head_matches_get_routes() {
        let mut router = Router::new();
        router.get("/", vec![pipe(Mark("home"))]);

        let mut req = request(Method::HEAD, "/");
        let response = router.dispatch(&mut req, Response::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    #[should_panic(expected = "invalid route GET /users/{id:float}")]
    fn test_invalid_route_panics() {
        Router::new().get("/users/{id:float}", vec![]);
    }

    #[test]
    fn test_pipe_names() {
        assert_eq!(pipe(Deny).name(), "Deny");
    }
}
