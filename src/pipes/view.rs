use std::{collections::BTreeMap, path::Path};

use async_trait::async_trait;

use crate::{
    bootstrap::AppRoot,
    core::{configuration::Configuration, failure::Failure},
    net::{request::Request, response::Response},
    routes::pipe::{Next, Pipe},
};

const VIEW_EXTENSION: &str = "html";

/// Renders `<views>/<name>.html` into the response body.
///
/// `{{ key }}` placeholders are replaced with values given through [`ViewPipe::with`].
/// The rendered page then continues down the pipeline.
#[derive(Debug, Clone)]
pub struct ViewPipe {
    name: String,
    data: BTreeMap<String, String>,
}

impl ViewPipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Names stay inside the views directory: no `..` segment, no absolute path.
    fn has_valid_name(&self) -> bool {
        !self.name.is_empty()
            && !Path::new(&self.name).is_absolute()
            && !Path::new(&self.name).has_root()
            && !self.name.split(['/', '\\']).any(|part| part == "..")
    }

    /// Substitutes placeholders in a single scan; inserted values are not
    /// searched for placeholders again.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find("{{") {
            out.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let found = after
                .find("}}")
                .and_then(|close| self.data.get(after[..close].trim()).map(|value| (close, value)));
            match found {
                Some((close, value)) => {
                    out.push_str(value);
                    rest = &after[close + 2..];
                }
                None => {
                    out.push_str("{{");
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[async_trait(?Send)]
impl Pipe for ViewPipe {
    async fn handle(
        &self,
        request: &mut Request,
        response: Response,
        next: Next<'_>,
    ) -> Result<Response, Failure> {
        if !self.has_valid_name() {
            return Err(Failure::new(format!("invalid view name '{}'", self.name)));
        }
        let root = request.resolve::<AppRoot>()?;
        let configuration = request.resolve::<Configuration>()?;
        let path = root
            .join(&configuration.paths.views)
            .join(format!("{}.{VIEW_EXTENSION}", self.name));

        let template = tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| Failure::new(format!("view '{}' could not be read: {err}", self.name)))?;
        tracing::debug!(view = %self.name, path = %path.display(), "rendering view");

        let response = response.with_html(self.render(&template));
        next.run(request, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{kernel::Kernel, testing::scratch_app};
    use actix_web::{test::TestRequest, web::Bytes};

    #[test]
    fn test_render_replaces_placeholders() {
        let view = ViewPipe::new("home").with("title", "Handlr").with("user", "ada");
        assert_eq!(
            view.render("<h1>{{ title }}</h1><p>{{user}}</p><p>{{ other }}</p>"),
            "<h1>Handlr</h1><p>ada</p><p>{{ other }}</p>"
        );
    }

    #[test]
    fn test_inserted_values_are_not_rendered_again() {
        let view = ViewPipe::new("home")
            .with("a", "{{ b }}")
            .with("b", "second");
        assert_eq!(view.render("{{ a }}|{{ b }}|{{"), "{{ b }}|second|{{");
    }

    #[test]
    fn test_names_must_stay_in_views_directory() {
        assert!(ViewPipe::new("home").has_valid_name());
        assert!(ViewPipe::new("admin/dashboard").has_valid_name());
        assert!(!ViewPipe::new("../x").has_valid_name());
        assert!(!ViewPipe::new("admin/../../x").has_valid_name());
        assert!(!ViewPipe::new("/etc/x").has_valid_name());
        assert!(!ViewPipe::new("").has_valid_name());
    }

    async fn run(app: &crate::bootstrap::App, view: ViewPipe) -> Result<Response, Failure> {
        let http = TestRequest::get().uri("/").to_http_request();
        let mut request = Request::from_http(&http, Bytes::new(), app.container().clone()).unwrap();
        view.handle(&mut request, Response::new(), Next::new(&[])).await
    }

    #[actix_web::test]
    async fn test_rejected_and_missing_views_fail() {
        let (_dir, app) = scratch_app("local");

        let traversal = run(&app, ViewPipe::new("../x")).await.unwrap_err();
        assert_eq!(traversal.message(), "invalid view name '../x'");

        let absolute = run(&app, ViewPipe::new("/etc/x")).await.unwrap_err();
        assert_eq!(absolute.message(), "invalid view name '/etc/x'");

        let missing = run(&app, ViewPipe::new("absent")).await.unwrap_err();
        assert!(missing.message().starts_with("view 'absent' could not be read"));

        let home = run(&app, ViewPipe::new("home").with("title", "Hi")).await.unwrap();
        assert_eq!(home.body_text(), "<h1>Hi</h1>");
    }

    #[actix_web::test]
    async fn test_missing_view_is_a_server_error() {
        let (_dir, app) = scratch_app("local");
        let mut router = crate::routes::Router::new();
        router.get("/absent", vec![crate::routes::pipe(ViewPipe::new("absent"))]);
        router.get("/escape", vec![crate::routes::pipe(ViewPipe::new("../x"))]);
        let kernel = Kernel::new(
            app.container().clone(),
            router,
            crate::net::error_boundary::ErrorBoundary::new("local"),
        )
        .unwrap();

        for (path, message) in [
            ("/absent", "view 'absent' could not be read"),
            ("/escape", "invalid view name '../x'"),
        ] {
            let http = TestRequest::get().uri(path).to_http_request();
            let response = kernel.handle(&http, Bytes::new()).await;
            assert_eq!(response.status(), crate::net::response::HTTP_SERVER_ERROR);
            let body = response.json().unwrap();
            assert_eq!(body["status"], "error");
            assert!(body["message"].as_str().unwrap().starts_with(message));
        }
    }
}
