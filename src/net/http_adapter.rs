use std::{
    io,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use actix_files::NamedFile;
use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer, Responder,
    web::{self, Bytes},
};

use crate::{
    bootstrap, core::configuration::ServerSettings, kernel::Kernel,
    net::headers_middleware::HeadersMiddleware,
};

/// Directory whose existing files are served as-is.
#[derive(Debug, Clone)]
pub struct PublicDir(PathBuf);

impl PublicDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// The file a request path points at, when it exists under the directory.
    pub fn file(&self, request_path: &str) -> Option<PathBuf> {
        let relative = Path::new(request_path.trim_start_matches('/'));
        if relative.as_os_str().is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }
        let candidate = self.0.join(relative);
        candidate.is_file().then_some(candidate)
    }
}

/// Serves the application over HTTP.
///
/// Requests for existing files under the public directory are answered with the
/// file, everything else goes through the kernel.
pub struct HttpAdapter {
    kernel: Arc<Kernel>,
    settings: ServerSettings,
    public: PublicDir,
}

impl HttpAdapter {
    pub fn new(app: &bootstrap::App, kernel: Kernel) -> Self {
        let config = app.config();
        Self {
            kernel: Arc::new(kernel),
            settings: config.server.clone(),
            public: PublicDir::new(app.root().join(&config.paths.public)),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    pub async fn run(self) -> io::Result<()> {
        let address = self.address();
        let kernel = web::Data::from(self.kernel);
        let public = web::Data::new(self.public);
        let headers = self.settings.headers;

        let mut server = HttpServer::new(move || {
            App::new()
                .wrap(HeadersMiddleware::new(&headers))
                .configure(|cfg| configure(cfg, kernel.clone(), public.clone()))
        });
        if let Some(workers) = self.settings.workers {
            server = server.workers(workers);
        }

        tracing::info!(%address, "listening");
        server.bind(&address)?.run().await
    }
}

/// Registers the entrypoint as the default service.
pub fn configure(
    cfg: &mut web::ServiceConfig,
    kernel: web::Data<Kernel>,
    public: web::Data<PublicDir>,
) {
    cfg.app_data(kernel)
        .app_data(public)
        .default_service(web::to(entrypoint));
}

async fn entrypoint(
    req: HttpRequest,
    body: Bytes,
    kernel: web::Data<Kernel>,
    public: web::Data<PublicDir>,
) -> HttpResponse {
    if let Some(path) = public.file(req.path()) {
        match NamedFile::open_async(&path).await {
            Ok(file) => {
                return file
                    .use_last_modified(true)
                    .prefer_utf8(true)
                    .respond_to(&req);
            }
            Err(err) => tracing::warn!(path = %path.display(), "cannot open public file: {err}"),
        }
    }
    kernel.handle(&req, body).await.into_http()
}
