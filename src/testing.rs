//! Fixtures shared by the unit tests.

use std::fs;

use crate::{
    bootstrap::{App, BootstrapOptions, boot},
    environment::Environment,
};

/// Boots an application in a temporary root with a home view and a public file.
pub fn scratch_app(app_env: &str) -> (tempfile::TempDir, App) {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("app")).unwrap();
    fs::create_dir_all(dir.path().join("views")).unwrap();
    fs::create_dir_all(dir.path().join("public")).unwrap();
    fs::write(dir.path().join("app/config.yaml"), "").unwrap();
    fs::write(dir.path().join("views/home.html"), "<h1>{{ title }}</h1>").unwrap();
    fs::write(dir.path().join("public/robots.txt"), "User-agent: *\n").unwrap();

    let pairs = vec![
        ("APP_ENV".to_string(), app_env.to_string()),
        ("DB_DSN".to_string(), "sqlite:/tmp/handlr.db".to_string()),
        ("DB_USER".to_string(), "handlr".to_string()),
        ("DB_PASSWORD".to_string(), String::new()),
    ];
    let app = boot(
        BootstrapOptions::new(dir.path())
            .environment(move |_| Ok(pairs.into_iter().collect::<Environment>())),
    )
    .unwrap();
    (dir, app)
}
