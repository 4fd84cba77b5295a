use std::process::ExitCode;

use clap::Parser;
use handlr::{
    bootstrap::{self, BootstrapError, BootstrapOptions},
    core::{
        cli::{Cli, Command},
        failure::Failure,
    },
    environment::Environment,
    kernel::Kernel,
    net::{error_boundary::ErrorBoundary, http_adapter::HttpAdapter},
    telemetry,
};

#[actix_web::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init(&cli.log);

    let command = cli.command();
    let app = match bootstrap::app_with(|| options(&cli)) {
        Ok(app) => app,
        Err(err) => return report(Failure::from(err)),
    };

    match command {
        Command::Serve => {
            let kernel = match Kernel::boot(app) {
                Ok(kernel) => kernel,
                Err(err) => return report(Failure::from(err)),
            };
            match HttpAdapter::new(app, kernel).run().await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => report(Failure::from(err)),
            }
        }
        Command::Config => match serde_json::to_string_pretty(app.config().as_ref()) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => report(Failure::from(err)),
        },
        Command::Routes => {
            let kernel = match Kernel::boot(app) {
                Ok(kernel) => kernel,
                Err(err) => return report(Failure::from(err)),
            };
            for route in kernel.router().routes() {
                let pipes = route
                    .pipes()
                    .iter()
                    .map(|pipe| pipe.name())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                println!("{:<7} {:<30} {pipes}", route.method().as_str(), route.path());
            }
            ExitCode::SUCCESS
        }
    }
}

fn options(cli: &Cli) -> Result<BootstrapOptions, BootstrapError> {
    let options = match &cli.root {
        Some(root) => BootstrapOptions::new(root),
        None => BootstrapOptions::from_process()?,
    };
    Ok(match &cli.configuration_path {
        Some(path) => options.config_path(path),
        None => options,
    })
}

/// Writes the boundary's JSON body to stderr. Startup failures have no request
/// to answer, so the process environment decides the debug detail.
fn report(failure: Failure) -> ExitCode {
    let boundary = ErrorBoundary::from_environment(&Environment::capture());
    tracing::error!(kind = failure.kind(), "{failure}");
    eprintln!("{}", boundary.body(&failure));
    ExitCode::FAILURE
}
