mod config;
mod http;
mod model;
mod telemetry;

use std::path::Path;
use std::sync::Arc;

use log::{error, info};
use tokio::sync::oneshot;

use crate::config::ServerConfig;
use crate::http::ApiState;
use crate::model::ForestModel;
use crate::telemetry::TelemetryStore;

const FALLBACK_TEMPLATE: &str = "<html><body><h1>Error loading template.</h1></body></html>";

fn main() {
    let _ = env_logger::try_init();

    if let Err(error) = run_console() {
        eprintln!("[SHELF] {}", error);
    }
}

fn run_console() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown: {}", error);
            }
            let _ = shutdown_tx.send(());
        });

        run_until_shutdown(shutdown_rx).await;
    });

    Ok(())
}

async fn run_until_shutdown(shutdown_rx: oneshot::Receiver<()>) {
    let config = ServerConfig::from_env();

    let model = load_model(&config);
    let template = Arc::new(load_template(&config.template_path));
    let telemetry = Arc::new(TelemetryStore::new());

    let state = ApiState {
        model,
        template,
        telemetry,
    };

    let addr = config.bind_addr();
    info!("listening on {}", addr);

    let cors_origin = config.cors_origin.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(error) = http::serve(addr, cors_origin, state).await {
            error!("server error: {}", error);
        }
    });

    let _ = shutdown_rx.await;

    info!("shutting down");
    api_handle.abort();
}

/// Startup is fail-soft: a missing or malformed artifact leaves the service
/// running in a degraded state instead of aborting the process.
fn load_model(config: &ServerConfig) -> Option<Arc<ForestModel>> {
    match ForestModel::load(&config.model_path) {
        Ok(model) => {
            info!("model loaded from {}", config.model_path.display());
            Some(Arc::new(model))
        }
        Err(error) => {
            error!(
                "failed to load model from {}: {}",
                config.model_path.display(),
                error
            );
            None
        }
    }
}

fn load_template(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            info!("template loaded from {}", path.display());
            contents
        }
        Err(error) => {
            error!("failed to load template from {}: {}", path.display(), error);
            FALLBACK_TEMPLATE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_template_falls_back_to_error_page() {
        let dir = tempfile::tempdir().unwrap();
        let contents = load_template(&dir.path().join("missing.html"));
        assert_eq!(contents, FALLBACK_TEMPLATE);
    }

    #[test]
    fn template_is_returned_verbatim() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"<html><body><form></form></body></html>")
            .unwrap();
        let contents = load_template(file.path());
        assert_eq!(contents, "<html><body><form></form></body></html>");
    }

    #[test]
    fn unloadable_model_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            port: 5000,
            model_path: dir.path().join("missing.json"),
            template_path: dir.path().join("index.html"),
            cors_origin: "*".to_string(),
        };
        assert!(load_model(&config).is_none());
    }
}
