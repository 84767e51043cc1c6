use std::path::PathBuf;

const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub model_path: PathBuf,
    pub template_path: PathBuf,
    pub cors_origin: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port = parse_port(std::env::var("PORT").ok().as_deref());

        let model_path = std::env::var("SHELF_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_model_path());

        let template_path = std::env::var("SHELF_TEMPLATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_template_path());

        let cors_origin =
            normalize_cors_origin(std::env::var("SHELF_CORS_ORIGIN").ok().as_deref());

        ServerConfig {
            port,
            model_path,
            template_path,
            cors_origin,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_port(value: Option<&str>) -> u16 {
    value
        .and_then(|raw| raw.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
        .unwrap_or(DEFAULT_PORT)
}

fn normalize_cors_origin(value: Option<&str>) -> String {
    let trimmed = value.unwrap_or("*").trim();
    if trimmed.is_empty() {
        "*".to_string()
    } else {
        trimmed.to_string()
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("models")
        .join("shelf_life_forest.json")
}

fn default_template_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("templates")
        .join("index.html")
}
