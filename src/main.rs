use asrr_agent::output;
use asrr_agent::server::{self, AppOptions};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Directory scanned for agent definitions, one sub-directory per agent.
const AGENTS_ROOT_DIR: &str = "agents";

/// Container storage is ephemeral, so sessions only last as long as the instance.
const SESSION_DB_URL: &str = "sqlite:///./sessions.db";

const ALLOWED_ORIGINS: [&str; 3] = ["http://localhost", "http://localhost:8080", "*"];

const SERVE_WEB_INTERFACE: bool = true;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asrr_agent=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    output::startup_banner(env!("CARGO_PKG_VERSION"));

    let agents_dir = PathBuf::from(AGENTS_ROOT_DIR);
    let config = server::load_server_config(&agents_dir)
        .inspect_err(|e| output::startup_error(&e.to_string()))?;

    let options = AppOptions {
        agents_dir,
        session_service_uri: SESSION_DB_URL.to_string(),
        allow_origins: ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
        web: SERVE_WEB_INTERFACE,
        model_backend: config.model_backend.clone(),
    };

    output::section("Configuration");
    output::config_item("Agents", &options.agents_dir.display().to_string());
    output::config_item("Sessions", &options.session_service_uri);
    output::config_item("CORS origins", &options.allow_origins.join(", "));
    output::config_item("Model region", &config.model_backend.region);

    let app = server::build_app(&options).inspect_err(|e| output::startup_error(&e.to_string()))?;

    output::server_ready(config.port, options.web);
    server::serve(app, config.port).await?;

    Ok(())
}
