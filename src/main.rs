use cdr_core::config::{config_path_env, resolve_config_path};
use cdr_core::{CdrState, CoreConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the CDR application
///
/// Loads the configuration, connects the openEHR and discovery clients and serves the REST API
/// (with Swagger UI at `/swagger-ui`).
///
/// # Environment Variables
/// - `CDR_CONFIG`: Path to the JSON configuration file (default: "config/cdr.json")
/// - `CDR_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `RUST_LOG`: Log filter, on top of the default `cdr=info`
///
/// # Errors
/// Returns an error if:
/// - the configuration cannot be read or is invalid,
/// - the remote clients cannot be built, or
/// - the server address cannot be bound.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cdr_run=info".parse()?)
                .add_directive("cdr_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = resolve_config_path(std::env::var(config_path_env()).ok());
    tracing::info!("++ Loading CDR configuration from {}", config_path.display());
    let cfg = CoreConfig::load(&config_path)?;

    tracing::info!(
        hosts = ?cfg.host_names().collect::<Vec<_>>(),
        default_host = cfg.default_host(),
        headings = ?cfg.headings(),
        "configuration loaded"
    );
    let state = CdrState::connect(cfg)?;

    let rest_addr = std::env::var("CDR_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    tracing::info!("++ Starting CDR REST on {}", rest_addr);

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, api_rest::router(state)).await?;

    Ok(())
}
