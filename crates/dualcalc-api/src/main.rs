//! Binary entrypoint for the Dualcalc API server.
use dualcalc_api::run;
use dualcalc_core::CalcConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Defaults can be overridden with DUALCALC_ADDR and DUALCALC_CONFIG
    let addr = std::env::var("DUALCALC_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let config_path =
        std::env::var("DUALCALC_CONFIG").unwrap_or_else(|_| "config.json".to_string());

    let config = CalcConfig::load(&config_path)?;
    run(&addr, &config).await
}
