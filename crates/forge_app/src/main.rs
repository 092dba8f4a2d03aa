use forge_app::app::run;
use forge_service::ForgeConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let config = match ForgeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(%err, "invalid configuration, using defaults");
            ForgeConfig::default()
        }
    };
    match run(config).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("Failed to render report: {err}"),
        },
        Err(err) => eprintln!("Forge demo failed: {err:#}"),
    }
}
