use courier_core::prelude::*;
use courier_examples::run_demo;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let base_url = dotenvy::var("COURIER_BASE_URL").unwrap_or_else(|_| "https://httpbin.org".into());
    let mut builder = Settings::builder().variable("base_url", base_url);
    if let Ok(path) = dotenvy::var("COURIER_SETTINGS") {
        builder = builder.file(SettingsFile::load(path)?)?;
    }
    let level = dotenvy::var("COURIER_DEBUG")
        .ok()
        .and_then(|s| DebugLevel::parse(&s))
        .unwrap_or(DebugLevel::V);

    let courier = Courier::new(builder.build()).with_debug_level(level);
    run_demo(&courier).await?;
    Ok(())
}
