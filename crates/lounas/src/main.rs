use std::sync::Arc;

use tracing::info;

use lounas_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), lounas_core::Error> {
    lounas_core::logging::init("lounas")?;

    let cfg = Arc::new(Config::load()?);
    info!("Settings loaded from {}", cfg.settings_file.display());

    lounas_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| lounas_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
