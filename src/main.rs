use anyhow::Result;
use log::{info, LevelFilter};

use emu2mqtt::cli;
use emu2mqtt::config::Settings;
use emu2mqtt::services::LifecycleController;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli::build_cli().get_matches();
    let settings = Settings::from_matches(&matches)?;

    env_logger::Builder::new()
        .filter_level(if settings.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .init();

    info!("🔌 emu2mqtt {} starting", emu2mqtt::VERSION);

    // Serial open failure or a refused broker connection propagate here and
    // exit non-zero; a Ctrl-C shutdown exits zero.
    let controller = LifecycleController::start(settings)?;
    controller.run().await?;
    Ok(())
}
