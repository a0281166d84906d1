//! noxherd entry point
//!
//! Initializes logging, loads configuration and reports the player, pool
//! and adb connection status.

use anyhow::Result;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use noxherd_core::AppConfig;
use noxherd_emulator_bridge::{AdbClient, SlotPool};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("{} v{} starting...", noxherd::APP_NAME, noxherd::VERSION);

    let config = AppConfig::load().await?;
    info!("Player executable: {:?}", config.player.player_exe());

    let pool = SlotPool::new(config.player.pool_capacity);
    info!(
        "Clone pool: capacity {}, {} free",
        pool.capacity(),
        pool.free_count()
    );

    let adb = AdbClient::default();
    match adb.list_devices().await {
        Ok(devices) => {
            info!("{} adb connection(s)", devices.len());
            for device in devices {
                info!("  {} [{}]", device.serial, device.state.as_str());
            }
        }
        Err(e) => warn!("adb unavailable: {}", e),
    }

    Ok(())
}
