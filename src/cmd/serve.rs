//! Server commands: `char3 serve` and `char3 init-db`.

use anyhow::Result;

use char3_dashboard::config::DashboardConfig;
use char3_dashboard::dashboard::db::DashboardDb;
use char3_dashboard::dashboard::server::{ServerConfig, start_server};

pub async fn cmd_serve(config: &DashboardConfig, dev: bool, open: bool, no_poll: bool) -> Result<()> {
    start_server(
        config,
        ServerConfig {
            dev_mode: dev,
            // No browser inside dev containers.
            open_browser: open && !dev,
            no_poll,
        },
    )
    .await
}

pub fn cmd_init_db(config: &DashboardConfig) -> Result<()> {
    DashboardDb::new(config.db_path())?;
    println!(
        "Dashboard database initialized at {}",
        config.db_path().display()
    );
    Ok(())
}
