//! Foreground daemon: one periodic tick per active entity until Ctrl-C.

use std::time::Duration;

use epochtap_core::Driver;
use tracing::{error, info};

use crate::context::{Context, Output};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = Context::open(Output::Console)?;
    let interval = Duration::from_secs(ctx.config.scheduler.tick_interval_secs);
    let driver = Driver::new(ctx.tracker.clone(), &ctx.config.scheduler);

    let watched = driver.reconcile().await?;
    info!(
        entities = watched,
        data_dir = %ctx.data_dir.display(),
        "driver started"
    );

    // Records changed by other `epochtap` invocations are picked up on the
    // next reconcile.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(interval) => {
                if let Err(e) = driver.reconcile().await {
                    error!(error = %e, "reconcile failed");
                }
            }
        }
    }

    driver.shutdown().await;
    Ok(())
}
