//! `podesk scan once`: one delay sweep, outside the daemon's schedule.

use anyhow::Result;
use podesk_schemas::ReminderCategory;

use super::{connect, load_config};

pub async fn once(config_paths: &[String]) -> Result<()> {
    let (_, cfg) = load_config(config_paths)?;
    let wiring = connect(&cfg).await?;

    let report = wiring.scanner.scan_once().await;
    println!("scan_at_utc={}", report.at.to_rfc3339());
    for category in ReminderCategory::ALL {
        let c = report.category(category);
        println!(
            "category={} candidates={} claimed={} skipped={} dispatched={} dispatch_failed={} \
             errors={}",
            category.as_str(),
            c.candidates,
            c.claimed,
            c.skipped,
            c.dispatched,
            c.dispatch_failed,
            c.errors
        );
    }
    println!("total_claimed={}", report.total_claimed());
    Ok(())
}
