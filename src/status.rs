//! Periodic device status table
//!
//! Prints the registry to stdout every tick and forgets silent devices when
//! a TTL is configured.

use std::fmt::Write;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::devices::Device;
use crate::listener::SharedRegistry;

const HEADERS: [&str; 5] = ["Chip Id", "Device Type", "Value", "Update Time", "Address"];

/// Render devices as a fixed-width table
#[must_use]
pub fn render_table(devices: &[Device]) -> String {
    let rows: Vec<[String; 5]> = devices
        .iter()
        .map(|d| {
            [
                d.chip_id.to_string(),
                d.device_type.to_string(),
                d.value.to_string(),
                d.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                d.addr.to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(&mut out, &rule, &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    if rows.is_empty() {
        out.push_str("(no devices)\n");
    }
    out
}

fn push_row<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize; 5]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell.as_ref(), width = *width))
        .collect::<Vec<_>>()
        .join(" | ");
    let _ = writeln!(out, "{}", line.trim_end());
}

/// Print the table every `interval` until shutdown
///
/// The first table is printed one interval after start.
#[allow(clippy::future_not_send)]
pub async fn run(
    registry: SharedRegistry,
    interval: Duration,
    device_ttl: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) {
    let ttl = device_ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok());
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        let devices = {
            let mut registry = registry.borrow_mut();
            if let Some(ttl) = ttl {
                let removed = registry.sweep_stale(Utc::now(), ttl);
                if removed > 0 {
                    tracing::info!(removed, "forgot silent devices");
                }
            }
            registry.all()
        };

        println!("{}", render_table(&devices));
    }

    tracing::debug!("status reporter stopped");
}
