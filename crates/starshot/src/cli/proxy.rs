//! The `starshot proxy` command for inspecting proxy health.

use clap::{Args, Subcommand};
use serde::Serialize;
use starshot_core::proxy::origin_of;
use starshot_core::{
    Clock, Config, FileHealthStore, ProxyCandidate, ProxyHealthStore, ProxyRouter, SystemClock,
};
use std::sync::Arc;

/// Arguments for the `proxy` command.
#[derive(Args, Debug)]
pub struct ProxyArgs {
    #[command(subcommand)]
    pub command: ProxyCommand,
}

/// Subcommands for proxy management.
#[derive(Subcommand, Debug)]
pub enum ProxyCommand {
    /// List configured proxies in priority order with their health
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Forget all recorded proxy health
    Clear,
}

/// One row of `proxy list`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProxyRow {
    priority: usize,
    url: String,
    success_count: u64,
    failure_count: u64,
    success_rate: Option<f64>,
    last_updated_at: Option<u64>,
}

impl ProxyRow {
    fn new(priority: usize, candidate: ProxyCandidate) -> Self {
        let health = candidate.health.as_ref();
        Self {
            priority,
            success_count: health.map_or(0, |h| h.success_count),
            failure_count: health.map_or(0, |h| h.failure_count),
            success_rate: health.map(|h| h.success_rate()),
            last_updated_at: health.map(|h| h.last_updated_at),
            url: candidate.url,
        }
    }
}

/// Execute the proxy command.
pub async fn execute(config: Config, args: ProxyArgs) -> anyhow::Result<()> {
    let store: Arc<dyn ProxyHealthStore> = Arc::new(FileHealthStore::new(
        config.health_file(),
        config.health_ttl(),
        Arc::new(SystemClock),
    ));

    match args.command {
        ProxyCommand::List { json } => {
            let rows = list(&config, store)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No proxies configured.");
            } else {
                if !config.proxy.enabled {
                    println!("(proxying is disabled; set proxy.enabled = true to use these)");
                }
                let now = SystemClock.now_ms();
                for row in &rows {
                    println!("{}", format_row(row, now));
                }
            }
        }

        ProxyCommand::Clear => {
            store.clear();
            tracing::info!("Proxy health cleared at {}", config.health_file().display());
            println!("Proxy health cleared.");
        }
    }

    Ok(())
}

/// Configured proxies (enabled or not) with their unexpired health.
fn list(config: &Config, store: Arc<dyn ProxyHealthStore>) -> anyhow::Result<Vec<ProxyRow>> {
    let origin = origin_of(&config.api.base_url)
        .ok_or_else(|| anyhow::anyhow!("api.base_url is not a valid URL"))?;
    let mut config = config.clone();
    config.proxy.enabled = true;

    let router = ProxyRouter::new(origin, config.proxy_urls(), store);
    Ok(router
        .candidates()
        .into_iter()
        .enumerate()
        .map(|(i, c)| ProxyRow::new(i + 1, c))
        .collect())
}

fn format_row(row: &ProxyRow, now_ms: u64) -> String {
    match (row.success_rate, row.last_updated_at) {
        (Some(rate), Some(at)) => format!(
            "{}. {}  ok={} failed={} ({:.0}%)  updated {}s ago",
            row.priority,
            row.url,
            row.success_count,
            row.failure_count,
            rate * 100.0,
            now_ms.saturating_sub(at) / 1000
        ),
        _ => format!("{}. {}  no recent data", row.priority, row.url),
    }
}
