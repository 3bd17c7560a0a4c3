//! `meshsync check`: validate the config and show what `run` would start.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use meshsync_core::paths::filter_file_path;
use meshsync_core::{Config, FolderSettings, HostEnv};
use meshsync_daemon::{exchange_name, queue_name};

use super::load_config;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Config file; defaults to `<config dir>/meshsync/config.yaml`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Inspect another host's entry instead of the local one.
    #[arg(long)]
    pub host: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct FolderReport {
    remote: String,
    checksum: String,
    local: String,
    debounce_ms: u64,
    filters: usize,
    filter_file: String,
    exchange: String,
    queue: String,
}

#[derive(Tabled)]
struct FolderRow {
    #[tabled(rename = "remote")]
    remote: String,
    #[tabled(rename = "local")]
    local: String,
    #[tabled(rename = "id")]
    nick: String,
    #[tabled(rename = "debounce")]
    debounce: String,
    #[tabled(rename = "exchange")]
    exchange: String,
    #[tabled(rename = "queue")]
    queue: String,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let env = match self.host {
            Some(host) => {
                HostEnv::for_host(host).context("could not resolve the home directory")?
            }
            None => HostEnv::detect().context("could not resolve the local host")?,
        };

        let reports = build_reports(&config, &env)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&reports).context("failed to serialize check JSON")?
            );
            return Ok(());
        }

        print_table(&env.hostname, &config, reports);
        Ok(())
    }
}

fn build_reports(config: &Config, env: &HostEnv) -> Result<Vec<FolderReport>> {
    let folders = config
        .folders_for(&env.hostname)
        .with_context(|| format!("no folders would start on '{}'", env.hostname))?;
    Ok(folders.iter().map(|folder| report(folder, env)).collect())
}

fn report(folder: &FolderSettings, env: &HostEnv) -> FolderReport {
    FolderReport {
        remote: folder.remote.clone(),
        checksum: folder.checksum.to_string(),
        local: folder.local.display().to_string(),
        debounce_ms: u64::try_from(folder.debounce.as_millis()).unwrap_or(u64::MAX),
        filters: folder.filters.len(),
        filter_file: filter_file_path(&env.home, &env.hostname, &folder.checksum)
            .display()
            .to_string(),
        exchange: exchange_name(&folder.checksum),
        queue: queue_name(&env.hostname, &folder.checksum),
    }
}

fn print_table(hostname: &str, config: &Config, reports: Vec<FolderReport>) {
    println!(
        "meshsync v{} | host {} | broker {}:{} | {} folders",
        env!("CARGO_PKG_VERSION"),
        hostname.bold(),
        config.connection.hostname,
        config.connection.port,
        reports.len(),
    );

    if reports.is_empty() {
        println!("{}", "No folders configured for this host.".yellow());
        return;
    }

    let rows: Vec<FolderRow> = reports
        .into_iter()
        .map(|r| FolderRow {
            nick: r.checksum.chars().take(6).collect(),
            remote: r.remote,
            local: r.local,
            debounce: format!("{}ms", r.debounce_ms),
            exchange: r.exchange,
            queue: r.queue,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{}", "config OK".green());
}
