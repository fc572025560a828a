// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Plugin Updater - command line entry point

use clap::{Parser, Subcommand};
use plugin_updater::{LocalHost, UpdateOrchestrator, UpgradeResult, load_config};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "plugin-updater", version, about = "Keep a plugin in sync with its GitHub releases")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, default_value = "updater.json")]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report whether a newer release exists
    Check,
    /// Install the latest release if it is newer
    Upgrade,
    /// Show details of the latest release
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("plugin_updater={level}").parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli.config)?;
    info!(
        "Loaded config for {}/{} at {}",
        config.owner,
        config.repo,
        config.install_dir.display()
    );

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current step");
            ctrl_c_cancel.cancel();
        }
    });

    let host = Arc::new(LocalHost::from_config(&config));
    let orchestrator = UpdateOrchestrator::new(&config, host)?.with_cancellation(cancel);

    match cli.command {
        Command::Check => {
            let check = orchestrator.check_for_update().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&check)?);
            } else if check.available {
                println!(
                    "update available: {} -> {}",
                    check.installed_version, check.latest_version
                );
            } else {
                println!("up to date ({})", check.installed_version);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Upgrade => {
            let result = orchestrator.perform_upgrade().await?;
            println!("{result}");
            match result {
                UpgradeResult::Applied {
                    enable_error: Some(e),
                    ..
                } => {
                    eprintln!("warning: {e}");
                    Ok(ExitCode::SUCCESS)
                }
                UpgradeResult::Applied { .. } | UpgradeResult::NotNeeded => Ok(ExitCode::SUCCESS),
                UpgradeResult::Failed(_) => Ok(ExitCode::FAILURE),
            }
        }
        Command::Info => {
            let Some(details) = orchestrator
                .release_details(orchestrator.package_id())
                .await?
            else {
                return Ok(ExitCode::FAILURE);
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&details)?);
                return Ok(ExitCode::SUCCESS);
            }

            println!("{} ({})", details.name, details.slug);
            if let Some(author) = &details.author {
                println!("author:      {author}");
            }
            if let Some(homepage) = &details.homepage {
                println!("homepage:    {homepage}");
            }
            println!("installed:   {}", details.installed_version);
            println!("latest:      {}", details.version);
            if let Some(published) = details.last_updated {
                println!("published:   {}", published.format("%Y-%m-%d %H:%M UTC"));
            }
            if let Some(requires) = &details.hints.min_host_version {
                println!("requires:    {requires}");
            }
            if let Some(tested) = &details.hints.max_host_version {
                println!("tested:      {tested}");
            }
            println!("download:    {}", details.download_link);
            if !details.notes.trim().is_empty() {
                println!();
                println!("{}", details.notes.trim());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
