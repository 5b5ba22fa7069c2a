//! Command-line entry point for discord-archiver

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use discord_archiver::checkpoint::{latest_message_id, locate};
use discord_archiver::partition::list_partitions;
use discord_archiver::session::connect;
use discord_archiver::{
    ChannelId, CliExporter, Config, DiscordClient, ExportOutcome, RunSummary, Session,
    cancel_on_signal, logging,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Archive Discord channels and threads with crash-resumable exports
#[derive(Parser)]
#[command(name = "discord-archiver")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the JSON configuration file
    #[arg(
        short,
        long,
        global = true,
        default_value = "config.json",
        env = "DISCORD_ARCHIVER_CONFIG"
    )]
    config: PathBuf,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover channels and export them (default)
    Run {
        /// Run a single pass even if a repeat interval is configured
        #[arg(long)]
        once: bool,
    },

    /// Discover channels, update the cache and print them without exporting
    Discover,

    /// Show the resume checkpoint and newest exported message of a channel
    Inspect {
        /// Channel or thread id
        channel_id: ChannelId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Run { once: false }) {
        Commands::Run { once } => run(config, once).await,
        Commands::Discover => discover(config).await,
        Commands::Inspect { channel_id } => inspect(&config.paths.output_dir, channel_id).await,
    }
}

async fn run(config: Config, once: bool) -> Result<()> {
    config
        .ensure_directories()
        .context("failed to create output directories")?;

    let client = Arc::new(DiscordClient::new(&config.token, &config.platform)?);
    let exporter = Arc::new(CliExporter::from_config(&config)?);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let session = Session::new(config, client, exporter, shutdown);
    if once {
        let summary = session.run_once().await?;
        print_summary(&summary);
    } else {
        session.run_scheduled().await?;
    }
    Ok(())
}

async fn discover(config: Config) -> Result<()> {
    let client = Arc::new(DiscordClient::new(&config.token, &config.platform)?);
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let channels = connect(client, Arc::new(config), &shutdown).await?;

    for channel in &channels {
        println!("{}\t{}\t{}", channel.id, channel.kind, channel.display_path());
    }
    println!("{} channels", channels.len());
    Ok(())
}

async fn inspect(output_dir: &Path, channel_id: ChannelId) -> Result<()> {
    let partitions = list_partitions(output_dir, channel_id).await?;
    println!("channel:     {}", channel_id);
    println!("partitions:  {}", partitions.len());
    for partition in &partitions {
        println!("  part {:>4}  {}", partition.part(), partition.path.display());
    }

    match latest_message_id(channel_id, output_dir).await {
        Some(id) => println!("latest:      {}", id),
        None => println!("latest:      unknown"),
    }

    match locate(channel_id, output_dir).await {
        Some(checkpoint) => {
            println!("resume:      after {}", checkpoint.last_confirmed_message_id);
            println!("next part:   {}", checkpoint.next_part_index);
            for path in &checkpoint.files_to_delete {
                println!("replaces:    {}", path.display());
            }
        }
        None => println!("resume:      none (fresh export)"),
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} channels: {} fresh, {} resumed, {} skipped, {} failed{}",
        summary.reports.len(),
        summary.count(ExportOutcome::Fresh),
        summary.count(ExportOutcome::Resumed),
        summary.count(ExportOutcome::Skipped),
        summary.count(ExportOutcome::Failed),
        if summary.interrupted { " (interrupted)" } else { "" }
    );
}
