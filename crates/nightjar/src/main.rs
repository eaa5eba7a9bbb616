// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nightjar - a single-binary personal AI assistant gateway.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Nightjar - a personal AI assistant gateway.
#[derive(Parser, Debug)]
#[command(name = "nightjar", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the state directory, default config, and workspace scaffold.
    Onboard,
    /// Show configuration, channel, cron, and memory status.
    Status,
    /// Run an agent turn (or an interactive session) from the CLI.
    Agent {
        /// Single message (non-interactive).
        #[arg(short, long)]
        message: Option<String>,
        /// Session key.
        #[arg(short, long, default_value = "cli:default")]
        session: String,
        /// Workspace directory (default: ~/.nightjar/workspace or NIGHTJAR_WORKSPACE).
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Max tool-call iterations.
        #[arg(long, default_value_t = 20)]
        max_iters: usize,
        /// Verbose logging.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Run the long-lived gateway (channels + cron + heartbeat).
    Gateway {
        /// Workspace directory (default: ~/.nightjar/workspace or NIGHTJAR_WORKSPACE).
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Max tool-call iterations.
        #[arg(long, default_value_t = 20)]
        max_iters: usize,
        /// Verbose logging.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Inspect channel adapters.
    Channels {
        #[command(subcommand)]
        command: ChannelsCommands,
    },
    /// Manage scheduled jobs.
    Cron {
        #[command(subcommand)]
        command: CronCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ChannelsCommands {
    /// Show configured channels and their enablement.
    Status,
}

#[derive(Subcommand, Debug)]
enum CronCommands {
    /// List jobs (including disabled).
    List,
    /// Add a job.
    Add {
        /// Job name (defaults to the message).
        #[arg(long)]
        name: Option<String>,
        /// Message for the agent turn.
        #[arg(long)]
        message: String,
        /// Run every N seconds.
        #[arg(long)]
        every: Option<i64>,
        /// 5-field cron expression.
        #[arg(long)]
        cron: Option<String>,
        /// Run once at an RFC3339 time.
        #[arg(long)]
        at: Option<String>,
        /// Skip delivering the response to a channel.
        #[arg(long)]
        no_deliver: bool,
        /// Delivery channel (e.g. telegram).
        #[arg(long)]
        channel: Option<String>,
        /// Delivery chat/user id.
        #[arg(long)]
        to: Option<String>,
    },
    /// Remove a job.
    Remove { job_id: String },
    /// Enable or disable a job.
    Toggle {
        job_id: String,
        #[arg(long)]
        disable: bool,
    },
    /// Trigger a job immediately.
    Run {
        job_id: String,
        /// Run even if disabled.
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbose = matches!(
        cli.command,
        Commands::Agent { verbose: true, .. } | Commands::Gateway { verbose: true, .. }
    );
    init_tracing(verbose);

    let result = match cli.command {
        Commands::Onboard => commands::onboard::run(),
        Commands::Status => commands::status::run().await,
        Commands::Agent {
            message,
            session,
            workspace,
            max_iters,
            verbose: _,
        } => commands::agent_cmd::run(message, session, workspace, max_iters).await,
        Commands::Gateway {
            workspace,
            max_iters,
            verbose: _,
        } => commands::gateway::run(workspace, max_iters).await,
        Commands::Channels {
            command: ChannelsCommands::Status,
        } => commands::channels_cmd::status(),
        Commands::Cron { command } => commands::cron_cmd::run(command).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
