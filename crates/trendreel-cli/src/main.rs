/*
 *  Copyright 2025-2026 Trendreel Developers
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! trendreel CLI: one-shot orchestration, queue workers, the push endpoint
//! server and operator maintenance commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::Runtime;

/// trendreel - claim-before-work batch creative generation
#[derive(Parser)]
#[command(name = "trendreel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to TRENDREEL_CONFIG, then the search paths)
    #[arg(short, long, env = "TRENDREEL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Database URL, overriding `[database] url`
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Table and agent selection shared by the dispatch commands.
#[derive(clap::Args, Debug, Clone)]
struct TargetArgs {
    /// Dataset (PostgreSQL schema) holding the Row Store table
    #[arg(long)]
    dataset: Option<String>,

    /// Row Store table name
    #[arg(long)]
    table: Option<String>,

    /// Agent runtime resource id to invoke
    #[arg(long, env = "AGENT_RESOURCE_ID")]
    agent_resource_id: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Claim unclaimed rows and publish one work message per row
    Orchestrate {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Claim unclaimed rows and process them in this process
    Batch {
        #[command(flatten)]
        target: TargetArgs,

        /// Maximum agent invocations in flight
        #[arg(long)]
        max_concurrent: Option<usize>,
    },
    /// Consume work messages until interrupted
    Work {
        /// Process at most one message and exit
        #[arg(long)]
        once: bool,
    },
    /// Serve the push endpoints (/orchestrate, /work) plus /healthz and /metrics
    Serve {
        /// Address to bind, overriding `[server] bind_address`
        #[arg(long)]
        bind: Option<String>,
    },
    /// Administrative commands for operating the Row Store
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Reset rows stuck in QUEUED or PROCESSING back to unclaimed
    ResetStale {
        /// Reset claims older than this duration (e.g., "2h", "1h30m", "1d")
        #[arg(long)]
        older_than: Option<String>,

        #[arg(long)]
        dataset: Option<String>,

        #[arg(long)]
        table: Option<String>,
    },
    /// Reset a single row back to unclaimed
    Reset {
        /// The row's entry_timestamp (RFC 3339)
        #[arg(long)]
        entry_timestamp: String,

        #[arg(long)]
        dataset: Option<String>,

        #[arg(long)]
        table: Option<String>,
    },
    /// Apply database migrations
    Migrate,
    /// Insert rows from a JSON array file as unclaimed work
    Seed {
        /// File holding `[{"entry_timestamp": ..., "target_trend": ..., ...}]`
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        dataset: Option<String>,

        #[arg(long)]
        table: Option<String>,
    },
}

fn init_tracing(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = trendreel::ConfigLoader::new()
        .load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(url) = cli.database_url.clone() {
        config.database.url = url;
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Orchestrate { target } => {
            let runtime = Runtime::connect(config).await?;
            commands::orchestrate::run(&runtime, target.into(), None).await?;
        }
        Commands::Batch {
            target,
            max_concurrent,
        } => {
            let runtime = Runtime::connect(config).await?;
            commands::orchestrate::run_batch(&runtime, target.into(), max_concurrent).await?;
        }
        Commands::Work { once } => {
            let runtime = Runtime::connect(config).await?;
            commands::work::run(&runtime, once).await?;
        }
        Commands::Serve { bind } => {
            let runtime = Runtime::connect(config).await?;
            commands::serve::run(runtime, bind).await?;
        }
        Commands::Admin { command } => match command {
            AdminCommands::ResetStale {
                older_than,
                dataset,
                table,
            } => {
                let runtime = Runtime::connect(config).await?;
                let table = runtime.table(dataset, table);
                commands::admin::reset_stale(&runtime, &table, older_than.as_deref()).await?;
            }
            AdminCommands::Reset {
                entry_timestamp,
                dataset,
                table,
            } => {
                let runtime = Runtime::connect(config).await?;
                let table = runtime.table(dataset, table);
                commands::admin::reset(&runtime, &table, &entry_timestamp).await?;
            }
            AdminCommands::Migrate => {
                commands::admin::migrate(&config).await?;
            }
            AdminCommands::Seed {
                file,
                dataset,
                table,
            } => {
                let runtime = Runtime::connect(config).await?;
                let table = runtime.table(dataset, table);
                commands::admin::seed(&runtime, &table, &file).await?;
            }
        },
    }

    Ok(())
}

impl From<TargetArgs> for commands::orchestrate::Target {
    fn from(args: TargetArgs) -> Self {
        Self {
            dataset: args.dataset,
            table: args.table,
            agent_resource_id: args.agent_resource_id,
        }
    }
}
