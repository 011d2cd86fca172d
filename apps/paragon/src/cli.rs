//! # Command Line
//!
//! ```text
//! paragon [--config PATH] [--database PATH] <COMMAND>
//!
//!   ingest [--interactive] [--inbox DIR]
//!   serve  [--port PORT]
//!   users  list | add NAME
//!   payments unassigned | assign NAME USER_ID | ignore NAME | unignore NAME | ignored
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use paragon_ingest::{IngestConfig, Ingestor};
use tracing::info;

use crate::prompt::TerminalPrompt;
use crate::server;

#[derive(Parser, Debug)]
#[command(name = "paragon", version, about = "Household receipt ingestion")]
pub struct Cli {
    /// Config file (default: the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database file, overrides the config
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process every receipt file waiting in the inbox
    Ingest {
        /// Ask who owns unknown payment labels
        #[arg(short, long)]
        interactive: bool,

        /// Read from this folder instead of the configured inbox
        #[arg(long)]
        inbox: Option<PathBuf>,
    },

    /// Run the HTTP upload server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Household members
    Users {
        #[command(subcommand)]
        action: UsersCommand,
    },

    /// Payment labels
    Payments {
        #[command(subcommand)]
        action: PaymentsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum UsersCommand {
    /// List members, "Other" last
    List,
    /// Add a member
    Add { name: String },
}

#[derive(Subcommand, Debug)]
pub enum PaymentsCommand {
    /// Labels on stored receipts that nobody owns yet
    Unassigned,
    /// Assign a label to a member and re-flag its receipts
    Assign { payment_name: String, user_id: i64 },
    /// Skip receipts paid with this label from now on
    Ignore { payment_name: String },
    /// Remove a label from the ignore list
    Unignore { payment_name: String },
    /// Show the ignore list
    Ignored,
}

impl Cli {
    /// Loads configuration, opens the database and runs the command.
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = IngestConfig::load(self.config).context("loading configuration")?;
        if let Some(path) = self.database {
            config.database.path = path;
        }

        let ingestor = Ingestor::open(&config)
            .await
            .with_context(|| format!("opening database {}", config.database.path.display()))?;

        let result = match self.command {
            Command::Ingest { interactive, inbox } => {
                run_ingest(ingestor.clone(), &config, interactive, inbox).await
            }
            Command::Serve { port } => {
                let mut settings = config.server.clone();
                if let Some(port) = port {
                    settings.port = port;
                }
                server::serve(ingestor.clone(), &settings).await
            }
            Command::Users { action } => run_users(&ingestor, action).await,
            Command::Payments { action } => run_payments(&ingestor, action).await,
        };

        ingestor.database().close().await;
        result
    }
}

async fn run_ingest(
    mut ingestor: Ingestor,
    config: &IngestConfig,
    interactive: bool,
    inbox: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(inbox) = inbox {
        ingestor = ingestor.with_inbox(inbox);
    }
    if interactive || config.ingest.interactive {
        ingestor = ingestor.with_prompt(Arc::new(TerminalPrompt::stdio()));
    }

    info!(inbox = ?ingestor.files().inbox(), "Processing inbox");
    let summary = ingestor
        .process_inbox_with(|report| println!("{}: {}", report.file, report.status))
        .await?;

    println!();
    println!("{}", summary);
    Ok(())
}

async fn run_users(ingestor: &Ingestor, action: UsersCommand) -> anyhow::Result<()> {
    let users = ingestor.database().users();
    match action {
        UsersCommand::List => {
            for user in users.list_users().await? {
                let marker = if user.is_other { "  (not ours)" } else { "" };
                println!("{:>4}  {}{}", user.user_id, user.name, marker);
            }
        }
        UsersCommand::Add { name } => {
            let user = users.add_user(&name).await?;
            println!("Added {} (id {})", user.name, user.user_id);
        }
    }
    Ok(())
}

async fn run_payments(ingestor: &Ingestor, action: PaymentsCommand) -> anyhow::Result<()> {
    let payments = ingestor.database().payments();
    match action {
        PaymentsCommand::Unassigned => {
            let unassigned = payments.unassigned_payment_names().await?;
            if unassigned.is_empty() {
                println!("No unassigned payment names");
            }
            for entry in unassigned {
                println!("{:>4}  {}", entry.receipt_count, entry.payment_name);
            }
        }
        PaymentsCommand::Assign {
            payment_name,
            user_id,
        } => {
            let updated = payments.assign_payment(&payment_name, user_id).await?;
            println!(
                "Assigned '{}' to user {} ({} receipt(s) updated)",
                payment_name, user_id, updated
            );
        }
        PaymentsCommand::Ignore { payment_name } => {
            if payments.add_ignored(&payment_name).await? {
                println!("Ignoring '{}'", payment_name);
            } else {
                println!("'{}' is already ignored", payment_name);
            }
        }
        PaymentsCommand::Unignore { payment_name } => {
            if payments.remove_ignored(&payment_name).await? {
                println!("No longer ignoring '{}'", payment_name);
            } else {
                println!("'{}' was not ignored", payment_name);
            }
        }
        PaymentsCommand::Ignored => {
            for name in payments.list_ignored().await? {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
