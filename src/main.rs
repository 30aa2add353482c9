//! Compliance Ledger CLI
//!
//! Append records, inspect user chains, and export signed evidence packages.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use compliance_ledger::{
    init_tracing, ComplianceRecord, EvidenceAssembler, LedgerConfig, RecordKind,
};

#[derive(Parser)]
#[command(name = "compliance-ledger")]
#[command(about = "Tamper-evident compliance ledger")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append one record or an array of records from a JSON file
    Append {
        file: PathBuf,
    },

    /// Print a user's history grouped by kind
    History {
        user_id: String,
    },

    /// Build and sign the evidence package of an order
    Evidence {
        order_id: String,

        /// Write the package here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify a user's hash chain
    VerifyChain {
        user_id: String,
    },

    /// Recompute the hash of one stored record
    VerifyRecord {
        /// VALIDATION, APPEAL, ACCESS_CHECK or GEOFENCE_CHECK
        kind: String,
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LedgerConfig::load(cli.config.as_deref())?;
    init_tracing(&config.log_filter);
    info!("Configuration loaded");

    let ledger = config.open_ledger().await?;

    match cli.command {
        Commands::Append { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let value: serde_json::Value = serde_json::from_str(&contents)?;
            let records: Vec<ComplianceRecord> = match value {
                serde_json::Value::Array(_) => serde_json::from_value(value)?,
                other => vec![serde_json::from_value(other)?],
            };

            for record in records {
                let stored = ledger.append(record).await?;
                println!("Appended {}", stored.summary());
            }
        }

        Commands::History { user_id } => {
            let history = ledger.get_user_history(&user_id).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }

        Commands::Evidence { order_id, output } => {
            let signer = config.load_signer()?;
            let assembler = EvidenceAssembler::new(ledger.clone(), signer);
            let package = assembler.build_evidence_package(&order_id).await?;
            let json = package.to_json()?;

            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    println!("{}", package.summary());
                    println!("Written to {:?}", path);
                }
                None => println!("{}", json),
            }
        }

        Commands::VerifyChain { user_id } => {
            let verification = ledger.verify_user_chain(&user_id).await?;
            println!("{}", verification.summary());
            if !verification.is_valid {
                println!("{}", verification.detailed_status());
                ledger.close().await?;
                std::process::exit(1);
            }
        }

        Commands::VerifyRecord { kind, id } => {
            let kind: RecordKind = kind.parse().map_err(|e: String| anyhow!(e))?;
            if ledger.verify_record(kind, &id).await? {
                println!("{} {} is intact", kind, id);
            } else {
                println!("{} {} is missing or fails hash verification", kind, id);
                ledger.close().await?;
                std::process::exit(1);
            }
        }
    }

    ledger.close().await?;
    Ok(())
}
