use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use compliance_ledger::crypto::{parse_public_key, Secp256k1Signer};
use compliance_ledger::{init_tracing, verify_evidence_package, EvidencePackage};

/// Verify an exported evidence package against the signer's public key
#[derive(Parser)]
#[command(name = "verify-evidence")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the exported package (JSON)
    package: PathBuf,

    /// Signer public key, hex
    #[arg(short, long)]
    public_key: String,

    /// Show every check and a membership proof per record
    #[arg(short, long)]
    verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.quiet {
        init_tracing("error");
    } else if cli.verbose {
        init_tracing("compliance_ledger=debug");
    } else {
        init_tracing("compliance_ledger=info");
    }

    let json = std::fs::read_to_string(&cli.package)
        .with_context(|| format!("Failed to read {:?}", cli.package))?;
    let package = EvidencePackage::from_json(&json)?;
    let verifier = Secp256k1Signer::verifier(parse_public_key(&cli.public_key)?);

    info!("Verifying {}", package.summary());
    let verification = verify_evidence_package(&package, &verifier);

    if cli.verbose {
        println!("{}", verification.detailed_status());
        for node in &package.hash_chain {
            let proven = package
                .membership_proof(&node.id)
                .map(|proof| proof.verify())
                .unwrap_or(false);
            println!("  {} {}: {}", node.kind, node.id, if proven { "in merkle tree" } else { "NOT PROVEN" });
        }
    }

    if verification.is_verified() {
        if !cli.quiet {
            println!("✅ {}", verification.summary());
        }
        Ok(())
    } else {
        error!("{}", verification.summary());
        eprintln!("❌ {}", verification.summary());
        std::process::exit(1);
    }
}
