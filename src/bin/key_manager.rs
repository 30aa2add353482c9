//! Key Management CLI Tool
//!
//! Generates evidence signing keys and prints their public keys.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use compliance_ledger::crypto::{generate_signing_key, save_signing_key, Secp256k1Signer};
use compliance_ledger::init_tracing;

#[derive(Parser)]
#[command(name = "key-manager")]
#[command(about = "Compliance ledger signing key tool")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new signing key
    Generate {
        /// Where to write the secret key (hex)
        #[arg(short, long)]
        output: PathBuf,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Print the public key of a signing key file
    PublicKey {
        #[arg(short, long)]
        key: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing("compliance_ledger=warn");
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { output, force } => {
            if output.exists() && !force {
                anyhow::bail!("{:?} already exists; pass --force to overwrite", output);
            }
            let secret_key = generate_signing_key();
            save_signing_key(&output, &secret_key)?;
            let signer = Secp256k1Signer::from_secret_key(secret_key);

            println!("Key generated successfully:");
            println!("  Key file: {:?}", output);
            println!("  Public Key: {}", signer.public_key_hex());
        }

        Commands::PublicKey { key } => {
            let signer = Secp256k1Signer::from_key_file(&key)?;
            println!("{}", signer.public_key_hex());
        }
    }

    Ok(())
}
