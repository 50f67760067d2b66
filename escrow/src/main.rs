//! Custos escrow operator tool

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use custos_escrow::config::EscrowConfig;
use custos_escrow::keyfile::{read_escrow_key, read_message, write_escrow_key};
use custos_escrow::simulate::{self, SimulationOptions};
use custos_shared::EscrowAuthority;
use tracing::{error, info};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "custos-escrow", version, about = "Custos escrow authority tool")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new escrow key pair and write the secret key file
    Keygen {
        /// Key file to create (defaults to CUSTOS_ESCROW_KEY)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Replace an existing key file
        #[arg(long)]
        force: bool,
    },

    /// Recover the message key and plaintext of an intercepted message
    Recover {
        /// File holding the hex-encoded wire envelope
        #[arg(long)]
        message: PathBuf,

        /// Escrow secret key file (defaults to CUSTOS_ESCROW_KEY)
        #[arg(long)]
        key: Option<PathBuf>,
    },

    /// Run two clients through an end-to-end exchange and check escrow recovery
    Simulate {
        /// Number of messages to exchange
        #[arg(long, default_value_t = 200)]
        messages: usize,

        /// Seed for burst sizes and delivery order
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Use the escrow key file instead of a throwaway key
        #[arg(long)]
        key: Option<PathBuf>,

        /// Largest counter gap one message may skip
        #[arg(long, env = "CUSTOS_MAX_SKIP")]
        max_skip: Option<u32>,

        /// Largest number of skipped keys cached per session
        #[arg(long, env = "CUSTOS_MAX_CACHED_KEYS")]
        max_cached_keys: Option<usize>,
    },
}

// ── Entry Point ───────────────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "custos_escrow=info,custos_shared=info".into()),
        )
        .init();

    // Load .env before clap reads env-backed flags.
    dotenvy::dotenv().ok();
    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let config = EscrowConfig::from_env()?;

    match args.command {
        Command::Keygen { out, force } => {
            let path = out.unwrap_or(config.key_path);
            let authority = EscrowAuthority::generate();
            write_escrow_key(&path, &authority, force)?;
            info!(path = %path.display(), fingerprint = %authority.fingerprint().short(), "Escrow key written");
            println!("{}", hex::encode(authority.public_key().as_bytes()));
        }
        Command::Recover { message, key } => {
            let authority = read_escrow_key(&key.unwrap_or(config.key_path))?;
            let envelope = read_message(&message)?;
            let message_key = authority
                .recover_message_key(&envelope.header)
                .context("Message key is not wrapped for this escrow key")?;
            let plaintext = authority
                .decrypt_message(&envelope)
                .context("Recovered key does not open the message")?;
            info!(
                ratchet = %envelope.header.ratchet_fingerprint().short(),
                counter = envelope.header.counter,
                "Recovered message"
            );
            println!("message key: {}", hex::encode(&message_key.export_raw()[..]));
            println!("plaintext:   {}", String::from_utf8_lossy(&plaintext));
        }
        Command::Simulate {
            messages,
            seed,
            key,
            max_skip,
            max_cached_keys,
        } => {
            let session = config.session_with(max_skip, max_cached_keys)?;
            let options = SimulationOptions {
                messages,
                seed,
                session,
            };
            let report = match key {
                Some(path) => simulate::run_with_escrow(&options, &read_escrow_key(&path)?)?,
                None => simulate::run(&options)?,
            };
            println!(
                "delivered {} messages in {} bursts ({} reordered), escrow recovered {}, {} replays rejected",
                report.delivered,
                report.bursts,
                report.reordered,
                report.recovered,
                report.replays_rejected
            );
        }
    }

    Ok(())
}
