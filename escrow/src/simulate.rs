//! In-process end-to-end run of the messaging core
//!
//! Alice and Bob exchange bursts of messages. Each burst is delivered in a
//! shuffled order, one delivered message is replayed, and the escrow
//! authority recovers every message from its envelope alone.

use anyhow::{bail, ensure, Context, Result};
use custos_shared::{
    CertificateAuthority, CryptoError, EncryptedMessage, EscrowAuthority, MessengerClient,
    SessionConfig,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Largest number of messages sent before the other side replies.
pub const MAX_BURST: usize = 8;

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    /// Total number of messages exchanged
    pub messages: usize,
    /// Seed for burst sizes and delivery order
    pub seed: u64,
    /// Session limits for both clients
    pub session: SessionConfig,
}

/// Outcome of a successful simulation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationReport {
    /// Messages delivered and decrypted by the recipient
    pub delivered: usize,
    /// Bursts sent (each burst is one sending chain)
    pub bursts: usize,
    /// Messages delivered ahead of an earlier one from the same burst
    pub reordered: usize,
    /// Messages whose plaintext the escrow authority recovered
    pub recovered: usize,
    /// Replays rejected by the recipient
    pub replays_rejected: usize,
}

struct Party {
    name: &'static str,
    client: MessengerClient,
}

/// Run the simulation with a fresh escrow authority.
pub fn run(options: &SimulationOptions) -> Result<SimulationReport> {
    run_with_escrow(options, &EscrowAuthority::generate())
}

/// Run the simulation, wrapping every message key for `escrow`.
pub fn run_with_escrow(options: &SimulationOptions, escrow: &EscrowAuthority) -> Result<SimulationReport> {
    options.session.validate()?;
    let mut rng = StdRng::seed_from_u64(options.seed);

    let ca = CertificateAuthority::generate();
    let alice = Party {
        name: "alice",
        client: MessengerClient::with_config(ca.verifying_key(), escrow.public_key(), options.session)?,
    };
    let bob = Party {
        name: "bob",
        client: MessengerClient::with_config(ca.verifying_key(), escrow.public_key(), options.session)?,
    };
    introduce(&ca, &alice, &bob)?;
    introduce(&ca, &bob, &alice)?;

    // A burst of n messages needs n - 1 skipped keys at worst.
    let max_burst = MAX_BURST.min(options.session.max_skip as usize + 1);
    let mut report = SimulationReport::default();
    let mut sent = 0usize;

    while sent < options.messages {
        let (sender, recipient) = if report.bursts % 2 == 0 {
            (&alice, &bob)
        } else {
            (&bob, &alice)
        };
        let burst = rng.gen_range(1..=max_burst).min(options.messages - sent);

        let mut outbox = Vec::with_capacity(burst);
        for _ in 0..burst {
            let text = format!("{} -> {} #{}", sender.name, recipient.name, sent);
            let message = sender
                .client
                .encrypt_message(recipient.name, text.as_bytes())
                .with_context(|| format!("{} failed to encrypt message {}", sender.name, sent))?;
            outbox.push((message, text));
            sent += 1;
        }

        outbox.shuffle(&mut rng);
        let mut highest = None;
        for (message, text) in &outbox {
            deliver(sender, recipient, message, text)?;
            report.delivered += 1;

            if highest.is_some_and(|h| message.header.counter < h) {
                report.reordered += 1;
            }
            highest = highest.max(Some(message.header.counter));

            let recovered = escrow
                .decrypt_message(message)
                .with_context(|| format!("Escrow failed to recover \"{}\"", text))?;
            ensure!(recovered == text.as_bytes(), "Escrow recovered the wrong plaintext for \"{}\"", text);
            report.recovered += 1;
        }

        if let Some((message, _)) = outbox.choose(&mut rng) {
            match recipient.client.decrypt_message(sender.name, message) {
                Err(CryptoError::ReplayDetected) => report.replays_rejected += 1,
                Ok(_) => bail!("{} accepted a replayed message", recipient.name),
                Err(e) => bail!("Replay produced an unexpected error: {}", e),
            }
        }

        debug!(burst = report.bursts, from = sender.name, size = burst, "Burst delivered");
        report.bursts += 1;
    }

    info!(
        delivered = report.delivered,
        bursts = report.bursts,
        reordered = report.reordered,
        recovered = report.recovered,
        replays_rejected = report.replays_rejected,
        "Simulation complete"
    );
    Ok(report)
}

fn introduce(ca: &CertificateAuthority, subject: &Party, relying: &Party) -> Result<()> {
    let certificate = subject.client.issue_certificate(subject.name)?;
    let signature = ca.sign(&certificate)?;
    relying
        .client
        .accept_certificate(&certificate, &signature)
        .with_context(|| format!("{} rejected the certificate of {}", relying.name, subject.name))
}

fn deliver(sender: &Party, recipient: &Party, message: &EncryptedMessage, text: &str) -> Result<()> {
    let plaintext = recipient
        .client
        .decrypt_message(sender.name, message)
        .with_context(|| format!("{} failed to decrypt \"{}\"", recipient.name, text))?;
    ensure!(
        plaintext == text.as_bytes(),
        "{} decrypted the wrong plaintext for \"{}\"",
        recipient.name,
        text
    );
    Ok(())
}
