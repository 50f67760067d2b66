//! Hex-encoded key and message files

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use custos_shared::{EncryptedMessage, EscrowAuthority};
use zeroize::Zeroizing;

/// Write the escrow secret key as hex.
///
/// An existing file is only replaced when `overwrite` is set.
pub fn write_escrow_key(path: &Path, authority: &EscrowAuthority, overwrite: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create key file {}", path.display()))?;
    let encoded = Zeroizing::new(hex::encode(&authority.secret_bytes()[..]));
    writeln!(file, "{}", encoded.as_str())
        .with_context(|| format!("Failed to write key file {}", path.display()))?;
    Ok(())
}

/// Read an escrow secret key written by [`write_escrow_key`].
pub fn read_escrow_key(path: &Path) -> Result<EscrowAuthority> {
    let contents = Zeroizing::new(
        fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file {}", path.display()))?,
    );
    let decoded = Zeroizing::new(
        hex::decode(contents.trim()).context("Key file is not valid hex")?,
    );
    if decoded.len() != 32 {
        bail!("Key file must hold 32 bytes, found {}", decoded.len());
    }
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&decoded);
    let authority = EscrowAuthority::from_secret_bytes(bytes);
    zeroize::Zeroize::zeroize(&mut bytes);
    Ok(authority)
}

/// Read a hex-encoded wire envelope.
pub fn read_message(path: &Path) -> Result<EncryptedMessage> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read message file {}", path.display()))?;
    let wire = hex::decode(contents.trim()).context("Message file is not valid hex")?;
    EncryptedMessage::from_wire(&wire).context("Message file is not a valid envelope")
}

/// Write a message as a hex-encoded wire envelope.
pub fn write_message(path: &Path, message: &EncryptedMessage) -> Result<()> {
    let wire = message.to_wire()?;
    fs::write(path, format!("{}\n", hex::encode(wire)))
        .with_context(|| format!("Failed to write message file {}", path.display()))
}
