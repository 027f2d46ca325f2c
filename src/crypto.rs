// src/crypto.rs

//! Integrity and authenticity verification
//!
//! Two concerns live here: SHA-256 checksums for downloaded artifacts, and
//! detached OpenPGP signature verification of repository indexes against a
//! directory of trusted public keys (sequoia-openpgp, pure Rust).

use crate::error::{Error, Result};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::{Cert, Packet, PacketPile};
use sequoia_openpgp as openpgp;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::{debug, info};

/// Compute the hex SHA-256 of a file, streaming
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute the hex SHA-256 of a byte slice
pub fn sha256_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Verify a file's SHA-256 against an expected hex digest
pub fn verify_file_checksum(path: &Path, expected: &str, display_name: &str) -> Result<()> {
    debug!("verifying checksum for {}", path.display());
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            name: display_name.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Load every OpenPGP certificate found in the trusted key directory.
///
/// Unparseable files are skipped; an empty or missing directory yields an
/// empty set, which makes every verification fail.
fn load_trusted_certs(key_dir: &Path) -> Result<Vec<Cert>> {
    let mut certs = Vec::new();
    if !key_dir.is_dir() {
        return Ok(certs);
    }
    for entry in fs::read_dir(key_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match fs::read(&path).map_err(Error::from).and_then(|data| {
            Cert::from_bytes(&data)
                .map_err(|e| Error::Parse(format!("key {}: {e}", path.display())))
        }) {
            Ok(cert) => {
                debug!(
                    "loaded trusted key {} ({})",
                    path.display(),
                    cert.fingerprint()
                );
                certs.push(cert);
            }
            Err(e) => debug!("ignoring unusable key file: {e}"),
        }
    }
    Ok(certs)
}

/// Verify a detached signature over a data file.
///
/// The signature is accepted iff it is cryptographically valid and was made
/// by a signing-capable key belonging to one of the certificates in
/// `key_dir`.
pub fn verify_detached_signature(data_file: &Path, sig_file: &Path, key_dir: &Path) -> Result<()> {
    let certs = load_trusted_certs(key_dir)?;
    if certs.is_empty() {
        return Err(Error::SignatureInvalid(format!(
            "no trusted keys in {}",
            key_dir.display()
        )));
    }

    let message = fs::read(data_file)?;
    let sig_data = fs::read(sig_file)?;

    let pile = PacketPile::from_bytes(&sig_data)
        .map_err(|e| Error::SignatureInvalid(format!("unreadable signature: {e}")))?;

    let policy = StandardPolicy::new();
    for packet in pile.descendants() {
        let Packet::Signature(sig) = packet else {
            continue;
        };
        let mut sig = sig.clone();
        for cert in &certs {
            for key in cert
                .keys()
                .with_policy(&policy, None)
                .alive()
                .revoked(false)
                .for_signing()
            {
                if sig.verify_message(key.key(), &message).is_ok() {
                    info!(
                        "repository index signature verified against key {}",
                        cert.fingerprint()
                    );
                    return Ok(());
                }
            }
        }
    }

    Err(Error::SignatureInvalid(
        "no valid signature from a trusted key".to_string(),
    ))
}
