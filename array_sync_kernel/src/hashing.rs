//! Envelope digest — SHA-256 over a canonical byte form.
//!
//! Layout hashed, in order:
//!   - wire format version, u32 LE
//!   - dtype tag length, u32 LE, then the tag bytes
//!   - rank, u64 LE, then each dimension as u64 LE
//!   - the buffer, verbatim
//!
//! Two envelopes share a digest iff all three fields are equal.

use sha2::{Digest, Sha256};

use crate::envelope::Envelope;
use crate::WIRE_FORMAT_VERSION;

/// Canonical bytes of an envelope, as fed to the digest.
pub fn canonical_bytes(envelope: &Envelope) -> Vec<u8> {
    let tag = envelope.dtype.as_str().as_bytes();
    let dims = envelope.shape.dims();
    let mut out = Vec::with_capacity(16 + tag.len() + dims.len() * 8 + envelope.buffer.len());
    out.extend_from_slice(&WIRE_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&(tag.len() as u32).to_le_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(&(dims.len() as u64).to_le_bytes());
    for &d in dims {
        out.extend_from_slice(&(d as u64).to_le_bytes());
    }
    out.extend_from_slice(&envelope.buffer);
    out
}

/// SHA-256 of `canonical_bytes`. Lowercase hex.
pub fn envelope_digest(envelope: &Envelope) -> String {
    let digest = Sha256::digest(canonical_bytes(envelope));
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
