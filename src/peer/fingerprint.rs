//! Короткая строка для сверки установленного линка.
//!
//! Обе стороны хешируют DTLS-отпечатки двух session description в одном и том же
//! порядке, поэтому пользователи видят одинаковую строку и могут сверить её голосом.

use sha2::{Digest, Sha256};

const SAS_BYTES: usize = 6;

/// Первое значение `a=fingerprint:` из session description
pub fn sdp_fingerprint(sdp: &str) -> Option<&str> {
    sdp.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("a=fingerprint:"))
        .map(str::trim)
}

pub fn link_fingerprint(local_sdp: &str, remote_sdp: &str) -> Option<String> {
    let mut prints = [sdp_fingerprint(local_sdp)?, sdp_fingerprint(remote_sdp)?];
    prints.sort_unstable();

    let mut hasher = Sha256::new();
    for print in prints {
        hasher.update(print.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();

    let encoded = hex::encode(&digest[..SAS_BYTES]);
    let groups: Vec<&str> = (0..encoded.len())
        .step_by(4)
        .map(|i| &encoded[i..i + 4])
        .collect();
    Some(groups.join("-"))
}
