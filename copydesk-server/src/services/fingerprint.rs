//! Creation request fingerprinting for duplicate detection

use copydesk_common::db::models::TriggerKind;
use sha2::{Digest, Sha256};

/// Stable fingerprint over (trigger kind, normalized text, sorted URLs)
///
/// Whitespace and case differences in the text do not produce distinct
/// fingerprints; URL order does not matter.
pub fn request_fingerprint(trigger_kind: TriggerKind, text: &str, urls: &[String]) -> String {
    let mut sorted_urls: Vec<&str> = urls.iter().map(|u| u.trim()).collect();
    sorted_urls.sort_unstable();
    sorted_urls.dedup();

    let mut hasher = Sha256::new();
    hasher.update(trigger_kind.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_text(text).as_bytes());
    for url in sorted_urls {
        hasher.update(b"\n");
        hasher.update(url.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
