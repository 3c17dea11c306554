//! ============================================================================
//! Identity Resolver - Stable caller keys for memory partitioning
//! ============================================================================
//! Callers arriving with a phone number get a UUIDv5 derived from the
//! normalized number; everyone else shares the anonymous bucket.
//! ============================================================================

use uuid::Uuid;

use crate::types::CallerMetadata;

/// Identity used when no caller metadata is available
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

/// Derive the memory identity for a caller. Never fails.
pub fn resolve_identity(caller: &CallerMetadata) -> String {
    match caller.phone_number().and_then(normalize_phone_number) {
        Some(number) => Uuid::new_v5(&Uuid::NAMESPACE_DNS, number.as_bytes()).to_string(),
        None => ANONYMOUS_IDENTITY.to_string(),
    }
}

/// Strip formatting from a phone number, keeping digits and a leading `+`.
/// Returns None when no digits remain.
pub fn normalize_phone_number(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut normalized = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        normalized.push('+');
    }
    normalized.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));

    if normalized.trim_start_matches('+').is_empty() {
        None
    } else {
        Some(normalized)
    }
}
