//! Run identifier generation
//!
//! Format: `run-{timestamp_ms}-{random_hex}`, e.g. `run-1738300800123-a1b2c3d4`.

use rand::Rng;

const RUN_PREFIX: &str = "run-";

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique run ID
pub fn generate_run_id() -> String {
    let timestamp = now_ms();
    let random: u32 = rand::rng().random();
    format!("{}{}-{:08x}", RUN_PREFIX, timestamp, random)
}

/// Lexical check that `id` has the shape produced by [`generate_run_id`].
///
/// Used before any registry or filesystem lookup so a crafted id can never
/// name a path.
pub fn is_valid_run_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix(RUN_PREFIX) else {
        return false;
    };
    let Some((timestamp, random)) = rest.split_once('-') else {
        return false;
    };
    !timestamp.is_empty()
        && timestamp.chars().all(|c| c.is_ascii_digit())
        && random.len() == 8
        && random.chars().all(|c| c.is_ascii_hexdigit())
}
