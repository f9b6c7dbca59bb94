/// Keyspace progress estimation
///
/// The store never tells us how many entries a trie holds, so progress is
/// guessed from where the latest key sits in the keyspace. Keys arrive in
/// ascending order and are assumed to be spread evenly over their leading
/// 16 bits. This is for humans watching a long scan and for the legacy scan's
/// early stop. It says nothing about completeness.

use serde::Deserialize;

/// Number of leading hex digits that make up the position.
pub const PREFIX_DIGITS: usize = 4;

const HIGH: f64 = 0xffff as f64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressDirection {
    /// Fraction of keyspace still ahead: 1.0 at `0000`, 0.0 at `ffff`.
    #[default]
    Reverse,
    /// Fraction of keyspace already behind: 0.0 at `0000`, 1.0 at `ffff`.
    Forward,
}

/// Estimate progress from a hex key.
///
/// Returns `None` when the key has fewer than `PREFIX_DIGITS` hex digits.
pub fn estimate_progress(hex: &str, direction: ProgressDirection) -> Option<f64> {
    let prefix = hex.get(..PREFIX_DIGITS)?;
    if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let pos = u16::from_str_radix(prefix, 16).ok()? as f64;

    Some(match direction {
        ProgressDirection::Reverse => (HIGH - pos) / HIGH,
        ProgressDirection::Forward => pos / HIGH,
    })
}

/// Per-mille bucket of a progress fraction, used to throttle reports.
pub fn progress_bucket(progress: f64) -> u16 {
    (progress.clamp(0.0, 1.0) * 1000.0).floor() as u16
}
