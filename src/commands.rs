/// Command bodies behind the CLI.
///
/// Each command owns its store handle, output file and counters for the
/// length of the call. Handles are scoped, so they are released on every exit
/// path, including errors.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use tracing::info;

use crate::address::{Address, LEGACY_ACCOUNT};
use crate::config::Settings;
use crate::derive::{derive_batch, DeriveStats, MAX_AVATAR_COUNT};
use crate::error::Result;
use crate::observer::ScanObserver;
use crate::predicate::{FixedLengthKey, LegacyAgentShape};
use crate::scanner::{scan, ScanLabels, ScanOptions, ScanStats};
use crate::store::ChainStore;
use crate::trie::Trie;

fn scan_options(settings: &Settings, early_stop: Option<f64>, labels: ScanLabels) -> ScanOptions {
    ScanOptions {
        early_stop,
        direction: settings.progress_direction,
        report_interval: settings.report_interval,
        labels,
    }
}

fn log_totals(stats: &ScanStats, what: &str) {
    info!(elapsed_ms = stats.elapsed.as_millis() as u64, "Total time");
    info!(value_count = stats.visited, "Total value count");
    info!(count = stats.matched, state = ?stats.state, "Total {} count", what);
}

/// `account export-addresses`: every address-wide key in an account's trie.
pub fn export_addresses(
    store_uri: &str,
    account: &Address,
    output_path: &Path,
    settings: &Settings,
    observer: &mut dyn ScanObserver,
) -> Result<ScanStats> {
    let store = ChainStore::open(store_uri)?;
    let tip = store.tip()?;
    let world = store.world_trie(&tip)?;
    let trie = world.account_trie(account)?;
    info!(
        account = %account,
        state_root_hash = %hex::encode(trie.hash()),
        "Resolved account trie"
    );

    let mut output = BufWriter::new(File::create(output_path)?);
    let options = scan_options(
        settings,
        None,
        ScanLabels { record: "Address", visited: None, matched: "address count" },
    );
    let stats = scan(&trie, &FixedLengthKey::address(), &mut output, observer, &options)?;

    log_totals(&stats, "address");
    Ok(stats)
}

/// `legacy export-agents`: addresses of agent records in the legacy account.
///
/// `early_stop` bounds the scan to the front of the keyspace where agents
/// cluster; `None` scans the whole trie.
pub fn export_agents(
    store_uri: &str,
    output_path: &Path,
    early_stop: Option<f64>,
    settings: &Settings,
    observer: &mut dyn ScanObserver,
) -> Result<ScanStats> {
    let store = ChainStore::open(store_uri)?;
    let tip = store.tip()?;
    let world = store.world_trie(&tip)?;
    let trie = world.account_trie(&LEGACY_ACCOUNT)?;
    info!(
        state_root_hash = %hex::encode(trie.hash()),
        early_stop = ?early_stop,
        "Resolved legacy account trie"
    );

    let mut output = BufWriter::new(File::create(output_path)?);
    let options = scan_options(
        settings,
        early_stop,
        ScanLabels { record: "Agent address", visited: Some("value count"), matched: "agent count" },
    );
    let stats = scan(&trie, &LegacyAgentShape::default(), &mut output, observer, &options)?;

    log_totals(&stats, "agent");
    Ok(stats)
}

/// `derive agent-to-avatar-addresses`: every possible avatar address of each
/// agent in the input file.
pub fn agent_to_avatar_addresses(
    input_path: &Path,
    output_path: &Path,
    observer: &mut dyn ScanObserver,
) -> Result<DeriveStats> {
    // First pass only counts lines, for progress.
    let line_count = BufReader::new(File::open(input_path)?).lines().count() as u64;

    let input = BufReader::new(File::open(input_path)?);
    let mut output = BufWriter::new(File::create(output_path)?);
    let stats = derive_batch(input, &mut output, MAX_AVATAR_COUNT, Some(line_count), observer)?;

    info!(agents = stats.parents, avatar_addresses = stats.derived, "Derivation complete");
    Ok(stats)
}
