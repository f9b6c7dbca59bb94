/// Streaming Trie Scanner
///
/// Drives one ascending traversal of a trie, runs every entry through a
/// single predicate and writes each extracted record to the sink the moment
/// it is found, one per line. Nothing is collected: memory stays at the size
/// of the entry in hand plus two counters, however large the trie.
///
/// States: NotStarted -> Scanning -> Completed | EarlyStopped | Aborted.
/// The sink is flushed on every exit; an aborted scan leaves what it already
/// wrote in place.

use std::io::Write;
use std::time::{Duration, Instant};

use tracing::Level;

use crate::error::{CensusError, Result};
use crate::observer::ScanObserver;
use crate::predicate::EntryPredicate;
use crate::progress::{estimate_progress, progress_bucket, ProgressDirection};
use crate::telemetry::truncate_hex;
use crate::trie::Trie;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    NotStarted,
    Scanning,
    Completed,
    EarlyStopped,
    Aborted,
}

/// Wording for progress messages.
#[derive(Debug, Clone, Copy)]
pub struct ScanLabels {
    /// What a record is, e.g. "Address".
    pub record: &'static str,
    /// Label for the visited count; omitted from messages when `None`.
    pub visited: Option<&'static str>,
    pub matched: &'static str,
}

impl Default for ScanLabels {
    fn default() -> Self {
        Self { record: "Record", visited: Some("value count"), matched: "match count" }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Stop once the forward progress of the latest record exceeds this
    /// fraction. Progress is only an estimate, so a stop can lose records.
    pub early_stop: Option<f64>,
    /// Direction of the progress handed to the observer.
    pub direction: ProgressDirection,
    /// Report at least this often (in visited entries) even if the progress
    /// bucket has not moved.
    pub report_interval: u64,
    pub labels: ScanLabels,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            early_stop: None,
            direction: ProgressDirection::default(),
            report_interval: crate::config::DEFAULT_REPORT_INTERVAL,
            labels: ScanLabels::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanStats {
    pub visited: u64,
    pub matched: u64,
    pub state: ScanState,
    pub elapsed: Duration,
    /// Latest record written; also the key progress is estimated from.
    pub last_record: Option<String>,
}

impl ScanStats {
    fn new() -> Self {
        Self {
            visited: 0,
            matched: 0,
            state: ScanState::NotStarted,
            elapsed: Duration::ZERO,
            last_record: None,
        }
    }
}

/// Scan `trie` with `predicate`, writing each record to `sink`.
pub fn scan<T, P, W, O>(
    trie: &T,
    predicate: &P,
    sink: &mut W,
    observer: &mut O,
    options: &ScanOptions,
) -> Result<ScanStats>
where
    T: Trie + ?Sized,
    P: EntryPredicate + ?Sized,
    W: Write + ?Sized,
    O: ScanObserver + ?Sized,
{
    if let Some(threshold) = options.early_stop {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CensusError::precondition(format!(
                "early stop threshold {} is outside 0.0 to 1.0",
                threshold
            )));
        }
    }

    let timer = Instant::now();
    let mut stats = ScanStats::new();

    observer.log(
        Level::INFO,
        &format!(
            "Iterating over trie with state root hash {} using {}",
            hex::encode(trie.hash()),
            predicate.name()
        ),
    );

    stats.state = ScanState::Scanning;
    let outcome = run(trie, predicate, sink, observer, options, &mut stats);
    let flushed = sink.flush();
    stats.elapsed = timer.elapsed();

    let result = outcome.and_then(|state| flushed.map(|()| state).map_err(CensusError::Io));
    stats.state = match &result {
        Ok(state) => *state,
        Err(_) => ScanState::Aborted,
    };
    observer.finish();

    match result {
        Ok(_) => {
            observer.log(
                Level::INFO,
                &format!(
                    "Scan {:?} after {} ms: {} visited, {} matched",
                    stats.state,
                    stats.elapsed.as_millis(),
                    stats.visited,
                    stats.matched
                ),
            );
            Ok(stats)
        }
        Err(e) => {
            observer.log(
                Level::ERROR,
                &format!(
                    "Scan aborted after {} visited, {} matched (last record {}): {}",
                    stats.visited,
                    stats.matched,
                    stats.last_record.as_deref().map(|r| truncate_hex(r, 16)).unwrap_or_default(),
                    e
                ),
            );
            Err(e)
        }
    }
}

fn run<T, P, W, O>(
    trie: &T,
    predicate: &P,
    sink: &mut W,
    observer: &mut O,
    options: &ScanOptions,
    stats: &mut ScanStats,
) -> Result<ScanState>
where
    T: Trie + ?Sized,
    P: EntryPredicate + ?Sized,
    W: Write + ?Sized,
    O: ScanObserver + ?Sized,
{
    let interval = options.report_interval.max(1);
    let mut last_bucket: Option<u16> = None;

    for entry in trie.iterate_values() {
        let (key, value) = entry?;
        stats.visited += 1;

        if let Some(record) = predicate.extract(&key, &value)? {
            writeln!(sink, "{}", record).map_err(CensusError::Io)?;
            stats.matched += 1;
            stats.last_record = Some(record);
        }

        let Some(current) = stats.last_record.as_deref() else {
            continue;
        };

        if let Some(progress) = estimate_progress(current, options.direction) {
            let bucket = progress_bucket(progress);
            if last_bucket != Some(bucket) || stats.visited % interval == 0 {
                last_bucket = Some(bucket);
                observer.report(progress, &describe(&options.labels, current, stats));
            }
        }

        if let Some(threshold) = options.early_stop {
            let advanced = estimate_progress(current, ProgressDirection::Forward);
            if advanced.map_or(false, |p| p > threshold) {
                return Ok(ScanState::EarlyStopped);
            }
        }
    }

    Ok(ScanState::Completed)
}

fn describe(labels: &ScanLabels, current: &str, stats: &ScanStats) -> String {
    match labels.visited {
        Some(visited) => format!(
            "{}: {}, {}: {}, {}: {}",
            labels.record, current, visited, stats.visited, labels.matched, stats.matched
        ),
        None => format!("{}: {}, {}: {}", labels.record, current, labels.matched, stats.matched),
    }
}
