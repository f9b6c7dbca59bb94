/// Address Derivation Generator
///
/// Each agent can own up to three avatars, and avatar addresses are never
/// allocated on chain: they are derived from the agent address and the slot
/// index. Output position is the slot, so order matters.

use std::io::{BufRead, Write};
use std::time::Instant;

use tracing::Level;

use crate::address::Address;
use crate::error::{CensusError, Result};
use crate::observer::ScanObserver;

/// Avatar slots per agent.
pub const MAX_AVATAR_COUNT: usize = 3;

/// Derivation tag for an avatar slot.
pub fn avatar_derive_tag(index: usize) -> String {
    format!("avatar-state-{}", index)
}

/// Children `0..count` of `parent`, in index order.
pub fn derive_children(parent: &Address, count: usize) -> Vec<Address> {
    (0..count).map(|i| parent.derive(&avatar_derive_tag(i))).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeriveStats {
    pub parents: u64,
    pub derived: u64,
}

/// Read one parent address per line, write `count` children per parent.
///
/// Output is grouped by parent in input order. A line that is not an address
/// aborts the batch; lines already written stay. `total_lines` is only used
/// for progress.
pub fn derive_batch<R, W, O>(
    input: R,
    output: &mut W,
    count: usize,
    total_lines: Option<u64>,
    observer: &mut O,
) -> Result<DeriveStats>
where
    R: BufRead,
    W: Write + ?Sized,
    O: ScanObserver + ?Sized,
{
    let timer = Instant::now();
    let mut stats = DeriveStats::default();

    observer.log(Level::INFO, "Generating avatar addresses from agent addresses");

    let outcome = derive_lines(input, output, count, total_lines, observer, &mut stats);
    let flushed = output.flush();
    observer.finish();
    outcome?;
    flushed?;

    observer.log(
        Level::INFO,
        &format!(
            "Derived {} addresses from {} agents in {} ms",
            stats.derived,
            stats.parents,
            timer.elapsed().as_millis()
        ),
    );
    Ok(stats)
}

fn derive_lines<R, W, O>(
    input: R,
    output: &mut W,
    count: usize,
    total_lines: Option<u64>,
    observer: &mut O,
    stats: &mut DeriveStats,
) -> Result<()>
where
    R: BufRead,
    W: Write + ?Sized,
    O: ScanObserver + ?Sized,
{
    for line in input.lines() {
        let line = line?;
        let parent: Address = line.parse().map_err(|e| CensusError::MalformedInput {
            line: stats.parents + 1,
            source: Box::new(e),
        })?;
        stats.parents += 1;

        for child in derive_children(&parent, count) {
            writeln!(output, "{}", child)?;
            stats.derived += 1;
        }

        match total_lines {
            Some(total) if total > 0 => observer.report(
                stats.parents as f64 / total as f64,
                &format!("{}/{}", stats.parents, total),
            ),
            _ => observer.report(0.0, &stats.parents.to_string()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NullObserver;
    use std::collections::HashSet;
    use std::io::Cursor;

    const AGENT_A: &str = "c0ffee254729296a45a3885639ac7e10f9d54979";
    const AGENT_B: &str = "999999cf1046e68e36e1aa2e0e07105eddd1f08e";

    #[test]
    fn test_derive_children_deterministic_and_ordered() {
        let parent: Address = AGENT_A.parse().unwrap();
        let first = derive_children(&parent, MAX_AVATAR_COUNT);
        let second = derive_children(&parent, MAX_AVATAR_COUNT);
        assert_eq!(first.len(), MAX_AVATAR_COUNT);
        assert_eq!(first, second);
        for (i, child) in first.iter().enumerate() {
            assert_eq!(*child, parent.derive(&format!("avatar-state-{}", i)));
        }
    }

    #[test]
    fn test_children_of_distinct_parents_do_not_collide() {
        let a = derive_children(&AGENT_A.parse().unwrap(), MAX_AVATAR_COUNT);
        let b = derive_children(&AGENT_B.parse().unwrap(), MAX_AVATAR_COUNT);
        let all: HashSet<Address> = a.iter().chain(b.iter()).copied().collect();
        assert_eq!(all.len(), 2 * MAX_AVATAR_COUNT);
    }

    #[test]
    fn test_tag_format() {
        assert_eq!(avatar_derive_tag(0), "avatar-state-0");
        assert_eq!(avatar_derive_tag(1000), "avatar-state-1000");
    }

    #[test]
    fn test_batch_groups_by_parent() {
        let input = format!("{}\n{}\n", AGENT_A, AGENT_B);
        let mut output = Vec::new();
        let stats = derive_batch(
            Cursor::new(input),
            &mut output,
            MAX_AVATAR_COUNT,
            Some(2),
            &mut NullObserver,
        )
        .unwrap();

        assert_eq!(stats, DeriveStats { parents: 2, derived: 6 });
        let lines: Vec<String> = String::from_utf8(output).unwrap().lines().map(str::to_string).collect();
        let mut expected = Vec::new();
        for agent in [AGENT_A, AGENT_B] {
            for child in derive_children(&agent.parse().unwrap(), MAX_AVATAR_COUNT) {
                expected.push(child.to_string());
            }
        }
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_batch_is_byte_identical_across_runs() {
        let input = format!("{}\r\n0x{}\n", AGENT_A, AGENT_B.to_uppercase());
        let run = || {
            let mut output = Vec::new();
            derive_batch(Cursor::new(input.clone()), &mut output, MAX_AVATAR_COUNT, None, &mut NullObserver).unwrap();
            output
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_batch_aborts_on_malformed_line() {
        let input = format!("{}\nnot-an-address\n{}\n", AGENT_A, AGENT_B);
        let mut output = Vec::new();
        let result = derive_batch(Cursor::new(input), &mut output, MAX_AVATAR_COUNT, Some(3), &mut NullObserver);

        match result {
            Err(CensusError::MalformedInput { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed input, got {:?}", other),
        }
        // The first parent's children were written before the bad line.
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), MAX_AVATAR_COUNT);
    }

    #[test]
    fn test_batch_empty_input() {
        let mut output = Vec::new();
        let stats = derive_batch(Cursor::new(""), &mut output, MAX_AVATAR_COUNT, Some(0), &mut NullObserver).unwrap();
        assert_eq!(stats, DeriveStats::default());
        assert!(output.is_empty());
    }
}
