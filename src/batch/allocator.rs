//! Collision-free display codes for batches sharing a schedule code
//!
//! Two allocation modes:
//! - group re-derivation ([`allocate_display_codes`]): every batch sharing a
//!   base code is ranked and all but the first receive an ordinal suffix
//! - single insertion ([`probe_code`]): candidate codes are tried in order and
//!   the first free one, or the first one held by the same logical batch, wins

use crate::model::{BatchIdentity, BatchStatus};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Suffixes past this position are plain integers instead of Roman numerals
pub const ROMAN_ORDINAL_LIMIT: u32 = 10;

/// Ordinal suffix for the `position`-th duplicate (1-based)
///
/// `1..=10` produce `I`..`X`; anything later falls back to the decimal
/// position (`11`, `12`, ...). The switch in style after the tenth
/// collision is intentional and matches codes already in circulation.
#[must_use]
pub fn ordinal_suffix(position: u32) -> String {
    if position == 0 || position > ROMAN_ORDINAL_LIMIT {
        return position.to_string();
    }

    const NUMERALS: [(u32, &str); 4] = [(10, "X"), (9, "IX"), (5, "V"), (4, "IV")];
    let mut remaining = position;
    let mut out = String::new();
    for (value, numeral) in NUMERALS {
        while remaining >= value {
            out.push_str(numeral);
            remaining -= value;
        }
    }
    out.push_str(&"I".repeat(remaining as usize));
    out
}

/// Display code for the `position`-th duplicate of `base` (0 keeps the bare code)
#[must_use]
pub fn suffixed_code(base: &str, position: u32) -> String {
    if position == 0 {
        base.to_string()
    } else {
        format!("{base}-{}", ordinal_suffix(position))
    }
}

/// Candidate codes in probe order: `base`, `base-I`, `base-II`, ...
pub fn candidate_codes(base: &str) -> impl Iterator<Item = String> + '_ {
    (0u32..).map(move |position| suffixed_code(base, position))
}

/// One member of a group re-derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeCandidate<K> {
    /// Stable tie-breaker, typically the batch id
    pub key: K,
    pub base_code: String,
    pub status: BatchStatus,
    pub start_date: Option<NaiveDate>,
}

/// Assign a display code to every candidate
///
/// Candidates are grouped by base code. Within a group they are ordered by
/// status (active, ended, draft), then start date ascending with missing
/// dates last, then key. The first keeps the bare base code; the rest get
/// `-I`, `-II`, ... in that order. The result follows input order and is the
/// same for any permutation of the same input.
#[must_use]
pub fn allocate_display_codes<K: Clone + Ord>(candidates: &[CodeCandidate<K>]) -> Vec<(K, String)> {
    let mut groups: BTreeMap<&str, Vec<&CodeCandidate<K>>> = BTreeMap::new();
    for candidate in candidates {
        groups.entry(candidate.base_code.as_str()).or_default().push(candidate);
    }

    let mut assigned: BTreeMap<K, String> = BTreeMap::new();
    for (base, mut members) in groups {
        members.sort_by(|a, b| {
            a.status
                .rank()
                .cmp(&b.status.rank())
                .then_with(|| match (a.start_date, b.start_date) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.key.cmp(&b.key))
        });
        for (position, member) in (0u32..).zip(members) {
            assigned.insert(member.key.clone(), suffixed_code(base, position));
        }
    }

    candidates
        .iter()
        .filter_map(|c| assigned.get(&c.key).map(|code| (c.key.clone(), code.clone())))
        .collect()
}

/// Outcome of probing for a code for one new batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeProbe {
    /// No batch holds this code yet
    Free(String),
    /// A batch with the same start date, stage and level already holds it
    Existing(String),
}

impl CodeProbe {
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            CodeProbe::Free(code) | CodeProbe::Existing(code) => code,
        }
    }
}

/// Find the code a batch with `identity` should use
///
/// `lookup` returns the identity of the batch currently holding a code, if
/// any. Probing stops at the first code that is free or that is held by the
/// same logical batch.
pub fn probe_code<F>(base: &str, identity: &BatchIdentity, lookup: F) -> CodeProbe
where
    F: Fn(&str) -> Option<BatchIdentity>,
{
    for code in candidate_codes(base) {
        match lookup(&code) {
            None => return CodeProbe::Free(code),
            Some(existing) if existing == *identity => return CodeProbe::Existing(code),
            Some(_) => continue,
        }
    }
    unreachable!("candidate_codes is unbounded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Level, Stage};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn candidate(key: u32, base: &str, status: BatchStatus, start: Option<NaiveDate>) -> CodeCandidate<u32> {
        CodeCandidate {
            key,
            base_code: base.to_string(),
            status,
            start_date: start,
        }
    }

    #[test]
    fn test_ordinal_suffix_sequence() {
        let suffixes: Vec<String> = (1..=12).map(ordinal_suffix).collect();
        assert_eq!(
            suffixes,
            vec!["I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "11", "12"]
        );
    }

    #[test]
    fn test_single_batch_keeps_base_code() {
        let codes = allocate_display_codes(&[candidate(1, "WF:2:30", BatchStatus::Active, None)]);
        assert_eq!(codes, vec![(1, "WF:2:30".to_string())]);
    }

    #[test]
    fn test_group_ordering() {
        let input = vec![
            candidate(1, "WF:2:30", BatchStatus::Draft, None),
            candidate(2, "WF:2:30", BatchStatus::Active, Some(date(2026, 3, 1))),
            candidate(3, "WF:2:30", BatchStatus::Active, None),
            candidate(4, "WF:2:30", BatchStatus::Active, Some(date(2026, 1, 1))),
            candidate(5, "SS:4:30", BatchStatus::Draft, None),
        ];
        let codes: HashMap<u32, String> = allocate_display_codes(&input).into_iter().collect();
        assert_eq!(codes[&4], "WF:2:30");
        assert_eq!(codes[&2], "WF:2:30-I");
        assert_eq!(codes[&3], "WF:2:30-II");
        assert_eq!(codes[&1], "WF:2:30-III");
        assert_eq!(codes[&5], "SS:4:30");
    }

    #[test]
    fn test_allocation_is_permutation_independent() {
        let input: Vec<CodeCandidate<u32>> = (0..14)
            .map(|i| {
                let start = if i % 3 == 0 { None } else { Some(date(2026, 1 + i % 12, 1)) };
                let status = if i % 4 == 0 { BatchStatus::Draft } else { BatchStatus::Active };
                candidate(i, "MW:5:00", status, start)
            })
            .collect();
        let expected: HashMap<u32, String> = allocate_display_codes(&input).into_iter().collect();

        let bare: Vec<&String> = expected.values().filter(|c| c.as_str() == "MW:5:00").collect();
        assert_eq!(bare.len(), 1);
        let mut distinct: Vec<&String> = expected.values().collect();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), input.len());

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let mut shuffled = input.clone();
            shuffled.shuffle(&mut rng);
            let again: HashMap<u32, String> = allocate_display_codes(&shuffled).into_iter().collect();
            assert_eq!(again, expected);
        }
    }

    #[test]
    fn test_probe_accepts_same_logical_batch() {
        let identity = BatchIdentity {
            start_date: Some(date(2026, 2, 1)),
            stage: Stage::Beginner,
            level: Level::new(1).unwrap(),
        };
        let other = BatchIdentity {
            start_date: Some(date(2025, 9, 1)),
            ..identity
        };
        let held: HashMap<String, BatchIdentity> = [
            ("WF:2:30".to_string(), other),
            ("WF:2:30-I".to_string(), identity),
        ]
        .into_iter()
        .collect();

        let probe = probe_code("WF:2:30", &identity, |code| held.get(code).copied());
        assert_eq!(probe, CodeProbe::Existing("WF:2:30-I".to_string()));
    }

    #[test]
    fn test_probe_falls_back_to_numbers() {
        let identity = BatchIdentity {
            start_date: None,
            stage: Stage::Advanced,
            level: Level::new(3).unwrap(),
        };
        let taken = BatchIdentity {
            start_date: Some(date(2024, 1, 1)),
            ..identity
        };
        let held: HashMap<String, BatchIdentity> =
            (0..=ROMAN_ORDINAL_LIMIT).map(|p| (suffixed_code("SS:4:30", p), taken)).collect();

        let probe = probe_code("SS:4:30", &identity, |code| held.get(code).copied());
        assert_eq!(probe, CodeProbe::Free("SS:4:30-11".to_string()));
    }
}
