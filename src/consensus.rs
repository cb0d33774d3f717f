//! Majority-vote consensus over an aligned reference set.
//!
//! Each column votes among A/C/G/T/U; ties break in that order, gap and
//! ambiguity characters contribute nothing, and a column with no votes at
//! all becomes 'A'. An optional limit bounds the candidate set to the K
//! longest records before voting. The per-column counts are persisted as
//! JSON next to the consensus FASTA so downstream tooling can inspect the
//! vote.

use crate::error::Result;
use crate::io::SeqRecord;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::Write;
use std::path::Path;

/// Vote tally for one consensus column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseCounts {
    pub a: u32,
    pub c: u32,
    pub g: u32,
    pub t: u32,
    pub u: u32,
}

impl BaseCounts {
    #[inline]
    fn add(&mut self, base: u8) {
        match base {
            b'A' | b'a' => self.a += 1,
            b'C' | b'c' => self.c += 1,
            b'G' | b'g' => self.g += 1,
            b'T' | b't' => self.t += 1,
            b'U' | b'u' => self.u += 1,
            _ => {}
        }
    }

    #[inline]
    fn merge(mut self, other: BaseCounts) -> BaseCounts {
        self.a += other.a;
        self.c += other.c;
        self.g += other.g;
        self.t += other.t;
        self.u += other.u;
        self
    }
}

/// Winning base of one column. Strict-majority scan in A, C, G, T, U order,
/// so ties keep the earlier base and an all-zero column yields 'A'.
pub fn pick_consensus_char(counts: &BaseCounts) -> u8 {
    let ordered = [
        (b'A', counts.a),
        (b'C', counts.c),
        (b'G', counts.g),
        (b'T', counts.t),
        (b'U', counts.u),
    ];
    let mut best = b'A';
    let mut best_count = 0u32;
    for (base, count) in ordered {
        if count > best_count {
            best = base;
            best_count = count;
        }
    }
    best
}

/// Column-wise vote over `records`. The column count is the longest record
/// length; shorter records simply stop contributing.
pub fn column_counts(records: &[SeqRecord]) -> Vec<BaseCounts> {
    let width = records.iter().map(|r| r.len()).max().unwrap_or(0);
    if width == 0 {
        return Vec::new();
    }

    records
        .par_iter()
        .fold(
            || vec![BaseCounts::default(); width],
            |mut acc, rec| {
                for (col, &b) in rec.seq.iter().enumerate() {
                    acc[col].add(b);
                }
                acc
            },
        )
        .reduce(
            || vec![BaseCounts::default(); width],
            |a, b| {
                a.into_iter()
                    .zip(b)
                    .map(|(x, y)| x.merge(y))
                    .collect()
            },
        )
}

/// Keeps the `k` longest records seen so far in a min-heap whose top is the
/// current worst candidate. Length ties keep the record that appeared
/// earlier in the input.
pub struct TopKLongestSelector {
    cap: usize,
    order_counter: u64,
    heap: BinaryHeap<SelectorItem>,
}

struct SelectorItem {
    len: usize,
    order: u64,
    rec: SeqRecord,
}

// max-heap ordering inverted so the heap top is the worst candidate:
// shorter is worse; equal lengths make the later arrival worse
impl Ord for SelectorItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .len
            .cmp(&self.len)
            .then(self.order.cmp(&other.order))
    }
}

impl PartialOrd for SelectorItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SelectorItem {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.order == other.order
    }
}

impl Eq for SelectorItem {}

impl TopKLongestSelector {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            order_counter: 0,
            heap: BinaryHeap::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offer one record; it displaces the current worst candidate when it
    /// is longer, or equally long but earlier.
    pub fn consider(&mut self, rec: SeqRecord) {
        if self.cap == 0 {
            return;
        }
        let cand = SelectorItem {
            len: rec.len(),
            order: self.order_counter,
            rec,
        };
        self.order_counter += 1;

        if self.heap.len() < self.cap {
            self.heap.push(cand);
            return;
        }
        let worst = self.heap.peek().expect("heap is at capacity");
        let better = cand.len > worst.len || (cand.len == worst.len && cand.order < worst.order);
        if better {
            self.heap.pop();
            self.heap.push(cand);
        }
    }

    /// Drain the kept records, longest first (ties by input order).
    pub fn take_sorted_desc(&mut self) -> Vec<SeqRecord> {
        let mut items: Vec<SelectorItem> = std::mem::take(&mut self.heap).into_vec();
        items.sort_by(|a, b| b.len.cmp(&a.len).then(a.order.cmp(&b.order)));
        items.into_iter().map(|it| it.rec).collect()
    }
}

/// Majority-vote consensus sequence plus its per-column counts.
///
/// `seq_limit == 0` votes over every record; otherwise only the `seq_limit`
/// longest records (ties by earliest appearance) cast votes.
pub fn generate_consensus(records: &[SeqRecord], seq_limit: usize) -> (Vec<u8>, Vec<BaseCounts>) {
    let counts = if seq_limit == 0 || records.len() <= seq_limit {
        column_counts(records)
    } else {
        let mut selector = TopKLongestSelector::new(seq_limit);
        for rec in records {
            selector.consider(rec.clone());
        }
        column_counts(&selector.take_sorted_desc())
    };
    let consensus = counts.iter().map(pick_consensus_char).collect();
    (consensus, counts)
}

/// Persist the per-column counts as JSON.
pub fn write_counts_json(path: &Path, counts: &[BaseCounts]) -> Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer(&mut file, counts)
        .map_err(|e| crate::error::MsaError::SeqParse(e.to_string()))?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, seq: &str) -> SeqRecord {
        SeqRecord::new(id, seq.as_bytes().to_vec())
    }

    #[test]
    fn test_majority_with_gap_column() {
        // the third column has one gap: majority among the bases wins;
        // the all-gap fifth column becomes 'A'
        let records = vec![rec("s1", "ACGT-"), rec("s2", "AC-T-"), rec("s3", "ACGT-")];
        let (cons, counts) = generate_consensus(&records, 0);
        assert_eq!(cons, b"ACGTA");
        assert_eq!(counts[2].g, 2);
        assert_eq!(counts[4], BaseCounts::default());
    }

    #[test]
    fn test_tie_breaks_toward_a() {
        let records = vec![rec("s1", "A"), rec("s2", "C")];
        let (cons, _) = generate_consensus(&records, 0);
        assert_eq!(cons, b"A");
    }

    #[test]
    fn test_tie_order_c_before_g() {
        let records = vec![rec("s1", "C"), rec("s2", "G")];
        let (cons, _) = generate_consensus(&records, 0);
        assert_eq!(cons, b"C");
    }

    #[test]
    fn test_all_gap_columns_become_a() {
        let records = vec![rec("s1", "---"), rec("s2", "---")];
        let (cons, _) = generate_consensus(&records, 0);
        assert_eq!(cons, b"AAA");
    }

    #[test]
    fn test_uneven_lengths_use_longest() {
        let records = vec![rec("s1", "ACGT"), rec("s2", "AC")];
        let (cons, _) = generate_consensus(&records, 0);
        assert_eq!(cons, b"ACGT");
    }

    #[test]
    fn test_seq_limit_affects_result() {
        // unrestricted, the three short 'C' records outvote the two long
        // 'A' records; limited to the 2 longest, only the 'A's vote
        let records = vec![
            rec("s1", "ACGT"),
            rec("s2", "AGGT"),
            rec("s3", "C"),
            rec("s4", "C"),
            rec("s5", "C"),
        ];
        let (unrestricted, _) = generate_consensus(&records, 0);
        assert_eq!(unrestricted[0], b'C');
        let (limited, _) = generate_consensus(&records, 2);
        assert_eq!(limited[0], b'A');
        assert_eq!(limited, b"ACGT");
    }

    #[test]
    fn test_selector_keeps_k_longest() {
        let mut sel = TopKLongestSelector::new(2);
        sel.consider(rec("short", "AC"));
        sel.consider(rec("long", "ACGTACGT"));
        sel.consider(rec("mid", "ACGT"));
        sel.consider(rec("tiny", "A"));
        let kept = sel.take_sorted_desc();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "long");
        assert_eq!(kept[1].id, "mid");
    }

    #[test]
    fn test_selector_ties_keep_earliest() {
        let mut sel = TopKLongestSelector::new(2);
        sel.consider(rec("first", "ACGT"));
        sel.consider(rec("second", "ACGT"));
        sel.consider(rec("third", "ACGT"));
        let kept = sel.take_sorted_desc();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "first");
        assert_eq!(kept[1].id, "second");
    }

    #[test]
    fn test_selector_zero_capacity_keeps_nothing() {
        let mut sel = TopKLongestSelector::new(0);
        sel.consider(rec("s1", "ACGT"));
        assert!(sel.is_empty());
        assert!(sel.take_sorted_desc().is_empty());
    }

    #[test]
    fn test_counts_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counts.json");
        let records = vec![rec("s1", "AC"), rec("s2", "AG")];
        let (_, counts) = generate_consensus(&records, 0);
        write_counts_json(&path, &counts).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<BaseCounts> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, counts);
    }
}
