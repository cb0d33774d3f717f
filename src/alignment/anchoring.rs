//! Anchor collection: hash-indexed join of reference and query minimizer
//! hits, with minimap2-style occurrence filtering.
//!
//! The frequency filters run *before* occurrence expansion. Filtering after
//! expansion would materialize the full Cartesian product first, which
//! explodes on repetitive regions.

use crate::alignment::seeding::MinimizerHit;
use crate::hash::Hash;
use std::collections::HashMap;

/// One seed match between a reference and a query position.
///
/// Owned by a single worker for a single query; never shared across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub hash: Hash,
    pub rid_ref: u32,
    pub pos_ref: u32,
    pub rid_qry: u32,
    pub pos_qry: u32,
    pub span: u32,
    pub is_rev: bool,
}

/// Occurrence-filter knobs applied during anchor collection.
#[derive(Debug, Clone, Copy)]
pub struct SeedFilterParams {
    /// Ignore the most frequent fraction of distinct reference hashes.
    pub f_top_frac: f64,
    /// Lower clamp on the per-hash reference occurrence cutoff.
    pub u_floor: usize,
    /// Upper clamp on the per-hash reference occurrence cutoff.
    pub u_ceil: usize,
    /// Drop a query hash whose query-side occurrence exceeds this fraction
    /// of the query hit count.
    pub q_occ_frac: f64,
    /// Above the occurrence cutoff, expand only query positions on this
    /// stride.
    pub sample_every_bp: u32,
}

impl Default for SeedFilterParams {
    fn default() -> Self {
        Self {
            f_top_frac: 2e-4,
            u_floor: 10,
            u_ceil: 1_000_000,
            q_occ_frac: 0.01,
            sample_every_bp: 500,
        }
    }
}

impl SeedFilterParams {
    /// All filters off: every (ref-hit, query-hit) pair with a shared hash
    /// becomes an anchor.
    pub fn disabled() -> Self {
        Self {
            f_top_frac: 0.0,
            u_floor: usize::MAX,
            u_ceil: usize::MAX,
            q_occ_frac: f64::INFINITY,
            sample_every_bp: 1,
        }
    }
}

/// Occurrence value at rank `floor(f_top_frac * distinct)` of the descending
/// occurrence list; usize::MAX when the rank is 0 (i.e. no filtering).
fn occ_cutoff_top_frac(occs: &[usize], f_top_frac: f64) -> usize {
    if occs.is_empty() || f_top_frac <= 0.0 {
        return usize::MAX;
    }
    if f_top_frac >= 1.0 {
        return 1;
    }
    let n_skip = (f_top_frac * occs.len() as f64).floor() as usize;
    if n_skip == 0 {
        return usize::MAX;
    }
    let mut tmp = occs.to_vec();
    let idx = n_skip - 1;
    tmp.select_nth_unstable_by(idx, |a, b| b.cmp(a));
    tmp[idx]
}

/// Final per-hash reference occurrence cutoff:
/// `max(u_floor, min(u_ceil, top_frac_cutoff))`.
fn ref_occ_threshold(occs: &[usize], p: &SeedFilterParams) -> usize {
    let f_cutoff = occ_cutoff_top_frac(occs, p.f_top_frac);
    p.u_floor.max(p.u_ceil.min(f_cutoff))
}

/// Collect anchors from one query's hits against the reference hits.
///
/// The reference side is sorted by hash once and indexed into
/// `hash -> (start, count)` runs; each query hit is then joined in O(1)
/// expected time. Survivors of the occurrence filters expand into one anchor
/// per (ref-hit, query-hit) pair with `span = min(ref.span, qry.span)` and
/// `is_rev = ref.strand XOR qry.strand`.
pub fn collect_anchors(
    ref_hits: &[MinimizerHit],
    qry_hits: &[MinimizerHit],
    params: &SeedFilterParams,
) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    if ref_hits.is_empty() || qry_hits.is_empty() {
        return anchors;
    }

    let mut sorted_ref: Vec<MinimizerHit> = ref_hits.to_vec();
    sorted_ref.sort_unstable_by_key(|h| h.hash());

    // hash -> (start, count) over the sorted reference hits
    let mut hash_index: HashMap<Hash, (usize, usize)> = HashMap::new();
    hash_index.reserve(sorted_ref.len());
    let mut start = 0usize;
    for i in 1..=sorted_ref.len() {
        if i == sorted_ref.len() || sorted_ref[i].hash() != sorted_ref[start].hash() {
            hash_index.insert(sorted_ref[start].hash(), (start, i - start));
            start = i;
        }
    }

    let occs: Vec<usize> = hash_index.values().map(|&(_, c)| c).collect();
    let occ_cutoff = ref_occ_threshold(&occs, params);

    // query-side occurrence counts for the q_occ_frac filter
    let mut qry_occ: HashMap<Hash, usize> = HashMap::new();
    for h in qry_hits {
        *qry_occ.entry(h.hash()).or_insert(0) += 1;
    }
    let qry_occ_max = if params.q_occ_frac.is_finite() {
        (params.q_occ_frac * qry_hits.len() as f64) as usize
    } else {
        usize::MAX
    };

    anchors.reserve(qry_hits.len());
    for qry_hit in qry_hits {
        let h = qry_hit.hash();
        let Some(&(start, count)) = hash_index.get(&h) else {
            continue;
        };
        if qry_occ[&h] > qry_occ_max {
            continue;
        }
        if count > occ_cutoff && qry_hit.pos() % params.sample_every_bp.max(1) != 0 {
            continue;
        }
        for ref_hit in &sorted_ref[start..start + count] {
            anchors.push(Anchor {
                hash: h,
                rid_ref: ref_hit.rid(),
                pos_ref: ref_hit.pos(),
                rid_qry: qry_hit.rid(),
                pos_qry: qry_hit.pos(),
                span: ref_hit.span().min(qry_hit.span()),
                is_rev: ref_hit.strand() != qry_hit.strand(),
            });
        }
    }

    anchors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::seeding::extract_minimizers;

    #[test]
    fn test_disabled_filters_give_cartesian_product() {
        // two ref hits and three qry hits on the same hash -> 6 anchors
        let h = 0xdead_beefu64;
        let ref_hits = vec![
            MinimizerHit::new(h, 10, 0, true, 15),
            MinimizerHit::new(h, 40, 0, true, 15),
        ];
        let qry_hits = vec![
            MinimizerHit::new(h, 5, 0, true, 15),
            MinimizerHit::new(h, 25, 0, true, 15),
            MinimizerHit::new(h, 45, 0, false, 15),
        ];
        let anchors = collect_anchors(&ref_hits, &qry_hits, &SeedFilterParams::disabled());
        assert_eq!(anchors.len(), 6);
        // strand XOR: the third query hit flips is_rev
        assert_eq!(anchors.iter().filter(|a| a.is_rev).count(), 2);
    }

    #[test]
    fn test_span_is_min_of_sides() {
        let h = 1u64;
        let ref_hits = vec![MinimizerHit::new(h, 0, 0, true, 21)];
        let qry_hits = vec![MinimizerHit::new(h, 0, 0, true, 15)];
        let anchors = collect_anchors(&ref_hits, &qry_hits, &SeedFilterParams::disabled());
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].span, 15);
    }

    #[test]
    fn test_no_shared_hash_no_anchors() {
        let ref_hits = vec![MinimizerHit::new(1, 0, 0, true, 15)];
        let qry_hits = vec![MinimizerHit::new(2, 0, 0, true, 15)];
        assert!(collect_anchors(&ref_hits, &qry_hits, &SeedFilterParams::disabled()).is_empty());
    }

    #[test]
    fn test_default_filters_bound_repeat_expansion() {
        // a sequence that is one 16-mer repeated many times; default filters
        // must keep the anchor count far below the quadratic product
        let motif = b"ACGGTTCAGGACCTTA";
        let mut seq = Vec::new();
        for _ in 0..64 {
            seq.extend_from_slice(motif);
        }
        let ref_hits = extract_minimizers(&seq, 11, 5, false, 0);
        let qry_hits = extract_minimizers(&seq, 11, 5, false, 0);

        let unfiltered = collect_anchors(&ref_hits, &qry_hits, &SeedFilterParams::disabled());
        let filtered = collect_anchors(&ref_hits, &qry_hits, &SeedFilterParams::default());
        assert!(
            filtered.len() < unfiltered.len(),
            "default filters kept the full product ({} anchors)",
            filtered.len()
        );
        // sub-quadratic in the repeat count
        assert!(filtered.len() < 64 * 64);
    }

    #[test]
    fn test_occ_cutoff_top_frac() {
        assert_eq!(occ_cutoff_top_frac(&[], 0.5), usize::MAX);
        assert_eq!(occ_cutoff_top_frac(&[1, 2, 3], 0.0), usize::MAX);
        // rank floor(0.5*4)=2 -> second largest value
        assert_eq!(occ_cutoff_top_frac(&[1, 9, 4, 2], 0.5), 4);
        // rank 0 -> no filtering
        assert_eq!(occ_cutoff_top_frac(&[1, 9, 4, 2], 0.1), usize::MAX);
        assert_eq!(occ_cutoff_top_frac(&[5, 6], 1.0), 1);
    }
}
