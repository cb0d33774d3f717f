//! Anchor chaining via the classical best-predecessor DP.
//!
//! Anchors are sorted by (rid_ref, is_rev, pos_ref, pos_qry) and chained
//! with a score that rewards covered bases and penalizes diagonal drift and
//! skipped distance. The best surviving chain drives the segmented aligner.

use crate::alignment::anchoring::Anchor;

#[derive(Debug, Clone)]
pub struct Chain {
    pub score: f64,
    /// Indices into the (sorted) anchor vector, in chain order.
    pub anchors: Vec<usize>,
    pub qry_start: u32,
    pub qry_end: u32,
    pub ref_start: u32,
    pub ref_end: u32,
    pub is_rev: bool,
}

impl Chain {
    pub fn count(&self) -> usize {
        self.anchors.len()
    }
}

/// Chaining DP knobs.
#[derive(Debug, Clone, Copy)]
pub struct ChainParams {
    /// Per-base penalty on |dref - dqry| (diagonal drift).
    pub gap_penalty: f64,
    /// Per-base penalty on min(dref, dqry) (skipped distance).
    pub skip_penalty: f64,
    /// Maximum reference-axis jump between chained anchors.
    pub max_dist_x: u32,
    /// Maximum query-axis jump between chained anchors.
    pub max_dist_y: u32,
    /// Maximum diagonal drift between chained anchors.
    pub bw: u32,
    /// Give up on a predecessor scan after this many non-improving checks.
    pub max_skip: usize,
    /// Hard cap on predecessor checks per anchor.
    pub max_iter: usize,
    /// Discard chains with fewer anchors than this.
    pub min_cnt: usize,
    /// Discard chains scoring below this.
    pub min_score: f64,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            gap_penalty: 0.12,
            skip_penalty: 0.01,
            max_dist_x: 5000,
            max_dist_y: 5000,
            bw: 500,
            max_skip: 25,
            max_iter: 5000,
            min_cnt: 3,
            min_score: 40.0,
        }
    }
}

/// Sort anchors into chaining order. The DP below requires this ordering.
pub fn sort_anchors_for_chaining(anchors: &mut [Anchor]) {
    anchors.sort_unstable_by(|a, b| {
        (a.rid_ref, a.is_rev, a.pos_ref, a.pos_qry).cmp(&(
            b.rid_ref,
            b.is_rev,
            b.pos_ref,
            b.pos_qry,
        ))
    });
}

/// Transition score for extending the chain ending at `prev` with `cur`,
/// or None when the transition is inadmissible.
#[inline]
fn transition_score(prev: &Anchor, cur: &Anchor, p: &ChainParams) -> Option<f64> {
    if prev.rid_ref != cur.rid_ref || prev.is_rev != cur.is_rev {
        return None;
    }
    if cur.pos_ref <= prev.pos_ref || cur.pos_qry <= prev.pos_qry {
        return None;
    }
    let dref = cur.pos_ref - prev.pos_ref;
    let dqry = cur.pos_qry - prev.pos_qry;
    if dref > p.max_dist_x || dqry > p.max_dist_y {
        return None;
    }
    let dd = dref.abs_diff(dqry);
    if dd > p.bw {
        return None;
    }

    let base = dref.min(dqry).min(cur.span) as f64;
    let penalty = p.gap_penalty * dd as f64
        + p.skip_penalty * dref.min(dqry) as f64
        + 0.5 * ((dd as f64) + 1.0).log2();
    Some(base - penalty)
}

/// Chain sorted anchors. Returns surviving chains ordered by descending
/// score. `anchors` must already be in chaining order
/// (see [`sort_anchors_for_chaining`]).
pub fn chain_anchors(anchors: &[Anchor], params: &ChainParams) -> Vec<Chain> {
    let n = anchors.len();
    if n == 0 {
        return Vec::new();
    }

    let mut dp = vec![0.0f64; n];
    let mut prev_idx: Vec<Option<usize>> = vec![None; n];

    for i in 0..n {
        dp[i] = anchors[i].span as f64;
        let mut skipped = 0usize;
        let mut iters = 0usize;
        for j in (0..i).rev() {
            iters += 1;
            if iters > params.max_iter {
                break;
            }
            // anchors are sorted by pos_ref within a (rid, strand) group, so
            // once the reference gap exceeds the limit no earlier j can chain
            if anchors[j].rid_ref != anchors[i].rid_ref
                || anchors[j].is_rev != anchors[i].is_rev
            {
                break;
            }
            if anchors[i].pos_ref - anchors[j].pos_ref > params.max_dist_x {
                break;
            }
            let Some(ts) = transition_score(&anchors[j], &anchors[i], params) else {
                continue;
            };
            let cand = dp[j] + ts;
            if cand > dp[i] {
                dp[i] = cand;
                prev_idx[i] = Some(j);
                skipped = 0;
            } else {
                skipped += 1;
                if skipped > params.max_skip {
                    break;
                }
            }
        }
    }

    // iterative peak extraction: best unused endpoint, backtrace, repeat
    let mut chains = Vec::new();
    let mut used = vec![false; n];
    loop {
        let mut best: Option<usize> = None;
        for i in 0..n {
            if !used[i] && best.map_or(true, |b| dp[i] > dp[b]) {
                best = Some(i);
            }
        }
        let Some(end) = best else { break };
        if dp[end] < params.min_score {
            break;
        }

        let mut members = Vec::new();
        let mut cur = end;
        loop {
            members.push(cur);
            used[cur] = true;
            match prev_idx[cur] {
                Some(p) if !used[p] => cur = p,
                _ => break,
            }
        }
        members.reverse();

        if members.len() >= params.min_cnt {
            let first = &anchors[members[0]];
            let last = &anchors[*members.last().expect("non-empty chain")];
            chains.push(Chain {
                score: dp[end],
                qry_start: first.pos_qry,
                qry_end: last.pos_qry + last.span,
                ref_start: first.pos_ref,
                ref_end: last.pos_ref + last.span,
                is_rev: first.is_rev,
                anchors: members,
            });
        }
    }

    chains.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    chains
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(pos_ref: u32, pos_qry: u32, span: u32) -> Anchor {
        Anchor {
            hash: 0,
            rid_ref: 0,
            pos_ref,
            rid_qry: 0,
            pos_qry,
            span,
            is_rev: false,
        }
    }

    #[test]
    fn test_colinear_anchors_form_one_chain() {
        let mut anchors: Vec<Anchor> =
            (0..10).map(|i| anchor(i * 100, i * 100, 15)).collect();
        sort_anchors_for_chaining(&mut anchors);
        let params = ChainParams {
            min_score: 10.0,
            ..ChainParams::default()
        };
        let chains = chain_anchors(&anchors, &params);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].count(), 10);
        assert_eq!(chains[0].ref_start, 0);
        assert_eq!(chains[0].ref_end, 915);
    }

    #[test]
    fn test_off_diagonal_anchor_not_chained() {
        let mut anchors = vec![
            anchor(0, 0, 15),
            anchor(100, 100, 15),
            // 2000 bases of drift, far beyond bw
            anchor(200, 2200, 15),
            anchor(300, 300, 15),
        ];
        sort_anchors_for_chaining(&mut anchors);
        let params = ChainParams {
            min_cnt: 2,
            min_score: 10.0,
            bw: 500,
            ..ChainParams::default()
        };
        let chains = chain_anchors(&anchors, &params);
        assert!(!chains.is_empty());
        let best = &chains[0];
        for &idx in &best.anchors {
            assert_ne!(anchors[idx].pos_qry, 2200);
        }
    }

    #[test]
    fn test_min_cnt_filters_short_chains() {
        let mut anchors = vec![anchor(0, 0, 15), anchor(100, 100, 15)];
        sort_anchors_for_chaining(&mut anchors);
        let params = ChainParams {
            min_cnt: 3,
            min_score: 1.0,
            ..ChainParams::default()
        };
        assert!(chain_anchors(&anchors, &params).is_empty());
    }

    #[test]
    fn test_chains_sorted_by_score() {
        // two separate diagonals, the longer one must rank first
        let mut anchors = Vec::new();
        for i in 0..8u32 {
            anchors.push(anchor(i * 50, i * 50, 15));
        }
        for i in 0..4u32 {
            anchors.push(anchor(100_000 + i * 50, i * 50, 15));
        }
        sort_anchors_for_chaining(&mut anchors);
        let params = ChainParams {
            min_cnt: 2,
            min_score: 10.0,
            ..ChainParams::default()
        };
        let chains = chain_anchors(&anchors, &params);
        assert!(chains.len() >= 2);
        assert!(chains[0].score >= chains[1].score);
        assert_eq!(chains[0].count(), 8);
    }

    #[test]
    fn test_empty_input() {
        assert!(chain_anchors(&[], &ChainParams::default()).is_empty());
    }
}
