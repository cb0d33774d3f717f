//! Affine-gap banded dynamic-programming aligner over the DNA5 matrix.
//!
//! Global mode fills the classic H/E/F recurrences inside a diagonal band
//! and backtraces to a compressed CIGAR. Extension mode reuses the same fill
//! but tracks the best-scoring cell, applies an end bonus on reaching either
//! sequence end, and stops early under the Z-drop criterion.
//!
//! Scores are plain i32; the traceback is band-compressed so memory stays
//! `O(rows * band)` rather than `O(rows * cols)`.

use crate::alignment::cigar::{self, Cigar, CigarOp};
use crate::alignment::{encode_dna5, PairwiseAligner, DNA5, DNA5_MAT};
use crate::error::Result;

const NEG_INF: i32 = i32::MIN / 2;

/// Traceback flags per cell.
const H_FROM_DIAG: u8 = 0;
const H_FROM_E: u8 = 1; // deletion run ends here
const H_FROM_F: u8 = 2; // insertion run ends here
const H_SRC_MASK: u8 = 0x3;
const E_EXTENDED: u8 = 0x4;
const F_EXTENDED: u8 = 0x8;

/// Banded DP configuration. The concrete scoring is fixed to the DNA5
/// matrix; the band follows `margin + indel_rate * (qlen + tlen/2)` and is
/// disabled (full matrix) when the lengths differ by more than half.
#[derive(Debug, Clone, Copy)]
pub struct DpParams {
    pub gap_open: i32,
    pub gap_extend: i32,
    pub band_margin: usize,
    pub indel_rate: f64,
    pub end_bonus: i32,
}

impl Default for DpParams {
    fn default() -> Self {
        Self {
            gap_open: 6,
            gap_extend: 2,
            band_margin: 32,
            indel_rate: 0.01,
            end_bonus: 50,
        }
    }
}

/// The banded DP engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandedDp {
    pub params: DpParams,
}

impl BandedDp {
    pub fn new(params: DpParams) -> Self {
        Self { params }
    }
}

/// Band half-width for a (qlen, tlen) pair, or None when banding is
/// disabled because the lengths are too dissimilar.
fn auto_band(qlen: usize, tlen: usize, p: &DpParams) -> Option<usize> {
    let max = qlen.max(tlen);
    if max == 0 {
        return None;
    }
    if qlen.abs_diff(tlen) as f64 / max as f64 > 0.5 {
        return None;
    }
    Some(p.band_margin + (p.indel_rate * (qlen as f64 + tlen as f64 / 2.0)) as usize)
}

/// Diagonal range `j - i` covered by the DP. Always spans both the main
/// diagonal and the end cell's diagonal.
fn diag_range(qlen: usize, tlen: usize, p: &DpParams) -> (i64, i64) {
    let d = tlen as i64 - qlen as i64;
    match auto_band(qlen, tlen, p) {
        Some(w) => (0.min(d) - w as i64, 0.max(d) + w as i64),
        None => (-(qlen as i64), tlen as i64),
    }
}

struct DpResult {
    /// Traceback flags, band-compressed: row i holds diagonals lo..=hi.
    tb: Vec<u8>,
    width: usize,
    lo: i64,
    /// Best cell for extension mode: (i, j, score including end bonus).
    best: (usize, usize, i32),
    /// Score of the global end cell, NEG_INF when outside the band.
    end_score: i32,
}

impl DpResult {
    #[inline]
    fn flags(&self, i: usize, j: usize) -> u8 {
        let off = (j as i64 - i as i64 - self.lo) as usize;
        self.tb[i * self.width + off]
    }
}

/// Fill the banded matrices. `zdrop < 0` disables early termination.
///
/// H and F need the previous row (diagonal and vertical moves); E is local
/// to the current row. Each row clears one cell beyond its band on both
/// sides so the next row never reads a stale value.
fn fill(
    tseq: &[u8],
    qseq: &[u8],
    p: &DpParams,
    zdrop: i32,
    with_end_bonus: bool,
) -> DpResult {
    let qlen = qseq.len();
    let tlen = tseq.len();
    let (lo, hi) = diag_range(qlen, tlen, p);
    let width = (hi - lo + 1) as usize;
    let oe = p.gap_open + p.gap_extend;

    let mut tb = vec![0u8; (qlen + 1) * width];
    // rolling rows, indexed by absolute reference position j
    let mut h_prev = vec![NEG_INF; tlen + 1];
    let mut h_cur = vec![NEG_INF; tlen + 1];
    let mut f_prev = vec![NEG_INF; tlen + 1];
    let mut f_cur = vec![NEG_INF; tlen + 1];
    let mut e_row = vec![NEG_INF; tlen + 1];

    let mut best = (0usize, 0usize, 0i32);
    let mut global_best = 0i32;

    // row 0: leading deletions
    h_prev[0] = 0;
    let row0_hi = (hi.min(tlen as i64)).max(0) as usize;
    for j in 1..=row0_hi {
        h_prev[j] = -(p.gap_open + p.gap_extend * j as i32);
        let off = (j as i64 - lo) as usize;
        tb[off] = H_FROM_E | if j > 1 { E_EXTENDED } else { 0 };
    }

    let mut end_score = if qlen == 0 {
        if tlen <= row0_hi { h_prev[tlen] } else { NEG_INF }
    } else {
        NEG_INF
    };

    for i in 1..=qlen {
        let jlo = (i as i64 + lo).max(0) as usize;
        let jhi = ((i as i64 + hi).min(tlen as i64)).max(-1);
        if jhi < jlo as i64 {
            break;
        }
        let jhi = jhi as usize;

        let clear_lo = jlo.saturating_sub(1);
        let clear_hi = (jhi + 1).min(tlen);
        for x in h_cur[clear_lo..=clear_hi].iter_mut() {
            *x = NEG_INF;
        }
        for x in f_cur[clear_lo..=clear_hi].iter_mut() {
            *x = NEG_INF;
        }
        for x in e_row[clear_lo..=clear_hi].iter_mut() {
            *x = NEG_INF;
        }

        let row_base = i * width;
        let qc = qseq[i - 1] as usize;
        let mut row_max = NEG_INF;

        if jlo == 0 {
            // column 0: leading insertions
            let s = -(p.gap_open + p.gap_extend * i as i32);
            h_cur[0] = s;
            f_cur[0] = s;
            let off = (0i64 - i as i64 - lo) as usize;
            tb[row_base + off] = H_FROM_F | if i > 1 { F_EXTENDED } else { 0 };
            row_max = row_max.max(s);
        }

        for j in jlo.max(1)..=jhi {
            let off = (j as i64 - i as i64 - lo) as usize;
            let mut flags = 0u8;

            // E: gap in the query (deletion), moving along the reference
            let e_open = h_cur[j - 1].saturating_sub(oe);
            let e_ext = e_row[j - 1].saturating_sub(p.gap_extend);
            let e = if e_ext > e_open {
                flags |= E_EXTENDED;
                e_ext
            } else {
                e_open
            };
            e_row[j] = e;

            // F: gap in the reference (insertion), moving along the query
            let f_open = h_prev[j].saturating_sub(oe);
            let f_ext = f_prev[j].saturating_sub(p.gap_extend);
            let f = if f_ext > f_open {
                flags |= F_EXTENDED;
                f_ext
            } else {
                f_open
            };
            f_cur[j] = f;

            let diag = h_prev[j - 1]
                .saturating_add(DNA5_MAT[qc * DNA5 + tseq[j - 1] as usize] as i32);

            let mut h = diag;
            let mut src = H_FROM_DIAG;
            if e > h {
                h = e;
                src = H_FROM_E;
            }
            if f > h {
                h = f;
                src = H_FROM_F;
            }
            h_cur[j] = h;
            tb[row_base + off] = flags | src;
            row_max = row_max.max(h);

            if with_end_bonus {
                let bonus = if i == qlen || j == tlen { p.end_bonus } else { 0 };
                let scored = h.saturating_add(bonus);
                if scored > best.2 {
                    best = (i, j, scored);
                }
            }
        }

        if i == qlen && jhi >= tlen && tlen >= jlo {
            end_score = h_cur[tlen];
        }

        global_best = global_best.max(row_max);
        if zdrop >= 0 && row_max < global_best - zdrop {
            break;
        }

        std::mem::swap(&mut h_prev, &mut h_cur);
        std::mem::swap(&mut f_prev, &mut f_cur);
    }

    DpResult {
        tb,
        width,
        lo,
        best,
        end_score,
    }
}

/// Backtrace from `(i, j)` to the origin, producing a compressed CIGAR.
fn backtrace(dp: &DpResult, mut i: usize, mut j: usize) -> Cigar {
    #[derive(PartialEq, Clone, Copy)]
    enum State {
        H,
        E,
        F,
    }

    let mut ops: Vec<(CigarOp, u32)> = Vec::new();
    let push = |op: CigarOp, ops: &mut Vec<(CigarOp, u32)>| {
        if let Some(last) = ops.last_mut() {
            if last.0 == op {
                last.1 += 1;
                return;
            }
        }
        ops.push((op, 1));
    };

    let mut state = State::H;
    while i > 0 || j > 0 {
        let flags = dp.flags(i, j);
        match state {
            State::H => {
                if i == 0 {
                    state = State::E;
                } else if j == 0 {
                    state = State::F;
                } else {
                    match flags & H_SRC_MASK {
                        H_FROM_E => state = State::E,
                        H_FROM_F => state = State::F,
                        _ => {
                            push(CigarOp::M, &mut ops);
                            i -= 1;
                            j -= 1;
                        }
                    }
                }
            }
            State::E => {
                push(CigarOp::D, &mut ops);
                let extended = flags & E_EXTENDED != 0;
                j -= 1;
                if !extended {
                    state = State::H;
                }
            }
            State::F => {
                push(CigarOp::I, &mut ops);
                let extended = flags & F_EXTENDED != 0;
                i -= 1;
                if !extended {
                    state = State::H;
                }
            }
        }
    }

    ops.reverse();
    ops.into_iter()
        .map(|(op, len)| cigar::unit(op, len))
        .collect()
}

impl PairwiseAligner for BandedDp {
    fn global_align(&self, reference: &[u8], query: &[u8]) -> Result<Cigar> {
        if reference.is_empty() && query.is_empty() {
            return Ok(Cigar::new());
        }
        if reference.is_empty() {
            return Ok(vec![cigar::unit(CigarOp::I, query.len() as u32)]);
        }
        if query.is_empty() {
            return Ok(vec![cigar::unit(CigarOp::D, reference.len() as u32)]);
        }

        let tseq = encode_dna5(reference);
        let qseq = encode_dna5(query);
        let dp = fill(&tseq, &qseq, &self.params, -1, false);

        if dp.end_score == NEG_INF {
            // end cell fell outside the band; realign without one
            let wide = DpParams {
                band_margin: reference.len().max(query.len()),
                ..self.params
            };
            let dp = fill(&tseq, &qseq, &wide, -1, false);
            return Ok(backtrace(&dp, qseq.len(), tseq.len()));
        }
        Ok(backtrace(&dp, qseq.len(), tseq.len()))
    }

    fn extend_align(&self, reference: &[u8], query: &[u8], zdrop: i32) -> Result<Cigar> {
        if reference.is_empty() || query.is_empty() {
            return Ok(Cigar::new());
        }
        let tseq = encode_dna5(reference);
        let qseq = encode_dna5(query);
        let dp = fill(&tseq, &qseq, &self.params, zdrop, true);
        let (bi, bj, _) = dp.best;
        Ok(backtrace(&dp, bi, bj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::cigar::{cigar_to_string, query_length, ref_length};

    fn global(r: &[u8], q: &[u8]) -> Cigar {
        BandedDp::default().global_align(r, q).unwrap()
    }

    #[test]
    fn test_identity() {
        let cg = global(b"ACGTACGTACGTACGT", b"ACGTACGTACGTACGT");
        assert_eq!(cigar_to_string(&cg), "16M");
    }

    #[test]
    fn test_single_mismatch_stays_match_run() {
        let cg = global(b"ACGTACGT", b"ACGAACGT");
        assert_eq!(cigar_to_string(&cg), "8M");
    }

    #[test]
    fn test_single_insertion() {
        let cg = global(b"ACGTACGT", b"ACGTTACGT");
        assert_eq!(query_length(&cg), 9);
        assert_eq!(ref_length(&cg), 8);
        assert!(cigar::has_insertion(&cg));
    }

    #[test]
    fn test_single_deletion() {
        let cg = global(b"ACGTACGT", b"ACGACGT");
        assert_eq!(query_length(&cg), 7);
        assert_eq!(ref_length(&cg), 8);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(cigar_to_string(&global(b"", b"ACGT")), "4I");
        assert_eq!(cigar_to_string(&global(b"ACGT", b"")), "4D");
        assert!(global(b"", b"").is_empty());
    }

    #[test]
    fn test_length_invariant_on_divergent_pair() {
        let r = b"ACGTACGTACGTACGTACGTACGTACGTACGT";
        let q = b"ACGTACCTACGTACGAACGTACGTTTACGT";
        let cg = global(r, q);
        assert_eq!(query_length(&cg), q.len() as u64);
        assert_eq!(ref_length(&cg), r.len() as u64);
    }

    #[test]
    fn test_very_different_lengths_disable_band() {
        let r = b"ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT";
        let q = b"ACGTACGT";
        let cg = global(r, q);
        assert_eq!(query_length(&cg), q.len() as u64);
        assert_eq!(ref_length(&cg), r.len() as u64);
    }

    #[test]
    fn test_n_bases_score_zero_but_align() {
        let cg = global(b"ACGTNNNNACGT", b"ACGTAAAAACGT");
        assert_eq!(cigar_to_string(&cg), "12M");
    }

    #[test]
    fn test_extension_stops_at_divergence() {
        // shared 16bp prefix, then unrelated tails
        let r = b"ACGGTTCAGGACCTTATTTTTTTTTTTTTTTT";
        let q = b"ACGGTTCAGGACCTTAGGGGGGGGGGGGGGGG";
        let cg = BandedDp::default().extend_align(r, q, 10).unwrap();
        let qlen = query_length(&cg);
        assert!(qlen >= 16, "extension should cover the shared prefix");
        assert!(qlen < 32, "Z-drop should stop before the divergent tail ends");
    }

    #[test]
    fn test_extension_full_on_identical() {
        let s = b"ACGGTTCAGGACCTTAGAGAG";
        let cg = BandedDp::default().extend_align(s, s, 100).unwrap();
        assert_eq!(cigar_to_string(&cg), "21M");
    }
}
