//! Gap-affine wavefront aligner for high-identity pairs.
//!
//! Exact matches are free and are consumed by diagonal extension, so the
//! work scales with the alignment score rather than the product of the
//! sequence lengths. Penalties are mismatch 3, gap-open 4, gap-extend 1;
//! emitted CIGARs use M/I/D and satisfy the same length contract as the DP
//! engine.
//!
//! Conventions: diagonal `k = h - v` where `h` indexes the reference and `v`
//! the query; offsets store `h`. An insertion consumes query (`v += 1`,
//! `k -= 1`); a deletion consumes reference (`h += 1`, `k += 1`).

use crate::alignment::cigar::{self, Cigar, CigarOp};
use crate::alignment::PairwiseAligner;
use crate::error::Result;

const NONE: i32 = i32::MIN;

/// Wavefront penalties. All must be positive (gap cost `o + e*len`).
#[derive(Debug, Clone, Copy)]
pub struct WavefrontParams {
    pub mismatch: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
    /// Hard cap on the alignment score; beyond it the aligner gives up and
    /// reports an empty CIGAR so the caller can fall back to the DP engine.
    pub max_score: i32,
}

impl Default for WavefrontParams {
    fn default() -> Self {
        Self {
            mismatch: 3,
            gap_open: 4,
            gap_extend: 1,
            max_score: 25_000,
        }
    }
}

/// NONE-propagating arrival check: an offset that stepped past the end of
/// either sequence cannot seed an M cell.
#[inline]
fn clamp_arrival(offset: i32, k: i32, tlen: i32, qlen: i32) -> i32 {
    if offset == NONE || offset > tlen || offset - k > qlen {
        NONE
    } else {
        offset
    }
}

/// One score's wavefront: furthest-reaching offsets per diagonal for the
/// match (M), insertion (I) and deletion (D) states.
struct Wavefront {
    lo: i32,
    hi: i32,
    m: Vec<i32>,
    i: Vec<i32>,
    d: Vec<i32>,
}

impl Wavefront {
    fn new(lo: i32, hi: i32) -> Self {
        let width = (hi - lo + 1) as usize;
        Self {
            lo,
            hi,
            m: vec![NONE; width],
            i: vec![NONE; width],
            d: vec![NONE; width],
        }
    }

    #[inline]
    fn get(v: &[i32], lo: i32, hi: i32, k: i32) -> i32 {
        if k < lo || k > hi {
            NONE
        } else {
            v[(k - lo) as usize]
        }
    }

    #[inline]
    fn m_at(&self, k: i32) -> i32 {
        Self::get(&self.m, self.lo, self.hi, k)
    }

    #[inline]
    fn i_at(&self, k: i32) -> i32 {
        Self::get(&self.i, self.lo, self.hi, k)
    }

    #[inline]
    fn d_at(&self, k: i32) -> i32 {
        Self::get(&self.d, self.lo, self.hi, k)
    }
}

/// The wavefront engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavefrontAligner {
    pub params: WavefrontParams,
}

impl WavefrontAligner {
    pub fn new(params: WavefrontParams) -> Self {
        Self { params }
    }

    /// Core alignment; returns None when `max_score` is exhausted.
    fn align(&self, reference: &[u8], query: &[u8]) -> Option<Cigar> {
        let tlen = reference.len() as i32;
        let qlen = query.len() as i32;
        if tlen == 0 && qlen == 0 {
            return Some(Cigar::new());
        }
        if tlen == 0 {
            return Some(vec![cigar::unit(CigarOp::I, qlen as u32)]);
        }
        if qlen == 0 {
            return Some(vec![cigar::unit(CigarOp::D, tlen as u32)]);
        }

        let p = &self.params;
        let k_final = tlen - qlen;
        let oe = p.gap_open + p.gap_extend;

        let extend = |k: i32, mut h: i32| -> i32 {
            let mut v = h - k;
            while h < tlen && v < qlen && reference[h as usize] == query[v as usize] {
                h += 1;
                v += 1;
            }
            h
        };

        let mut fronts: Vec<Option<Wavefront>> = Vec::new();

        // score 0: extend from the origin
        let mut wf0 = Wavefront::new(0, 0);
        wf0.m[0] = extend(0, 0);
        if wf0.m[0] >= tlen && wf0.m[0] - 0 >= qlen {
            let matched = tlen;
            return Some(vec![cigar::unit(CigarOp::M, matched as u32)]);
        }
        fronts.push(Some(wf0));

        let mut score = 0;
        loop {
            score += 1;
            if score > p.max_score {
                return None;
            }

            let prev = |s: i32, fronts: &Vec<Option<Wavefront>>| -> Option<usize> {
                if s < 0 || s as usize >= fronts.len() {
                    None
                } else if fronts[s as usize].is_some() {
                    Some(s as usize)
                } else {
                    None
                }
            };

            let s_mis = prev(score - p.mismatch, &fronts);
            let s_open = prev(score - oe, &fronts);
            let s_ext = prev(score - p.gap_extend, &fronts);

            if s_mis.is_none() && s_open.is_none() && s_ext.is_none() {
                fronts.push(None);
                continue;
            }

            // diagonal range of the new front
            let mut lo = i32::MAX;
            let mut hi = i32::MIN;
            let mut widen = |f: Option<usize>, fronts: &Vec<Option<Wavefront>>, by: i32| {
                if let Some(idx) = f {
                    let wf = fronts[idx].as_ref().expect("checked above");
                    lo = lo.min(wf.lo - by);
                    hi = hi.max(wf.hi + by);
                }
            };
            widen(s_mis, &fronts, 0);
            widen(s_open, &fronts, 1);
            widen(s_ext, &fronts, 1);

            let mut wf = Wavefront::new(lo, hi);
            let mut done = false;

            for k in lo..=hi {
                let idx = (k - lo) as usize;

                // I: consumes query, arrives from diagonal k+1, offset kept
                let i_open = s_open
                    .map(|s| fronts[s].as_ref().expect("present").m_at(k + 1))
                    .unwrap_or(NONE);
                let i_ext = s_ext
                    .map(|s| fronts[s].as_ref().expect("present").i_at(k + 1))
                    .unwrap_or(NONE);
                let ins = i_open.max(i_ext);
                wf.i[idx] = ins;

                // D: consumes reference, arrives from diagonal k-1, offset +1
                let d_open = s_open
                    .map(|s| fronts[s].as_ref().expect("present").m_at(k - 1))
                    .unwrap_or(NONE);
                let d_ext = s_ext
                    .map(|s| fronts[s].as_ref().expect("present").d_at(k - 1))
                    .unwrap_or(NONE);
                let del_src = d_open.max(d_ext);
                let del = if del_src == NONE { NONE } else { del_src + 1 };
                wf.d[idx] = del;

                // M: mismatch step or gap close, then free diagonal extension.
                // Arrivals outside the matrix are dropped per candidate, not
                // collectively, so a valid gap close survives an overlong
                // mismatch arrival on the same diagonal.
                let mis_src = s_mis
                    .map(|s| fronts[s].as_ref().expect("present").m_at(k))
                    .unwrap_or(NONE);
                let mis = if mis_src == NONE { NONE } else { mis_src + 1 };
                let mut m = clamp_arrival(mis, k, tlen, qlen)
                    .max(clamp_arrival(ins, k, tlen, qlen))
                    .max(clamp_arrival(del, k, tlen, qlen));

                if m != NONE {
                    m = extend(k, m);
                    wf.m[idx] = m;
                    if k == k_final && m >= tlen {
                        done = true;
                    }
                }
            }

            fronts.push(Some(wf));
            if done {
                return Some(self.backtrace(&fronts, score, reference, query));
            }
        }
    }

    /// Walk back through the stored wavefronts from the end cell.
    fn backtrace(
        &self,
        fronts: &[Option<Wavefront>],
        end_score: i32,
        reference: &[u8],
        query: &[u8],
    ) -> Cigar {
        let p = &self.params;
        let tlen = reference.len() as i32;
        let qlen = query.len() as i32;
        let oe = p.gap_open + p.gap_extend;

        #[derive(PartialEq, Clone, Copy)]
        enum State {
            M,
            I,
            D,
        }

        // ops collected back-to-front as (op, len) runs
        let mut ops: Vec<(CigarOp, u32)> = Vec::new();
        let push = |op: CigarOp, n: u32, ops: &mut Vec<(CigarOp, u32)>| {
            if n == 0 {
                return;
            }
            if let Some(last) = ops.last_mut() {
                if last.0 == op {
                    last.1 += n;
                    return;
                }
            }
            ops.push((op, n));
        };

        let front = |s: i32| -> Option<&Wavefront> {
            if s < 0 || s as usize >= fronts.len() {
                None
            } else {
                fronts[s as usize].as_ref()
            }
        };

        let mut s = end_score;
        let mut k = tlen - qlen;
        let mut h = tlen;
        let mut state = State::M;

        while h > 0 || h - k > 0 {
            match state {
                State::M => {
                    // predecessors of M[s][k] before the extension run,
                    // clamped the same way the fill clamps them
                    let mis = front(s - p.mismatch)
                        .map(|w| w.m_at(k))
                        .unwrap_or(NONE);
                    let mis_arr =
                        clamp_arrival(if mis == NONE { NONE } else { mis + 1 }, k, tlen, qlen);
                    let cur = front(s).expect("end front exists");
                    let ins = clamp_arrival(cur.i_at(k), k, tlen, qlen);
                    let del = clamp_arrival(cur.d_at(k), k, tlen, qlen);
                    let best_arr = mis_arr.max(ins).max(del);

                    if best_arr == NONE || s == 0 {
                        // initial front: everything left is the s=0 extension
                        debug_assert_eq!(k, 0);
                        push(CigarOp::M, h as u32, &mut ops);
                        break;
                    }

                    // free matches consumed after arriving at best_arr
                    push(CigarOp::M, (h - best_arr) as u32, &mut ops);
                    h = best_arr;

                    if del != NONE && del == best_arr {
                        state = State::D;
                    } else if ins != NONE && ins == best_arr {
                        state = State::I;
                    } else {
                        // mismatch consumed one diagonal step
                        push(CigarOp::M, 1, &mut ops);
                        h -= 1;
                        s -= p.mismatch;
                    }
                }
                State::I => {
                    push(CigarOp::I, 1, &mut ops);
                    let ext = front(s - p.gap_extend)
                        .map(|w| w.i_at(k + 1))
                        .unwrap_or(NONE);
                    let cur = front(s).expect("front exists").i_at(k);
                    if ext != NONE && ext == cur {
                        s -= p.gap_extend;
                        k += 1;
                        state = State::I;
                    } else {
                        s -= oe;
                        k += 1;
                        state = State::M;
                    }
                }
                State::D => {
                    push(CigarOp::D, 1, &mut ops);
                    let cur = front(s).expect("front exists").d_at(k);
                    let ext = front(s - p.gap_extend)
                        .map(|w| w.d_at(k - 1))
                        .unwrap_or(NONE);
                    h -= 1;
                    if ext != NONE && ext + 1 == cur {
                        s -= p.gap_extend;
                        k -= 1;
                        state = State::D;
                    } else {
                        s -= oe;
                        k -= 1;
                        state = State::M;
                    }
                }
            }
        }

        ops.reverse();
        ops.into_iter()
            .map(|(op, len)| cigar::unit(op, len))
            .collect()
    }
}

impl PairwiseAligner for WavefrontAligner {
    fn global_align(&self, reference: &[u8], query: &[u8]) -> Result<Cigar> {
        Ok(self.align(reference, query).unwrap_or_default())
    }

    fn extend_align(&self, reference: &[u8], query: &[u8], _zdrop: i32) -> Result<Cigar> {
        // the wavefront engine always runs end-to-end; extension callers get
        // the same contract as global mode
        Ok(self.align(reference, query).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::cigar::{cigar_to_string, query_length, ref_length};

    fn wfa(r: &[u8], q: &[u8]) -> Cigar {
        WavefrontAligner::default().global_align(r, q).unwrap()
    }

    #[test]
    fn test_identity() {
        assert_eq!(cigar_to_string(&wfa(b"ACGTACGTACGTACGT", b"ACGTACGTACGTACGT")), "16M");
    }

    #[test]
    fn test_single_mismatch() {
        assert_eq!(cigar_to_string(&wfa(b"ACGTACGT", b"ACGAACGT")), "8M");
    }

    #[test]
    fn test_single_insertion_placement() {
        assert_eq!(cigar_to_string(&wfa(b"ACGTACGT", b"ACGTTACGT")), "4M1I4M");
    }

    #[test]
    fn test_single_deletion_placement() {
        assert_eq!(cigar_to_string(&wfa(b"ACGTACGT", b"ACGACGT")), "3M1D4M");
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(cigar_to_string(&wfa(b"", b"ACGT")), "4I");
        assert_eq!(cigar_to_string(&wfa(b"ACGT", b"")), "4D");
        assert!(wfa(b"", b"").is_empty());
    }

    #[test]
    fn test_length_contract_on_messy_pair() {
        let r = b"ACGGTTCAGGACCTTAGAGAGATTTACACGTACGGTTCAG";
        let q = b"ACGGTTCGGACCTTAGAGCGATTTACACGTACGGTTCAGA";
        let cg = wfa(r, q);
        assert_eq!(query_length(&cg), q.len() as u64);
        assert_eq!(ref_length(&cg), r.len() as u64);
    }

    #[test]
    fn test_long_gap_affine() {
        let r = b"ACGTACGTACGTACGTACGT";
        let q = b"ACGTACGTAAAAAACGTACGTACGT";
        let cg = wfa(r, q);
        assert_eq!(query_length(&cg), q.len() as u64);
        assert_eq!(ref_length(&cg), r.len() as u64);
        assert!(cigar::has_insertion(&cg));
    }

    #[test]
    fn test_agrees_with_dp_on_lengths() {
        use crate::alignment::banded_dp::BandedDp;
        let r = b"GATTACAGATTACAGATTACAGATTACA";
        let q = b"GATTACAGATTTACAGATACAGATTACA";
        let w = wfa(r, q);
        let d = BandedDp::default().global_align(r, q).unwrap();
        assert_eq!(query_length(&w), query_length(&d));
        assert_eq!(ref_length(&w), ref_length(&d));
    }
}
