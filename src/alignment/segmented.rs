//! Chain-driven segmented alignment.
//!
//! The best anchor chain splits a (reference, query) pair into alternating
//! gap segments and anchor-span segments; each segment is aligned
//! end-to-end with the DP engine and the per-segment CIGARs are stitched
//! with [`cigar::append_cigar`]. Cursors advance by the *actual* reference
//! and query consumption of each segment CIGAR, not by the nominal segment
//! widths, so the concatenated CIGAR always consumes exactly the input
//! lengths even when a segment aligner picked a different path than the
//! anchor suggested.

use crate::alignment::anchoring::{collect_anchors, Anchor, SeedFilterParams};
use crate::alignment::chaining::{chain_anchors, sort_anchors_for_chaining, ChainParams};
use crate::alignment::cigar::{self, Cigar, CigarOp};
use crate::alignment::seeding::{extract_minimizers, MinimizerHit};
use crate::alignment::PairwiseAligner;
use crate::error::Result;

/// Segmented aligner over any base engine.
pub struct SegmentedAligner<'a, A: PairwiseAligner> {
    pub engine: &'a A,
    pub filter: SeedFilterParams,
    pub chain: ChainParams,
}

impl<'a, A: PairwiseAligner> SegmentedAligner<'a, A> {
    pub fn new(engine: &'a A) -> Self {
        Self {
            engine,
            filter: SeedFilterParams::default(),
            chain: ChainParams::default(),
        }
    }

    /// Align using precomputed minimizer hits for both sides.
    pub fn align_with_hits(
        &self,
        reference: &[u8],
        query: &[u8],
        ref_hits: &[MinimizerHit],
        qry_hits: &[MinimizerHit],
    ) -> Result<Cigar> {
        let mut anchors = collect_anchors(ref_hits, qry_hits, &self.filter);
        self.align_with_anchors(reference, query, &mut anchors)
    }

    /// Extract minimizers, chain, and align.
    pub fn align(
        &self,
        reference: &[u8],
        query: &[u8],
        k: usize,
        w: usize,
        canonical: bool,
    ) -> Result<Cigar> {
        let ref_hits = extract_minimizers(reference, k, w, canonical, 0);
        let qry_hits = extract_minimizers(query, k, w, canonical, 0);
        self.align_with_hits(reference, query, &ref_hits, &qry_hits)
    }

    /// Chain `anchors` and align segment by segment. Falls back to one
    /// full-length DP call when no chain survives or when the stitched
    /// result violates the length contract.
    pub fn align_with_anchors(
        &self,
        reference: &[u8],
        query: &[u8],
        anchors: &mut Vec<Anchor>,
    ) -> Result<Cigar> {
        sort_anchors_for_chaining(anchors);
        let chains = chain_anchors(anchors, &self.chain);
        let Some(best) = chains.first() else {
            return self.engine.global_align(reference, query);
        };

        // walk the chain's anchors in (pos_qry, pos_ref) order
        let mut chain_anchors_sorted: Vec<&Anchor> =
            best.anchors.iter().map(|&i| &anchors[i]).collect();
        chain_anchors_sorted.sort_unstable_by_key(|a| (a.pos_qry, a.pos_ref));

        let mut out = Cigar::new();
        let mut ref_pos = 0usize;
        let mut qry_pos = 0usize;

        let align_segment =
            |out: &mut Cigar, ref_pos: &mut usize, qry_pos: &mut usize, ref_end: usize, qry_end: usize| -> Result<()> {
                let ref_end = ref_end.min(reference.len()).max(*ref_pos);
                let qry_end = qry_end.min(query.len()).max(*qry_pos);
                let ref_seg = &reference[*ref_pos..ref_end];
                let qry_seg = &query[*qry_pos..qry_end];
                if ref_seg.is_empty() && qry_seg.is_empty() {
                    return Ok(());
                }

                let mut seg_cigar = self.engine.global_align(ref_seg, qry_seg)?;
                if cigar::ref_length(&seg_cigar) != ref_seg.len() as u64
                    || cigar::query_length(&seg_cigar) != qry_seg.len() as u64
                {
                    // per-segment safe fallback: all-insertion then all-deletion
                    seg_cigar.clear();
                    if !qry_seg.is_empty() {
                        seg_cigar.push(cigar::unit(CigarOp::I, qry_seg.len() as u32));
                    }
                    if !ref_seg.is_empty() {
                        seg_cigar.push(cigar::unit(CigarOp::D, ref_seg.len() as u32));
                    }
                }

                // advance by what the segment actually consumed
                *ref_pos += cigar::ref_length(&seg_cigar) as usize;
                *qry_pos += cigar::query_length(&seg_cigar) as usize;
                cigar::append_cigar(out, &seg_cigar);
                Ok(())
            };

        for anchor in &chain_anchors_sorted {
            let a_ref = anchor.pos_ref as usize;
            let a_qry = anchor.pos_qry as usize;
            if a_ref < ref_pos || a_qry < qry_pos {
                // overlapping anchor already consumed by the previous segment
                continue;
            }
            // gap segment up to the anchor start
            align_segment(&mut out, &mut ref_pos, &mut qry_pos, a_ref, a_qry)?;
            // anchor span segment
            let span = anchor.span as usize;
            align_segment(&mut out, &mut ref_pos, &mut qry_pos, a_ref + span, a_qry + span)?;
        }
        // tail segment
        align_segment(&mut out, &mut ref_pos, &mut qry_pos, reference.len(), query.len())?;

        if cigar::ref_length(&out) != reference.len() as u64
            || cigar::query_length(&out) != query.len() as u64
        {
            log::warn!(
                "segmented alignment violated the length contract ({}R/{}Q vs {}/{}), falling back to full DP",
                cigar::ref_length(&out),
                cigar::query_length(&out),
                reference.len(),
                query.len()
            );
            return self.engine.global_align(reference, query);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::banded_dp::BandedDp;
    use crate::alignment::cigar::{cigar_to_string, query_length, ref_length};

    fn seg_align(r: &[u8], q: &[u8]) -> Cigar {
        let engine = BandedDp::default();
        let mut aligner = SegmentedAligner::new(&engine);
        aligner.chain = ChainParams {
            min_cnt: 2,
            min_score: 10.0,
            ..ChainParams::default()
        };
        aligner.align(r, q, 11, 5, false).unwrap()
    }

    fn random_seq(n: usize, state: &mut u64) -> Vec<u8> {
        (0..n)
            .map(|_| {
                *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                b"ACGT"[(*state >> 33) as usize % 4]
            })
            .collect()
    }

    #[test]
    fn test_identical_sequences() {
        let mut s = 7u64;
        let seq = random_seq(400, &mut s);
        let cg = seg_align(&seq, &seq);
        assert_eq!(cigar_to_string(&cg), "400M");
    }

    #[test]
    fn test_length_contract_with_indel() {
        let mut s = 11u64;
        let reference = random_seq(600, &mut s);
        let mut query = reference.clone();
        // 12bp deletion in the middle
        query.drain(300..312);
        let cg = seg_align(&reference, &query);
        assert_eq!(ref_length(&cg), reference.len() as u64);
        assert_eq!(query_length(&cg), query.len() as u64);
    }

    #[test]
    fn test_no_anchors_falls_back_to_full_dp() {
        // too short for 11-mers on one side: no chain, full DP path
        let cg = seg_align(b"ACGTACGT", b"ACGTACGT");
        assert_eq!(cigar_to_string(&cg), "8M");
    }

    #[test]
    fn test_substitutions_do_not_break_segments() {
        let mut s = 23u64;
        let reference = random_seq(500, &mut s);
        let mut query = reference.clone();
        for i in (40..460).step_by(97) {
            query[i] = match query[i] {
                b'A' => b'C',
                b'C' => b'G',
                b'G' => b'T',
                _ => b'A',
            };
        }
        let cg = seg_align(&reference, &query);
        assert_eq!(ref_length(&cg), 500);
        assert_eq!(query_length(&cg), 500);
    }
}
