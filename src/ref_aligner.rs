//! Per-query reference alignment.
//!
//! For each query: sketch, pick the most similar reference by Jaccard
//! (first wins on ties), align, and recheck any insertion against the
//! consensus. Queries whose consensus alignment still carries insertions
//! land in the insertion bucket for the merger's external-MSA pass;
//! everything else goes to the normal bucket.

use crate::alignment::banded_dp::BandedDp;
use crate::alignment::cigar::{self, Cigar};
use crate::alignment::seeding::extract_minimizers;
use crate::alignment::segmented::SegmentedAligner;
use crate::alignment::wavefront::WavefrontAligner;
use crate::alignment::PairwiseAligner;
use crate::config::{AlignConfig, EngineKind};
use crate::error::Result;
use crate::index::ReferenceIndex;
use crate::io::SeqRecord;
use crate::sketch::{jaccard, sketch_from_sequence};
use std::sync::Arc;

/// Which output file a query belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Normal,
    Insertion,
}

/// The sequence a query ended up aligned against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignTarget {
    Reference(usize),
    Consensus,
}

/// Result of aligning one query.
#[derive(Debug, Clone)]
pub struct AlignedQuery {
    pub qname: String,
    pub target: AlignTarget,
    pub cigar: Cigar,
    pub bucket: Bucket,
}

pub struct RefAligner {
    index: Arc<ReferenceIndex>,
    cfg: Arc<AlignConfig>,
    wavefront: WavefrontAligner,
    dp: BandedDp,
}

impl RefAligner {
    pub fn new(index: Arc<ReferenceIndex>, cfg: Arc<AlignConfig>) -> Self {
        Self {
            index,
            cfg,
            wavefront: WavefrontAligner::default(),
            dp: BandedDp::default(),
        }
    }

    /// Reference sequence / id for an alignment target.
    pub fn target_seq(&self, target: AlignTarget) -> &SeqRecord {
        match target {
            AlignTarget::Reference(i) => &self.index.records[i],
            AlignTarget::Consensus => &self.index.consensus,
        }
    }

    /// Linear scan over the reference sketches; maximum Jaccard wins, first
    /// match on ties.
    fn pick_best_reference(&self, query: &SeqRecord) -> Result<usize> {
        let qry_sketch = sketch_from_sequence(
            &query.seq,
            self.cfg.kmer_size,
            self.cfg.sketch_size,
            self.cfg.canonical,
            self.cfg.sketch_seed,
        );
        let mut best = 0usize;
        let mut best_j = -1.0f64;
        for (i, ref_sketch) in self.index.sketches.iter().enumerate() {
            let j = jaccard(ref_sketch, &qry_sketch)?;
            if j > best_j {
                best_j = j;
                best = i;
            }
        }
        log::debug!(
            "query {}: best reference {} (jaccard {:.4})",
            query.id,
            self.index.records[best].id,
            best_j
        );
        Ok(best)
    }

    /// Produce a CIGAR for `query` against `target` with the configured
    /// engine, falling back to the chain-segmented DP whenever the primary
    /// engine returns a CIGAR that does not consume both sequences exactly.
    fn align_pair(&self, target: AlignTarget, query: &SeqRecord) -> Result<Cigar> {
        let reference = &self.target_seq(target).seq;
        let primary = match self.cfg.engine {
            EngineKind::Wavefront => self.wavefront.global_align(reference, &query.seq)?,
            EngineKind::BandedDp => self.dp.global_align(reference, &query.seq)?,
            EngineKind::Segmented => return self.align_segmented(target, query),
        };

        let valid = cigar::ref_length(&primary) == reference.len() as u64
            && cigar::query_length(&primary) == query.seq.len() as u64;
        if valid {
            return Ok(primary);
        }
        log::debug!(
            "query {}: primary engine gave up, falling back to segmented DP",
            query.id
        );
        self.align_segmented(target, query)
    }

    fn align_segmented(&self, target: AlignTarget, query: &SeqRecord) -> Result<Cigar> {
        let reference = &self.target_seq(target).seq;
        let ref_hits = match target {
            AlignTarget::Reference(i) => &self.index.minimizers[i],
            AlignTarget::Consensus => &self.index.consensus_minimizers,
        };
        let qry_hits = extract_minimizers(
            &query.seq,
            self.cfg.kmer_size,
            self.cfg.window_size,
            self.cfg.canonical,
            0,
        );
        SegmentedAligner::new(&self.dp).align_with_hits(reference, &query.seq, ref_hits, &qry_hits)
    }

    /// Align one query end-to-end.
    ///
    /// The insertion recheck: a first-pass CIGAR with any `I` is realigned
    /// against the consensus. If the consensus CIGAR still carries an `I`
    /// the query needs new columns and goes to the insertion bucket; if not
    /// the insertion was an artifact of the chosen reference and the
    /// consensus alignment is emitted normally.
    pub fn align_one_query(&self, query: &SeqRecord) -> Result<AlignedQuery> {
        let best = self.pick_best_reference(query)?;
        let target = AlignTarget::Reference(best);
        let first = self.align_pair(target, query)?;

        if !cigar::has_insertion(&first) {
            return Ok(AlignedQuery {
                qname: query.id.clone(),
                target,
                cigar: first,
                bucket: Bucket::Normal,
            });
        }

        let consensus_cigar = self.align_pair(AlignTarget::Consensus, query)?;
        let bucket = if cigar::has_insertion(&consensus_cigar) {
            Bucket::Insertion
        } else {
            Bucket::Normal
        };
        Ok(AlignedQuery {
            qname: query.id.clone(),
            target: AlignTarget::Consensus,
            cigar: consensus_cigar,
            bucket,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ReferenceIndex;
    use std::io::Write as _;
    use std::path::PathBuf;

    fn setup(refs: &[u8]) -> (tempfile::TempDir, RefAligner) {
        let dir = tempfile::tempdir().unwrap();
        let ref_path = dir.path().join("refs.fasta");
        std::fs::File::create(&ref_path).unwrap().write_all(refs).unwrap();
        let mut cfg = AlignConfig::new(
            PathBuf::from("unused.fasta"),
            ref_path,
            dir.path().join("out"),
        );
        cfg.kmer_size = 7;
        cfg.window_size = 3;
        cfg.sketch_size = 200;
        let cfg = Arc::new(cfg);
        let index = Arc::new(ReferenceIndex::build(&cfg).unwrap());
        (dir, RefAligner::new(index, cfg))
    }

    #[test]
    fn test_reference_selection_prefers_identical() {
        let refs = format!(">allA\n{}\n>allC\n{}\n", "A".repeat(32), "C".repeat(32));
        let (_dir, aligner) = setup(refs.as_bytes());
        let query = SeqRecord::new("q", "A".repeat(32).into_bytes());
        let best = aligner.pick_best_reference(&query).unwrap();
        assert_eq!(aligner.index.records[best].id, "allA");
    }

    #[test]
    fn test_identity_query_goes_to_normal_bucket() {
        let (_dir, aligner) = setup(b">r\nACGTACGTACGTACGT\n");
        let query = SeqRecord::new("q", b"ACGTACGTACGTACGT".to_vec());
        let out = aligner.align_one_query(&query).unwrap();
        assert_eq!(out.bucket, Bucket::Normal);
        assert_eq!(cigar::cigar_to_string(&out.cigar), "16M");
        assert_eq!(out.target, AlignTarget::Reference(0));
    }

    #[test]
    fn test_insertion_query_goes_to_insertion_bucket() {
        let (_dir, aligner) = setup(b">r\nACGTACGTACGTACGT\n");
        // 4 extra bases force an insertion against reference and consensus
        let query = SeqRecord::new("q", b"ACGTACGTTTTTACGTACGT".to_vec());
        let out = aligner.align_one_query(&query).unwrap();
        assert_eq!(out.bucket, Bucket::Insertion);
        assert_eq!(out.target, AlignTarget::Consensus);
        assert!(cigar::has_insertion(&out.cigar));
        assert_eq!(cigar::query_length(&out.cigar), 20);
        assert_eq!(cigar::ref_length(&out.cigar), 16);
    }

    #[test]
    fn test_deletion_query_stays_normal() {
        let (_dir, aligner) = setup(b">r\nACGTACGTACGTACGT\n");
        let query = SeqRecord::new("q", b"ACGTACGTACGT".to_vec());
        let out = aligner.align_one_query(&query).unwrap();
        assert_eq!(out.bucket, Bucket::Normal);
        assert_eq!(cigar::ref_length(&out.cigar), 16);
    }
}
