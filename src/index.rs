//! Read-only reference index.
//!
//! Built once at startup and shared by every worker without locking: for
//! each reference record its MinHash sketch and minimizer vector, plus the
//! consensus sequence (with its own sketch and minimizers) that defines the
//! output coordinate system.

use crate::alignment::seeding::{extract_minimizers, MinimizerHit};
use crate::config::AlignConfig;
use crate::consensus::{generate_consensus, BaseCounts};
use crate::error::{MsaError, Result};
use crate::io::{read_all_records, SeqRecord};
use crate::sketch::{sketch_from_sequence, Sketch};
use rayon::prelude::*;
use std::path::Path;

pub struct ReferenceIndex {
    pub records: Vec<SeqRecord>,
    pub sketches: Vec<Sketch>,
    pub minimizers: Vec<Vec<MinimizerHit>>,

    pub consensus: SeqRecord,
    pub consensus_sketch: Sketch,
    pub consensus_minimizers: Vec<MinimizerHit>,
    pub consensus_counts: Vec<BaseCounts>,
}

impl ReferenceIndex {
    /// Load the reference FASTA and build all derived structures.
    ///
    /// With `keep_first_length` the first record *is* the coordinate system;
    /// otherwise the majority-vote consensus of the (aligned) reference set
    /// is. Gap characters are stripped from the consensus before sketching
    /// since queries align against the ungapped sequence.
    pub fn build(cfg: &AlignConfig) -> Result<Self> {
        let mut records = read_all_records(&cfg.reference)?;
        if records.is_empty() {
            return Err(MsaError::EmptyReference(cfg.reference.clone()));
        }
        for rec in &mut records {
            rec.seq.make_ascii_uppercase();
        }
        log::info!(
            "building reference index: {} record(s), k={}, w={}, sketch={}",
            records.len(),
            cfg.kmer_size,
            cfg.window_size,
            cfg.sketch_size
        );

        let sketches: Vec<Sketch> = records
            .par_iter()
            .map(|rec| {
                sketch_from_sequence(
                    &rec.seq,
                    cfg.kmer_size,
                    cfg.sketch_size,
                    cfg.canonical,
                    cfg.sketch_seed,
                )
            })
            .collect();

        let minimizers: Vec<Vec<MinimizerHit>> = records
            .par_iter()
            .enumerate()
            .map(|(rid, rec)| {
                extract_minimizers(
                    &rec.seq,
                    cfg.kmer_size,
                    cfg.window_size,
                    cfg.canonical,
                    rid as u32,
                )
            })
            .collect();

        let (consensus, consensus_counts) = if cfg.keep_first_length || records.len() == 1 {
            (records[0].clone(), Vec::new())
        } else {
            let (seq, counts) = generate_consensus(&records, cfg.reference_limit);
            (
                SeqRecord {
                    id: format!("{}_consensus", records[0].id),
                    desc: Some("majority-vote consensus".to_string()),
                    seq,
                },
                counts,
            )
        };

        // queries align against the ungapped consensus
        let mut consensus = consensus;
        consensus.seq.retain(|&b| b != b'-');

        let consensus_sketch = sketch_from_sequence(
            &consensus.seq,
            cfg.kmer_size,
            cfg.sketch_size,
            cfg.canonical,
            cfg.sketch_seed,
        );
        let consensus_minimizers = extract_minimizers(
            &consensus.seq,
            cfg.kmer_size,
            cfg.window_size,
            cfg.canonical,
            records.len() as u32,
        );

        Ok(Self {
            records,
            sketches,
            minimizers,
            consensus,
            consensus_sketch,
            consensus_minimizers,
            consensus_counts,
        })
    }

    pub fn num_refs(&self) -> usize {
        self.records.len()
    }

    /// Persist the consensus FASTA and its counts JSON into the workdir.
    pub fn write_consensus_artifacts(&self, fasta: &Path, counts_json: &Path) -> Result<()> {
        let mut writer = crate::io::fasta_writer::FastaWriter::create(fasta, 0)?;
        writer.write_record(&self.consensus)?;
        writer.flush()?;
        crate::consensus::write_counts_json(counts_json, &self.consensus_counts)?;
        Ok(())
    }
}
