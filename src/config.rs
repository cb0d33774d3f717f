//! Run configuration.
//!
//! One explicit record flows from the CLI through the pipeline into the
//! workers and the merger; nothing reads process-wide globals.

use crate::defaults;
use std::path::PathBuf;

/// Which engine produces the per-query CIGAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// WFA-style wavefront (default; fastest on high-identity pairs).
    Wavefront,
    /// Full banded DP.
    BandedDp,
    /// Anchor-chained segmented DP.
    Segmented,
}

#[derive(Debug, Clone)]
pub struct AlignConfig {
    /// Query FASTA file or a directory of FASTA files.
    pub input: PathBuf,
    /// Reference FASTA (one or several records).
    pub reference: PathBuf,
    /// Output prefix; produces `<prefix>.fasta` and optionally `<prefix>.vcf`.
    pub out_prefix: PathBuf,

    pub threads: usize,
    pub save_vcf: bool,
    pub batch_size: usize,

    pub kmer_size: usize,
    pub window_size: usize,
    pub sketch_size: usize,
    pub canonical: bool,
    pub sketch_seed: u64,

    pub engine: EngineKind,

    /// Use the first reference record as the coordinate system and trim the
    /// final output to its length; otherwise the majority-vote consensus of
    /// the reference set defines the columns and insertion columns survive.
    pub keep_first_length: bool,

    /// Cap on how many reference records vote in the consensus: only the
    /// N longest (ties by input order) are counted. 0 means no cap.
    pub reference_limit: usize,

    /// External MSA command template; `{input}` and `{output}` are
    /// substituted. Without an `{output}` placeholder, stdout is captured.
    pub msa_command: String,

    /// Keep the intermediate workdir even on success.
    pub keep_workdir: bool,
}

impl AlignConfig {
    pub fn new(input: PathBuf, reference: PathBuf, out_prefix: PathBuf) -> Self {
        Self {
            input,
            reference,
            out_prefix,
            threads: defaults::THREADS,
            save_vcf: false,
            batch_size: defaults::BATCH_SIZE,
            kmer_size: defaults::KMER_SIZE,
            window_size: defaults::WINDOW_SIZE,
            sketch_size: defaults::SKETCH_SIZE,
            canonical: defaults::CANONICAL_KMERS,
            sketch_seed: defaults::SKETCH_SEED,
            engine: EngineKind::Wavefront,
            keep_first_length: defaults::KEEP_FIRST_LENGTH,
            reference_limit: defaults::REFERENCE_LIMIT,
            msa_command: defaults::MSA_COMMAND.to_string(),
            keep_workdir: false,
        }
    }

    /// Workdir holding all run intermediates.
    pub fn workdir(&self) -> PathBuf {
        let mut name = self
            .out_prefix
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "refmsa".to_string());
        name.push_str(".work");
        self.out_prefix.with_file_name(name)
    }

    pub fn final_fasta_path(&self) -> PathBuf {
        let mut p = self.out_prefix.clone().into_os_string();
        p.push(".fasta");
        PathBuf::from(p)
    }

    pub fn final_vcf_path(&self) -> PathBuf {
        let mut p = self.out_prefix.clone().into_os_string();
        p.push(".vcf");
        PathBuf::from(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_paths() {
        let cfg = AlignConfig::new(
            PathBuf::from("in.fasta"),
            PathBuf::from("ref.fasta"),
            PathBuf::from("/tmp/run/out"),
        );
        assert_eq!(cfg.workdir(), PathBuf::from("/tmp/run/out.work"));
        assert_eq!(cfg.final_fasta_path(), PathBuf::from("/tmp/run/out.fasta"));
        assert_eq!(cfg.final_vcf_path(), PathBuf::from("/tmp/run/out.vcf"));
    }
}
