//! Sequence and record I/O: FASTA/FASTQ streaming readers, buffered FASTA
//! writing, intermediate SAM files and the optional VCF output.

pub mod fasta_reader;
pub mod fasta_writer;
pub mod fastq_reader;
pub mod sam;
pub mod vcf;

use crate::error::{MsaError, Result};
use std::path::Path;

/// One sequence record. Immutable after creation; `seq` holds raw bytes
/// (A/C/G/T/N case-insensitive, '-' permitted in already-aligned input).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeqRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

impl SeqRecord {
    pub fn new(id: impl Into<String>, seq: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            desc: None,
            seq: seq.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

/// A finite stream of sequence records.
pub trait RecordStream {
    /// Next record, or None at end of input.
    fn next_record(&mut self) -> Result<Option<SeqRecord>>;

    /// Read up to `batch_size` records. An empty batch means end of input.
    fn read_batch(&mut self, batch_size: usize) -> Result<Vec<SeqRecord>> {
        let mut batch = Vec::with_capacity(batch_size.min(1024));
        while batch.len() < batch_size {
            match self.next_record()? {
                Some(rec) => batch.push(rec),
                None => break,
            }
        }
        Ok(batch)
    }
}

/// Open a sequence file, picking the parser by extension: `.fq`/`.fastq`
/// (optionally `.gz`) stream as FASTQ, everything else as FASTA.
pub fn open_record_stream(path: &Path) -> Result<Box<dyn RecordStream + Send>> {
    if !path.exists() {
        return Err(MsaError::InputNotFound(path.to_path_buf()));
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stem = name.strip_suffix(".gz").unwrap_or(&name);
    if stem.ends_with(".fq") || stem.ends_with(".fastq") {
        Ok(Box::new(fastq_reader::FastqReader::new(path)?))
    } else {
        Ok(Box::new(fasta_reader::FastaReader::new(path)?))
    }
}

/// Read every record of a FASTA/FASTQ file into memory.
pub fn read_all_records(path: &Path) -> Result<Vec<SeqRecord>> {
    let mut reader = open_record_stream(path)?;
    let mut records = Vec::new();
    while let Some(rec) = reader.next_record()? {
        records.push(rec);
    }
    Ok(records)
}
