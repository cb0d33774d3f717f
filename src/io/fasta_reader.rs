// FASTA reader module using bio::io::fasta
//
// This module provides a wrapper around bio::io::fasta with:
// - Automatic gzip/bgzip detection by file extension and magic bytes
// - Parallel BGZIP decompression for .gz files (if BGZIP format detected)
//
// BGZIP format (used in bioinformatics) enables parallel decompression
// via independent compressed blocks. Standard gzip uses single-threaded
// fallback.

use crate::error::{MsaError, Result};
use crate::io::{RecordStream, SeqRecord};
use bio::io::fasta;
use flate2::read::GzDecoder;
use noodles_bgzf as bgzf;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// FASTA reader with automatic gzip/bgzip detection
pub struct FastaReader {
    records: fasta::Records<BufReader<Box<dyn Read + Send>>>,
}

/// Detect if a gzipped file is BGZIP format by checking for the
/// BGZIP-specific header
fn is_bgzip_format(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let mut header = [0u8; 18]; // BGZIP header is at least 18 bytes

    if file.read(&mut header).unwrap_or(0) < 18 {
        return Ok(false); // Not enough bytes for BGZIP header
    }

    // gzip magic bytes
    if header[0] != 0x1f || header[1] != 0x8b {
        return Ok(false);
    }

    // BGZIP uses the extra field (FEXTRA flag = 0x04)
    if header[3] & 0x04 == 0 {
        return Ok(false);
    }

    // BGZIP has a 'BC' subfield at the expected offset of the extra field
    Ok(header[12] == b'B' && header[13] == b'C')
}

impl FastaReader {
    /// Open a FASTA file (auto-detects gzip/bgzip by .gz extension and magic
    /// bytes). BGZF input decompresses on multiple cores; standard gzip
    /// falls back to a single-threaded stream.
    pub fn new(path: &Path) -> Result<Self> {
        const BUFFER_SIZE: usize = 4 * 1024 * 1024;

        let file = File::open(path)?;
        let is_gz = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        let reader: Box<dyn Read + Send> = if is_gz {
            if is_bgzip_format(path)? {
                log::debug!("detected BGZF input, using multithreaded decompression");
                let worker_count = std::num::NonZeroUsize::new(num_cpus::get()).unwrap_or(
                    std::num::NonZeroUsize::new(1).expect("1 is non-zero"),
                );
                let bgzf_reader =
                    bgzf::MultithreadedReader::with_worker_count(worker_count, File::open(path)?);
                Box::new(BufReader::with_capacity(BUFFER_SIZE, bgzf_reader))
            } else {
                log::debug!("detected standard gzip input");
                Box::new(BufReader::with_capacity(BUFFER_SIZE, GzDecoder::new(file)))
            }
        } else {
            Box::new(BufReader::with_capacity(BUFFER_SIZE, file))
        };

        // Reader::new() wraps the boxed stream in its own BufReader
        let fasta_reader = fasta::Reader::new(reader);
        Ok(Self {
            records: fasta_reader.records(),
        })
    }
}

impl RecordStream for FastaReader {
    fn next_record(&mut self) -> Result<Option<SeqRecord>> {
        match self.records.next() {
            Some(Ok(record)) => Ok(Some(SeqRecord {
                id: record.id().to_string(),
                desc: record.desc().map(|d| d.to_string()),
                seq: record.seq().to_vec(),
            })),
            Some(Err(e)) => Err(MsaError::SeqParse(e.to_string())),
            None => Ok(None),
        }
    }
}
