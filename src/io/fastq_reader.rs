// FASTQ reader module using bio::io::fastq
//
// Wraps bio::io::fastq with automatic gzip detection by file extension.
// Quality strings are dropped: the alignment pipeline is sequence-only.

use crate::error::{MsaError, Result};
use crate::io::{RecordStream, SeqRecord};
use bio::io::fastq;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// FASTQ reader with automatic gzip detection
pub struct FastqReader {
    records: fastq::Records<BufReader<Box<dyn Read + Send>>>,
}

impl FastqReader {
    /// Open a FASTQ file (.fq, .fastq, .fq.gz, .fastq.gz).
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let is_gz = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);
        let reader: Box<dyn Read + Send> = if is_gz {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        // Reader::new() wraps the boxed stream in its own BufReader
        let fastq_reader = fastq::Reader::new(reader);
        Ok(Self {
            records: fastq_reader.records(),
        })
    }
}

impl RecordStream for FastqReader {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_reads_fastq_records() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("t.fastq");
        std::fs::File::create(&p)
            .unwrap()
            .write_all(b"@r1\nACGT\n+\nIIII\n@r2\nGG\n+\nII\n")
            .unwrap();
        let mut r = FastqReader::new(&p).unwrap();
        assert_eq!(r.next_record().unwrap().unwrap().id, "r1");
        assert_eq!(r.next_record().unwrap().unwrap().seq, b"GG");
        assert!(r.next_record().unwrap().is_none());
    }
}
