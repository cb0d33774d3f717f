//! Minimal SAM 1.6 reading and writing for the per-worker intermediates.
//!
//! One record per query: QNAME, FLAG 0, RNAME, POS 1, MAPQ 60, the CIGAR
//! string and the query sequence. RNEXT/PNEXT/TLEN/QUAL stay `*`/0/0/`*`.
//! The merger re-reads these files, so SEQ carries the raw query bytes.

use crate::error::{MsaError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One intermediate SAM record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamRecord {
    pub qname: String,
    pub rname: String,
    pub cigar: String,
    pub seq: Vec<u8>,
}

/// Buffered SAM writer owned by exactly one worker.
pub struct SamWriter {
    out: BufWriter<File>,
}

impl SamWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        let mut out = BufWriter::with_capacity(1 << 20, file);
        out.write_all(b"@HD\tVN:1.6\tSO:unknown\n")?;
        Ok(Self { out })
    }

    pub fn write_record(&mut self, rec: &SamRecord) -> Result<()> {
        self.out.write_all(rec.qname.as_bytes())?;
        self.out.write_all(b"\t0\t")?;
        self.out.write_all(rec.rname.as_bytes())?;
        self.out.write_all(b"\t1\t60\t")?;
        self.out.write_all(rec.cigar.as_bytes())?;
        self.out.write_all(b"\t*\t0\t0\t")?;
        self.out.write_all(&rec.seq)?;
        self.out.write_all(b"\t*\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Streaming SAM reader for the merger.
pub struct SamReader {
    lines: std::io::Lines<BufReader<File>>,
}

impl SamReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::with_capacity(1 << 20, file).lines(),
        })
    }

    /// Next alignment record, skipping header lines. None at end of file.
    pub fn next_record(&mut self) -> Result<Option<SamRecord>> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            let line = line?;
            if line.is_empty() || line.starts_with('@') {
                continue;
            }
            let mut fields = line.split('\t');
            let qname = fields.next();
            let _flag = fields.next();
            let rname = fields.next();
            let _pos = fields.next();
            let _mapq = fields.next();
            let cigar = fields.next();
            let _rnext = fields.next();
            let _pnext = fields.next();
            let _tlen = fields.next();
            let seq = fields.next();
            let (Some(qname), Some(rname), Some(cigar), Some(seq)) = (qname, rname, cigar, seq)
            else {
                return Err(MsaError::SamParse(line.clone()));
            };
            return Ok(Some(SamRecord {
                qname: qname.to_string(),
                rname: rname.to_string(),
                cigar: cigar.to_string(),
                seq: seq.as_bytes().to_vec(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.sam");
        {
            let mut w = SamWriter::create(&path).unwrap();
            w.write_record(&SamRecord {
                qname: "q1".into(),
                rname: "ref".into(),
                cigar: "4M1I4M".into(),
                seq: b"ACGTTACGT".to_vec(),
            })
            .unwrap();
            w.write_record(&SamRecord {
                qname: "q2".into(),
                rname: "ref".into(),
                cigar: "8M".into(),
                seq: b"ACGTACGT".to_vec(),
            })
            .unwrap();
            w.flush().unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("@HD\tVN:1.6\tSO:unknown\n"));
        assert!(content.contains("q1\t0\tref\t1\t60\t4M1I4M\t*\t0\t0\tACGTTACGT\t*\n"));

        let mut r = SamReader::open(&path).unwrap();
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.qname, "q1");
        assert_eq!(rec.cigar, "4M1I4M");
        assert_eq!(rec.seq, b"ACGTTACGT");
        assert_eq!(r.next_record().unwrap().unwrap().qname, "q2");
        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn test_malformed_line_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.sam");
        std::fs::write(&path, "q1\t0\tref\n").unwrap();
        let mut r = SamReader::open(&path).unwrap();
        assert!(r.next_record().is_err());
    }
}
