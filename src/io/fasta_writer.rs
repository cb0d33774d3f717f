//! Buffered FASTA writing.
//!
//! `line_width == 0` writes each sequence on a single line, which is what
//! the final column-aligned output uses (one '>' line, one sequence line,
//! trailing newline per record).

use crate::error::Result;
use crate::io::SeqRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct FastaWriter<W: Write> {
    out: W,
    line_width: usize,
}

impl FastaWriter<BufWriter<File>> {
    /// Create a file-backed writer. `line_width == 0` disables wrapping.
    pub fn create(path: &Path, line_width: usize) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            out: BufWriter::with_capacity(1 << 20, file),
            line_width,
        })
    }
}

impl<W: Write> FastaWriter<W> {
    pub fn new(out: W, line_width: usize) -> Self {
        Self { out, line_width }
    }

    pub fn write_record(&mut self, rec: &SeqRecord) -> Result<()> {
        self.write_parts(&rec.id, rec.desc.as_deref(), &rec.seq)
    }

    pub fn write_parts(&mut self, id: &str, desc: Option<&str>, seq: &[u8]) -> Result<()> {
        self.out.write_all(b">")?;
        self.out.write_all(id.as_bytes())?;
        if let Some(d) = desc {
            self.out.write_all(b" ")?;
            self.out.write_all(d.as_bytes())?;
        }
        self.out.write_all(b"\n")?;

        if self.line_width == 0 {
            self.out.write_all(seq)?;
            self.out.write_all(b"\n")?;
        } else {
            for chunk in seq.chunks(self.line_width) {
                self.out.write_all(chunk)?;
                self.out.write_all(b"\n")?;
            }
            if seq.is_empty() {
                self.out.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_output() {
        let mut buf = Vec::new();
        {
            let mut w = FastaWriter::new(&mut buf, 0);
            w.write_parts("q1", None, b"ACGT-ACGT").unwrap();
            w.flush().unwrap();
        }
        assert_eq!(buf, b">q1\nACGT-ACGT\n");
    }

    #[test]
    fn test_wrapped_output() {
        let mut buf = Vec::new();
        {
            let mut w = FastaWriter::new(&mut buf, 4);
            w.write_parts("a", Some("d"), b"ACGTACG").unwrap();
            w.flush().unwrap();
        }
        assert_eq!(buf, b">a d\nACGT\nACG\n");
    }

    #[test]
    fn test_empty_sequence_keeps_newline() {
        let mut buf = Vec::new();
        {
            let mut w = FastaWriter::new(&mut buf, 0);
            w.write_parts("e", None, b"").unwrap();
            w.flush().unwrap();
        }
        assert_eq!(buf, b">e\n\n");
    }
}
