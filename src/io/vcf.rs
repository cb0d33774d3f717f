//! VCF 4.1 output: SNP/INS/DEL records derived from a query's CIGAR
//! against the reference it was aligned to.
//!
//! Positions are 1-based. Insertions and deletions are anchored on the
//! preceding reference base; an event with no anchor base (a leading
//! insertion at reference position 0) is suppressed.

use crate::alignment::cigar::{unit_len, unit_op, CigarOp, CigarUnit};
use crate::error::Result;
use std::io::Write;
use std::path::Path;

/// Write the fixed VCF header. `source` and `reference` name the input and
/// reference files of the run.
pub fn write_vcf_header<W: Write>(out: &mut W, source: &Path, reference: &Path) -> Result<()> {
    writeln!(out, "##fileformat=VCFv4.1")?;
    writeln!(out, "##source={}", source.display())?;
    writeln!(out, "##reference={}", reference.display())?;
    writeln!(
        out,
        "##INFO=<ID=SEQID,Number=1,TYPE=SNP/INS/DEL,Type=String,Description=\"Query sequence ID\">"
    )?;
    writeln!(out, "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;
    Ok(())
}

/// Generate the VCF lines for one aligned query.
pub fn vcf_records_from_cigar(
    ref_id: &str,
    query_id: &str,
    ref_seq: &[u8],
    query_seq: &[u8],
    cigar: &[CigarUnit],
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut ref_pos = 0usize; // 0-based
    let mut qry_pos = 0usize;

    for &u in cigar {
        let Some(op) = unit_op(u) else { continue };
        let len = unit_len(u) as usize;
        match op {
            CigarOp::M | CigarOp::Eq | CigarOp::X => {
                for i in 0..len {
                    let (r, q) = (ref_pos + i, qry_pos + i);
                    if r >= ref_seq.len() || q >= query_seq.len() {
                        break;
                    }
                    let (rb, qb) = (ref_seq[r], query_seq[q]);
                    if !rb.eq_ignore_ascii_case(&qb) {
                        lines.push(format!(
                            "{}\t{}\t.\t{}\t{}\t.\tPASS\tSEQID={}, TYPE=SNP",
                            ref_id,
                            r + 1,
                            rb as char,
                            qb as char,
                            query_id
                        ));
                    }
                }
                ref_pos += len;
                qry_pos += len;
            }
            CigarOp::I => {
                if ref_pos > 0 && qry_pos + len <= query_seq.len() {
                    let anchor = ref_seq[ref_pos - 1] as char;
                    let inserted =
                        String::from_utf8_lossy(&query_seq[qry_pos..qry_pos + len]).into_owned();
                    lines.push(format!(
                        "{}\t{}\t.\t{}\t{}{}\t.\tPASS\tSEQID={}, TYPE=INS",
                        ref_id, ref_pos, anchor, anchor, inserted, query_id
                    ));
                }
                qry_pos += len;
            }
            CigarOp::D | CigarOp::N => {
                if op == CigarOp::D && ref_pos > 0 && ref_pos + len <= ref_seq.len() {
                    let anchor = ref_seq[ref_pos - 1] as char;
                    let deleted = String::from_utf8_lossy(&ref_seq[ref_pos - 1..ref_pos + len])
                        .into_owned();
                    lines.push(format!(
                        "{}\t{}\t.\t{}\t{}\t.\tPASS\tSEQID={}, TYPE=DEL",
                        ref_id, ref_pos, deleted, anchor, query_id
                    ));
                }
                ref_pos += len;
            }
            CigarOp::S => qry_pos += len,
            CigarOp::H | CigarOp::P => {}
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::cigar::string_to_cigar;

    fn records(r: &[u8], q: &[u8], cg: &str) -> Vec<String> {
        vcf_records_from_cigar("ref", "qry", r, q, &string_to_cigar(cg).unwrap())
    }

    #[test]
    fn test_identity_has_no_records() {
        assert!(records(b"ACGTACGT", b"ACGTACGT", "8M").is_empty());
    }

    #[test]
    fn test_snp_record() {
        let lines = records(b"ACGTACGT", b"ACGAACGT", "8M");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "ref\t4\t.\tT\tA\t.\tPASS\tSEQID=qry, TYPE=SNP");
    }

    #[test]
    fn test_insertion_record() {
        let lines = records(b"ACGTACGT", b"ACGTTACGT", "4M1I4M");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "ref\t4\t.\tT\tTT\t.\tPASS\tSEQID=qry, TYPE=INS");
    }

    #[test]
    fn test_deletion_record() {
        let lines = records(b"ACGTACGT", b"ACGACGT", "3M1D4M");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0], "ref\t3\t.\tGT\tG\t.\tPASS\tSEQID=qry, TYPE=DEL");
    }

    #[test]
    fn test_leading_insertion_suppressed() {
        let lines = records(b"ACGT", b"TTACGT", "2I4M");
        assert!(lines.is_empty());
    }

    #[test]
    fn test_case_insensitive_match() {
        assert!(records(b"acgt", b"ACGT", "4M").is_empty());
    }

    #[test]
    fn test_header_shape() {
        let mut buf = Vec::new();
        write_vcf_header(&mut buf, Path::new("in.fasta"), Path::new("ref.fasta")).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("##fileformat=VCFv4.1\n"));
        assert!(text.contains("##source=in.fasta\n"));
        assert!(text.contains("##reference=ref.fasta\n"));
        assert!(text.ends_with("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n"));
    }
}
