//! Two-pass consensus projection: the merger combines per-worker SAM files
//! into one column-aligned FASTA.
//!
//! Pass A realigns the insertion bucket against the consensus through the
//! external MSA tool and converts each aligned row into a CIGAR over the
//! aligned consensus row. Pass B projects every record (both buckets) into
//! the consensus coordinate system with `pad_query_to_ref_by_cigar` and
//! enforces one column count across all emitted rows.

use crate::alignment::cigar::{self, Cigar, CigarOp};
use crate::config::AlignConfig;
use crate::error::{MsaError, Result};
use crate::index::ReferenceIndex;
use crate::io::fasta_writer::FastaWriter;
use crate::io::sam::SamReader;
use crate::io::vcf::write_vcf_header;
use crate::io::{read_all_records, SeqRecord};
use crate::pipeline::WorkdirLayout;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::Command;

/// Pass-A result: per-query CIGARs over the aligned consensus row plus the
/// columns where the consensus row itself is a gap.
struct InsertionRealignment {
    cigars: HashMap<String, Cigar>,
    ref_gap_pos: Vec<bool>,
    msa_width: usize,
}

/// Substitute `{input}`/`{output}` into the command template and run it via
/// the shell. Templates without an `{output}` placeholder have their stdout
/// captured into the output file.
fn run_external_msa(template: &str, input: &Path, output: &Path) -> Result<()> {
    let has_output = template.contains("{output}");
    let cmd = template
        .replace("{input}", &input.display().to_string())
        .replace("{output}", &output.display().to_string());
    log::info!("invoking external MSA tool: {}", cmd);

    let mut command = Command::new("sh");
    command.arg("-c").arg(&cmd);

    if has_output {
        let status = command.status()?;
        if !status.success() {
            return Err(MsaError::ExternalMsa(format!(
                "'{}' exited with {}",
                cmd, status
            )));
        }
    } else {
        let out = command.output()?;
        if !out.status.success() {
            return Err(MsaError::ExternalMsa(format!(
                "'{}' exited with {}",
                cmd, out.status
            )));
        }
        std::fs::write(output, &out.stdout)?;
    }

    if std::fs::metadata(output).map(|m| m.len()).unwrap_or(0) == 0 {
        return Err(MsaError::ExternalMsa(format!(
            "'{}' produced no output",
            cmd
        )));
    }
    Ok(())
}

/// Convert one MSA row into a CIGAR over the aligned consensus row: a
/// column holding a query base is M, a column holding a query gap is D.
/// Projecting the raw query with this CIGAR reproduces the row exactly.
fn msa_row_to_cigar(row: &[u8]) -> Cigar {
    let mut out = Cigar::new();
    let mut run_op: Option<CigarOp> = None;
    let mut run_len = 0u32;
    for &b in row {
        let op = if b == b'-' { CigarOp::D } else { CigarOp::M };
        match run_op {
            Some(cur) if cur == op => run_len += 1,
            Some(cur) => {
                out.push(cigar::unit(cur, run_len));
                run_op = Some(op);
                run_len = 1;
            }
            None => {
                run_op = Some(op);
                run_len = 1;
            }
        }
    }
    if let Some(op) = run_op {
        out.push(cigar::unit(op, run_len));
    }
    out
}

/// Pass A: gather the insertion bucket, run the external MSA tool with the
/// consensus prepended, and parse the aligned result.
fn realign_insertion_bucket(
    cfg: &AlignConfig,
    index: &ReferenceIndex,
    layout: &WorkdirLayout,
    num_workers: usize,
) -> Result<Option<InsertionRealignment>> {
    let mut bucket: Vec<SeqRecord> = Vec::new();
    for tid in 0..num_workers {
        let path = layout.insertion_sam(tid);
        if !path.exists() {
            continue;
        }
        let mut reader = SamReader::open(&path)?;
        while let Some(rec) = reader.next_record()? {
            bucket.push(SeqRecord::new(rec.qname, rec.seq));
        }
    }
    if bucket.is_empty() {
        return Ok(None);
    }
    log::info!(
        "insertion bucket: {} record(s), realigning against the consensus",
        bucket.len()
    );

    let pre = layout.pre_msa_fasta();
    {
        let mut writer = FastaWriter::create(&pre, 0)?;
        writer.write_record(&index.consensus)?;
        for rec in &bucket {
            writer.write_record(rec)?;
        }
        writer.flush()?;
    }

    let aligned_path = layout.aligned_msa_fasta();
    run_external_msa(&cfg.msa_command, &pre, &aligned_path)?;

    let rows = read_all_records(&aligned_path)?;
    if rows.len() != bucket.len() + 1 {
        return Err(MsaError::ExternalMsa(format!(
            "aligned output has {} records, expected {}",
            rows.len(),
            bucket.len() + 1
        )));
    }

    let cons_row = &rows[0];
    let msa_width = cons_row.len();
    let ref_gap_pos: Vec<bool> = cons_row.seq.iter().map(|&b| b == b'-').collect();

    let mut cigars = HashMap::with_capacity(bucket.len());
    for row in &rows[1..] {
        if row.len() != msa_width {
            return Err(MsaError::ColumnMismatch {
                id: row.id.clone(),
                expected: msa_width,
                actual: row.len(),
            });
        }
        cigars.insert(row.id.clone(), msa_row_to_cigar(&row.seq));
    }

    Ok(Some(InsertionRealignment {
        cigars,
        ref_gap_pos,
        msa_width,
    }))
}

/// Delete every column flagged in `ref_gap_pos`.
fn strip_ref_gap_columns(row: &[u8], ref_gap_pos: &[bool]) -> Vec<u8> {
    row.iter()
        .zip(ref_gap_pos)
        .filter_map(|(&b, &gap)| if gap { None } else { Some(b) })
        .collect()
}

/// Insert a '-' at every column flagged in `ref_gap_pos`.
fn inflate_at_ref_gap_columns(row: &[u8], ref_gap_pos: &[bool]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ref_gap_pos.len());
    let mut it = row.iter();
    for &gap in ref_gap_pos {
        if gap {
            out.push(b'-');
        } else {
            out.push(it.next().copied().unwrap_or(b'-'));
        }
    }
    out
}

/// Pass B plus the final write: project every record into the consensus
/// coordinate system and emit one fixed-width FASTA.
pub fn merge(
    cfg: &AlignConfig,
    index: &ReferenceIndex,
    layout: &WorkdirLayout,
    num_workers: usize,
) -> Result<()> {
    let realignment = realign_insertion_bucket(cfg, index, layout, num_workers)?;

    let consensus_len = index.consensus.len();
    let expected_width = match (&realignment, cfg.keep_first_length) {
        (Some(_), true) | (None, _) => consensus_len,
        (Some(r), false) => r.msa_width,
    };

    let out_path = cfg.final_fasta_path();
    let mut writer = FastaWriter::create(&out_path, 0)?;
    let mut written = 0usize;
    let mut skipped = 0usize;

    // consensus row first
    let consensus_row: Vec<u8> = match (&realignment, cfg.keep_first_length) {
        (Some(r), false) => inflate_at_ref_gap_columns(&index.consensus.seq, &r.ref_gap_pos),
        _ => index.consensus.seq.clone(),
    };
    writer.write_parts(&index.consensus.id, index.consensus.desc.as_deref(), &consensus_row)?;

    fn emit<W: std::io::Write>(
        writer: &mut FastaWriter<W>,
        id: &str,
        row: &[u8],
        expected_width: usize,
        written: &mut usize,
        skipped: &mut usize,
    ) -> Result<()> {
        if row.len() != expected_width {
            log::error!(
                "record {} projects to {} columns, expected {}; skipped",
                id,
                row.len(),
                expected_width
            );
            *skipped += 1;
            return Ok(());
        }
        writer.write_parts(id, None, row)?;
        *written += 1;
        Ok(())
    }

    for tid in 0..num_workers {
        // normal bucket: the record's own CIGAR projects into ref coords
        let normal = layout.normal_sam(tid);
        if normal.exists() {
            let mut reader = SamReader::open(&normal)?;
            while let Some(rec) = reader.next_record()? {
                let row = match cigar::string_to_cigar(&rec.cigar)
                    .and_then(|cg| cigar::pad_query_to_ref_by_cigar(&rec.seq, &cg))
                {
                    Ok(row) => row,
                    Err(e) => {
                        log::error!("record {}: {}; skipped", rec.qname, e);
                        skipped += 1;
                        continue;
                    }
                };
                let row = match (&realignment, cfg.keep_first_length) {
                    (Some(r), false) => inflate_at_ref_gap_columns(&row, &r.ref_gap_pos),
                    _ => row,
                };
                emit(&mut writer, &rec.qname, &row, expected_width, &mut written, &mut skipped)?;
            }
        }

        // insertion bucket: the Pass-A CIGAR projects into MSA columns
        let Some(r) = &realignment else { continue };
        let insertions = layout.insertion_sam(tid);
        if !insertions.exists() {
            continue;
        }
        let mut reader = SamReader::open(&insertions)?;
        while let Some(rec) = reader.next_record()? {
            let Some(cg) = r.cigars.get(&rec.qname) else {
                log::error!("record {} missing from the external MSA output; skipped", rec.qname);
                skipped += 1;
                continue;
            };
            let row = match cigar::pad_query_to_ref_by_cigar(&rec.seq, cg) {
                Ok(row) => row,
                Err(e) => {
                    log::error!("record {}: {}; skipped", rec.qname, e);
                    skipped += 1;
                    continue;
                }
            };
            let row = if cfg.keep_first_length {
                strip_ref_gap_columns(&row, &r.ref_gap_pos)
            } else {
                row
            };
            emit(&mut writer, &rec.qname, &row, expected_width, &mut written, &mut skipped)?;
        }
    }

    writer.flush()?;
    log::info!(
        "final alignment written to {}: {} row(s) at {} columns, {} skipped",
        out_path.display(),
        written + 1,
        expected_width,
        skipped
    );
    Ok(())
}

/// Concatenate the per-worker VCF fragments under one header.
pub fn merge_vcf(cfg: &AlignConfig, layout: &WorkdirLayout, num_workers: usize) -> Result<()> {
    let out_path = cfg.final_vcf_path();
    let mut out = std::io::BufWriter::new(std::fs::File::create(&out_path)?);
    write_vcf_header(&mut out, &cfg.input, &cfg.reference)?;

    for tid in 0..num_workers {
        let frag = layout.vcf_fragment(tid);
        if !frag.exists() {
            continue;
        }
        let reader = BufReader::new(std::fs::File::open(&frag)?);
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            writeln!(out, "{}", line)?;
        }
    }
    out.flush()?;
    log::info!("VCF written to {}", out_path.display());
    Ok(())
}
