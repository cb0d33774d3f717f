//! Pipeline orchestration: workdir layout, the batched streaming driver and
//! the per-worker dispatch.

pub mod worker_pool;

use crate::config::AlignConfig;
use crate::error::{MsaError, Result};
use crate::index::ReferenceIndex;
use crate::io::sam::{SamRecord, SamWriter};
use crate::io::vcf::vcf_records_from_cigar;
use crate::io::open_record_stream;
use crate::merge;
use crate::ref_aligner::RefAligner;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use self::worker_pool::WorkerPool;

// ============================================================================
// WORKDIR LAYOUT
// ============================================================================

/// Paths of every intermediate under the run's workdir.
#[derive(Debug, Clone)]
pub struct WorkdirLayout {
    root: PathBuf,
}

impl WorkdirLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn consensus_fasta(&self) -> PathBuf {
        self.root.join("consensus.fasta")
    }

    pub fn counts_json(&self) -> PathBuf {
        self.root.join("counts.json")
    }

    pub fn normal_sam(&self, tid: usize) -> PathBuf {
        self.root.join(format!("worker_{}.sam", tid))
    }

    pub fn insertion_sam(&self, tid: usize) -> PathBuf {
        self.root.join(format!("worker_{}.insertions.sam", tid))
    }

    pub fn vcf_fragment(&self, tid: usize) -> PathBuf {
        self.root.join(format!("worker_{}.vcf", tid))
    }

    pub fn pre_msa_fasta(&self) -> PathBuf {
        self.root.join("insertions.fasta")
    }

    pub fn aligned_msa_fasta(&self) -> PathBuf {
        self.root.join("insertions.aligned.fasta")
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Aggregate statistics from a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub total_queries: usize,
    pub total_bases: usize,
    pub batches: usize,
    pub insertion_bucket: usize,
    pub failed_queries: usize,
    pub wall_time_secs: f64,
    /// Peak resident set size in kB; None where the OS does not expose it.
    pub peak_rss_kb: Option<u64>,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} queries ({} bp) in {} batches, {} rechecked into the insertion bucket, {} failed, {:.2}s",
            self.total_queries,
            self.total_bases,
            self.batches,
            self.insertion_bucket,
            self.failed_queries,
            self.wall_time_secs
        )?;
        if let Some(kb) = self.peak_rss_kb {
            write!(f, ", peak RSS {} kB", kb)?;
        }
        Ok(())
    }
}

/// VmHWM value (peak resident set, kB) from a /proc/self/status dump.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_hwm(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmHWM:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse().ok())
}

/// Peak resident set size of this process in kB.
#[cfg(target_os = "linux")]
fn peak_rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_hwm(&status)
}

#[cfg(not(target_os = "linux"))]
fn peak_rss_kb() -> Option<u64> {
    None
}

// ============================================================================
// PER-WORKER STATE
// ============================================================================

/// Output sinks owned by exactly one worker thread.
struct WorkerState {
    tid: usize,
    normal: SamWriter,
    insertions: SamWriter,
    vcf: Option<BufWriter<File>>,
}

impl WorkerState {
    fn create(tid: usize, layout: &WorkdirLayout, save_vcf: bool) -> Result<Self> {
        Ok(Self {
            tid,
            normal: SamWriter::create(&layout.normal_sam(tid))?,
            insertions: SamWriter::create(&layout.insertion_sam(tid))?,
            vcf: if save_vcf {
                Some(BufWriter::new(File::create(layout.vcf_fragment(tid))?))
            } else {
                None
            },
        })
    }

    fn finish(&mut self) {
        if let Err(e) = self.normal.flush() {
            log::error!("worker {}: failed to flush normal bucket: {}", self.tid, e);
        }
        if let Err(e) = self.insertions.flush() {
            log::error!("worker {}: failed to flush insertion bucket: {}", self.tid, e);
        }
        if let Some(vcf) = self.vcf.as_mut() {
            if let Err(e) = vcf.flush() {
                log::error!("worker {}: failed to flush VCF fragment: {}", self.tid, e);
            }
        }
    }
}

// ============================================================================
// DRIVER
// ============================================================================

/// List the query files: the input itself, or every FASTA inside an input
/// directory in lexicographic order.
fn query_files(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.exists() {
        return Err(MsaError::InputNotFound(input.to_path_buf()));
    }
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.extension()
                .map(|e| {
                    let e = e.to_string_lossy().to_lowercase();
                    e == "fasta" || e == "fa" || e == "fna"
                })
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(MsaError::InputNotFound(input.to_path_buf()));
    }
    Ok(files)
}

/// Copy the raw input into the workdir (kept for post-mortems and reruns).
fn copy_raw_input(files: &[PathBuf], layout: &WorkdirLayout) -> Result<()> {
    let raw = layout.raw_dir();
    std::fs::create_dir_all(&raw)?;
    for f in files {
        if let Some(name) = f.file_name() {
            std::fs::copy(f, raw.join(name))?;
        }
    }
    Ok(())
}

/// Run the full pipeline: index, parallel alignment, merge, optional VCF.
pub fn run(cfg: AlignConfig) -> Result<PipelineStats> {
    let start = Instant::now();
    let cfg = Arc::new(cfg);

    let files = query_files(&cfg.input)?;
    log::info!("input: {} file(s)", files.len());

    let layout = WorkdirLayout::new(cfg.workdir());
    std::fs::create_dir_all(layout.root())?;
    copy_raw_input(&files, &layout)?;

    let index = Arc::new(ReferenceIndex::build(&cfg)?);
    index.write_consensus_artifacts(&layout.consensus_fasta(), &layout.counts_json())?;
    log::info!(
        "consensus '{}' ({} bp) defines the output coordinate system",
        index.consensus.id,
        index.consensus.len()
    );

    let num_workers = cfg.threads.max(1);
    let mut stats = PipelineStats::default();
    let insertion_count = Arc::new(AtomicUsize::new(0));
    let failed_count = Arc::new(AtomicUsize::new(0));

    {
        let mut state_error: Option<MsaError> = None;
        let pool: WorkerPool<Option<WorkerState>> = WorkerPool::new(num_workers, |tid| {
            match WorkerState::create(tid, &layout, cfg.save_vcf) {
                Ok(state) => Some(state),
                Err(e) => {
                    state_error = Some(e);
                    None
                }
            }
        })
        .map_err(MsaError::Io)?;
        if let Some(e) = state_error {
            return Err(e);
        }

        let aligner = Arc::new(RefAligner::new(Arc::clone(&index), Arc::clone(&cfg)));

        for file in &files {
            let mut reader = open_record_stream(file)?;
            loop {
                let batch = reader.read_batch(cfg.batch_size)?;
                if batch.is_empty() {
                    break;
                }
                stats.batches += 1;
                stats.total_queries += batch.len();
                stats.total_bases += batch.iter().map(|r| r.len()).sum::<usize>();

                for (i, record) in batch.into_iter().enumerate() {
                    let tid = i % num_workers;
                    let aligner = Arc::clone(&aligner);
                    let insertion_count = Arc::clone(&insertion_count);
                    let failed_count = Arc::clone(&failed_count);
                    pool.enqueue(tid, move |state| {
                        let Some(state) = state.as_mut() else { return };
                        process_query(&aligner, record, state, &insertion_count, &failed_count);
                    });
                }
                log::info!("batch {} dispatched, total {}", stats.batches, stats.total_queries);
            }
        }

        pool.wait_for_all();
        for tid in 0..num_workers {
            pool.enqueue(tid, |state| {
                if let Some(state) = state.as_mut() {
                    state.finish();
                }
            });
        }
        pool.shutdown();
    }

    stats.insertion_bucket = insertion_count.load(Ordering::SeqCst);
    stats.failed_queries = failed_count.load(Ordering::SeqCst);

    merge::merge(&cfg, &index, &layout, num_workers)?;
    if cfg.save_vcf {
        merge::merge_vcf(&cfg, &layout, num_workers)?;
    }

    if !cfg.keep_workdir {
        if let Err(e) = std::fs::remove_dir_all(layout.root()) {
            log::warn!("failed to remove workdir {}: {}", layout.root().display(), e);
        }
    }

    stats.wall_time_secs = start.elapsed().as_secs_f64();
    stats.peak_rss_kb = peak_rss_kb();
    log::info!("completed: {}", stats);
    Ok(stats)
}

/// Align one query and write it to the worker's sinks. Failures are logged
/// and counted; the worker keeps consuming its queue.
fn process_query(
    aligner: &RefAligner,
    mut record: crate::io::SeqRecord,
    state: &mut WorkerState,
    insertion_count: &AtomicUsize,
    failed_count: &AtomicUsize,
) {
    use crate::alignment::cigar::cigar_to_string;
    use crate::ref_aligner::Bucket;

    record.seq.make_ascii_uppercase();
    let aligned = match aligner.align_one_query(&record) {
        Ok(a) => a,
        Err(e) => {
            log::error!("query {}: alignment failed: {}", record.id, e);
            failed_count.fetch_add(1, Ordering::SeqCst);
            return;
        }
    };

    let target = aligner.target_seq(aligned.target);
    let sam = SamRecord {
        qname: aligned.qname.clone(),
        rname: target.id.clone(),
        cigar: cigar_to_string(&aligned.cigar),
        seq: record.seq.clone(),
    };

    let sink = match aligned.bucket {
        Bucket::Normal => &mut state.normal,
        Bucket::Insertion => {
            insertion_count.fetch_add(1, Ordering::SeqCst);
            &mut state.insertions
        }
    };
    if let Err(e) = sink.write_record(&sam) {
        log::error!("query {}: dropped after write failure: {}", record.id, e);
        failed_count.fetch_add(1, Ordering::SeqCst);
        return;
    }

    if let Some(vcf) = state.vcf.as_mut() {
        for line in
            vcf_records_from_cigar(&target.id, &record.id, &target.seq, &record.seq, &aligned.cigar)
        {
            if let Err(e) = writeln!(vcf, "{}", line) {
                log::error!("query {}: VCF line dropped: {}", record.id, e);
            }
        }
    }
}
