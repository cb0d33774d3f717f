use clap::Parser;
use std::path::PathBuf;

use refmsa::config::{AlignConfig, EngineKind};
use refmsa::pipeline;

#[derive(Parser)]
#[command(name = "refmsa")]
#[command(
    about = "Reference-guided multiple sequence alignment for large collections of highly similar genomes",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Input FASTA file or a directory of FASTA files
    #[arg(value_name = "INPUT.FA|DIR")]
    input: PathBuf,

    /// Reference FASTA file
    #[arg(value_name = "REF.FA")]
    reference: PathBuf,

    /// Output prefix; writes <PREFIX>.fasta and optionally <PREFIX>.vcf
    #[arg(value_name = "PREFIX")]
    out_prefix: PathBuf,

    /// Number of worker threads
    #[arg(short = 't', long, value_name = "INT", default_value = "1")]
    threads: usize,

    /// Emit a VCF with SNP/INS/DEL records alongside the aligned FASTA
    #[arg(short = 's', long = "save-vcf")]
    save_vcf: bool,

    /// Alignment engine: wavefront, dp, or segmented
    #[arg(long, value_name = "ENGINE", default_value = "wavefront")]
    engine: String,

    /// k-mer size for sketches and minimizers
    #[arg(short = 'k', long, value_name = "INT", default_value = "21")]
    kmer_size: usize,

    /// Minimizer window size
    #[arg(short = 'w', long, value_name = "INT", default_value = "10")]
    window_size: usize,

    /// MinHash sketch size
    #[arg(long, value_name = "INT", default_value = "2000")]
    sketch_size: usize,

    /// Queries per streaming batch
    #[arg(long, value_name = "INT", default_value = "25600")]
    batch_size: usize,

    /// Keep insertion columns instead of trimming to the reference length
    #[arg(long)]
    keep_insertions: bool,

    /// Only the N longest reference records vote in the consensus (0 = all)
    #[arg(long, value_name = "INT", default_value = "0")]
    reference_limit: usize,

    /// External MSA command template; {input} and {output} are substituted
    #[arg(long, value_name = "CMD")]
    msa_cmd: Option<String>,

    /// Keep the intermediate workdir after a successful run
    #[arg(long)]
    keep_workdir: bool,

    /// Verbose level: 1=error, 2=warning, 3=message, 4+=debugging
    #[arg(short = 'v', long, value_name = "INT", default_value = "3")]
    verbosity: i32,
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbosity {
        v if v <= 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    let engine = match cli.engine.as_str() {
        "wavefront" | "wfa" => EngineKind::Wavefront,
        "dp" | "banded-dp" => EngineKind::BandedDp,
        "segmented" => EngineKind::Segmented,
        other => {
            log::error!("unknown engine '{}', expected wavefront, dp or segmented", other);
            std::process::exit(1);
        }
    };

    let mut threads = cli.threads;
    if threads < 1 {
        log::warn!("invalid thread count {}, using 1 thread", threads);
        threads = 1;
    }
    let max_threads = num_cpus::get() * 2;
    if threads > max_threads {
        log::warn!(
            "thread count {} exceeds recommended maximum {}, capping at {}",
            threads,
            max_threads,
            max_threads
        );
        threads = max_threads;
    }

    let mut cfg = AlignConfig::new(cli.input, cli.reference, cli.out_prefix);
    cfg.threads = threads;
    cfg.save_vcf = cli.save_vcf;
    cfg.engine = engine;
    cfg.kmer_size = cli.kmer_size;
    cfg.window_size = cli.window_size;
    cfg.sketch_size = cli.sketch_size;
    cfg.batch_size = cli.batch_size.max(1);
    cfg.keep_first_length = !cli.keep_insertions;
    cfg.reference_limit = cli.reference_limit;
    cfg.keep_workdir = cli.keep_workdir;
    if let Some(msa_cmd) = cli.msa_cmd {
        cfg.msa_command = msa_cmd;
    }

    log::info!("input      : {}", cfg.input.display());
    log::info!("reference  : {}", cfg.reference.display());
    log::info!("output     : {}", cfg.final_fasta_path().display());
    log::info!("threads    : {}", cfg.threads);
    log::info!("save VCF   : {}", if cfg.save_vcf { "yes" } else { "no" });

    if let Err(e) = pipeline::run(cfg) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
