// src/defaults.rs

// Seed & sketch constants
pub const KMER_SIZE: usize = 21;
pub const WINDOW_SIZE: usize = 10;
pub const SKETCH_SIZE: usize = 2000;
pub const SKETCH_SEED: u64 = 42;
pub const CANONICAL_KMERS: bool = false;

// Pipeline constants
pub const BATCH_SIZE: usize = 25_600;
pub const THREADS: usize = 1;

// Consensus constants
pub const REFERENCE_LIMIT: usize = 0;

// Merger constants
pub const KEEP_FIRST_LENGTH: bool = true;
pub const MSA_COMMAND: &str = "mafft --auto {input}";

// Other constants
pub const VERBOSITY: i32 = 3;
