//! Error types for the refmsa library.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MsaError>;

/// Errors that can occur during indexing, alignment and merging.
#[derive(Error, Debug)]
pub enum MsaError {
    /// Input file or directory not found
    #[error("input not found: {0}")]
    InputNotFound(PathBuf),

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unparseable FASTA/FASTQ record
    #[error("failed to parse sequence record: {0}")]
    SeqParse(String),

    /// Two sketches built with different k were compared
    #[error("mismatched sketch k: {a} vs {b}")]
    SketchKMismatch { a: usize, b: usize },

    /// CIGAR run length does not fit the 28-bit field
    #[error("CIGAR length {0} exceeds 28-bit limit")]
    CigarLenOverflow(u32),

    /// Unknown CIGAR operation character
    #[error("unknown CIGAR operation '{0}'")]
    UnknownCigarOp(char),

    /// Malformed CIGAR string or packed unit
    #[error("failed to parse CIGAR: {0}")]
    CigarParse(String),

    /// A CIGAR whose consumed length disagrees with the sequence it describes
    #[error("CIGAR consumes {actual} bases, sequence has {expected}")]
    CigarLengthMismatch { expected: u64, actual: u64 },

    /// Malformed SAM record in an intermediate file
    #[error("failed to parse SAM record: {0}")]
    SamParse(String),

    /// The reference FASTA produced no usable records
    #[error("reference set is empty: {0}")]
    EmptyReference(PathBuf),

    /// External MSA tool returned nonzero or produced no output
    #[error("external MSA tool failed: {0}")]
    ExternalMsa(String),

    /// An aligned output row disagrees with the consensus width
    #[error("aligned row for '{id}' has {actual} columns, expected {expected}")]
    ColumnMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },

    /// UTF-8 conversion error on an identifier
    #[error("identifier is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Invalid configuration parameter
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
