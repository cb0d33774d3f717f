//! Bottom-k MinHash sketches and sketch-level similarity estimates.
//!
//! A sketch is the sorted, duplicate-free list of the smallest `sketch_size`
//! k-mer hashes of a sequence. Jaccard between two sketches estimates the
//! Jaccard of the full k-mer sets; `mash_distance` and `ani` are the usual
//! Mash transformations of that estimate.

use crate::error::MsaError;
use crate::hash::{mix64, KmerCodes};

/// MinHash sketch of one sequence.
///
/// `hashes` is sorted ascending, duplicate-free, and holds at most
/// `sketch_size` entries. Sketches built with different `k` are incomparable.
#[derive(Debug, Clone, Default)]
pub struct Sketch {
    pub k: usize,
    pub hashes: Vec<u64>,
}

impl Sketch {
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }
}

/// Build the bottom-k sketch of `seq`.
///
/// Walks every valid k-mer (runs containing non-ACGT bases contribute
/// nothing), hashes `fwd` (non-canonical) or `min(fwd, rev)` (canonical)
/// through the seeded mixer, then sorts, deduplicates and truncates to
/// `sketch_size`. `k == 0` or `k > 31` yields an empty sketch.
pub fn sketch_from_sequence(
    seq: &[u8],
    k: usize,
    sketch_size: usize,
    canonical: bool,
    seed: u64,
) -> Sketch {
    let mut sk = Sketch {
        k,
        hashes: Vec::new(),
    };
    if k == 0 || k > 31 || sketch_size == 0 || seq.len() < k {
        return sk;
    }

    sk.hashes.reserve(seq.len() - k + 1);
    let mut codes = KmerCodes::new(k);
    for &b in seq {
        if !codes.push(b) {
            continue;
        }
        let code = if canonical {
            codes.fwd().min(codes.rev())
        } else {
            codes.fwd()
        };
        sk.hashes.push(mix64(code ^ seed));
    }

    sk.hashes.sort_unstable();
    sk.hashes.dedup();
    sk.hashes.truncate(sketch_size);
    sk
}

/// Size of the intersection of two sorted, duplicate-free hash lists.
fn intersection_size(a: &[u64], b: &[u64]) -> usize {
    let (mut i, mut j, mut inter) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            inter += 1;
            i += 1;
            j += 1;
        } else if a[i] < b[j] {
            i += 1;
        } else {
            j += 1;
        }
    }
    inter
}

/// Jaccard estimate between two sketches.
///
/// Two empty sketches compare equal (1.0); one empty sketch yields 0.0.
/// Mismatched `k` is a contract violation and surfaces as an error.
pub fn jaccard(a: &Sketch, b: &Sketch) -> Result<f64, MsaError> {
    if a.k != b.k {
        return Err(MsaError::SketchKMismatch { a: a.k, b: b.k });
    }
    if a.hashes.is_empty() && b.hashes.is_empty() {
        return Ok(1.0);
    }
    if a.hashes.is_empty() || b.hashes.is_empty() {
        return Ok(0.0);
    }
    let inter = intersection_size(&a.hashes, &b.hashes);
    let union = a.hashes.len() + b.hashes.len() - inter;
    Ok(inter as f64 / union as f64)
}

/// Mash distance derived from a Jaccard estimate: `-ln(2j/(1+j))/k`.
pub fn mash_distance(j: f64, k: usize) -> f64 {
    if k == 0 || j <= 0.0 {
        return f64::INFINITY;
    }
    if j >= 1.0 {
        return 0.0;
    }
    let x = (2.0 * j) / (1.0 + j);
    -x.ln() / k as f64
}

/// Average nucleotide identity derived from a Jaccard estimate:
/// `(2j/(1+j))^(1/k)`, clamped to [0,1].
pub fn ani(j: f64, k: usize) -> f64 {
    if k == 0 || j <= 0.0 {
        return 0.0;
    }
    if j >= 1.0 {
        return 1.0;
    }
    let x = (2.0 * j) / (1.0 + j);
    x.powf(1.0 / k as f64).clamp(0.0, 1.0)
}
