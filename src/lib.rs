//! Training and querying of word2vec-style word embeddings.
//!
//! The trainer consumes a restartable stream of sentences, builds a
//! frequency-sorted vocabulary, assigns Huffman codes, and runs the
//! continuous-bag-of-words or skip-gram update rules (with hierarchical
//! softmax and/or negative sampling) across worker threads sharing the
//! weight matrices. The resulting [`Word2VecModel`] can be persisted and
//! queried for nearest neighbors and analogies through a [`Searcher`].
//!
//! With a single worker thread the training process is fully
//! deterministic, down to the pseudo-random sequence.

pub mod config;
pub mod corpus;
mod error;
pub mod huffman;
pub mod model;
pub mod search;
pub mod train;
pub mod vocab;

pub use config::{ModelType, TrainingConfig};
pub use corpus::{SentenceSource, TextCorpus, WordStream, SENTENCE_END};
pub use error::{Error, Result};
pub use model::Word2VecModel;
pub use search::{Analogy, Searcher};
pub use train::{CancelToken, ProgressListener, Stage, Word2VecTrainer};
pub use vocab::{Vocab, VocabWord};

/// Words longer than this many bytes are truncated.
pub const MAX_STRING: usize = 100;
/// Maximum number of word indices buffered per training sentence.
pub const MAX_SENTENCE_LENGTH: usize = 1000;
/// Upper bound on the length of a Huffman code.
pub const MAX_CODE_LENGTH: usize = 40;

pub const EXP_TABLE_SIZE: usize = 1000;
pub const MAX_EXP: real = 6.0;

/// Slots in the vocabulary's open-addressed index table.
/// At the 0.7 load-factor cap this allows 21M distinct words.
pub const VOCAB_HASH_SIZE: usize = 30_000_000;

/// Cells in the negative-sampling unigram table.
pub const UNIGRAM_TABLE_SIZE: usize = 100_000_000;

#[allow(non_camel_case_types)]
pub type real = f32; // Precision of float numbers

pub fn norm(v: &[real]) -> real {
    v.iter().copied().map(|e| e * e).sum::<real>().sqrt()
}

pub fn normalize(v: &mut [real]) {
    let len = norm(v);
    for e in v {
        *e /= len;
    }
}

pub fn dot(a: &[real], b: &[real]) -> real {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&a, &b)| a * b).sum()
}

/// The linear-congruential generator used everywhere randomness is needed:
/// weight initialization, window sizing, subsampling, and noise-word draws.
pub struct Rng(pub u64);

impl Rng {
    pub fn rand_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(25214903917).wrapping_add(11);
        self.0
    }

    /// Get a uniformly distributed random number in `0.0 .. 1.0`.
    pub fn rand_real(&mut self) -> real {
        (self.rand_u64() & 0xFFFF) as real / 65536.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rng_sequence_matches_seeded_recurrence() {
        let mut rng = Rng(1);
        let a = rng.rand_u64();
        let b = rng.rand_u64();
        assert_eq!(a, 1u64.wrapping_mul(25214903917).wrapping_add(11));
        assert_eq!(b, a.wrapping_mul(25214903917).wrapping_add(11));
    }

    #[test]
    fn rand_real_stays_in_unit_interval() {
        let mut rng = Rng(7);
        for _ in 0..1000 {
            let x = rng.rand_real();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn normalize_produces_unit_vectors() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }
}
