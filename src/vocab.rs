//! Frequency vocabulary backed by an open-addressed index table.

use std::cmp::Reverse;
use std::ops::Index;
use std::slice;

use log::{debug, info};

use crate::corpus::{SentenceSource, WordStream, SENTENCE_END};
use crate::error::Result;
use crate::{MAX_CODE_LENGTH, VOCAB_HASH_SIZE};

/// A word in the training vocabulary.
///
/// `code` and `point` are written once by the Huffman coder: `code` is the
/// word's bit-code and `point` the indices of the internal tree nodes
/// addressed while emitting it.
#[derive(Debug, Clone)]
pub struct VocabWord {
    pub word: String,
    pub cn: u64,
    pub code: Vec<u8>,
    pub point: Vec<u32>,
}

/// Word-to-index table with open addressing and linear probing.
///
/// The index table is a flat pre-allocated array rather than a general hash
/// map: the load-factor policy drives [`Vocab::reduce`], and entry order
/// (insertion order until [`Vocab::finalize`] sorts by descending count)
/// is observable through word indices.
pub struct Vocab {
    words: Vec<VocabWord>,
    hash: Vec<i32>,
    min_reduce: u64,
    /// Total count over all retained words, including sentence boundaries.
    pub train_words: u64,
}

/// Multiplicative string hash reduced into the index table.
///
/// The accumulator wraps in 64 bits; the final reduction is unsigned, so
/// overflow can never produce a negative slot.
pub fn word_hash(word: &str) -> usize {
    let mut hash: u64 = 0;
    for &b in word.as_bytes() {
        hash = hash.wrapping_mul(257).wrapping_add(b as u64);
    }
    (hash % VOCAB_HASH_SIZE as u64) as usize
}

impl Vocab {
    pub fn new() -> Self {
        Vocab {
            words: Vec::with_capacity(1000),
            hash: vec![-1; VOCAB_HASH_SIZE],
            min_reduce: 1,
            train_words: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, VocabWord> {
        self.words.iter()
    }

    pub(crate) fn words_mut(&mut self) -> &mut [VocabWord] {
        &mut self.words
    }

    /// Returns the position of a word, or `None` if it is unknown.
    pub fn search(&self, word: &str) -> Option<usize> {
        let mut h = word_hash(word);
        loop {
            match self.hash[h] {
                -1 => return None,
                i => {
                    let i = i as usize;
                    if self.words[i].word == word {
                        return Some(i);
                    }
                }
            }
            h = (h + 1) % VOCAB_HASH_SIZE;
        }
    }

    /// Appends a word with count 0 and returns its index.
    pub fn add_word(&mut self, word: String) -> usize {
        let n = self.words.len();
        let mut h = word_hash(&word);
        while self.hash[h] != -1 {
            h = (h + 1) % VOCAB_HASH_SIZE;
        }
        self.hash[h] = n as i32;
        self.words.push(VocabWord {
            word,
            cn: 0,
            code: Vec::new(),
            point: Vec::new(),
        });
        n
    }

    fn rebuild_hash(&mut self) {
        self.hash.fill(-1);
        for (i, vw) in self.words.iter().enumerate() {
            let mut h = word_hash(&vw.word);
            while self.hash[h] != -1 {
                h = (h + 1) % VOCAB_HASH_SIZE;
            }
            self.hash[h] = i as i32;
        }
    }

    /// Scans the corpus once, counting every word. The sentinel is inserted
    /// first so sentence boundaries land at index 0.
    pub fn learn_from_corpus(&mut self, source: &dyn SentenceSource) -> Result<()> {
        self.words.clear();
        self.hash.fill(-1);
        self.train_words = 0;
        self.add_word(SENTENCE_END.to_string());

        for word in WordStream::open(source)? {
            let word = word?;
            self.train_words += 1;
            if self.train_words % 100_000 == 0 {
                debug!("{}K words scanned", self.train_words / 1000);
            }
            match self.search(&word) {
                Some(i) => self.words[i].cn += 1,
                None => {
                    let i = self.add_word(word);
                    self.words[i].cn = 1;
                }
            }
            if self.words.len() as f64 > VOCAB_HASH_SIZE as f64 * 0.7 {
                self.reduce();
            }
        }
        info!(
            "learned vocabulary: {} words, {} tokens",
            self.words.len(),
            self.train_words
        );
        Ok(())
    }

    /// Builds the vocabulary from an externally supplied word→count
    /// multiset instead of scanning a corpus. Counts are taken verbatim;
    /// the sentinel still occupies index 0.
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (String, u64)>,
    {
        let mut vocab = Vocab::new();
        vocab.add_word(SENTENCE_END.to_string());
        for (word, cn) in counts {
            match vocab.search(&word) {
                Some(i) => vocab.words[i].cn = cn,
                None => {
                    let i = vocab.add_word(word);
                    vocab.words[i].cn = cn;
                }
            }
        }
        vocab
    }

    /// Drops every non-sentinel word whose count is at most `min_reduce`,
    /// compacts the survivors, and raises the bar for the next call.
    pub fn reduce(&mut self) {
        let limit = self.min_reduce;
        let mut idx = 0;
        self.words.retain(|vw| {
            let keep = idx == 0 || vw.cn > limit;
            idx += 1;
            keep
        });
        self.rebuild_hash();
        self.min_reduce += 1;
        debug!(
            "reduced vocabulary to {} words (count > {})",
            self.words.len(),
            limit
        );
    }

    /// Sorts by descending count (sentinel pinned at index 0), drops words
    /// rarer than `min_count`, recomputes `train_words`, and reserves the
    /// per-word code storage.
    pub fn finalize(&mut self, min_count: u64) {
        if self.words.is_empty() {
            return;
        }
        self.words[1..].sort_by_key(|vw| Reverse(vw.cn));

        let mut first = true;
        self.words.retain(|vw| {
            let keep = first || vw.cn >= min_count;
            first = false;
            keep
        });
        self.rebuild_hash();
        self.train_words = self.words.iter().map(|vw| vw.cn).sum();

        for vw in &mut self.words {
            vw.code.reserve(MAX_CODE_LENGTH);
            vw.point.reserve(MAX_CODE_LENGTH);
        }
    }
}

impl Default for Vocab {
    fn default() -> Self {
        Vocab::new()
    }
}

impl Index<usize> for Vocab {
    type Output = VocabWord;

    fn index(&self, i: usize) -> &VocabWord {
        &self.words[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(raw: &[&str]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|s| s.split(' ').map(str::to_string).collect())
            .collect()
    }

    fn learned(raw: &[&str]) -> Vocab {
        let source = corpus(raw);
        let mut vocab = Vocab::new();
        vocab.learn_from_corpus(&source).unwrap();
        vocab
    }

    #[test]
    fn sentinel_is_first_and_counts_sentences() {
        let vocab = learned(&["a b", "a"]);
        assert_eq!(vocab[0].word, SENTENCE_END);
        assert_eq!(vocab[0].cn, 2);
        assert_eq!(vocab[vocab.search("a").unwrap()].cn, 2);
        assert_eq!(vocab[vocab.search("b").unwrap()].cn, 1);
    }

    #[test]
    fn train_words_counts_every_token_including_boundaries() {
        let vocab = learned(&["a b", "a"]);
        // 3 words + 2 sentence ends.
        assert_eq!(vocab.train_words, 5);
    }

    #[test]
    fn finalize_sorts_by_descending_count_with_sentinel_pinned() {
        let mut vocab = learned(&["c", "b b b", "a a", "b"]);
        vocab.finalize(1);
        assert_eq!(vocab[0].word, SENTENCE_END);
        for i in 2..vocab.len() {
            assert!(vocab[i - 1].cn >= vocab[i].cn);
        }
        assert_eq!(vocab[1].word, "b");
    }

    #[test]
    fn finalize_drops_rare_words_and_rehashes() {
        let mut vocab = learned(&["a a a", "b", "c c"]);
        vocab.finalize(2);
        assert!(vocab.search("b").is_none());
        assert_eq!(vocab.search("a"), Some(1));
        assert_eq!(vocab.search("c"), Some(2));
        // The word→index map is a bijection over the surviving entries.
        for (i, vw) in vocab.iter().enumerate() {
            assert_eq!(vocab.search(&vw.word), Some(i));
        }
    }

    #[test]
    fn finalize_recomputes_train_words_over_survivors() {
        let mut vocab = learned(&["a a a", "b", "c c"]);
        vocab.finalize(2);
        // 3 sentence ends + 3 a's + 2 c's.
        assert_eq!(vocab.train_words, 8);
    }

    #[test]
    fn reduce_drops_low_counts_and_raises_the_bar() {
        let mut vocab = learned(&["a a a", "b", "c c"]);
        vocab.reduce();
        assert!(vocab.search("b").is_none());
        assert!(vocab.search("a").is_some());
        assert!(vocab.search("c").is_some());
        // Second reduce drops counts <= 2.
        vocab.reduce();
        assert!(vocab.search("c").is_none());
        assert!(vocab.search("a").is_some());
        // The sentinel survives regardless of its count.
        assert_eq!(vocab[0].word, SENTENCE_END);
    }

    #[test]
    fn from_counts_inserts_verbatim_with_sentinel_first() {
        let mut vocab = Vocab::from_counts(vec![
            ("x".to_string(), 7),
            ("y".to_string(), 3),
        ]);
        assert_eq!(vocab[0].word, SENTENCE_END);
        vocab.finalize(1);
        assert_eq!(vocab[vocab.search("x").unwrap()].cn, 7);
        assert_eq!(vocab[vocab.search("y").unwrap()].cn, 3);
        assert_eq!(vocab.train_words, 10);
    }

    #[test]
    fn hash_is_stable_and_in_range() {
        for word in ["a", "anarchism", "ünïcodé", ""] {
            let h = word_hash(word);
            assert!(h < VOCAB_HASH_SIZE);
            assert_eq!(h, word_hash(word));
        }
    }
}
