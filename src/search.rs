//! Cosine-similarity search over a trained embedding.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use ordered_float::OrderedFloat;

use crate::error::{Error, Result};
use crate::model::Word2VecModel;
use crate::{dot, normalize, real};

/// Nearest-neighbor queries against an L2-normalized snapshot of the
/// embedding. Construction copies and normalizes every row once; the
/// searcher is immutable afterwards.
pub struct Searcher {
    layer_size: usize,
    words: Vec<String>,
    index: HashMap<String, usize>,
    normalized: Vec<real>,
}

impl Searcher {
    pub fn new(model: &Word2VecModel) -> Self {
        let mut normalized = model.vectors.clone();
        for row in normalized.chunks_mut(model.layer_size) {
            normalize(row);
        }
        let index = model
            .vocab
            .iter()
            .enumerate()
            .map(|(i, word)| (word.clone(), i))
            .collect();
        Searcher {
            layer_size: model.layer_size,
            words: model.vocab.clone(),
            index,
            normalized,
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.index.contains_key(word)
    }

    fn row(&self, i: usize) -> &[real] {
        &self.normalized[i * self.layer_size..][..self.layer_size]
    }

    fn vector(&self, word: &str) -> Result<&[real]> {
        match self.index.get(word) {
            Some(&i) => Ok(self.row(i)),
            None => Err(Error::UnknownWord(word.to_string())),
        }
    }

    /// The normalized vector for `word`.
    pub fn raw_vector(&self, word: &str) -> Result<Vec<real>> {
        Ok(self.vector(word)?.to_vec())
    }

    /// Cosine similarity of two words, in `[-1, 1]`.
    pub fn cosine_distance(&self, w1: &str, w2: &str) -> Result<real> {
        Ok(dot(self.vector(w1)?, self.vector(w2)?))
    }

    /// The `k` words most similar to `word`, best first, excluding `word`
    /// itself.
    pub fn top_matches(&self, word: &str, k: usize) -> Result<Vec<(String, real)>> {
        let vec = self.vector(word)?.to_vec();
        let mut ignored = HashSet::new();
        ignored.insert(word.to_string());
        Ok(self.top_matches_from_vector(&vec, k, &ignored))
    }

    /// The `k` vocabulary entries with the highest dot product against an
    /// explicit query vector, skipping `ignored` words. Ties keep
    /// vocabulary order.
    pub fn top_matches_from_vector(
        &self,
        vec: &[real],
        k: usize,
        ignored: &HashSet<String>,
    ) -> Vec<(String, real)> {
        let mut best: Vec<(usize, real)> = (0..self.words.len())
            .filter(|&i| !ignored.contains(self.words[i].as_str()))
            .map(|i| (i, dot(vec, self.row(i))))
            .collect();
        best.sort_by_key(|&(_, score)| Reverse(OrderedFloat(score)));
        best.truncate(k);
        best.into_iter()
            .map(|(i, score)| (self.words[i].clone(), score))
            .collect()
    }

    /// Captures the offset from `w1` to `w2`, applicable to other words:
    /// `analogy("man", "woman")?.top("king", k)` ranks by closeness to
    /// `king - (man - woman)`.
    pub fn analogy(&self, w1: &str, w2: &str) -> Result<Analogy<'_>> {
        let v1 = self.vector(w1)?;
        let v2 = self.vector(w2)?;
        let diff = v1.iter().zip(v2.iter()).map(|(a, b)| a - b).collect();
        Ok(Analogy {
            searcher: self,
            diff,
        })
    }
}

/// A semantic offset produced by [`Searcher::analogy`].
pub struct Analogy<'a> {
    searcher: &'a Searcher,
    diff: Vec<real>,
}

impl Analogy<'_> {
    pub fn top(&self, word: &str, k: usize) -> Result<Vec<(String, real)>> {
        let v = self.searcher.vector(word)?;
        let target: Vec<real> = v.iter().zip(self.diff.iter()).map(|(a, b)| a - b).collect();
        let mut ignored = HashSet::new();
        ignored.insert(word.to_string());
        Ok(self.searcher.top_matches_from_vector(&target, k, &ignored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::norm;

    fn model() -> Word2VecModel {
        Word2VecModel {
            layer_size: 2,
            vocab: vec![
                "</s>".into(),
                "east".into(),
                "west".into(),
                "north".into(),
            ],
            vectors: vec![
                0.1, 0.1, // </s>
                2.0, 0.0, // east
                -3.0, 0.0, // west
                0.0, 5.0, // north
            ],
        }
    }

    #[test]
    fn rows_are_normalized() {
        let searcher = Searcher::new(&model());
        for word in ["</s>", "east", "west", "north"] {
            let v = searcher.raw_vector(word).unwrap();
            assert!((norm(&v) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn unknown_word_is_reported() {
        let searcher = Searcher::new(&model());
        assert!(!searcher.contains("south"));
        match searcher.raw_vector("south") {
            Err(Error::UnknownWord(w)) => assert_eq!(w, "south"),
            other => panic!("expected UnknownWord, got {other:?}"),
        }
    }

    #[test]
    fn top_match_excludes_the_query_word() {
        let searcher = Searcher::new(&model());
        let matches = searcher.top_matches("east", 3).unwrap();
        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|(w, _)| w != "east"));
        // Scores come back best first.
        for pair in matches.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn self_similarity_is_one() {
        let searcher = Searcher::new(&model());
        let d = searcher.cosine_distance("east", "east").unwrap();
        assert!((d - 1.0).abs() < 1e-5);
    }

    #[test]
    fn opposite_vectors_have_similarity_minus_one() {
        let searcher = Searcher::new(&model());
        let d = searcher.cosine_distance("east", "west").unwrap();
        assert!((d + 1.0).abs() < 1e-5);
    }

    #[test]
    fn top_matches_from_vector_finds_the_matching_row() {
        let searcher = Searcher::new(&model());
        let v = searcher.raw_vector("north").unwrap();
        let matches = searcher.top_matches_from_vector(&v, 1, &HashSet::new());
        assert_eq!(matches[0].0, "north");
        assert!((matches[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn null_analogy_reduces_to_plain_top_matches() {
        let searcher = Searcher::new(&model());
        let via_analogy = searcher.analogy("east", "east").unwrap().top("west", 3).unwrap();
        let direct = searcher.top_matches("west", 3).unwrap();
        assert_eq!(via_analogy, direct);
    }
}
