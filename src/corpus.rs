//! Sentence sources and the word stream consumed by the trainer.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::vec;

use crate::MAX_STRING;

/// Token marking a sentence boundary. Always vocabulary index 0.
pub const SENTENCE_END: &str = "</s>";

pub type SentenceIter<'a> = Box<dyn Iterator<Item = io::Result<Vec<String>>> + 'a>;

/// A restartable stream of sentences, each an ordered sequence of words.
///
/// Restartability matters: every worker re-opens the stream at the start of
/// each training pass. One-shot streams must be materialized (for example
/// into a `Vec<Vec<String>>`) before training.
pub trait SentenceSource: Sync {
    fn sentences(&self) -> io::Result<SentenceIter<'_>>;
}

impl SentenceSource for Vec<Vec<String>> {
    fn sentences(&self) -> io::Result<SentenceIter<'_>> {
        Ok(Box::new(self.iter().map(|sentence| Ok(sentence.clone()))))
    }
}

/// A whitespace-tokenized text file; each line is one sentence.
pub struct TextCorpus {
    path: PathBuf,
}

impl TextCorpus {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TextCorpus { path: path.into() }
    }
}

impl SentenceSource for TextCorpus {
    fn sentences(&self) -> io::Result<SentenceIter<'_>> {
        let reader = BufReader::new(File::open(&self.path)?);
        Ok(Box::new(reader.lines().map(|line| {
            line.map(|l| l.split_whitespace().map(str::to_string).collect())
        })))
    }
}

/// Flattens a sentence stream into single words, yielding [`SENTENCE_END`]
/// once after each sentence. Empty words are skipped and words longer than
/// [`MAX_STRING`] bytes are truncated.
pub struct WordStream<'a> {
    sentences: SentenceIter<'a>,
    current: vec::IntoIter<String>,
    end_pending: bool,
}

impl<'a> WordStream<'a> {
    pub fn new(sentences: SentenceIter<'a>) -> Self {
        WordStream {
            sentences,
            current: Vec::new().into_iter(),
            end_pending: false,
        }
    }

    pub fn open(source: &'a dyn SentenceSource) -> io::Result<Self> {
        Ok(WordStream::new(source.sentences()?))
    }
}

impl Iterator for WordStream<'_> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<io::Result<String>> {
        loop {
            if let Some(word) = self.current.next() {
                if word.is_empty() {
                    continue;
                }
                return Some(Ok(truncate_word(word)));
            }
            if self.end_pending {
                self.end_pending = false;
                return Some(Ok(SENTENCE_END.to_string()));
            }
            match self.sentences.next() {
                None => return None,
                Some(Err(err)) => return Some(Err(err)),
                Some(Ok(words)) => {
                    self.current = words.into_iter();
                    self.end_pending = true;
                }
            }
        }
    }
}

fn truncate_word(mut word: String) -> String {
    if word.len() > MAX_STRING {
        let mut end = MAX_STRING;
        while !word.is_char_boundary(end) {
            end -= 1;
        }
        word.truncate(end);
    }
    word
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|s| s.iter().map(|w| w.to_string()).collect())
            .collect()
    }

    fn collect_words(source: &dyn SentenceSource) -> Vec<String> {
        WordStream::open(source)
            .unwrap()
            .map(|w| w.unwrap())
            .collect()
    }

    #[test]
    fn yields_sentinel_after_every_sentence() {
        let corpus = sentences(&[&["the", "cat"], &["sat"]]);
        assert_eq!(
            collect_words(&corpus),
            vec!["the", "cat", "</s>", "sat", "</s>"]
        );
    }

    #[test]
    fn empty_sentence_still_marks_a_boundary() {
        let corpus = sentences(&[&[], &["dog"]]);
        assert_eq!(collect_words(&corpus), vec!["</s>", "dog", "</s>"]);
    }

    #[test]
    fn empty_words_are_dropped() {
        let corpus = sentences(&[&["a", "", "b"]]);
        assert_eq!(collect_words(&corpus), vec!["a", "b", "</s>"]);
    }

    #[test]
    fn overlong_words_are_truncated_to_max_string_bytes() {
        let long = "x".repeat(MAX_STRING + 37);
        let corpus = vec![vec![long]];
        let words = collect_words(&corpus);
        assert_eq!(words[0].len(), MAX_STRING);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 50 two-byte characters, then one more straddling the limit.
        let long = "é".repeat(51);
        let corpus = vec![vec![long]];
        let words = collect_words(&corpus);
        assert_eq!(words[0], "é".repeat(50));
    }

    #[test]
    fn stream_is_restartable_from_the_source() {
        let corpus = sentences(&[&["one", "two"]]);
        let first = collect_words(&corpus);
        let second = collect_words(&corpus);
        assert_eq!(first, second);
    }
}
