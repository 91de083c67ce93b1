//! The trained model and its on-disk formats.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::corpus::SENTENCE_END;
use crate::error::{Error, Result};
use crate::real;

/// A trained embedding: the vocabulary in index order (sentinel first) and
/// the input-side weight matrix, row-major. Two models are equal exactly
/// when these fields are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word2VecModel {
    pub layer_size: usize,
    pub vocab: Vec<String>,
    pub vectors: Vec<real>,
}

impl Word2VecModel {
    /// Structural invariants checked when a model crosses a trust boundary.
    pub fn validate(&self) -> Result<()> {
        if self.layer_size == 0 {
            return Err(Error::Model("layer size must be at least 1".into()));
        }
        if self.vocab.len() < 2 {
            return Err(Error::Model("no words".into()));
        }
        if self.vocab[0] != SENTENCE_END {
            return Err(Error::Model("end-of-sentence marker missing".into()));
        }
        if self.vectors.len() != self.vocab.len() * self.layer_size {
            return Err(Error::Model(format!(
                "length of vector array {} must be number of words {} times layer size {}",
                self.vectors.len(),
                self.vocab.len(),
                self.layer_size
            )));
        }
        Ok(())
    }

    /// The embedding row for word index `i`.
    pub fn vector(&self, i: usize) -> &[real] {
        &self.vectors[i * self.layer_size..][..self.layer_size]
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let f = BufWriter::new(File::create(path)?);
        bincode::serialize_into(f, self).map_err(|err| Error::Model(err.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let f = BufReader::new(File::open(path)?);
        let model: Word2VecModel =
            bincode::deserialize_from(f).map_err(|err| Error::Model(err.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    /// Writes vectors in the classic textual format: a `words size` header
    /// line, then one `word v1 v2 ...` line per vocabulary entry.
    pub fn write_text_vectors(&self, fo: &mut impl Write) -> Result<()> {
        writeln!(fo, "{} {}", self.vocab.len(), self.layer_size)?;
        for (a, word) in self.vocab.iter().enumerate() {
            write!(fo, "{} ", word)?;
            for v in self.vector(a) {
                write!(fo, "{} ", v)?;
            }
            writeln!(fo)?;
        }
        Ok(())
    }

    /// Same layout but with each row as raw little-endian floats.
    pub fn write_binary_vectors(&self, fo: &mut impl Write) -> Result<()> {
        writeln!(fo, "{} {}", self.vocab.len(), self.layer_size)?;
        for (a, word) in self.vocab.iter().enumerate() {
            write!(fo, "{} ", word)?;
            fo.write_all(bytemuck::cast_slice::<real, u8>(self.vector(a)))?;
            writeln!(fo)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Word2VecModel {
        Word2VecModel {
            layer_size: 2,
            vocab: vec!["</s>".into(), "a".into(), "b".into()],
            vectors: vec![0.0, 0.0, 1.0, 2.0, 3.0, 4.0],
        }
    }

    #[test]
    fn valid_model_passes_validation() {
        assert!(model().validate().is_ok());
    }

    #[test]
    fn missing_sentinel_is_rejected() {
        let mut m = model();
        m.vocab[0] = "the".into();
        assert!(matches!(m.validate(), Err(Error::Model(_))));
    }

    #[test]
    fn mismatched_vector_length_is_rejected() {
        let mut m = model();
        m.vectors.pop();
        assert!(matches!(m.validate(), Err(Error::Model(_))));
    }

    #[test]
    fn vector_returns_the_row() {
        let m = model();
        assert_eq!(m.vector(1), &[1.0, 2.0]);
        assert_eq!(m.vector(2), &[3.0, 4.0]);
    }

    #[test]
    fn text_export_has_header_and_one_line_per_word() {
        let mut out = Vec::new();
        model().write_text_vectors(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("3 2"));
        assert!(lines.next().unwrap().starts_with("</s> "));
        assert!(lines.next().unwrap().starts_with("a 1 2"));
    }
}
