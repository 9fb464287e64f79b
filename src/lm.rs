//! Language model interface plus an ARPA-format n-gram implementation.
//!
//! The decoder only depends on the [`LanguageModel`] trait; [`NgramLm`] is a
//! self-contained backend for the standard ARPA text format, storing
//! interned n-grams with backoff weights in log10 (the format's native
//! unit — the scorer converts).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};

/// Start-of-sentence token.
pub const START_TOKEN: &str = "<s>";
/// End-of-sentence token.
pub const END_TOKEN: &str = "</s>";
/// Unknown-word token.
pub const UNK_TOKEN: &str = "<unk>";

/// Native unit of the scores a language model reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmUnit {
    /// Log base 10, the ARPA convention.
    Log10,
    /// Natural log.
    Natural,
}

/// Capability set the scorer requires from an n-gram language model.
///
/// Implementations are shared read-only across concurrent decodes.
pub trait LanguageModel: Send + Sync {
    /// Maximum n-gram order.
    fn order(&self) -> usize;
    /// Unit of the values `score` returns.
    fn unit(&self) -> LmUnit;
    /// Whether `word` is in the model vocabulary.
    fn contains(&self, word: &str) -> bool;
    /// Conditional log-probability of the last word given the preceding
    /// ones, in the model's native unit.
    fn score(&self, words: &[String]) -> f64;
    /// Enumerated vocabulary.
    fn vocabulary(&self) -> &[String];
}

/// N-gram model backed by an ARPA file.
#[derive(Debug, Clone)]
pub struct NgramLm {
    order: usize,
    vocab: HashMap<String, u32>,
    words: Vec<String>,
    /// Interned n-gram → (log10 probability, log10 backoff weight).
    ngrams: HashMap<Vec<u32>, (f64, f64)>,
}

impl NgramLm {
    /// Reads a model from an ARPA file on disk.
    pub fn from_arpa<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "cannot open language model {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parses ARPA text from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lm = Self {
            order: 0,
            vocab: HashMap::new(),
            words: Vec::new(),
            ngrams: HashMap::new(),
        };
        let mut current_order = 0usize;

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line == "\\data\\" {
                continue;
            }
            if let Some(rest) = line.strip_prefix("ngram ") {
                if let Some((order, _count)) = rest.split_once('=') {
                    let order: usize = order.trim().parse().map_err(|_| {
                        Error::Config(format!("bad ngram header at line {}", lineno + 1))
                    })?;
                    lm.order = lm.order.max(order);
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix('\\') {
                if line == "\\end\\" {
                    break;
                }
                if let Some(order) = rest.strip_suffix("-grams:") {
                    current_order = order.parse().map_err(|_| {
                        Error::Config(format!("bad section header at line {}", lineno + 1))
                    })?;
                    continue;
                }
            }
            if current_order == 0 {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < current_order + 1 {
                return Err(Error::Config(format!(
                    "truncated {current_order}-gram at line {}",
                    lineno + 1
                )));
            }
            let log_prob: f64 = parts[0].parse().map_err(|_| {
                Error::Config(format!("bad log-probability at line {}", lineno + 1))
            })?;
            let backoff: f64 = if parts.len() > current_order + 1 {
                parts[current_order + 1].parse().map_err(|_| {
                    Error::Config(format!("bad backoff weight at line {}", lineno + 1))
                })?
            } else {
                0.0
            };

            let ids: Vec<u32> = parts[1..=current_order]
                .iter()
                .map(|word| lm.intern(word))
                .collect();
            lm.ngrams.insert(ids, (log_prob, backoff));
        }

        if lm.order == 0 || lm.ngrams.is_empty() {
            return Err(Error::Config("ARPA input has no n-gram sections".into()));
        }
        Ok(lm)
    }

    fn intern(&mut self, word: &str) -> u32 {
        match self.vocab.get(word) {
            Some(&id) => id,
            None => {
                let id = self.words.len() as u32;
                self.vocab.insert(word.to_string(), id);
                self.words.push(word.to_string());
                id
            }
        }
    }

    /// Backoff lookup: the longest matching suffix wins, shorter matches are
    /// discounted by the backoff weights of the contexts skipped over.
    fn score_ids(&self, ngram: &[u32]) -> f64 {
        if ngram.is_empty() {
            return 0.0;
        }
        if let Some(&(log_prob, _)) = self.ngrams.get(ngram) {
            return log_prob;
        }
        if ngram.len() > 1 {
            let context = &ngram[..ngram.len() - 1];
            let backoff = self.ngrams.get(context).map(|&(_, b)| b).unwrap_or(0.0);
            return backoff + self.score_ids(&ngram[1..]);
        }
        // Unseen unigram: uniform over the vocabulary.
        -((self.words.len().max(2)) as f64).log10()
    }
}

impl LanguageModel for NgramLm {
    fn order(&self) -> usize {
        self.order
    }

    fn unit(&self) -> LmUnit {
        LmUnit::Log10
    }

    fn contains(&self, word: &str) -> bool {
        self.vocab.contains_key(word)
    }

    fn score(&self, words: &[String]) -> f64 {
        let mut ids = Vec::with_capacity(words.len());
        for word in words {
            match self.vocab.get(word.as_str()) {
                Some(&id) => ids.push(id),
                // Unknown context words cannot match any stored n-gram, so
                // this degrades to the unigram fallback for the last word.
                None => match self.vocab.get(UNK_TOKEN) {
                    Some(&id) => ids.push(id),
                    None => return -((self.words.len().max(2)) as f64).log10(),
                },
            }
        }
        let start = ids.len().saturating_sub(self.order);
        self.score_ids(&ids[start..])
    }

    fn vocabulary(&self) -> &[String] {
        &self.words
    }
}
