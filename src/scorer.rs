//! External scorer: folds language model evidence into beam scores.
//!
//! The scorer owns the LM weights (`alpha`, `beta`), knows which alphabet
//! labels terminate a word, assembles n-gram queries by walking the prefix
//! trie, and — in word mode — compiles the lexicon that constrains
//! mid-word extensions to the LM vocabulary.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::lexicon::{Lexicon, TrieLexicon};
use crate::lm::{LanguageModel, LmUnit, END_TOKEN, START_TOKEN, UNK_TOKEN};
use crate::math::LOG_10;
use crate::trie::{NodeId, PathTrie, ROOT_LABEL};

/// Score assigned when any queried word is missing from the LM vocabulary.
/// Already in natural log; never unit-converted.
pub const OOV_SCORE: f64 = -1000.0;

/// Whether LM vocabulary entries are single characters or whole words.
///
/// Character-based models disable the lexicon and the word-boundary LM
/// bonus entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    Character,
    Word,
}

/// Language model scorer with an optional compiled lexicon.
pub struct Scorer {
    /// Language model weight.
    pub alpha: f64,
    /// Word insertion weight.
    pub beta: f64,
    lm: Arc<dyn LanguageModel>,
    lexicon: Option<Arc<dyn Lexicon>>,
    char_list: Vec<String>,
    boundaries: HashSet<i32>,
    mode: ScoringMode,
}

impl Scorer {
    /// Builds a scorer over `lm` for the given alphabet.
    ///
    /// `tokenization_symbols` name the alphabet tokens that end a word
    /// (spaces, punctuation); every one of them must be present in
    /// `char_list` or setup fails. When `mode` is `None` it is inferred
    /// from the vocabulary: if every non-special entry encodes to at most
    /// five bytes the model is assumed character-based. In word mode the
    /// lexicon is compiled from the LM vocabulary.
    pub fn new(
        alpha: f64,
        beta: f64,
        lm: Arc<dyn LanguageModel>,
        char_list: &[String],
        tokenization_symbols: &[String],
        mode: Option<ScoringMode>,
    ) -> Result<Self> {
        let mut char_map: HashMap<String, i32> = HashMap::new();
        for (i, token) in char_list.iter().enumerate() {
            char_map.insert(token.clone(), i as i32);
        }

        let mut boundaries = HashSet::new();
        for symbol in tokenization_symbols {
            match char_map.get(symbol) {
                Some(&label) => {
                    boundaries.insert(label);
                }
                None => {
                    return Err(Error::Config(format!(
                        "tokenization symbol {symbol:?} is not in the alphabet"
                    )))
                }
            }
        }

        let mode = mode.unwrap_or_else(|| detect_mode(lm.vocabulary()));
        let lexicon = match mode {
            ScoringMode::Character => None,
            ScoringMode::Word => {
                let words = lm
                    .vocabulary()
                    .iter()
                    .filter(|w| !is_special(w))
                    .map(String::as_str);
                let lex = TrieLexicon::build(words, &char_map);
                debug!(
                    words = lex.num_words(),
                    states = lex.num_states(),
                    "compiled lexicon from language model vocabulary"
                );
                Some(Arc::new(lex) as Arc<dyn Lexicon>)
            }
        };
        debug!(?mode, order = lm.order(), "scorer ready");

        Ok(Self {
            alpha,
            beta,
            lm,
            lexicon,
            char_list: char_list.to_vec(),
            boundaries,
            mode,
        })
    }

    /// Swaps in new LM weights without recompiling anything.
    pub fn reset_params(&mut self, alpha: f64, beta: f64) {
        self.alpha = alpha;
        self.beta = beta;
    }

    pub fn mode(&self) -> ScoringMode {
        self.mode
    }

    pub fn is_word_based(&self) -> bool {
        self.mode == ScoringMode::Word
    }

    /// Whether `label` terminates a word.
    pub fn is_boundary(&self, label: i32) -> bool {
        self.boundaries.contains(&label)
    }

    pub fn order(&self) -> usize {
        self.lm.order()
    }

    pub fn alphabet_len(&self) -> usize {
        self.char_list.len()
    }

    /// The compiled lexicon, if this scorer runs in word mode.
    pub fn lexicon(&self) -> Option<Arc<dyn Lexicon>> {
        self.lexicon.clone()
    }

    /// Assembles the n-gram query for the hypothesis ending at `prefix`.
    ///
    /// Walks toward the root grouping labels into words; a tokenization
    /// symbol closes the current group and is emitted as its own
    /// single-label word. Collection stops after `order` groups or at the
    /// root; missing leading context is padded with `<s>` so the result has
    /// exactly `order` entries, most recent word last.
    pub fn make_ngram(&self, trie: &PathTrie, prefix: NodeId) -> Vec<String> {
        let order = self.lm.order();
        let mut ngram: Vec<String> = Vec::with_capacity(order);
        let mut cur = prefix;
        while ngram.len() < order {
            let node = trie.node(cur);
            if node.label == ROOT_LABEL {
                break;
            }
            if self.boundaries.contains(&node.label) {
                ngram.push(self.char_list[node.label as usize].clone());
                match node.parent {
                    Some(parent) => cur = parent,
                    None => break,
                }
            } else {
                let mut labels = Vec::new();
                let mut steps = Vec::new();
                cur = trie.path_to_root(cur, &self.boundaries, usize::MAX, &mut labels, &mut steps);
                let word: String = labels
                    .iter()
                    .map(|&l| self.char_list[l as usize].as_str())
                    .collect();
                if !word.is_empty() {
                    ngram.push(word);
                }
            }
        }
        ngram.reverse();
        while ngram.len() < order {
            ngram.insert(0, START_TOKEN.to_string());
        }
        ngram
    }

    /// Conditional log-probability (natural log) of the last word in
    /// `words` given the preceding ones. Any unknown word short-circuits to
    /// [`OOV_SCORE`].
    pub fn get_log_cond_prob(&self, words: &[String]) -> f64 {
        if words.is_empty() || words.iter().any(|w| !self.lm.contains(w)) {
            return OOV_SCORE;
        }
        self.to_natural(self.lm.score(words))
    }

    /// Sentence log-probability: pads with `<s>`, appends `</s>`, and sums
    /// conditional scores over every window of `order` words.
    pub fn get_sent_log_prob(&self, words: &[String]) -> f64 {
        let order = self.lm.order();
        if order == 0 {
            return 0.0;
        }
        let mut sentence: Vec<String> = Vec::with_capacity(words.len() + order + 1);
        if words.is_empty() {
            sentence.resize(order, START_TOKEN.to_string());
        } else {
            sentence.resize(order - 1, START_TOKEN.to_string());
            sentence.extend(words.iter().cloned());
        }
        sentence.push(END_TOKEN.to_string());

        sentence
            .windows(order)
            .map(|window| self.get_log_cond_prob(window))
            .sum()
    }

    /// Splits a decoded label sequence into words at the tokenization
    /// symbols; each symbol is emitted as its own word.
    pub fn split_labels(&self, labels: &[i32]) -> Vec<String> {
        let mut words = Vec::new();
        let mut current = String::new();
        for &label in labels {
            if self.boundaries.contains(&label) {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                words.push(self.char_list[label as usize].clone());
            } else {
                current.push_str(&self.char_list[label as usize]);
            }
        }
        if !current.is_empty() {
            words.push(current);
        }
        words
    }

    fn to_natural(&self, score: f64) -> f64 {
        match self.lm.unit() {
            LmUnit::Log10 => score * LOG_10,
            LmUnit::Natural => score,
        }
    }
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scorer")
            .field("alpha", &self.alpha)
            .field("beta", &self.beta)
            .field("mode", &self.mode)
            .field("order", &self.lm.order())
            .finish()
    }
}

fn is_special(word: &str) -> bool {
    word == START_TOKEN || word == END_TOKEN || word == UNK_TOKEN
}

/// Vocabulary entries longer than five bytes only occur in word models;
/// single characters (including escaped forms) stay within five.
fn detect_mode(vocabulary: &[String]) -> ScoringMode {
    let word_based = vocabulary
        .iter()
        .any(|w| !is_special(w) && w.len() > 5);
    if word_based {
        ScoringMode::Word
    } else {
        ScoringMode::Character
    }
}
