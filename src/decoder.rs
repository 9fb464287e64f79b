//! CTC prefix beam search over a time × vocabulary log-probability matrix.
//!
//! Each frame, every live prefix is extended under the CTC merging rules:
//! blank keeps the prefix, a repeated label without an intervening blank
//! merges into it, anything else grows it by one node in the trie. All
//! probability flowing into the same prefix is accumulated with
//! `log_sum_exp`, the beam keeps the `beam_size` best prefixes, and an
//! attached [`Scorer`] folds language model evidence in at word boundaries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use candle::{DType, Tensor, D};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::math::{log_sum_exp, top_k, NEG_INF};
use crate::scorer::Scorer;
use crate::trie::{NodeId, PathTrie};

/// Beam search parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DecoderOptions {
    /// Number of prefixes kept alive between frames.
    #[serde(default = "default_beam_size")]
    pub beam_size: usize,
    /// Index of the CTC blank label.
    #[serde(default)]
    pub blank_id: usize,
    /// Largest number of non-blank labels expanded per frame.
    #[serde(default = "default_cutoff_top_n")]
    pub cutoff_top_n: usize,
    /// Probability mass of the non-blank distribution expanded per frame.
    /// Both cutoffs apply; blank is always processed.
    #[serde(default = "default_cutoff_prob")]
    pub cutoff_prob: f64,
    /// Rescore final hypotheses with a sentence-level LM pass.
    #[serde(default)]
    pub sentence_rescoring: bool,
}

fn default_beam_size() -> usize {
    100
}
fn default_cutoff_top_n() -> usize {
    40
}
fn default_cutoff_prob() -> f64 {
    1.0
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            beam_size: default_beam_size(),
            blank_id: 0,
            cutoff_top_n: default_cutoff_top_n(),
            cutoff_prob: default_cutoff_prob(),
            sentence_rescoring: false,
        }
    }
}

/// A ranked decoding result.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Combined acoustic + language model log-probability.
    pub score: f64,
    /// Label indices with blanks and repeats already collapsed.
    pub labels: Vec<i32>,
    /// Frame at which each label was first emitted.
    pub timesteps: Vec<usize>,
}

/// CTC prefix beam search decoder.
///
/// One decoder can serve any number of decode calls, including concurrent
/// ones: every call owns an independent trie, and the scorer's lexicon and
/// language model are only read.
pub struct BeamSearchDecoder {
    char_list: Vec<String>,
    options: DecoderOptions,
    scorer: Option<Arc<Scorer>>,
}

impl BeamSearchDecoder {
    pub fn new(
        char_list: Vec<String>,
        options: DecoderOptions,
        scorer: Option<Arc<Scorer>>,
    ) -> Result<Self> {
        if char_list.is_empty() {
            return Err(Error::Config("alphabet is empty".into()));
        }
        if options.beam_size == 0 {
            return Err(Error::Config("beam_size must be positive".into()));
        }
        if options.blank_id >= char_list.len() {
            return Err(Error::Config(format!(
                "blank_id {} is outside the alphabet of {} labels",
                options.blank_id,
                char_list.len()
            )));
        }
        if let Some(scorer) = &scorer {
            if scorer.alphabet_len() != char_list.len() {
                return Err(Error::Config(format!(
                    "scorer was built for {} labels, decoder has {}",
                    scorer.alphabet_len(),
                    char_list.len()
                )));
            }
        }
        debug!(
            vocab = char_list.len(),
            beam = options.beam_size,
            scored = scorer.is_some(),
            "beam search decoder ready"
        );
        Ok(Self {
            char_list,
            options,
            scorer,
        })
    }

    /// Decodes one utterance given per-frame natural-log probabilities.
    ///
    /// Returns up to `beam_size` hypotheses, best first.
    pub fn decode(&self, log_probs: &[Vec<f64>]) -> Result<Vec<Hypothesis>> {
        self.run(log_probs, None)
    }

    /// Like [`decode`](Self::decode), but checks `cancel` between frames.
    /// A cancelled call returns [`Error::Cancelled`] and no partial beam.
    pub fn decode_with_cancel(
        &self,
        log_probs: &[Vec<f64>],
        cancel: &AtomicBool,
    ) -> Result<Vec<Hypothesis>> {
        self.run(log_probs, Some(cancel))
    }

    /// Decodes independent utterances in parallel.
    pub fn decode_batch(&self, batch: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<Hypothesis>>> {
        batch.par_iter().map(|probs| self.run(probs, None)).collect()
    }

    /// Applies a log-softmax over the last dimension and decodes.
    ///
    /// Accepts `[time, vocab]` or `[1, time, vocab]` tensors.
    pub fn decode_logits(&self, logits: &Tensor) -> Result<Vec<Hypothesis>> {
        let log_probs = candle_nn::ops::log_softmax(logits, D::Minus1)?;
        self.decode_log_probs_tensor(&log_probs)
    }

    /// Decodes a tensor that already holds natural-log probabilities.
    pub fn decode_log_probs_tensor(&self, log_probs: &Tensor) -> Result<Vec<Hypothesis>> {
        let matrix = match log_probs.dims() {
            [1, _, _] => log_probs.squeeze(0)?,
            [_, _] => log_probs.clone(),
            dims => {
                return Err(Error::Shape(format!(
                    "expected a [time, vocab] matrix, got {dims:?}"
                )))
            }
        };
        let rows = matrix.to_dtype(DType::F64)?.to_vec2::<f64>()?;
        self.run(&rows, None)
    }

    /// Greedy best-path decoding: frame-wise argmax with blanks and repeats
    /// collapsed. Much cheaper than the beam, useful as a baseline.
    pub fn decode_greedy(&self, log_probs: &[Vec<f64>]) -> Result<Hypothesis> {
        self.validate(log_probs)?;
        let blank = self.options.blank_id;
        let mut labels = Vec::new();
        let mut timesteps = Vec::new();
        let mut score = 0.0;
        let mut prev = blank;
        for (t, row) in log_probs.iter().enumerate() {
            let best = top_k(row, 1)[0];
            score += row[best];
            if best != blank && best != prev {
                labels.push(best as i32);
                timesteps.push(t);
            }
            prev = best;
        }
        Ok(Hypothesis {
            score,
            labels,
            timesteps,
        })
    }

    fn validate(&self, log_probs: &[Vec<f64>]) -> Result<()> {
        let vocab = self.char_list.len();
        if log_probs.is_empty() {
            return Err(Error::Shape("probability matrix has no frames".into()));
        }
        for (t, row) in log_probs.iter().enumerate() {
            if row.len() != vocab {
                return Err(Error::Shape(format!(
                    "frame {t} has {} entries, alphabet has {vocab}",
                    row.len()
                )));
            }
        }
        Ok(())
    }

    fn run(
        &self,
        log_probs: &[Vec<f64>],
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<Hypothesis>> {
        self.validate(log_probs)?;
        let blank = self.options.blank_id;
        let beam_size = self.options.beam_size;
        let cutoff_top_n = self.options.cutoff_top_n.min(self.char_list.len());
        // Character-based scorers have nothing to contribute here.
        let scorer = self.scorer.as_deref().filter(|s| s.is_word_based());

        let mut trie = PathTrie::new();
        if let Some(scorer) = scorer {
            if let Some(lexicon) = scorer.lexicon() {
                trie.attach_lexicon(lexicon);
            }
        }
        // The empty prefix starts with certainty mass on the blank side.
        trie.node_mut(NodeId::ROOT).log_p_b_cur = 0.0;

        let mut leaves: Vec<NodeId> = Vec::new();
        for (t, row) in log_probs.iter().enumerate() {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
            }

            leaves.clear();
            trie.commit_frame(&mut leaves);
            leaves.sort_by(|a, b| trie.node(*b).score.total_cmp(&trie.node(*a).score));
            let doomed = if leaves.len() > beam_size {
                leaves.split_off(beam_size)
            } else {
                Vec::new()
            };
            trace!(frame = t, live = leaves.len(), pruned = doomed.len(), "expanding beam");

            let candidates = self.frame_candidates(row, cutoff_top_n);
            let blank_lp = row[blank];

            for &p in &leaves {
                let p_label = trie.node(p).label;
                let p_score = trie.node(p).score;

                // Blank keeps the prefix as-is; it is exempt from the cutoff.
                {
                    let node = trie.node_mut(p);
                    node.log_p_b_cur = log_sum_exp(node.log_p_b_cur, blank_lp + p_score);
                }

                for &(c, lp) in &candidates {
                    if c == p_label {
                        // Repeat without an intervening blank merges into the
                        // same prefix.
                        let nb_prev = trie.node(p).log_p_nb_prev;
                        let node = trie.node_mut(p);
                        node.log_p_nb_cur = log_sum_exp(node.log_p_nb_cur, lp + nb_prev);
                    }
                    let boundary = scorer.map_or(false, |s| s.is_boundary(c));
                    let Some(q) = trie.get_or_create_child(p, c, t, boundary, true) else {
                        continue;
                    };
                    // A repeat can also extend the prefix, but only through
                    // the blank-ending mass.
                    let mut log_p = if c == p_label {
                        lp + trie.node(p).log_p_b_prev
                    } else {
                        lp + p_score
                    };
                    if boundary {
                        if let Some(scorer) = scorer {
                            if !trie.node(q).lm_applied {
                                let ngram = scorer.make_ngram(&trie, p);
                                let bonus =
                                    scorer.alpha * scorer.get_log_cond_prob(&ngram) + scorer.beta;
                                let node = trie.node_mut(q);
                                node.lm_bonus = bonus;
                                node.lm_applied = true;
                            }
                            log_p += trie.node(q).lm_bonus;
                        }
                    }
                    let node = trie.node_mut(q);
                    node.log_p_nb_cur = log_sum_exp(node.log_p_nb_cur, log_p);
                }
            }

            for d in doomed {
                trie.remove(d);
            }
        }

        leaves.clear();
        trie.commit_frame(&mut leaves);
        leaves.sort_by(|a, b| trie.node(*b).score.total_cmp(&trie.node(*a).score));
        leaves.truncate(beam_size);

        let no_stops = HashSet::new();
        let mut results = Vec::with_capacity(leaves.len());
        for &leaf in &leaves {
            let mut labels = Vec::new();
            let mut timesteps = Vec::new();
            trie.path_to_root(leaf, &no_stops, usize::MAX, &mut labels, &mut timesteps);
            let mut score = trie.node(leaf).score;
            if self.options.sentence_rescoring {
                if let Some(scorer) = scorer {
                    score += scorer.alpha * scorer.get_sent_log_prob(&scorer.split_labels(&labels));
                }
            }
            results.push(Hypothesis {
                score,
                labels,
                timesteps,
            });
        }
        if self.options.sentence_rescoring {
            results.sort_by(|a, b| b.score.total_cmp(&a.score));
        }
        Ok(results)
    }

    /// Non-blank labels worth expanding this frame: best-first, cut at the
    /// requested probability mass, then at `cutoff_top_n`. Labels with zero
    /// probability cannot be emitted and are never candidates.
    fn frame_candidates(&self, row: &[f64], cutoff_top_n: usize) -> Vec<(i32, f64)> {
        let blank = self.options.blank_id;
        let mut order = top_k(row, row.len());
        order.retain(|&i| i != blank && row[i] != NEG_INF);
        let mut keep = order.len();
        if self.options.cutoff_prob < 1.0 {
            let mut mass = 0.0;
            keep = 0;
            for &i in &order {
                mass += row[i].exp();
                keep += 1;
                if mass >= self.options.cutoff_prob {
                    break;
                }
            }
        }
        order.truncate(keep.min(cutoff_top_n));
        order.into_iter().map(|i| (i as i32, row[i])).collect()
    }
}
