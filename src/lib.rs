//! CTC Prefix Beam Search Decoding
//!
//! Turns a time × vocabulary matrix of log-probabilities — as emitted by a
//! CTC-trained acoustic model — into a ranked list of label sequences with
//! per-label emission frames. Decoding can optionally be constrained by a
//! compiled lexicon and rescored by an n-gram language model at word
//! boundaries.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`math`] | Log-space arithmetic, top-k selection |
//! | [`trie`] | Arena-backed trie of live beam hypotheses |
//! | [`lexicon`] | `Lexicon` trait + minimal deterministic word acceptor |
//! | [`lm`] | `LanguageModel` trait + ARPA n-gram backend |
//! | [`scorer`] | LM weighting, n-gram assembly, word boundaries |
//! | [`decoder`] | The per-frame beam search itself |
//!
//! ```no_run
//! use ctc_prefix_beam::{BeamSearchDecoder, DecoderOptions};
//!
//! # fn main() -> ctc_prefix_beam::Result<()> {
//! let alphabet: Vec<String> = ["_", "a", "b", " "]
//!     .iter()
//!     .map(|s| s.to_string())
//!     .collect();
//! let decoder = BeamSearchDecoder::new(alphabet, DecoderOptions::default(), None)?;
//! let log_probs: Vec<Vec<f64>> = vec![vec![(0.25f64).ln(); 4]; 10];
//! let hypotheses = decoder.decode(&log_probs)?;
//! println!("best: {:?}", hypotheses[0].labels);
//! # Ok(())
//! # }
//! ```

pub mod decoder;
pub mod error;
pub mod lexicon;
pub mod lm;
pub mod math;
pub mod scorer;
pub mod trie;

pub use decoder::{BeamSearchDecoder, DecoderOptions, Hypothesis};
pub use error::{Error, Result};
pub use lexicon::{Lexicon, StateId, TrieLexicon};
pub use lm::{LanguageModel, LmUnit, NgramLm, END_TOKEN, START_TOKEN, UNK_TOKEN};
pub use scorer::{Scorer, ScoringMode, OOV_SCORE};
pub use trie::{Node, NodeId, PathTrie, ROOT_LABEL};
