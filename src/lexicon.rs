//! Word-constrained decoding via a compiled character-level automaton.
//!
//! The beam search only needs three capabilities from a lexicon: a start
//! state, deterministic transitions, and word-finality. [`TrieLexicon`]
//! provides them by inserting every vocabulary word into a character trie
//! and merging equivalent suffix states, yielding a minimal deterministic
//! epsilon-free acceptor that is immutable during decoding.

use std::collections::HashMap;

/// State handle inside a lexicon automaton.
pub type StateId = u32;

/// Capability set the decoder requires from a lexicon.
///
/// Implementations are shared read-only across concurrent decodes and must
/// answer `accept` queries from multiple threads.
pub trait Lexicon: Send + Sync {
    /// Initial state.
    fn start(&self) -> StateId;
    /// Next state if `label` is a legal outgoing transition, `None` if the
    /// extension would leave every in-vocabulary word.
    fn accept(&self, state: StateId, label: i32) -> Option<StateId>;
    /// Whether `state` accepts a complete word.
    fn is_final(&self, state: StateId) -> bool;
}

/// Minimal deterministic acceptor over a word list.
#[derive(Debug, Clone)]
pub struct TrieLexicon {
    /// Outgoing transitions per state, sorted by label for binary search.
    transitions: Vec<Vec<(i32, StateId)>>,
    finals: Vec<bool>,
    start: StateId,
    num_words: usize,
}

impl TrieLexicon {
    /// Builds the acceptor from a word list.
    ///
    /// Each word is spelled per Unicode codepoint against `char_map`
    /// (alphabet token → label). Words containing a codepoint the alphabet
    /// does not carry are skipped. The raw trie is then compressed bottom-up
    /// by merging states with identical finality and outgoing transitions.
    pub fn build<'a, I>(words: I, char_map: &HashMap<String, i32>) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut transitions: Vec<Vec<(i32, StateId)>> = vec![Vec::new()];
        let mut finals = vec![false];
        let mut num_words = 0;

        for word in words {
            let Some(labels) = spell(word, char_map) else {
                continue;
            };
            if labels.is_empty() {
                continue;
            }
            let mut state: StateId = 0;
            for label in labels {
                let found = transitions[state as usize]
                    .iter()
                    .find(|&&(l, _)| l == label)
                    .map(|&(_, next)| next);
                state = match found {
                    Some(next) => next,
                    None => {
                        transitions.push(Vec::new());
                        finals.push(false);
                        let next = (transitions.len() - 1) as StateId;
                        transitions[state as usize].push((label, next));
                        next
                    }
                };
            }
            if !finals[state as usize] {
                num_words += 1;
            }
            finals[state as usize] = true;
        }

        Self::minimize(transitions, finals, num_words)
    }

    /// Merges equivalent states of an acyclic acceptor.
    ///
    /// States are processed children-first, so two states are equal exactly
    /// when their finality and label-to-canonical-child maps coincide.
    fn minimize(
        transitions: Vec<Vec<(i32, StateId)>>,
        finals: Vec<bool>,
        num_words: usize,
    ) -> Self {
        let n = transitions.len();
        let mut order = Vec::with_capacity(n);
        let mut stack = vec![(0 as StateId, false)];
        while let Some((state, expanded)) = stack.pop() {
            if expanded {
                order.push(state);
                continue;
            }
            stack.push((state, true));
            for &(_, child) in &transitions[state as usize] {
                stack.push((child, false));
            }
        }

        let mut canonical: HashMap<(bool, Vec<(i32, StateId)>), StateId> = HashMap::new();
        let mut remap = vec![0 as StateId; n];
        let mut out_transitions: Vec<Vec<(i32, StateId)>> = Vec::new();
        let mut out_finals: Vec<bool> = Vec::new();

        for state in order {
            let mut signature: Vec<(i32, StateId)> = transitions[state as usize]
                .iter()
                .map(|&(label, child)| (label, remap[child as usize]))
                .collect();
            signature.sort_unstable_by_key(|&(label, _)| label);
            let key = (finals[state as usize], signature.clone());
            let id = *canonical.entry(key).or_insert_with(|| {
                out_transitions.push(signature);
                out_finals.push(finals[state as usize]);
                (out_transitions.len() - 1) as StateId
            });
            remap[state as usize] = id;
        }

        Self {
            start: remap[0],
            transitions: out_transitions,
            finals: out_finals,
            num_words,
        }
    }

    /// Number of distinct words the acceptor was built from.
    pub fn num_words(&self) -> usize {
        self.num_words
    }

    /// Number of states after minimization.
    pub fn num_states(&self) -> usize {
        self.transitions.len()
    }
}

impl Lexicon for TrieLexicon {
    fn start(&self) -> StateId {
        self.start
    }

    fn accept(&self, state: StateId, label: i32) -> Option<StateId> {
        let transitions = self.transitions.get(state as usize)?;
        transitions
            .binary_search_by_key(&label, |&(l, _)| l)
            .ok()
            .map(|i| transitions[i].1)
    }

    fn is_final(&self, state: StateId) -> bool {
        self.finals.get(state as usize).copied().unwrap_or(false)
    }
}

/// Spells a word as alphabet labels, one per Unicode codepoint.
fn spell(word: &str, char_map: &HashMap<String, i32>) -> Option<Vec<i32>> {
    let mut buf = [0u8; 4];
    word.chars()
        .map(|ch| char_map.get(ch.encode_utf8(&mut buf)).copied())
        .collect()
}
