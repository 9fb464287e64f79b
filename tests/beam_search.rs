//! End-to-end beam search scenarios on a tiny `[_, a, b, space]` alphabet
//! with `_` as the CTC blank and the space as the word boundary.

use std::sync::Arc;

use ctc_prefix_beam::{
    BeamSearchDecoder, DecoderOptions, Hypothesis, LanguageModel, LmUnit, Scorer, ScoringMode,
};

const NEG_INF: f64 = f64::NEG_INFINITY;
const BLANK: usize = 0;
const A: i32 = 1;
const B: i32 = 2;
const SPACE: i32 = 3;

fn alphabet() -> Vec<String> {
    ["_", "a", "b", " "].iter().map(|s| s.to_string()).collect()
}

fn rows(frames: &[[f64; 4]]) -> Vec<Vec<f64>> {
    frames.iter().map(|f| f.to_vec()).collect()
}

fn ln_rows(frames: &[[f64; 4]]) -> Vec<Vec<f64>> {
    frames.iter().map(|f| f.map(f64::ln).to_vec()).collect()
}

fn decoder(beam_size: usize) -> BeamSearchDecoder {
    BeamSearchDecoder::new(
        alphabet(),
        DecoderOptions {
            beam_size,
            ..DecoderOptions::default()
        },
        None,
    )
    .unwrap()
}

fn find<'a>(hyps: &'a [Hypothesis], labels: &[i32]) -> Option<&'a Hypothesis> {
    hyps.iter().find(|h| h.labels == labels)
}

/// Word-level model that likes exactly one word.
struct WordLm {
    order: usize,
    vocab: Vec<String>,
    bonus: f64,
}

impl WordLm {
    fn new(vocab: &[&str], bonus: f64) -> Arc<dyn LanguageModel> {
        Arc::new(Self {
            order: 2,
            vocab: vocab.iter().map(|w| w.to_string()).collect(),
            bonus,
        })
    }
}

impl LanguageModel for WordLm {
    fn order(&self) -> usize {
        self.order
    }
    fn unit(&self) -> LmUnit {
        LmUnit::Natural
    }
    fn contains(&self, word: &str) -> bool {
        self.vocab.iter().any(|w| w == word)
    }
    fn score(&self, words: &[String]) -> f64 {
        match words.last() {
            Some(w) if w == "ab" => self.bonus,
            _ => -1000.0,
        }
    }
    fn vocabulary(&self) -> &[String] {
        &self.vocab
    }
}

#[test]
fn single_emission() {
    let probs = rows(&[
        [0.0, NEG_INF, NEG_INF, NEG_INF],
        [NEG_INF, 0.0, NEG_INF, NEG_INF],
        [0.0, NEG_INF, NEG_INF, NEG_INF],
    ]);
    let hyps = decoder(4).decode(&probs).unwrap();
    assert_eq!(hyps[0].labels, vec![A]);
    assert_eq!(hyps[0].timesteps, vec![1]);
    assert!(hyps[0].score.abs() < 1e-12);
}

#[test]
fn blank_separates_repeats() {
    let probs = ln_rows(&[
        [0.05, 0.85, 0.05, 0.05],
        [0.05, 0.85, 0.05, 0.05],
        [0.85, 0.05, 0.05, 0.05],
        [0.05, 0.85, 0.05, 0.05],
    ]);
    let hyps = decoder(100).decode(&probs).unwrap();
    assert_eq!(hyps[0].labels, vec![A, A]);
    let aa = find(&hyps, &[A, A]).unwrap();
    let a = find(&hyps, &[A]).unwrap();
    assert!(aa.score > a.score);
}

#[test]
fn repeats_without_blank_merge() {
    let third = 0.1 / 3.0;
    let probs = ln_rows(&[
        [third, 0.9, third, third],
        [third, 0.9, third, third],
        [third, 0.9, third, third],
    ]);
    let hyps = decoder(100).decode(&probs).unwrap();
    assert_eq!(hyps[0].labels, vec![A]);
    assert_eq!(hyps[0].timesteps, vec![0]);
}

#[test]
fn beam_size_bounds_the_survivors() {
    let probs = ln_rows(&[
        [0.25, 0.30, 0.25, 0.20],
        [0.25, 0.20, 0.30, 0.25],
        [0.30, 0.25, 0.20, 0.25],
    ]);
    let wide = decoder(50).decode(&probs).unwrap();
    assert!(wide.len() > 2, "matrix admits more than two viable prefixes");

    let narrow = decoder(2).decode(&probs).unwrap();
    assert_eq!(narrow.len(), 2);
    assert!(narrow[0].score >= narrow[1].score);
}

#[test]
fn lexicon_rejects_out_of_vocabulary_words() {
    let lm = WordLm::new(&["ab", "a", "<s>", "</s>"], 0.0);
    let scorer = Scorer::new(
        0.0,
        0.0,
        lm,
        &alphabet(),
        &[" ".to_string()],
        Some(ScoringMode::Word),
    )
    .unwrap();
    let dec = BeamSearchDecoder::new(
        alphabet(),
        DecoderOptions {
            beam_size: 100,
            ..DecoderOptions::default()
        },
        Some(Arc::new(scorer)),
    )
    .unwrap();

    let probs = ln_rows(&[
        [0.04, 0.9, 0.03, 0.03],
        [0.04, 0.03, 0.9, 0.03],
        [0.04, 0.03, 0.9, 0.03],
    ]);
    let hyps = dec.decode(&probs).unwrap();
    assert_eq!(hyps[0].labels, vec![A, B]);
    assert_eq!(hyps[0].timesteps, vec![0, 1]);
    assert!(find(&hyps, &[A, B, B]).is_none(), "abb is not a word prefix");
    assert!(find(&hyps, &[B]).is_none(), "no word starts with b");
}

#[test]
fn lm_bonus_applies_once_per_word_boundary() {
    let bonus = 2.5;
    let favored = |l: usize| {
        let mut frame = [0.01, 0.01, 0.01, 0.01];
        frame[l] = 0.97;
        frame
    };
    let probs = ln_rows(&[
        favored(1), // a
        favored(2), // b
        favored(3), // space
        favored(1), // a
        favored(2), // b
        favored(3), // space
    ]);
    let target = [A, B, SPACE, A, B, SPACE];

    let plain = decoder(2000).decode(&probs).unwrap();
    let baseline = find(&plain, &target).unwrap();

    let lm = WordLm::new(&["ab", " ", "<s>", "</s>"], bonus);
    let scorer = Scorer::new(
        1.0,
        0.0,
        lm,
        &alphabet(),
        &[" ".to_string()],
        Some(ScoringMode::Word),
    )
    .unwrap();
    let dec = BeamSearchDecoder::new(
        alphabet(),
        DecoderOptions {
            beam_size: 2000,
            ..DecoderOptions::default()
        },
        Some(Arc::new(scorer)),
    )
    .unwrap();
    let fused = dec.decode(&probs).unwrap();
    let scored = find(&fused, &target).unwrap();

    // One bonus per completed word, not per frame the boundary was seen.
    assert!((scored.score - baseline.score - 2.0 * bonus).abs() < 1e-9);
    assert_eq!(fused[0].labels, target);
}

#[test]
fn sentence_rescoring_shifts_scores() {
    let probs = ln_rows(&[
        [0.04, 0.9, 0.03, 0.03],
        [0.04, 0.03, 0.9, 0.03],
        [0.04, 0.03, 0.03, 0.9],
    ]);
    let lm = WordLm::new(&["ab", " ", "<s>", "</s>"], 1.5);
    let scorer = Arc::new(
        Scorer::new(
            1.0,
            0.0,
            lm,
            &alphabet(),
            &[" ".to_string()],
            Some(ScoringMode::Word),
        )
        .unwrap(),
    );

    let base = BeamSearchDecoder::new(
        alphabet(),
        DecoderOptions {
            beam_size: 100,
            ..DecoderOptions::default()
        },
        Some(scorer.clone()),
    )
    .unwrap()
    .decode(&probs)
    .unwrap();

    let rescored = BeamSearchDecoder::new(
        alphabet(),
        DecoderOptions {
            beam_size: 100,
            sentence_rescoring: true,
            ..DecoderOptions::default()
        },
        Some(scorer.clone()),
    )
    .unwrap()
    .decode(&probs)
    .unwrap();

    let hyp = &base[0];
    let expected =
        hyp.score + scorer.alpha * scorer.get_sent_log_prob(&scorer.split_labels(&hyp.labels));
    let shifted = find(&rescored, &hyp.labels).unwrap();
    assert!((shifted.score - expected).abs() < 1e-9);
}

#[test]
fn decoding_is_deterministic() {
    let probs = ln_rows(&[
        [0.25, 0.30, 0.25, 0.20],
        [0.25, 0.20, 0.30, 0.25],
        [0.20, 0.25, 0.30, 0.25],
        [0.30, 0.25, 0.20, 0.25],
    ]);
    let dec = decoder(8);
    let first = dec.decode(&probs).unwrap();
    let second = dec.decode(&probs).unwrap();
    assert_eq!(first, second);
}

#[test]
fn batch_matches_individual_decodes() {
    let m1 = ln_rows(&[
        [0.05, 0.85, 0.05, 0.05],
        [0.85, 0.05, 0.05, 0.05],
    ]);
    let m2 = ln_rows(&[
        [0.05, 0.05, 0.85, 0.05],
        [0.05, 0.05, 0.85, 0.05],
    ]);
    let dec = decoder(10);
    let batch = dec.decode_batch(&[m1.clone(), m2.clone()]).unwrap();
    assert_eq!(batch[0], dec.decode(&m1).unwrap());
    assert_eq!(batch[1], dec.decode(&m2).unwrap());
}

#[test]
fn tensor_entries_match_the_slice_path() -> anyhow::Result<()> {
    use candle::{Device, Tensor};

    let probs = ln_rows(&[
        [0.05, 0.85, 0.05, 0.05],
        [0.05, 0.85, 0.05, 0.05],
        [0.85, 0.05, 0.05, 0.05],
        [0.05, 0.85, 0.05, 0.05],
    ]);
    let dec = decoder(20);
    let expected = dec.decode(&probs)?;

    let flat: Vec<f64> = probs.iter().flatten().copied().collect();
    let tensor = Tensor::from_vec(flat, (4, 4), &Device::Cpu)?;
    assert_eq!(dec.decode_log_probs_tensor(&tensor)?, expected);

    let batched = tensor.unsqueeze(0)?;
    assert_eq!(dec.decode_log_probs_tensor(&batched)?, expected);

    // Rows already sum to one, so the log-softmax only shifts every score
    // by the same rounding-level constant: the ranking must not move.
    let via_logits = dec.decode_logits(&tensor)?;
    assert_eq!(via_logits.len(), expected.len());
    for (got, want) in via_logits.iter().zip(&expected) {
        assert_eq!(got.labels, want.labels);
        assert_eq!(got.timesteps, want.timesteps);
        assert!((got.score - want.score).abs() < 1e-9);
    }
    Ok(())
}
