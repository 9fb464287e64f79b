//! Log-domain arithmetic and top-k selection used by the beam search.

/// Log of zero probability, the additive identity of [`log_sum_exp`].
pub const NEG_INF: f64 = f64::NEG_INFINITY;

/// Natural log of 10, used to convert log10 language model scores.
pub const LOG_10: f64 = std::f64::consts::LN_10;

/// Log-domain addition: `log(exp(a) + exp(b))`.
///
/// Computed as `max + log1p(exp(-|a - b|))` so that neither exponential can
/// overflow. `f64::NEG_INFINITY` is the additive identity.
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == NEG_INF {
        b
    } else if b == NEG_INF {
        a
    } else {
        let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
        hi + (lo - hi).exp().ln_1p()
    }
}

/// Indices of the `k` largest values in `xs`, largest first.
///
/// Ties resolve to the lower index, so the selection is deterministic for
/// any input. Returns fewer than `k` indices when `xs` is shorter than `k`.
pub fn top_k(xs: &[f64], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..xs.len()).collect();
    indices.sort_by(|&a, &b| xs[b].total_cmp(&xs[a]).then(a.cmp(&b)));
    indices.truncate(k);
    indices
}
