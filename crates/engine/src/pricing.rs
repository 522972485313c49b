//! Tick-size price quantization.

/// Round `price` to the nearest multiple of `tick`, clamped to five
/// decimal places.
///
/// Rounding policy is round-half-away-from-zero (`f64::round`), which
/// matches the exchange's own tick rounding; a mismatch here risks
/// order rejection.
pub fn quantize(price: f64, tick: f64) -> f64 {
    round_dp((price / tick).round() * tick, 5)
}

/// Round to `dp` decimal places, half away from zero.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (value * factor).round() / factor
}
