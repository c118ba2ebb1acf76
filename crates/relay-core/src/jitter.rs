//! Gaussian jitter, sleep primitives, and network-error classification.

use rand::Rng;
use std::time::Duration;

/// Substrings that mark an error message as a transient network failure.
const NETWORK_ERROR_MARKERS: &[&str] =
    &["fetch failed", "network error", "econnreset", "etimedout", "socket hang up", "timeout"];

/// Sample `N(mean, std_dev)` via the Box–Muller transform.
pub fn gaussian(mean: f64, std_dev: f64) -> f64 {
    let mut rng = rand::thread_rng();
    // u1 in (0, 1] so ln() is finite
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    let z0 = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    mean + z0 * std_dev
}

/// A base delay widened by gaussian noise, clamped at zero.
///
/// `spread` scales the noise: the standard deviation is
/// `base * spread / 4`, so ~95% of samples land within `spread/2` of the
/// base.
pub fn jittered_ms(base_ms: f64, spread: f64) -> u64 {
    gaussian(base_ms, base_ms * spread / 4.0).max(0.0) as u64
}

/// Sleep for a uniformly random duration in `[min_ms, max_ms]`.
pub async fn sleep_range(min_ms: u64, max_ms: u64) {
    let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Case-insensitive check for transient network failures.
///
/// Tolerates an empty message (returns false).
pub fn is_network_error(message: &str) -> bool {
    if message.is_empty() {
        return false;
    }
    let lower = message.to_lowercase();
    NETWORK_ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
}
