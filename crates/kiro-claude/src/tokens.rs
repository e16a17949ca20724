//! Character-count token estimation and the synthetic 1:2:25 prompt-cache
//! distribution. There is no real tokenizer here — matching the
//! specification's explicit choice not to re-tokenize.

pub const TOTAL_CONTEXT_TOKENS: u64 = 172_500;
pub const CONTEXT_WINDOW_TOKENS: u64 = 200_000;
pub const MAX_OUTPUT_TOKENS: u32 = 64_000;

const THINKING_OVERHEAD_CHARS: usize = 100;
const DISTRIBUTION_THRESHOLD: u64 = 100;

/// `⌈characters / 4⌉`.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count();
    ((chars as u64) + 3) / 4
}

/// Estimate input tokens across the system prompt and all message text,
/// adding a 100-character overhead when extended thinking is enabled.
pub fn estimate_input_tokens(system: &str, messages_text: &str, thinking_enabled: bool) -> u64 {
    let mut chars = system.chars().count() + messages_text.chars().count();
    if thinking_enabled {
        chars += THINKING_OVERHEAD_CHARS;
    }
    ((chars as u64) + 3) / 4
}

/// Derive input tokens from an upstream-reported `contextUsagePercentage`,
/// falling back to `estimate` when the derived count would be non-positive
/// (mirrors the upstream's own fallback rather than clamping at zero).
pub fn derive_input_tokens(percentage: f64, output_tokens: u64, estimate: u64) -> u64 {
    let total = ((TOTAL_CONTEXT_TOKENS as f64) * percentage / 100.0).floor() as i64;
    let derived = total - output_tokens as i64;
    if derived <= 0 {
        estimate
    } else {
        derived as u64
    }
}

/// Split `n` input tokens into `(input, cache_creation, cache_read)` using
/// the fixed 1:2:25 ratio, applied only once `n >= 100`.
pub fn distribute(n: u64) -> (u64, u64, u64) {
    if n < DISTRIBUTION_THRESHOLD {
        return (n, 0, 0);
    }
    let input = n / 28;
    let creation = (2 * n) / 28;
    let read = n - input - creation;
    (input, creation, read)
}
