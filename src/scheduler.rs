use rand::Rng;
use std::time::Duration;

/// Draws a uniform inter-request delay in `[delay_min, delay_max]`
/// milliseconds. Returns 0 immediately if both bounds are zero.
pub fn jitter_ms(rng: &mut impl Rng, delay_min: u64, delay_max: u64) -> u64 {
    if delay_min == 0 && delay_max == 0 {
        return 0;
    }
    if delay_min == delay_max {
        return delay_min;
    }
    rng.gen_range(delay_min..=delay_max)
}

/// Scales the jittered delay during a connection's ramp-up window so the
/// emitted request rate grows linearly from zero at `elapsed_ms = 0` to the
/// steady-state rate at `elapsed_ms = ramp_up_ms`. Past the window this is
/// just `jitter_ms`.
///
/// Resolution of the "delayed = delay_max" ambiguity in the original timer
/// field: rather than a literal one-shot `delay_max` wait, the first
/// request's delay is this function evaluated at `elapsed_ms = 0`, i.e. the
/// maximally-stretched end of the same linear ramp every later request in
/// the window also uses.
pub fn ramp_scaled_delay_ms(
    rng: &mut impl Rng,
    delay_min: u64,
    delay_max: u64,
    ramp_up_ms: u64,
    elapsed_ms: u64,
) -> u64 {
    let base = jitter_ms(rng, delay_min, delay_max);
    if ramp_up_ms == 0 || elapsed_ms >= ramp_up_ms {
        return base;
    }
    let remaining = (ramp_up_ms - elapsed_ms) as f64 / ramp_up_ms as f64;
    let stretch = remaining * delay_max.max(1) as f64;
    base + stretch.round() as u64
}

/// Per-thread ramp-up stagger: how long worker `thread_index` (0-based, out
/// of `total_threads`) should wait after the previous worker was spawned.
pub fn thread_stagger(total_threads: usize, ramp_up_ms: u64) -> Duration {
    if total_threads <= 1 || ramp_up_ms == 0 {
        return Duration::from_millis(0);
    }
    Duration::from_millis(ramp_up_ms / total_threads as u64)
}
