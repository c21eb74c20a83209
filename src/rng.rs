use rand::{rngs::StdRng, SeedableRng};

/// Create a [`StdRng`] for one worker engine.
///
/// The base seed comes from the `SEED` environment variable (0 when unset)
/// and is offset by the caller-supplied worker id, giving deterministic yet
/// distinct streams across a training fleet.
pub fn worker_rng(worker: u64) -> StdRng {
    let base: u64 = std::env::var("SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    StdRng::seed_from_u64(base.wrapping_add(worker))
}
