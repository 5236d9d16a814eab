/// Deterministic generator behind `RANDOM`, `LIST_RANDOM` and shuffles.
/// Every draw starts from a fresh seed, so no generator state is saved.
#[derive(Debug, Clone)]
pub(crate) struct SeededRandom {
    state: u32,
}

impl SeededRandom {
    pub(crate) fn new(seed: i32) -> Self {
        Self { state: seed as u32 }
    }

    /// Non-negative draw.
    pub(crate) fn next(&mut self) -> i32 {
        (next_random_u32(&mut self.state) >> 1) as i32
    }
}

pub(crate) fn next_random_u32(state: &mut u32) -> u32 {
    let mut next = state.wrapping_add(0x6d2b79f5);
    *state = next;
    next = (next ^ (next >> 15)).wrapping_mul(next | 1);
    next ^= next.wrapping_add((next ^ (next >> 7)).wrapping_mul(next | 61));
    next ^ (next >> 14)
}

/// Seed for a new story when none is configured.
pub(crate) fn clock_seed() -> i32 {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    (millis % 100) as i32
}
