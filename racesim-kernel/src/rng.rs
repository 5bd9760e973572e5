//! Seeded rule-30 cellular automaton generator and per-runner stream bundle.
//!
//! Every stochastic decision in a trial draws from a [`Rule30Rng`] that was
//! seeded from the trial seed, so identical seeds reproduce identical races.
use hmac::{Hmac, Mac};
use rand::{RngCore, SeedableRng};
use sha2::Sha256;

/// Replacement state for a zero seed; an all-zero ring never changes.
const ZERO_SEED_STATE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Rule-30 automaton over a 64-cell ring.
///
/// Each step updates every cell as `left XOR (center OR right)` with
/// wrap-around and emits cell 0 as one output bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule30Rng {
    cells: u64,
}

impl Rule30Rng {
    /// Construct a generator from a 64-bit seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        let cells = if seed == 0 { ZERO_SEED_STATE } else { seed };
        Self { cells }
    }

    /// Current automaton cells, exposed for diagnostics.
    #[must_use]
    pub const fn cells(&self) -> u64 {
        self.cells
    }

    fn step(&mut self) -> u32 {
        let center = self.cells;
        let left = center.rotate_left(1);
        let right = center.rotate_right(1);
        self.cells = left ^ (center | right);
        (self.cells & 1) as u32
    }
}

impl RngCore for Rule30Rng {
    fn next_u32(&mut self) -> u32 {
        let mut out = 0u32;
        for _ in 0..32 {
            out = (out << 1) | self.step();
        }
        out
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.next_u32());
        let lo = u64::from(self.next_u32());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Rule30Rng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }

    fn seed_from_u64(state: u64) -> Self {
        Self::new(state)
    }
}

/// Convenience draws used throughout the race physics.
pub trait Prng: RngCore {
    /// Uniform float in `[0, 1)`.
    fn random(&mut self) -> f64 {
        f64::from(self.next_u32()) / 4_294_967_296.0
    }

    /// Uniform integer in `[0, upper)` using masked rejection sampling.
    ///
    /// Returns 0 when `upper` is 0 or 1.
    fn uniform(&mut self, upper: u32) -> u32 {
        if upper <= 1 {
            return 0;
        }
        let mask = u32::MAX >> (upper - 1).leading_zeros();
        loop {
            let candidate = self.next_u32() & mask;
            if candidate < upper {
                return candidate;
            }
        }
    }
}

impl<R: RngCore + ?Sized> Prng for R {}

/// Counting wrapper for RNG streams providing instrumentation.
#[derive(Debug, Clone)]
pub struct CountingRng<R> {
    rng: R,
    draws: u64,
}

impl CountingRng<Rule30Rng> {
    /// Wrap a fresh rule-30 stream.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            rng: Rule30Rng::new(seed),
            draws: 0,
        }
    }
}

impl<R: RngCore> CountingRng<R> {
    /// Number of draw calls performed against this stream.
    #[must_use]
    pub const fn draws(&self) -> u64 {
        self.draws
    }
}

impl<R: RngCore> RngCore for CountingRng<R> {
    fn next_u32(&mut self) -> u32 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.draws = self.draws.saturating_add(1);
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.draws = self.draws.saturating_add(1);
        self.rng.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.draws = self.draws.saturating_add(1);
        self.rng.try_fill_bytes(dest)
    }
}

/// Stream type handed to the runner subsystems.
pub type Stream = CountingRng<Rule30Rng>;

/// Deterministic bundle of RNG streams segregated by runner subsystem.
///
/// Streams are seeded from successive draws of the runner's master stream,
/// so adding draws to one subsystem never shifts another.
#[derive(Debug, Clone)]
pub struct RngBundle {
    pub master: Stream,
    pub rushed: Stream,
    pub wit: Stream,
    pub poskeep: Stream,
    pub lane: Stream,
    pub downhill: Stream,
    pub skill: Stream,
    pub dueling: Stream,
    pub gold: Stream,
    pub health: Stream,
}

impl RngBundle {
    /// Build every subsystem stream from a runner seed.
    #[must_use]
    pub fn from_runner_seed(seed: u64) -> Self {
        let mut master = CountingRng::new(seed);
        let mut child = || CountingRng::new(u64::from(master.next_u32()));
        let rushed = child();
        let wit = child();
        let poskeep = child();
        let lane = child();
        let downhill = child();
        let skill = child();
        let dueling = child();
        let gold = child();
        let health = child();
        Self {
            master,
            rushed,
            wit,
            poskeep,
            lane,
            downhill,
            skill,
            dueling,
            gold,
            health,
        }
    }

    /// Total draws across all streams.
    #[must_use]
    pub const fn total_draws(&self) -> u64 {
        self.master.draws()
            + self.rushed.draws()
            + self.wit.draws()
            + self.poskeep.draws()
            + self.lane.draws()
            + self.downhill.draws()
            + self.skill.draws()
            + self.dueling.draws()
            + self.gold.draws()
            + self.health.draws()
    }
}

/// Seed for the trial at `index` of a run seeded with `run_seed`.
#[must_use]
pub const fn trial_seed(run_seed: u64, index: u64) -> u64 {
    run_seed.wrapping_add(index)
}

/// Domain-separated seed derivation (HMAC-SHA256, first eight bytes).
#[must_use]
pub fn derive_stream_seed(user_seed: u64, domain_tag: &[u8]) -> u64 {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(&user_seed.to_le_bytes()).expect("64-bit seed is valid key");
    mac.update(domain_tag);
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}
