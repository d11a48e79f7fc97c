use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Random source behind the `random` opcode
pub trait RandomNumberGenerator {
    /// Switch to a predictable sequence determined by `seed`
    fn seed(&mut self, seed: u64);

    /// Switch back to an unpredictable sequence
    fn reseed_unpredictable(&mut self);

    /// Uniform value in 1..=range
    fn next_in_range(&mut self, range: u16) -> u16;
}

/// RandMode controls random generator behaviour. May be predictable for testing or truly random for gameplay
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RandMode {
    Predictable(u64),
    RandomUniform,
}

pub struct ZRand {
    rng: StdRng,
    rand_mode: RandMode,
}

impl ZRand {
    pub fn new(rm: RandMode) -> ZRand {
        let rng = match rm {
            RandMode::Predictable(seed) => StdRng::seed_from_u64(seed),
            RandMode::RandomUniform => StdRng::from_entropy(),
        };
        ZRand { rng, rand_mode: rm }
    }

    pub fn new_uniform() -> ZRand {
        ZRand::new(RandMode::RandomUniform)
    }

    pub fn new_predictable(seed: u64) -> ZRand {
        ZRand::new(RandMode::Predictable(seed))
    }

    pub fn mode(&self) -> RandMode {
        self.rand_mode
    }

    /// gen_unsigned_rand generates unsigned in range [0..32767]
    pub fn gen_unsigned_rand(&mut self) -> u16 {
        self.rng.gen_range(0..32768)
    }
}

impl RandomNumberGenerator for ZRand {
    fn seed(&mut self, seed: u64) {
        debug!("Random generator seeded with {}", seed);
        *self = ZRand::new_predictable(seed);
    }

    fn reseed_unpredictable(&mut self) {
        debug!("Random generator reseeded from entropy");
        *self = ZRand::new_uniform();
    }

    fn next_in_range(&mut self, range: u16) -> u16 {
        if range == 0 {
            return 0;
        }
        self.rng.gen_range(1..=range)
    }
}
