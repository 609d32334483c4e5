/// Seeded match RNG. Every shuffle, coin flip and pairing draw in a match goes
/// through one of these so a seed replays the same match.
#[derive(Clone, Debug)]
pub struct Rng {
    seed: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    pub fn next_f32(&mut self) -> f32 {
        self.seed = self.seed.wrapping_add(0x6d2b79f5);
        let mut t = self.seed;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        (out as f64 / 4_294_967_296.0) as f32
    }

    pub fn int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1) as f32;
        min + (self.next_f32() * span).floor() as i32
    }

    pub fn coin_flip(&mut self) -> bool {
        self.next_f32() < 0.5
    }

    pub fn pick_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        (self.next_f32() * len as f32).floor().min((len - 1) as f32) as usize
    }

    /// Fisher-Yates in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for idx in (1..items.len()).rev() {
            let swap_with = self.pick_index(idx + 1);
            items.swap(idx, swap_with);
        }
    }

    /// Picks an index with probability proportional to its weight. Non-positive
    /// or non-finite weights never win unless every weight is unusable, in which
    /// case the draw is uniform.
    pub fn weighted_index(&mut self, weights: &[f32]) -> Option<usize> {
        if weights.is_empty() {
            return None;
        }
        let total: f32 = weights
            .iter()
            .filter(|weight| weight.is_finite() && **weight > 0.0)
            .sum();
        if total <= 0.0 {
            return Some(self.pick_index(weights.len()));
        }

        let mut roll = self.next_f32() * total;
        let mut last_usable = 0;
        for (idx, weight) in weights.iter().enumerate() {
            if !weight.is_finite() || *weight <= 0.0 {
                continue;
            }
            last_usable = idx;
            if roll < *weight {
                return Some(idx);
            }
            roll -= weight;
        }
        Some(last_usable)
    }
}
