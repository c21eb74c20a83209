use rand::rngs::StdRng;
use rand::seq::SliceRandom;

pub const NEGATIVE_TABLE_SIZE: usize = 10_000_000;

/// Pre-shuffled pool of class indices for drawing negatives.
///
/// Class `i` appears roughly `sqrt(count_i) / sum_j sqrt(count_j)` of the
/// time, so frequent classes are damped relative to their raw counts.
pub struct NegativeTable {
    negatives: Vec<usize>,
    negpos: usize,
}

impl NegativeTable {
    pub fn new(counts: &[i64], rng: &mut StdRng) -> Self {
        let z: f64 = counts.iter().map(|&c| (c as f64).sqrt()).sum();
        let mut negatives = Vec::new();
        for (i, &c) in counts.iter().enumerate() {
            let c = (c as f64).sqrt();
            let reps = (c * NEGATIVE_TABLE_SIZE as f64 / z).ceil() as usize;
            for _ in 0..reps {
                negatives.push(i);
            }
        }
        negatives.shuffle(rng);
        NegativeTable {
            negatives,
            negpos: 0,
        }
    }

    /// Draw the next negative, skipping entries equal to `target`.
    ///
    /// Loops forever if `target` is the only class in the table; callers
    /// guarantee at least two classes have nonzero counts.
    pub fn next(&mut self, target: usize) -> usize {
        loop {
            let negative = self.negatives[self.negpos];
            self.negpos = (self.negpos + 1) % self.negatives.len();
            if negative != target {
                return negative;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.negatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.negatives.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.negatives
    }
}
