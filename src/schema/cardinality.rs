//! Column cardinality estimation.
//!
//! Small columns track an exact distinct-value set; once a column crosses
//! `EXACT_THRESHOLD` distinct values observed, the estimator is promoted to
//! a HyperLogLog sketch so memory stays bounded regardless of table size.
//! The optimizer consumes [`CardinalityEstimator::estimate`] when costing
//! index selection and group-by cardinality.

use crate::value::Value;
use std::collections::HashSet;

/// Distinct values tracked exactly before promotion to HyperLogLog.
pub const EXACT_THRESHOLD: usize = 512;

/// Number of HyperLogLog registers: `2^PRECISION`.
const PRECISION: u32 = 12;
const NUM_REGISTERS: usize = 1 << PRECISION;

#[derive(Debug, Clone)]
pub enum CardinalityEstimator {
    Exact(HashSet<u64>),
    Approximate(HyperLogLog),
}

impl Default for CardinalityEstimator {
    fn default() -> Self {
        CardinalityEstimator::Exact(HashSet::new())
    }
}

impl CardinalityEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, value: &Value) {
        let key = value.hash_key();
        match self {
            CardinalityEstimator::Exact(set) => {
                set.insert(key);
                if set.len() > EXACT_THRESHOLD {
                    let mut hll = HyperLogLog::new();
                    for k in set.iter() {
                        hll.add_hash(*k);
                    }
                    *self = CardinalityEstimator::Approximate(hll);
                }
            }
            CardinalityEstimator::Approximate(hll) => hll.add_hash(key),
        }
    }

    pub fn estimate(&self) -> u64 {
        match self {
            CardinalityEstimator::Exact(set) => set.len() as u64,
            CardinalityEstimator::Approximate(hll) => hll.estimate(),
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, CardinalityEstimator::Exact(_))
    }
}

/// HyperLogLog++-style cardinality sketch with linear-counting small-range
/// correction. Uses the top `PRECISION` bits of a 64-bit hash to select a
/// register and the position of the leading one in the remaining bits as
/// the rank.
#[derive(Debug, Clone)]
pub struct HyperLogLog {
    registers: Vec<u8>,
}

impl HyperLogLog {
    pub fn new() -> Self {
        HyperLogLog {
            registers: vec![0u8; NUM_REGISTERS],
        }
    }

    pub fn add_hash(&mut self, hash: u64) {
        let idx = (hash >> (64 - PRECISION)) as usize;
        let rest = hash << PRECISION | (1 << (PRECISION - 1));
        let rank = rest.leading_zeros() as u8 + 1;
        if rank > self.registers[idx] {
            self.registers[idx] = rank;
        }
    }

    pub fn merge(&mut self, other: &HyperLogLog) {
        for (a, b) in self.registers.iter_mut().zip(other.registers.iter()) {
            if *b > *a {
                *a = *b;
            }
        }
    }

    pub fn estimate(&self) -> u64 {
        let m = NUM_REGISTERS as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);
        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2f64.powi(-(i32::from(r))))
            .sum();
        let raw = alpha * m * m / sum;

        let zeros = self.registers.iter().filter(|&&r| r == 0).count();
        if raw <= 2.5 * m && zeros > 0 {
            (m * (m / zeros as f64).ln()).round() as u64
        } else {
            raw.round() as u64
        }
    }
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_counts_small_columns() {
        let mut est = CardinalityEstimator::new();
        for v in ["a", "b", "a", "c"] {
            est.observe(&Value::String(v.to_string()));
        }
        assert_eq!(est.estimate(), 3);
        assert!(est.is_exact());
    }

    #[test]
    fn promotes_past_threshold() {
        let mut est = CardinalityEstimator::new();
        for i in 0..(EXACT_THRESHOLD + 10) {
            est.observe(&Value::Int64(i as i64));
        }
        assert!(!est.is_exact());
        // HLL has nonzero relative error; just check it's in the right ballpark.
        let estimate = est.estimate();
        assert!(estimate > (EXACT_THRESHOLD as u64 / 2));
    }

    #[test]
    fn hyperloglog_reasonably_close_on_large_input() {
        let mut hll = HyperLogLog::new();
        let n = 100_000u64;
        for i in 0..n {
            hll.add_hash(Value::Int64(i as i64).hash_key());
        }
        let est = hll.estimate() as f64;
        let error = (est - n as f64).abs() / n as f64;
        assert!(error < 0.1, "relative error too high: {error}");
    }
}
