//! Item Selector
//!
//! Picks the next item from a caller-owned pool and removes it, so an item can
//! never be administered twice. Rules:
//! - `Closest`: difficulty numerically closest to theta
//! - `Mfi`: maximum Fisher information at theta
//! - `Random`: uniform over the eligible pool
//!
//! Deterministic rules break ties by lowest item id, compared as strings, so
//! "item-10" sorts before "item-9". Randomness comes from a seeded ChaCha8
//! stream so sessions can be replayed.

use std::cmp::Ordering;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::ItemSelect;
use crate::estimator::item_information;
use crate::types::{IrtParams, Item};

/// Seed from the system clock when none is configured
pub fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    })
}

pub struct ItemSelector {
    rule: ItemSelect,
    rng: ChaCha8Rng,
}

impl ItemSelector {
    pub fn new(rule: ItemSelect, seed: Option<u64>) -> Self {
        Self {
            rule,
            rng: ChaCha8Rng::seed_from_u64(resolve_seed(seed)),
        }
    }

    /// Create a selector with a specific seed (for testing)
    pub fn with_seed(rule: ItemSelect, seed: u64) -> Self {
        Self::new(rule, Some(seed))
    }

    pub fn rule(&self) -> ItemSelect {
        self.rule
    }

    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Remove and return the best eligible item for `theta`
    ///
    /// Items without usable IRT parameters are never eligible and stay in the
    /// pool. Returns `None` when nothing eligible remains.
    pub fn select_next(&mut self, pool: &mut Vec<Item>, theta: f64) -> Option<Item> {
        let eligible: Vec<(usize, IrtParams)> = pool
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| item.irt_params().ok().map(|p| (idx, p)))
            .collect();

        if eligible.is_empty() {
            return None;
        }

        let chosen = match self.rule {
            ItemSelect::Closest => best_by(pool, &eligible, |p| -(p.difficulty - theta).abs()),
            ItemSelect::Mfi => best_by(pool, &eligible, |p| item_information(p, theta)),
            ItemSelect::Random => eligible[self.rng.gen_range(0..eligible.len())].0,
        };

        let item = pool.remove(chosen);
        tracing::debug!(
            item_id = %item.id,
            difficulty = ?item.difficulty,
            theta,
            rule = ?self.rule,
            remaining = pool.len(),
            "item selected"
        );
        Some(item)
    }

    /// Take the next start-phase item: corpus order, or uniform when randomized
    pub fn select_start(&mut self, pool: &mut Vec<Item>, randomize: bool) -> Option<Item> {
        if pool.is_empty() {
            return None;
        }
        let idx = if randomize {
            self.rng.gen_range(0..pool.len())
        } else {
            0
        };
        Some(pool.remove(idx))
    }
}

/// Index of the eligible item with the highest score
///
/// Ties go to the lexicographically smallest id, independent of pool order.
fn best_by<F>(pool: &[Item], eligible: &[(usize, IrtParams)], score: F) -> usize
where
    F: Fn(&IrtParams) -> f64,
{
    let mut best = eligible[0].0;
    let mut best_score = score(&eligible[0].1);

    for &(idx, params) in &eligible[1..] {
        let s = score(&params);
        let better = match s.total_cmp(&best_score) {
            Ordering::Greater => true,
            Ordering::Equal => pool[idx].id < pool[best].id,
            Ordering::Less => false,
        };
        if better {
            best = idx;
            best_score = s;
        }
    }

    best
}
