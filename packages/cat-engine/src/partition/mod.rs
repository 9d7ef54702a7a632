//! Corpus Partitioner
//!
//! Splits a raw corpus into the phase pools a session consumes:
//! - instruction + practice rows, in a light and a heavy instruction track
//! - a fixed-size head of the remaining rows as the start (warm-up) set
//! - rows with usable IRT parameters as the adaptive pool
//! - everything else as the unnormed pool
//!
//! Per-task differences are expressed as a rule table keyed by trial type
//! rather than by string matching at call sites. Partitioning is pure and
//! order-preserving: the same corpus and rules always yield the same pools.

use std::collections::BTreeMap;

use rand::seq::index::sample;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ParamError;
use crate::types::{AssessmentStage, Item};

// ==================== Rule Table ====================

/// Which instruction track(s) an instruction/practice row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum InstructionTrack {
    #[default]
    Both,
    LightOnly,
    HeavyOnly,
}

impl InstructionTrack {
    fn in_light(&self) -> bool {
        matches!(self, InstructionTrack::Both | InstructionTrack::LightOnly)
    }

    fn in_heavy(&self) -> bool {
        matches!(self, InstructionTrack::Both | InstructionTrack::HeavyOnly)
    }
}

/// Classification rule for one trial type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TrialTypeRule {
    pub track: InstructionTrack,
    /// Test rows of this type are never adaptive, even with parameters
    pub exclude_from_cat: bool,
}

/// Declarative per-task partition configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartitionRules {
    /// Size of the start set taken from the head of the test rows
    pub start_items: usize,
    /// Trial type -> rule; unlisted types use `TrialTypeRule::default()`
    pub trial_types: BTreeMap<String, TrialTypeRule>,
}

impl PartitionRules {
    pub fn with_start_items(mut self, start_items: usize) -> Self {
        self.start_items = start_items;
        self
    }

    pub fn with_rule(mut self, trial_type: impl Into<String>, rule: TrialTypeRule) -> Self {
        self.trial_types.insert(trial_type.into(), rule);
        self
    }

    pub fn rule_for(&self, trial_type: &str) -> TrialTypeRule {
        self.trial_types
            .get(trial_type)
            .copied()
            .unwrap_or_default()
    }
}

/// A named block of a multi-block task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSpec {
    pub name: String,
    pub trial_types: Vec<String>,
}

impl BlockSpec {
    pub fn new(name: impl Into<String>, trial_types: &[&str]) -> Self {
        Self {
            name: name.into(),
            trial_types: trial_types.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn contains(&self, trial_type: &str) -> bool {
        self.trial_types.iter().any(|t| t == trial_type)
    }
}

// ==================== Pools ====================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhasePools {
    pub ip_light: Vec<Item>,
    pub ip_heavy: Vec<Item>,
    pub start: Vec<Item>,
    pub cat: Vec<Item>,
    pub unnormed: Vec<Item>,
}

impl PhasePools {
    /// Instruction and practice rows for the requested track
    pub fn instruction_practice(&self, heavy: bool) -> &[Item] {
        if heavy {
            &self.ip_heavy
        } else {
            &self.ip_light
        }
    }

    /// Item ids per pool, in pool order
    pub fn ids(&self) -> [Vec<&str>; 5] {
        fn ids(items: &[Item]) -> Vec<&str> {
            items.iter().map(|i| i.id.as_str()).collect()
        }
        [
            ids(&self.ip_light),
            ids(&self.ip_heavy),
            ids(&self.start),
            ids(&self.cat),
            ids(&self.unnormed),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPools {
    pub name: String,
    pub pools: PhasePools,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiBlockPools {
    pub blocks: Vec<BlockPools>,
    /// Rows whose trial type matches no block
    pub unassigned: Vec<Item>,
}

// ==================== Partitioning ====================

/// Partition a single-block corpus
pub fn partition(corpus: &[Item], rules: &PartitionRules) -> PhasePools {
    let mut pools = PhasePools::default();
    let mut start_remaining = rules.start_items;

    for item in corpus {
        let rule = rules.rule_for(&item.trial_type);

        if item.assessment_stage.is_instruction_or_practice() {
            if rule.track.in_light() {
                pools.ip_light.push(item.clone());
            }
            if rule.track.in_heavy() {
                pools.ip_heavy.push(item.clone());
            }
            continue;
        }

        if start_remaining > 0 {
            start_remaining -= 1;
            pools.start.push(item.clone());
            continue;
        }

        if rule.exclude_from_cat {
            tracing::debug!(
                item_id = %item.id,
                trial_type = %item.trial_type,
                "trial type excluded from adaptive pool"
            );
            pools.unnormed.push(item.clone());
            continue;
        }

        match item.irt_params() {
            Ok(_) => pools.cat.push(item.clone()),
            Err(ParamError::MissingDifficulty) => pools.unnormed.push(item.clone()),
            Err(err) => {
                tracing::warn!(
                    item_id = %item.id,
                    error = %err,
                    "malformed item parameters, routing to unnormed pool"
                );
                pools.unnormed.push(item.clone());
            }
        }
    }

    tracing::debug!(
        ip_light = pools.ip_light.len(),
        ip_heavy = pools.ip_heavy.len(),
        start = pools.start.len(),
        cat = pools.cat.len(),
        unnormed = pools.unnormed.len(),
        "corpus partitioned"
    );

    pools
}

/// Partition a multi-block corpus, classifying each block independently
pub fn partition_blocks(
    corpus: &[Item],
    rules: &PartitionRules,
    blocks: &[BlockSpec],
) -> MultiBlockPools {
    let mut per_block: Vec<Vec<Item>> = vec![Vec::new(); blocks.len()];
    let mut unassigned = Vec::new();

    for item in corpus {
        match blocks.iter().position(|b| b.contains(&item.trial_type)) {
            Some(idx) => per_block[idx].push(item.clone()),
            None => unassigned.push(item.clone()),
        }
    }

    if !unassigned.is_empty() {
        tracing::warn!(count = unassigned.len(), "corpus rows match no block");
    }

    let blocks = blocks
        .iter()
        .zip(per_block)
        .map(|(spec, items)| BlockPools {
            name: spec.name.clone(),
            pools: partition(&items, rules),
        })
        .collect();

    MultiBlockPools { blocks, unassigned }
}

/// Draw up to `n` items without replacement, in draw order
pub fn sample_unnormed<R: Rng + ?Sized>(pool: &[Item], n: usize, rng: &mut R) -> Vec<Item> {
    let amount = n.min(pool.len());
    sample(rng, pool.len(), amount)
        .into_iter()
        .map(|idx| pool[idx].clone())
        .collect()
}

/// Stage-only view used by callers that need to split an instruction track
pub fn split_instruction_practice(items: &[Item]) -> (Vec<Item>, Vec<Item>) {
    items
        .iter()
        .cloned()
        .partition(|item| item.assessment_stage == AssessmentStage::Instructions)
}
