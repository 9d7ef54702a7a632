//! Trial Sequencer
//!
//! Drives one assessment session through
//! Instruction -> Practice -> Start -> Adaptive -> Unnormed -> Done.
//!
//! The caller pulls a trial with [`TrialSequencer::next_trial`], presents it,
//! and reports the outcome with [`TrialSequencer::submit`]. The next trial is
//! prepared eagerly after every submission, so [`TrialSequencer::phase`]
//! always names the phase of the trial that will be handed out next.
//!
//! Multi-block sessions repeat Instruction..Adaptive per block, each block
//! with its own ability state; the Unnormed phase runs once at the end over
//! the union of the blocks' unnormed pools.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::CatConfig;
use crate::error::CatError;
use crate::estimator::{AbilityEstimator, AbilityState, EstimateStatus};
use crate::partition::{
    partition, partition_blocks, sample_unnormed, split_instruction_practice, BlockPools,
    BlockSpec,
};
use crate::selector::ItemSelector;
use crate::termination::{IncorrectTracker, StopReason, TerminationController};
use crate::types::{Item, Phase, ScoredResponse};

/// Block name used for single-block sessions
pub const DEFAULT_BLOCK_NAME: &str = "main";

// ==================== Public Types ====================

/// One item handed to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trial {
    pub item: Item,
    pub phase: Phase,
    pub block: usize,
    pub block_name: String,
}

/// One logged response with the ability estimate after it was applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub item_id: String,
    pub item_uid: String,
    pub block: usize,
    pub phase: Phase,
    pub correct: bool,
    pub theta: f64,
    pub standard_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub name: String,
    pub theta: f64,
    pub standard_error: f64,
    pub status: EstimateStatus,
    /// Adaptive items administered in this block
    pub items_administered: usize,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub blocks: Vec<BlockSummary>,
    pub responses: Vec<ResponseRecord>,
    /// Task-level stop if one fired, otherwise the last block's adaptive stop
    pub end_reason: Option<StopReason>,
    pub completed: bool,
}

// ==================== Internal State ====================

struct BlockRun {
    name: String,
    instructions: VecDeque<Item>,
    practice: VecDeque<Item>,
    start: Vec<Item>,
    cat: Vec<Item>,
    ability: AbilityState,
    administered: usize,
    stop_reason: Option<StopReason>,
}

impl BlockRun {
    fn new(block: BlockPools, config: &CatConfig) -> Self {
        let (instructions, practice) =
            split_instruction_practice(block.pools.instruction_practice(config.heavy_instructions));
        Self {
            name: block.name,
            instructions: instructions.into(),
            practice: practice.into(),
            start: block.pools.start,
            cat: block.pools.cat,
            ability: AbilityState::from_config(config),
            administered: 0,
            stop_reason: None,
        }
    }

    fn summary(&self) -> BlockSummary {
        BlockSummary {
            name: self.name.clone(),
            theta: self.ability.theta(),
            standard_error: self.ability.standard_error(),
            status: self.ability.last_status(),
            items_administered: self.administered,
            stop_reason: self.stop_reason,
        }
    }
}

// ==================== Sequencer ====================

pub struct TrialSequencer {
    config: CatConfig,
    estimator: AbilityEstimator,
    termination: TerminationController,
    selector: ItemSelector,
    tracker: IncorrectTracker,
    blocks: Vec<BlockRun>,
    current_block: usize,
    unnormed_pool: Vec<Item>,
    unnormed_queue: Option<VecDeque<Item>>,
    phase: Phase,
    upcoming: Option<Trial>,
    presented: bool,
    responses: Vec<ResponseRecord>,
    task_stop: Option<StopReason>,
}

impl TrialSequencer {
    /// Single-block session over a raw corpus
    pub fn new(corpus: &[Item], config: CatConfig) -> Result<Self, CatError> {
        config.validate()?;
        let pools = partition(corpus, &config.partition);
        Self::from_pools(
            vec![BlockPools {
                name: DEFAULT_BLOCK_NAME.to_string(),
                pools,
            }],
            config,
        )
    }

    /// Multi-block session; rows matching no block are dropped with a warning
    pub fn with_blocks(
        corpus: &[Item],
        config: CatConfig,
        blocks: &[BlockSpec],
    ) -> Result<Self, CatError> {
        config.validate()?;
        let pools = partition_blocks(corpus, &config.partition, blocks);
        Self::from_pools(pools.blocks, config)
    }

    /// Session over already-partitioned pools, one entry per block
    pub fn from_pools(blocks: Vec<BlockPools>, config: CatConfig) -> Result<Self, CatError> {
        config.validate()?;

        let blocks = if blocks.is_empty() {
            vec![BlockPools {
                name: DEFAULT_BLOCK_NAME.to_string(),
                pools: Default::default(),
            }]
        } else {
            blocks
        };

        let unnormed_pool: Vec<Item> = blocks
            .iter()
            .flat_map(|b| b.pools.unnormed.iter().cloned())
            .collect();
        let runs: Vec<BlockRun> = blocks.into_iter().map(|b| BlockRun::new(b, &config)).collect();

        tracing::debug!(
            blocks = runs.len(),
            unnormed = unnormed_pool.len(),
            item_select = ?config.item_select,
            "session created"
        );

        let mut sequencer = Self {
            estimator: AbilityEstimator::from_config(&config),
            termination: TerminationController::from_config(&config),
            selector: ItemSelector::new(config.item_select, config.seed),
            tracker: IncorrectTracker::new(config.task_stop.clone()),
            blocks: runs,
            current_block: 0,
            unnormed_pool,
            unnormed_queue: None,
            phase: Phase::Instruction,
            upcoming: None,
            presented: false,
            responses: Vec::new(),
            task_stop: None,
            config,
        };
        sequencer.prepare();
        Ok(sequencer)
    }

    /// Phase of the next trial, or `Done`
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn current_block(&self) -> usize {
        self.current_block
    }

    /// Ability state of the current block
    pub fn ability(&self) -> &AbilityState {
        &self.blocks[self.current_block].ability
    }

    pub fn responses(&self) -> &[ResponseRecord] {
        &self.responses
    }

    pub fn config(&self) -> &CatConfig {
        &self.config
    }

    /// Hand out the next trial
    ///
    /// Calling again before `submit` returns the same trial.
    pub fn next_trial(&mut self) -> Option<Trial> {
        let trial = self.upcoming.clone()?;
        self.presented = true;
        Some(trial)
    }

    /// Record the response to the presented trial and prepare the next one
    ///
    /// Returns the phase of the next trial.
    pub fn submit(&mut self, correct: bool) -> Result<Phase, CatError> {
        if !self.presented {
            return Err(if self.phase == Phase::Done {
                CatError::SessionFinished
            } else {
                CatError::NoPendingTrial
            });
        }
        let trial = self.upcoming.take().ok_or(CatError::NoPendingTrial)?;
        self.presented = false;

        let block = &mut self.blocks[trial.block];
        if trial.phase == Phase::Adaptive {
            match trial.item.irt_params() {
                Ok(params) => {
                    block
                        .ability
                        .record(&self.estimator, ScoredResponse::new(params, correct));
                }
                Err(err) => {
                    tracing::warn!(
                        item_id = %trial.item.id,
                        error = %err,
                        "adaptive item without usable parameters, response not scored"
                    );
                }
            }
            block.administered += 1;
        }

        self.responses.push(ResponseRecord {
            item_id: trial.item.id.clone(),
            item_uid: trial.item.uid.clone(),
            block: trial.block,
            phase: trial.phase,
            correct,
            theta: block.ability.theta(),
            standard_error: block.ability.standard_error(),
        });

        if trial.phase == Phase::Instruction {
            self.tracker.reset_run();
        } else if trial.phase.is_scored() {
            if let Some(reason) = self.tracker.record(correct) {
                self.end_task(reason);
                return Ok(self.phase);
            }
        }

        self.prepare();
        Ok(self.phase)
    }

    /// Snapshot of the session so far
    pub fn report(&self) -> SessionReport {
        let end_reason = self
            .task_stop
            .or_else(|| self.blocks.last().and_then(|b| b.stop_reason));
        SessionReport {
            blocks: self.blocks.iter().map(BlockRun::summary).collect(),
            responses: self.responses.clone(),
            end_reason,
            completed: self.is_done(),
        }
    }

    fn end_task(&mut self, reason: StopReason) {
        let block = &mut self.blocks[self.current_block];
        if block.stop_reason.is_none() && block.administered > 0 {
            block.stop_reason = Some(reason);
        }
        tracing::info!(
            reason = ?reason,
            incorrect_in_row = self.tracker.incorrect_in_row(),
            responses = self.responses.len(),
            "task stopped early"
        );
        self.task_stop = Some(reason);
        self.phase = Phase::Done;
        self.upcoming = None;
    }

    fn finish_block(&mut self, reason: StopReason) {
        let block = &mut self.blocks[self.current_block];
        block.stop_reason = Some(reason);
        tracing::info!(
            block = %block.name,
            reason = ?reason,
            items = block.administered,
            theta = block.ability.theta(),
            standard_error = block.ability.standard_error(),
            "adaptive phase finished"
        );

        if self.current_block + 1 < self.blocks.len() {
            self.current_block += 1;
            self.phase = Phase::Instruction;
        } else {
            self.phase = Phase::Unnormed;
        }
    }

    fn present(&mut self, item: Item) {
        self.upcoming = Some(Trial {
            item,
            phase: self.phase,
            block: self.current_block,
            block_name: self.blocks[self.current_block].name.clone(),
        });
    }

    /// Advance through phases until a trial is ready or the session is done
    fn prepare(&mut self) {
        self.upcoming = None;
        self.presented = false;

        loop {
            let idx = self.current_block;
            match self.phase {
                Phase::Done => return,
                Phase::Instruction => match self.blocks[idx].instructions.pop_front() {
                    Some(item) => return self.present(item),
                    None => self.phase = Phase::Practice,
                },
                Phase::Practice => match self.blocks[idx].practice.pop_front() {
                    Some(item) => return self.present(item),
                    None => self.phase = Phase::Start,
                },
                Phase::Start => {
                    let block = &mut self.blocks[idx];
                    match self
                        .selector
                        .select_start(&mut block.start, self.config.randomize_start)
                    {
                        Some(item) => return self.present(item),
                        None => {
                            tracing::debug!(block = %block.name, "entering adaptive phase");
                            self.phase = Phase::Adaptive;
                        }
                    }
                }
                Phase::Adaptive => {
                    let block = &mut self.blocks[idx];
                    let check = self
                        .termination
                        .check(block.ability.standard_error(), block.administered);
                    if let Some(reason) = check {
                        self.finish_block(reason);
                        continue;
                    }
                    match self.selector.select_next(&mut block.cat, block.ability.theta()) {
                        Some(item) => return self.present(item),
                        None => {
                            let reason = if block.administered == 0 {
                                StopReason::EmptyPool
                            } else {
                                StopReason::PoolExhausted
                            };
                            self.finish_block(reason);
                        }
                    }
                }
                Phase::Unnormed => {
                    if self.unnormed_queue.is_none() {
                        let drawn = sample_unnormed(
                            &self.unnormed_pool,
                            self.config.unnormed_count,
                            self.selector.rng_mut(),
                        );
                        tracing::debug!(
                            drawn = drawn.len(),
                            pool = self.unnormed_pool.len(),
                            "unnormed items sampled"
                        );
                        self.unnormed_queue = Some(drawn.into());
                    }
                    match self.unnormed_queue.as_mut().and_then(VecDeque::pop_front) {
                        Some(item) => return self.present(item),
                        None => {
                            tracing::debug!(responses = self.responses.len(), "session complete");
                            self.phase = Phase::Done;
                        }
                    }
                }
            }
        }
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RecentIncorrectRule, TaskStopPolicy};
    use crate::partition::PartitionRules;
    use crate::types::AssessmentStage;
    use std::collections::HashSet;

    fn corpus() -> Vec<Item> {
        let mut items = vec![
            Item::new("inst-1", AssessmentStage::Instructions),
            Item::new("prac-1", AssessmentStage::PracticeResponse).with_difficulty(-2.0),
            Item::test("start-1", -1.0),
        ];
        for i in 0..8 {
            items.push(Item::test(format!("cat-{i}"), -2.0 + i as f64 * 0.5));
        }
        items.push(Item::new("new-1", AssessmentStage::TestResponse));
        items.push(Item::new("new-2", AssessmentStage::TestResponse));
        items
    }

    fn config() -> CatConfig {
        CatConfig {
            seed: Some(42),
            unnormed_count: 5,
            partition: PartitionRules::default().with_start_items(1),
            ..Default::default()
        }
    }

    fn run(seq: &mut TrialSequencer, mut answer: impl FnMut(&Trial) -> bool) -> Vec<Trial> {
        let mut trials = Vec::new();
        while let Some(trial) = seq.next_trial() {
            let correct = answer(&trial);
            seq.submit(correct).unwrap();
            trials.push(trial);
        }
        trials
    }

    #[test]
    fn test_phases_run_in_order() {
        let mut seq = TrialSequencer::new(&corpus(), config()).unwrap();
        assert_eq!(seq.phase(), Phase::Instruction);

        let trials = run(&mut seq, |t| t.item.difficulty.is_none_or(|b| b <= 0.0));
        let phases: Vec<Phase> = trials.iter().map(|t| t.phase).collect();

        assert_eq!(phases[0], Phase::Instruction);
        assert_eq!(phases[1], Phase::Practice);
        assert_eq!(phases[2], Phase::Start);
        assert!(phases[3..].iter().take_while(|p| **p == Phase::Adaptive).count() > 0);
        assert_eq!(phases.iter().filter(|p| **p == Phase::Unnormed).count(), 2);
        assert_eq!(*phases.last().unwrap(), Phase::Unnormed);

        let mut sorted = phases.clone();
        sorted.sort_by_key(|p| *p as u8);
        assert_eq!(sorted, phases);

        assert!(seq.is_done());
        assert!(seq.next_trial().is_none());
        assert!(matches!(seq.submit(true), Err(CatError::SessionFinished)));
    }

    #[test]
    fn test_submit_without_trial_is_rejected() {
        let mut seq = TrialSequencer::new(&corpus(), config()).unwrap();
        assert!(matches!(seq.submit(true), Err(CatError::NoPendingTrial)));

        let first = seq.next_trial().unwrap();
        let again = seq.next_trial().unwrap();
        assert_eq!(first.item.id, again.item.id);
        assert!(seq.submit(true).is_ok());
        assert!(matches!(seq.submit(true), Err(CatError::NoPendingTrial)));
        assert_eq!(seq.responses().len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let bad = CatConfig {
            max_items: 0,
            ..Default::default()
        };
        assert!(matches!(
            TrialSequencer::new(&corpus(), bad),
            Err(CatError::Config(_))
        ));
    }

    #[test]
    fn test_theta_only_moves_in_adaptive_phase() {
        let mut seq = TrialSequencer::new(&corpus(), config()).unwrap();
        run(&mut seq, |_| true);

        for record in seq.responses() {
            if record.phase != Phase::Adaptive && record.phase != Phase::Unnormed {
                assert_eq!(record.theta, 0.0, "{:?} moved theta", record.phase);
            }
        }
        let adaptive_last = seq
            .responses()
            .iter()
            .rfind(|r| r.phase == Phase::Adaptive)
            .unwrap()
            .theta;
        for record in seq.responses().iter().filter(|r| r.phase == Phase::Unnormed) {
            assert_eq!(record.theta, adaptive_last);
        }
    }

    #[test]
    fn test_empty_adaptive_pool_skips_to_unnormed() {
        let items = vec![
            Item::new("inst", AssessmentStage::Instructions),
            Item::new("new-1", AssessmentStage::TestResponse),
        ];
        let cfg = CatConfig {
            partition: PartitionRules::default(),
            ..config()
        };
        let mut seq = TrialSequencer::new(&items, cfg).unwrap();
        let trials = run(&mut seq, |_| true);

        assert_eq!(trials.len(), 2);
        assert_eq!(trials[1].phase, Phase::Unnormed);
        let report = seq.report();
        assert_eq!(report.blocks[0].stop_reason, Some(StopReason::EmptyPool));
        assert!(report.completed);
    }

    #[test]
    fn test_empty_corpus_finishes_immediately() {
        let mut seq = TrialSequencer::new(&[], config()).unwrap();
        assert!(seq.is_done());
        assert!(seq.next_trial().is_none());
        assert_eq!(seq.report().end_reason, Some(StopReason::EmptyPool));
    }

    #[test]
    fn test_adaptive_stops_at_max_items() {
        let cfg = CatConfig {
            max_items: 3,
            sem_threshold: 0.0,
            ..config()
        };
        let mut seq = TrialSequencer::new(&corpus(), cfg).unwrap();
        run(&mut seq, |t| t.item.difficulty.is_some_and(|b| b < 0.0));

        let report = seq.report();
        assert_eq!(report.blocks[0].items_administered, 3);
        assert_eq!(report.blocks[0].stop_reason, Some(StopReason::MaxItems));
    }

    #[test]
    fn test_pool_exhaustion_ends_adaptive_phase() {
        let cfg = CatConfig {
            sem_threshold: 0.0,
            ..config()
        };
        let mut seq = TrialSequencer::new(&corpus(), cfg).unwrap();
        let trials = run(&mut seq, |t| t.item.difficulty.is_some_and(|b| b <= 0.0));

        let adaptive: Vec<&Trial> = trials.iter().filter(|t| t.phase == Phase::Adaptive).collect();
        assert_eq!(adaptive.len(), 8);
        let ids: HashSet<&str> = adaptive.iter().map(|t| t.item.id.as_str()).collect();
        assert_eq!(ids.len(), 8);
        assert_eq!(
            seq.report().blocks[0].stop_reason,
            Some(StopReason::PoolExhausted)
        );
    }

    #[test]
    fn test_incorrect_in_row_ends_task() {
        let cfg = CatConfig {
            task_stop: TaskStopPolicy {
                max_incorrect_in_row: Some(3),
                recent_incorrect: None,
            },
            ..config()
        };
        let mut seq = TrialSequencer::new(&corpus(), cfg).unwrap();
        let trials = run(&mut seq, |_| false);

        // practice is unscored, so the run starts at the start item
        assert_eq!(trials.len(), 2 + 3);
        let report = seq.report();
        assert_eq!(report.end_reason, Some(StopReason::MaxIncorrectInRow));
        assert!(report.completed);
    }

    #[test]
    fn test_recent_incorrect_ends_task() {
        let cfg = CatConfig {
            task_stop: TaskStopPolicy {
                max_incorrect_in_row: None,
                recent_incorrect: Some(RecentIncorrectRule {
                    window: 4,
                    max_incorrect: 2,
                }),
            },
            ..config()
        };
        let mut seq = TrialSequencer::new(&corpus(), cfg).unwrap();
        let mut count = 0;
        let trials = run(&mut seq, |_| {
            count += 1;
            count % 2 == 0
        });

        // wrong on the start item and the second adaptive item
        assert_eq!(trials.len(), 5);
        assert_eq!(seq.report().end_reason, Some(StopReason::RecentIncorrect));
    }

    #[test]
    fn test_multi_block_runs_independent_sessions() {
        let mut items = Vec::new();
        for (prefix, trial_type) in [("v", "vocab"), ("s", "syntax")] {
            items.push(
                Item::new(format!("{prefix}-inst"), AssessmentStage::Instructions)
                    .with_trial_type(trial_type),
            );
            for i in 0..5 {
                let b = -1.0 + i as f64 * 0.5;
                items.push(Item::test(format!("{prefix}-{i}"), b).with_trial_type(trial_type));
            }
            items.push(
                Item::new(format!("{prefix}-new"), AssessmentStage::TestResponse)
                    .with_trial_type(trial_type),
            );
        }
        let blocks = [
            BlockSpec::new("vocab", &["vocab"]),
            BlockSpec::new("syntax", &["syntax"]),
        ];
        let cfg = CatConfig {
            seed: Some(1),
            ..Default::default()
        };
        let mut seq = TrialSequencer::with_blocks(&items, cfg, &blocks).unwrap();
        let trials = run(&mut seq, |t| t.block == 0);

        let block_order: Vec<usize> = trials
            .iter()
            .filter(|t| t.phase != Phase::Unnormed)
            .map(|t| t.block)
            .collect();
        assert!(block_order.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(trials.iter().filter(|t| t.phase == Phase::Unnormed).count(), 2);

        let report = seq.report();
        assert_eq!(report.blocks.len(), 2);
        assert_eq!(report.blocks[0].name, "vocab");
        assert!(report.blocks[0].theta > 0.0);
        assert!(report.blocks[1].theta < 0.0);
    }

    #[test]
    fn test_report_serializes() {
        let mut seq = TrialSequencer::new(&corpus(), config()).unwrap();
        run(&mut seq, |_| true);
        let json = serde_json::to_string(&seq.report()).unwrap();
        assert!(json.contains("\"responses\""));
        assert!(json.contains("\"endReason\""));
    }
}
