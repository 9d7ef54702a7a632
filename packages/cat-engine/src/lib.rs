#![deny(clippy::all)]
//! Computerized adaptive testing engine.
//!
//! Partitions an item corpus into session phases, estimates ability from the
//! response history with maximum likelihood (or EAP), picks each adaptive item
//! by difficulty or information, and decides when to stop. A
//! [`TrialSequencer`] ties these together behind a `next_trial` / `submit`
//! protocol.

pub mod config;
pub mod error;
pub mod estimator;
pub mod partition;
pub mod sanitize;
pub mod selector;
pub mod sequencer;
pub mod termination;
pub mod types;

pub use config::{CatConfig, EstimationMethod, ItemSelect, RecentIncorrectRule, TaskStopPolicy};
pub use error::{CatError, ConfigError, ParamError};
pub use estimator::{
    item_information, probability, test_information, AbilityEstimator, AbilityState, Estimate,
    EstimateStatus, EstimatorSettings,
};
pub use partition::{
    partition, partition_blocks, sample_unnormed, BlockPools, BlockSpec, InstructionTrack,
    MultiBlockPools, PartitionRules, PhasePools, TrialTypeRule,
};
pub use selector::ItemSelector;
pub use sequencer::{BlockSummary, ResponseRecord, SessionReport, Trial, TrialSequencer};
pub use termination::{should_continue, IncorrectTracker, StopReason, TerminationController};
pub use types::*;
