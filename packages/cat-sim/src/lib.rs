//! Offline simulation harness for the CAT engine.
//!
//! Loads a JSON corpus, runs simulated test takers with known ability through
//! complete sessions, and reports how well the final estimates recover them.

pub mod batch;
pub mod config;
pub mod corpus;
pub mod error;
pub mod logging;
pub mod respondent;

pub use batch::{run_batch, run_session, BatchSummary, SessionOutcome, SimulationPlan, ThetaSummary};
pub use config::SimConfig;
pub use corpus::{load_corpus, parse_corpus};
pub use error::{SimError, SimResult};
pub use respondent::{ResponseModel, SimulatedRespondent};
