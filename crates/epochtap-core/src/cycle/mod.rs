mod engine;
mod params;
mod record;

pub use engine::{EpochEngine, Evaluation, Outcome, StatusReport};
pub use params::CycleParams;
pub use record::{AdjustOutcome, Adjustment, Decision, RenewalPolicy, TrackedRecord};
