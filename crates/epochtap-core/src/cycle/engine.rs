//! Epoch cycle state machine.
//!
//! The engine is a pure function over a record and a wall-clock reading. It
//! does not persist anything or talk to a transport: the caller stores the
//! returned record whenever [`Evaluation::changed`] is true and delivers the
//! emission if there is one.
//!
//! ## State Transitions
//!
//! ```text
//! Uninitialized -> Active -> Active                 (tick inside the cycle)
//!                         -> Exhausted (terminal)   (cycle elapsed, Terminal)
//!                         -> Active                 (cycle elapsed, Renew)
//! any -> removed                                    (explicit reset)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let engine = EpochEngine::new(CycleParams::default());
//! let eval = engine.evaluate(&record, now, false);
//! if eval.changed() {
//!     store.put(key, &eval.record)?;
//! }
//! ```

use serde::Serialize;
use tracing::debug;

use super::params::CycleParams;
use super::record::{Decision, RenewalPolicy, TrackedRecord};
use crate::tier::{tier_for, TierPlacement};

/// Counters surfaced to the entity after a finalization or a forced query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub current_epoch: u32,
    pub total_epochs: u32,
    pub remaining_epochs: u32,
    pub tapped_epochs: u32,
    pub tier: TierPlacement,
    pub remaining_in_tier: u32,
    pub used_taps: u64,
    pub remaining_taps: u64,
    pub max_taps: u64,
}

impl StatusReport {
    pub fn tier_name(&self) -> &'static str {
        self.tier.name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Record has `active = false`; nothing evaluated.
    Inactive,
    /// Non-renewing entity past the end of its cycle.
    Exhausted,
    /// Same epoch as the last finalization and not forced.
    Unchanged,
    /// Pending decision consumed and `last_epoch_emitted` moved to `epoch`.
    Finalized {
        epoch: u32,
        /// A `Tapped` decision was folded into `tapped_epochs`.
        credited: bool,
        /// The cycle wrapped before finalizing.
        renewed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub record: TrackedRecord,
    pub outcome: Outcome,
    pub emission: Option<StatusReport>,
    /// `now` was earlier than `cycle_start`; elapsed was clamped to zero.
    pub clock_anomaly: bool,
}

impl Evaluation {
    /// Whether the record must be persisted.
    pub fn changed(&self) -> bool {
        matches!(self.outcome, Outcome::Finalized { .. })
    }
}

#[derive(Debug, Clone)]
pub struct EpochEngine {
    params: CycleParams,
}

impl EpochEngine {
    pub fn new(params: CycleParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &CycleParams {
        &self.params
    }

    /// 1-based epoch for `elapsed` seconds, clamped to the last epoch.
    pub fn epoch_at(&self, elapsed: u64) -> u32 {
        let raw = elapsed / self.params.epoch_seconds.max(1) + 1;
        raw.min(self.params.total_epochs as u64) as u32
    }

    /// Advance `record` to `now`.
    ///
    /// Finalizes at most one pending decision per call and never twice for the
    /// same epoch unless `forced`, in which case the decision (if any) is
    /// consumed immediately.
    pub fn evaluate(&self, record: &TrackedRecord, now: i64, forced: bool) -> Evaluation {
        if !record.active {
            return Evaluation {
                record: record.clone(),
                outcome: Outcome::Inactive,
                emission: None,
                clock_anomaly: false,
            };
        }

        let mut next = record.clone();
        let (mut elapsed, clock_anomaly) = elapsed_since(next.cycle_start, now);
        if clock_anomaly {
            debug!(
                cycle_start = next.cycle_start,
                now, "clock behind cycle start, clamping elapsed to zero"
            );
        }

        let mut renewed = false;
        if elapsed > self.params.cycle_seconds() {
            match next.renewal {
                RenewalPolicy::Terminal => {
                    return Evaluation {
                        record: next,
                        outcome: Outcome::Exhausted,
                        emission: None,
                        clock_anomaly,
                    };
                }
                RenewalPolicy::Renew => {
                    next.restart_cycle(now);
                    elapsed = 0;
                    renewed = true;
                }
            }
        }

        let current_epoch = self.epoch_at(elapsed);
        if !forced && current_epoch == next.last_epoch_emitted {
            return Evaluation {
                record: next,
                outcome: Outcome::Unchanged,
                emission: None,
                clock_anomaly,
            };
        }

        let credited = next.pending_decision.take() == Some(Decision::Tapped);
        if credited {
            next.tapped_epochs = next.tapped_epochs.saturating_add(1);
        }
        next.last_epoch_emitted = current_epoch;

        let emission = if forced || next.notify_enabled {
            Some(self.report(current_epoch, next.tapped_epochs))
        } else {
            None
        };

        Evaluation {
            record: next,
            outcome: Outcome::Finalized {
                epoch: current_epoch,
                credited,
                renewed,
            },
            emission,
            clock_anomaly,
        }
    }

    /// Build the status counters for `epoch` and `tapped_epochs`.
    pub fn report(&self, epoch: u32, tapped_epochs: u32) -> StatusReport {
        let tier = tier_for(tapped_epochs);
        let used_taps = (tapped_epochs as u64).saturating_mul(self.params.taps_per_epoch as u64);
        StatusReport {
            current_epoch: epoch,
            total_epochs: self.params.total_epochs,
            remaining_epochs: self.params.total_epochs.saturating_sub(epoch),
            tapped_epochs,
            tier,
            remaining_in_tier: tier.remaining_in_tier(tapped_epochs),
            used_taps,
            remaining_taps: self.params.max_taps.saturating_sub(used_taps),
            max_taps: self.params.max_taps,
        }
    }
}

impl Default for EpochEngine {
    fn default() -> Self {
        Self::new(CycleParams::default())
    }
}

fn elapsed_since(cycle_start: i64, now: i64) -> (u64, bool) {
    let diff = now.saturating_sub(cycle_start);
    if diff < 0 {
        (0, true)
    } else {
        (diff as u64, false)
    }
}
