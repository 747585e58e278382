use serde::{Deserialize, Deserializer, Serialize};

use crate::transport::MessageHandle;

/// Self-reported outcome for the epoch currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Tapped,
    Skipped,
}

/// What happens once an entity's cycle runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenewalPolicy {
    /// Stop producing output until explicitly reset.
    #[default]
    Terminal,
    /// Start a fresh cycle at the evaluation time (group trackers).
    Renew,
}

/// Direction of a manual tap correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adjustment {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AdjustOutcome {
    Added { tapped_epochs: u32 },
    Removed { tapped_epochs: u32 },
    /// Removal requested at zero; nothing changed.
    AlreadyZero,
}

/// Persistent per-entity state.
///
/// Only [`EpochEngine`](super::EpochEngine) and the two correction methods
/// below mutate it; stores treat it as an opaque blob.
///
/// Snapshots written by the chat bot deserialize as well: they use
/// `last_epoch_seen`, `notify`, `current_decision` and a numeric `chat_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedRecord {
    /// Unix seconds at the start of epoch 1.
    pub cycle_start: i64,
    pub tapped_epochs: u32,
    /// Highest epoch already finalized; 0 before the first evaluation.
    #[serde(alias = "last_epoch_seen")]
    pub last_epoch_emitted: u32,
    #[serde(default, alias = "current_decision")]
    pub pending_decision: Option<Decision>,
    #[serde(alias = "notify")]
    pub notify_enabled: bool,
    pub active: bool,
    #[serde(alias = "chat_id", deserialize_with = "string_or_integer")]
    pub delivery_target: String,
    #[serde(default)]
    pub renewal: RenewalPolicy,
    /// Most recent status message still carrying acknowledgment buttons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<MessageHandle>,
}

fn string_or_integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Target {
        Text(String),
        Number(i64),
    }

    Ok(match Target::deserialize(deserializer)? {
        Target::Text(text) => text,
        Target::Number(n) => n.to_string(),
    })
}

impl TrackedRecord {
    /// Fresh record whose cycle starts at `now`.
    pub fn new(now: i64, delivery_target: impl Into<String>, renewal: RenewalPolicy) -> Self {
        Self {
            cycle_start: now,
            tapped_epochs: 0,
            last_epoch_emitted: 0,
            pending_decision: None,
            notify_enabled: true,
            active: true,
            delivery_target: delivery_target.into(),
            renewal,
            last_message: None,
        }
    }

    /// Set the outcome for the current, unfinalized epoch. Last write wins.
    pub fn record_decision(&mut self, decision: Decision) {
        self.pending_decision = Some(decision);
    }

    /// Out-of-band correction of the tapped count, floored at zero.
    pub fn adjust_tapped(&mut self, adjustment: Adjustment) -> AdjustOutcome {
        match adjustment {
            Adjustment::Add => {
                self.tapped_epochs = self.tapped_epochs.saturating_add(1);
                AdjustOutcome::Added {
                    tapped_epochs: self.tapped_epochs,
                }
            }
            Adjustment::Remove if self.tapped_epochs == 0 => AdjustOutcome::AlreadyZero,
            Adjustment::Remove => {
                self.tapped_epochs -= 1;
                AdjustOutcome::Removed {
                    tapped_epochs: self.tapped_epochs,
                }
            }
        }
    }

    /// Back to the first epoch of a new cycle starting at `now`.
    pub(crate) fn restart_cycle(&mut self, now: i64) {
        self.cycle_start = now;
        self.last_epoch_emitted = 0;
        self.pending_decision = None;
        self.tapped_epochs = 0;
    }
}
