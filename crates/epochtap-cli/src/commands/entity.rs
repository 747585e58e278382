use chrono::{TimeZone, Utc};
use clap::{Subcommand, ValueEnum};
use epochtap_core::{
    Activation, AdjustOutcome, Adjustment, CoreError, Decision, Delivery, MessageHandle, Outcome,
    RenewalPolicy, StatusOutcome,
};

use crate::context::{Context, Output};

const NOT_TRACKING: &str = "Tracking not active. Use `epochtap on` first.";

#[derive(Subcommand)]
pub enum EntityAction {
    /// Start tracking, or resume notifications
    On {
        /// Entity key (user or chat id)
        key: String,
        /// Delivery destination; defaults to the key
        #[arg(long)]
        target: Option<String>,
        /// Restart the cycle automatically once it is exhausted
        #[arg(long)]
        renew: bool,
    },
    /// Pause notifications; epoch counting continues
    Off {
        key: String,
        /// Suspend tracking entirely instead of just muting
        #[arg(long)]
        stop: bool,
    },
    /// Show current status (always delivers)
    Status {
        key: String,
        /// Print the outcome as JSON instead of the rendered message
        #[arg(long)]
        json: bool,
    },
    /// Run one periodic evaluation
    Tick { key: String },
    /// Manually correct the tapped-epoch count
    Tap {
        #[arg(value_enum)]
        direction: TapDirection,
        key: String,
    },
    /// Record the outcome of the current epoch
    Decide {
        key: String,
        #[arg(value_enum)]
        decision: DecisionArg,
        /// Id of the status message being answered
        #[arg(long)]
        message: Option<String>,
    },
    /// Delete all data for an entity
    Reset { key: String },
    /// List tracked entities
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TapDirection {
    Add,
    Remove,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DecisionArg {
    Tapped,
    Skipped,
}

impl From<TapDirection> for Adjustment {
    fn from(d: TapDirection) -> Self {
        match d {
            TapDirection::Add => Adjustment::Add,
            TapDirection::Remove => Adjustment::Remove,
        }
    }
}

impl From<DecisionArg> for Decision {
    fn from(d: DecisionArg) -> Self {
        match d {
            DecisionArg::Tapped => Decision::Tapped,
            DecisionArg::Skipped => Decision::Skipped,
        }
    }
}

pub async fn run(action: EntityAction) -> Result<(), Box<dyn std::error::Error>> {
    let output = match &action {
        EntityAction::Status { json: true, .. } => Output::Silent,
        _ => Output::Console,
    };
    let ctx = Context::open(output)?;

    match execute(&ctx, action).await {
        Err(e) if e.is_untracked() => {
            println!("{NOT_TRACKING}");
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}

async fn execute(ctx: &Context, action: EntityAction) -> Result<(), CoreError> {
    let tracker = &ctx.tracker;
    match action {
        EntityAction::On { key, target, renew } => {
            let target = target.unwrap_or_else(|| key.clone());
            let renewal = if renew {
                RenewalPolicy::Renew
            } else {
                RenewalPolicy::Terminal
            };
            match tracker.activate(&key, &target, renewal).await? {
                Activation::Created => {
                    println!("🔔 Notifications ON. Epoch tracking active.")
                }
                Activation::Resumed => println!("🔔 Notifications ON. Tracking resumed."),
            }
        }
        EntityAction::Off { key, stop } => {
            if stop {
                tracker.deactivate(&key).await?;
                println!("⏸️ Tracking suspended. Use `epochtap on` to resume.");
            } else {
                tracker.mute(&key).await?;
                println!("🔕 Notifications OFF. Epoch counting continues.");
            }
        }
        EntityAction::Status { key, json } => {
            let outcome = tracker.status(&key).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }
        EntityAction::Tick { key } => {
            let outcome = tracker.tick(&key).await?;
            if outcome.outcome == Outcome::Unchanged {
                println!("No new epoch yet.");
            } else {
                print_outcome(&outcome);
            }
        }
        EntityAction::Tap { direction, key } => {
            match tracker.adjust_tapped(&key, direction.into()).await? {
                AdjustOutcome::Added { .. } => println!("✅ One tapped epoch added."),
                AdjustOutcome::Removed { .. } => println!("➖ One tapped epoch removed."),
                AdjustOutcome::AlreadyZero => println!("Tapped epochs already zero."),
            }
        }
        EntityAction::Decide {
            key,
            decision,
            message,
        } => {
            let decision = Decision::from(decision);
            match message {
                Some(id) => {
                    let record = tracker.get(&key)?.ok_or_else(|| CoreError::NotFound {
                        key: key.clone(),
                    })?;
                    let handle = MessageHandle {
                        destination: record.delivery_target,
                        id,
                    };
                    tracker.acknowledge(&key, &handle, decision).await?;
                }
                None => tracker.record_decision(&key, decision).await?,
            }
            println!("Recorded for the current epoch.");
        }
        EntityAction::Reset { key } => {
            tracker.reset(&key).await?;
            println!("♻️ All data reset. Tracking stopped.");
        }
        EntityAction::List { json } => {
            let records = tracker.snapshot()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for (key, r) in records {
                    let started = Utc
                        .timestamp_opt(r.cycle_start, 0)
                        .single()
                        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                        .unwrap_or_else(|| r.cycle_start.to_string());
                    println!(
                        "{key}\ttarget={}\tstarted={started}\tepoch={}\ttapped={}\tnotify={}\tactive={}",
                        r.delivery_target,
                        r.last_epoch_emitted,
                        r.tapped_epochs,
                        r.notify_enabled,
                        r.active
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_outcome(outcome: &StatusOutcome) {
    match (&outcome.outcome, &outcome.delivery) {
        (Outcome::Exhausted, _) => {
            println!("🏁 Cycle complete. Use `epochtap reset` to start a new one.")
        }
        (_, Delivery::Failed(reason)) => eprintln!("warning: status not delivered: {reason}"),
        (Outcome::Finalized { .. }, Delivery::NotAttempted) => {
            println!("Epoch finalized (notifications off).")
        }
        _ => {}
    }
}
