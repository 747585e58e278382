//! Delivery collaborators.
//!
//! A transport turns a [`StatusMessage`] into something the entity sees and
//! returns a handle to it. The acknowledgment controls attached to a message
//! round-trip back into [`Tracker::acknowledge`](crate::Tracker::acknowledge).

mod console;
mod recording;

pub use console::ConsoleTransport;
pub use recording::{Delivered, RecordingTransport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cycle::{Decision, StatusReport};
use crate::error::DeliveryError;
use crate::format;

/// Reference to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub destination: String,
    pub id: String,
}

/// One acknowledgment button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub label: &'static str,
    pub decision: Decision,
}

pub const ACTIONS: [Action; 2] = [
    Action {
        label: "✅ Tapped",
        decision: Decision::Tapped,
    },
    Action {
        label: "⏭️ Not Tapped",
        decision: Decision::Skipped,
    },
];

/// Payload handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub text: String,
    pub report: StatusReport,
    pub actions: [Action; 2],
}

impl StatusMessage {
    pub fn new(report: StatusReport) -> Self {
        Self {
            text: format::render_status(&report),
            report,
            actions: ACTIONS,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Short identifier used in logs (e.g. "console").
    fn name(&self) -> &str;

    async fn deliver(
        &self,
        destination: &str,
        message: &StatusMessage,
    ) -> Result<MessageHandle, DeliveryError>;

    /// Strip the acknowledgment controls from an answered message.
    async fn revoke_interactivity(&self, _handle: &MessageHandle) -> Result<(), DeliveryError> {
        Ok(()) // default no-op
    }
}
