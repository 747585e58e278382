//! In-memory transport that records every delivery. Used by tests and dry runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{MessageHandle, StatusMessage, Transport};
use crate::error::DeliveryError;

#[derive(Debug, Clone)]
pub struct Delivered {
    pub handle: MessageHandle,
    pub message: StatusMessage,
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    delivered: Mutex<Vec<Delivered>>,
    revoked: Mutex<Vec<MessageHandle>>,
    failing: AtomicBool,
    next_id: AtomicU64,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `deliver` fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }

    pub fn revoked(&self) -> Vec<MessageHandle> {
        self.revoked.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(
        &self,
        destination: &str,
        message: &StatusMessage,
    ) -> Result<MessageHandle, DeliveryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeliveryError::Rejected {
                destination: destination.to_string(),
                message: "simulated failure".into(),
            });
        }
        let handle = MessageHandle {
            destination: destination.to_string(),
            id: self.next_id.fetch_add(1, Ordering::SeqCst).to_string(),
        };
        let mut delivered = self
            .delivered
            .lock()
            .map_err(|_| DeliveryError::Unavailable("recording lock poisoned".into()))?;
        delivered.push(Delivered {
            handle: handle.clone(),
            message: message.clone(),
        });
        Ok(handle)
    }

    async fn revoke_interactivity(&self, handle: &MessageHandle) -> Result<(), DeliveryError> {
        let mut revoked = self
            .revoked
            .lock()
            .map_err(|_| DeliveryError::Unavailable("recording lock poisoned".into()))?;
        revoked.push(handle.clone());
        Ok(())
    }
}
