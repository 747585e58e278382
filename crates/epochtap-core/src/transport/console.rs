//! Console transport -- prints status messages to a writer (stdout by default).

use std::io::{self, Write};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{MessageHandle, StatusMessage, Transport};
use crate::error::DeliveryError;

pub struct ConsoleTransport<W: Write + Send = io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleTransport<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleTransport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_block(&self, block: &str) -> Result<(), DeliveryError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| DeliveryError::Unavailable("console writer poisoned".into()))?;
        writeln!(out, "{block}")
            .and_then(|_| out.flush())
            .map_err(|e| DeliveryError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl<W: Write + Send> Transport for ConsoleTransport<W> {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(
        &self,
        destination: &str,
        message: &StatusMessage,
    ) -> Result<MessageHandle, DeliveryError> {
        let buttons: Vec<&str> = message.actions.iter().map(|a| a.label).collect();
        self.write_block(&format!(
            "[{destination}]\n{}\n[ {} ]\n",
            message.text,
            buttons.join(" | ")
        ))?;
        Ok(MessageHandle {
            destination: destination.to_string(),
            id: uuid::Uuid::new_v4().to_string(),
        })
    }
}
