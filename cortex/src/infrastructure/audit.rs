// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Audit Sinks - Structured log and Pub/Sub delivery of audit events
//
// TracingAuditSink writes every event as a structured `tracing` record.
// BroadcastAuditSink fans events out over a tokio broadcast channel so the
// CLI or an embedding host can observe arbitration live.
//
// Events are in-memory only; persistence belongs to whoever subscribes.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::{AuditEvent, AuditSink};

/// Writes audit events to the `memex::audit` tracing target
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&event)?;
        info!(
            target: "memex::audit",
            event_type = event.event_type(),
            timestamp = %event.timestamp(),
            payload = %payload,
            "audit"
        );
        Ok(())
    }
}

/// Broadcast channel for audit events
#[derive(Clone)]
pub struct BroadcastAuditSink {
    sender: Arc<broadcast::Sender<AuditEvent>>,
}

impl BroadcastAuditSink {
    /// Capacity bounds how many events are buffered before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn subscribe(&self) -> AuditReceiver {
        AuditReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastAuditSink {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[async_trait]
impl AuditSink for BroadcastAuditSink {
    async fn record(&self, event: AuditEvent) -> anyhow::Result<()> {
        debug!(event_type = event.event_type(), "Publishing audit event");

        // send() only fails when nobody is listening
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to audit event");
        }
        Ok(())
    }
}

pub struct AuditReceiver {
    receiver: broadcast::Receiver<AuditEvent>,
}

impl AuditReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<AuditEvent, AuditBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => AuditBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Audit receiver lagged by {} events", n);
                AuditBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<AuditEvent, AuditBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => AuditBusError::Empty,
            broadcast::error::TryRecvError::Closed => AuditBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Audit receiver lagged by {} events", n);
                AuditBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditBusError {
    #[error("Audit channel is closed")]
    Closed,

    #[error("No audit events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
