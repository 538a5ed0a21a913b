// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Audit Publisher - fire-and-forget delivery to the optional audit sink
//
// Each event is recorded on a spawned task. A sink failure is logged and
// swallowed; the audit trail never changes the outcome of the operation that
// produced the event. Must be called from within a tokio runtime.

use std::sync::Arc;
use tracing::warn;

use crate::domain::{AuditEvent, AuditSink};

#[derive(Clone, Default)]
pub struct AuditPublisher {
    sink: Option<Arc<dyn AuditSink>>,
}

impl AuditPublisher {
    pub fn new(sink: Option<Arc<dyn AuditSink>>) -> Self {
        Self { sink }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn publish(&self, event: AuditEvent) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        tokio::spawn(async move {
            let event_type = event.event_type();
            if let Err(e) = sink.record(event).await {
                warn!(event_type, error = %e, "Failed to record audit event");
            }
        });
    }
}
