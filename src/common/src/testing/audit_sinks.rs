use std::sync::Mutex;

use async_trait::async_trait;

use crate::audit::AuditSink;
use crate::model::NewAuditEvent;

/// Sink that rejects every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn append(&self, event: NewAuditEvent) -> anyhow::Result<()> {
        anyhow::bail!("audit sink unavailable (dropping {})", event.event_type)
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<NewAuditEvent>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<NewAuditEvent> {
        self.events.lock().expect("audit mutex poisoned").clone()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<NewAuditEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.event_type == event_type)
            .collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn append(&self, event: NewAuditEvent) -> anyhow::Result<()> {
        self.events.lock().expect("audit mutex poisoned").push(event);
        Ok(())
    }
}
