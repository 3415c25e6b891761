use std::{collections::HashSet, time::Duration};

use axum::response::sse::{Event, KeepAlive};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};

/// Pipeline stage a debug tap event was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Validation,
    Persistence,
    Invalidation,
    Navigation,
    Auth,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Validation => "validation",
            StageKind::Persistence => "persistence",
            StageKind::Invalidation => "invalidation",
            StageKind::Navigation => "navigation",
            StageKind::Auth => "auth",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "validation" => Some(StageKind::Validation),
            "persistence" => Some(StageKind::Persistence),
            "invalidation" => Some(StageKind::Invalidation),
            "navigation" => Some(StageKind::Navigation),
            "auth" => Some(StageKind::Auth),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub stage: StageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

impl StageEvent {
    pub fn new(
        ts: chrono::DateTime<chrono::Utc>,
        stage: StageKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ts,
            stage,
            op: None,
            invoice_id: None,
            message: message.into(),
            payload: Value::Null,
        }
    }

    pub fn with_op(mut self, op: &'static str) -> Self {
        self.op = Some(op);
        self
    }

    pub fn with_invoice(mut self, id: impl Into<String>) -> Self {
        self.invoice_id = Some(id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn into_sse_event(self) -> Result<Event, serde_json::Error> {
        let event = Event::default().event(self.stage.as_str());
        let data = serde_json::to_string(&self)?;
        Ok(event.data(data))
    }
}

/// Fan-out of stage events to any attached `/_debug/tap` listeners.
#[derive(Clone)]
pub struct TapHub {
    sender: broadcast::Sender<StageEvent>,
}

impl Default for TapHub {
    fn default() -> Self {
        Self::new()
    }
}

impl TapHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(128);
        Self { sender }
    }

    /// Cheap check so callers can skip building events nobody will read.
    pub fn has_listeners(&self) -> bool {
        self.sender.receiver_count() > 0
    }

    pub fn publish(&self, event: StageEvent) {
        // Send only fails when nobody is listening, which is the normal state.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.sender.subscribe()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TapFilter {
    stages: Option<HashSet<StageKind>>,
}

impl TapFilter {
    pub fn from_stages(stages: Option<HashSet<StageKind>>) -> Self {
        Self { stages }
    }

    pub fn matches(&self, event: &StageEvent) -> bool {
        match &self.stages {
            Some(stages) => stages.contains(&event.stage),
            None => true,
        }
    }
}

pub fn tap_stream(
    hub: &TapHub,
    filter: TapFilter,
) -> impl Stream<Item = Result<Event, serde_json::Error>> + Send + 'static {
    BroadcastStream::new(hub.subscribe()).filter_map(move |result| match result {
        Ok(event) if filter.matches(&event) => Some(event.into_sse_event()),
        // Lagged receivers skip ahead.
        _ => None,
    })
}

pub fn tap_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(20))
        .text("heartbeat")
}

pub fn parse_stage_list(value: Option<&str>) -> Result<Option<HashSet<StageKind>>, String> {
    let Some(raw) = value else {
        return Ok(None);
    };
    let mut set = HashSet::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let lowered = item.to_lowercase();
        let stage =
            StageKind::parse(&lowered).ok_or_else(|| format!("unknown stage '{lowered}'"))?;
        set.insert(stage);
    }

    if set.is_empty() {
        Ok(None)
    } else {
        Ok(Some(set))
    }
}
