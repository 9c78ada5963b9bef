use std::collections::HashMap;

/// Label reported for detected people.
pub const PERSON: &str = "person";

/// Default overall pose score at which a person counts as present.
pub const DEFAULT_PRESENCE_THRESHOLD: f32 = 0.5;

/// Receives presence changes. Called only on edges, never for a repeated state.
pub trait PresenceSink: Send {
    fn presence_changed(&mut self, camera: &str, label: &str, present: bool);
}

/// Sink that reports edges to the log.
#[derive(Debug, Default)]
pub struct LogPresenceSink;

impl PresenceSink for LogPresenceSink {
    fn presence_changed(&mut self, camera: &str, label: &str, present: bool) {
        let state = if present { "ON" } else { "OFF" };
        log::info!("[{}] {} {}", camera, label, state);
    }
}

/// Last reported state per label. A label not yet reported is off.
#[derive(Debug, Default)]
pub struct PresenceStatus {
    labels: HashMap<String, bool>,
}

impl PresenceStatus {
    pub fn is_present(&self, label: &str) -> bool {
        self.labels.get(label).copied().unwrap_or(false)
    }

    /// Record `present` and report whether that is a change.
    pub fn update(&mut self, label: &str, present: bool) -> bool {
        let previous = self.labels.insert(label.to_string(), present);
        previous.unwrap_or(false) != present
    }
}
