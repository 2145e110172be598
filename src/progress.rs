use std::sync::mpsc::Sender;

/// A single unit-of-work notification emitted by the loading and export
/// workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub index: usize,
    pub total: usize,
    pub message: &'static str,
}

/// Sending half of a progress channel.
///
/// A disconnected receiver is ignored, so an abandoned observer can never
/// bring down an in-flight worker.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<Sender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event.
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn emit(&self, index: usize, total: usize, message: &'static str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent {
                index,
                total,
                message,
            });
        }
    }
}
