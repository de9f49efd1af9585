//! Operator-facing output.

use parking_lot::Mutex;

/// Sink for messages meant for the person running the command.
pub trait OperatorNotifier: Send + Sync {
    /// A condition worth attention that does not stop the workflow.
    fn warn(&self, text: &str);

    /// A result line.
    fn report(&self, text: &str);
}

/// Notifier that keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    warnings: Mutex<Vec<String>>,
    reports: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }
}

impl OperatorNotifier for RecordingNotifier {
    fn warn(&self, text: &str) {
        self.warnings.lock().push(text.to_string());
    }

    fn report(&self, text: &str) {
        self.reports.lock().push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_keeps_order() {
        let notifier = RecordingNotifier::new();
        notifier.warn("first");
        notifier.report("done");
        notifier.warn("second");

        assert_eq!(notifier.warnings(), vec!["first", "second"]);
        assert_eq!(notifier.reports(), vec!["done"]);
    }
}
