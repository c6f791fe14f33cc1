use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use podesk_runtime::{DispatchError, Escalation, ReminderDispatcher};
use tokio::sync::Mutex;

/// Records every dispatch attempt. Can be switched to fail.
#[derive(Default)]
pub struct RecordingDispatcher {
    delivered: Mutex<Vec<Escalation>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let d = Self::default();
        d.set_fail(true);
        d
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Calls to `dispatch`, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successfully delivered escalations, in order.
    pub async fn delivered(&self) -> Vec<Escalation> {
        self.delivered.lock().await.clone()
    }
}

#[async_trait]
impl ReminderDispatcher for RecordingDispatcher {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn dispatch(&self, escalation: &Escalation) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport("injected dispatch failure".to_string()));
        }
        self.delivered.lock().await.push(escalation.clone());
        Ok(())
    }
}
