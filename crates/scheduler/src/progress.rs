//! Progress fan-out
//!
//! Passes publish integer percentages (0-100); any number of subscribers
//! receive them over plain channels. Dropped receivers are pruned on the
//! next publish.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct ProgressHub {
    subscribers: Arc<Mutex<Vec<Sender<u8>>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<u8> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Sends `percent` (capped at 100) to every live subscriber.
    pub fn publish(&self, percent: u8) {
        let percent = percent.min(100);
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(percent).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

/// Percentage of `completed` out of `total`, rounded half up.
pub fn percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    let completed = u64::from(completed.min(total));
    let total = u64::from(total);
    ((200 * completed + total) / (2 * total)) as u8
}
