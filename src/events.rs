use serde::Serialize;
use std::sync::mpsc::{channel, Receiver, Sender};

/// A write batch that failed to commit. Reported once, never retried.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WriteFailure {
    pub id: String,
    pub at: String,
    pub operation: String,
    pub batch_index: usize,
    pub op_count: usize,
    pub first_key: Option<String>,
    pub message: String,
}

/// Cloneable sending half handed to batch writers.
#[derive(Debug, Clone)]
pub struct FailureEmitter {
    tx: Sender<WriteFailure>,
}

impl FailureEmitter {
    pub fn emit(&self, failure: WriteFailure) {
        log::warn!(
            "{} batch {} failed ({} ops): {}",
            failure.operation,
            failure.batch_index,
            failure.op_count,
            failure.message
        );
        // The receiver lives as long as the app state; a send can only
        // fail during shutdown.
        let _ = self.tx.send(failure);
    }
}

/// Side channel for asynchronous write failures. Handlers emit into it;
/// the UI collects with `events.drain`.
#[derive(Debug)]
pub struct EventBus {
    tx: Sender<WriteFailure>,
    rx: Receiver<WriteFailure>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = channel();
        Self { tx, rx }
    }

    pub fn emitter(&self) -> FailureEmitter {
        FailureEmitter {
            tx: self.tx.clone(),
        }
    }

    pub fn drain(&self) -> Vec<WriteFailure> {
        self.rx.try_iter().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
