/// Load notifications delivered to the view layer over channels
use std::sync::mpsc::{self, Receiver, Sender};

use crate::range::{GenomicRange, ViewportId};

#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    /// New data is cached; the viewport should re-query its rows
    Loaded {
        viewport: ViewportId,
        range: GenomicRange,
        alignment_count: usize,
    },
    Failed {
        viewport: ViewportId,
        range: GenomicRange,
        message: String,
    },
    Cancelled {
        viewport: ViewportId,
        range: GenomicRange,
    },
}

impl LoadEvent {
    pub fn viewport(&self) -> ViewportId {
        match self {
            LoadEvent::Loaded { viewport, .. }
            | LoadEvent::Failed { viewport, .. }
            | LoadEvent::Cancelled { viewport, .. } => *viewport,
        }
    }

    pub fn range(&self) -> &GenomicRange {
        match self {
            LoadEvent::Loaded { range, .. }
            | LoadEvent::Failed { range, .. }
            | LoadEvent::Cancelled { range, .. } => range,
        }
    }
}

/// Fan-out to every registered receiver; dropped receivers are pruned
#[derive(Debug, Default)]
pub struct LoadListeners {
    senders: Vec<Sender<LoadEvent>>,
}

impl LoadListeners {
    pub fn add(&mut self, sender: Sender<LoadEvent>) {
        self.senders.push(sender);
    }

    pub fn subscribe(&mut self) -> Receiver<LoadEvent> {
        let (tx, rx) = mpsc::channel();
        self.senders.push(tx);
        rx
    }

    pub fn emit(&mut self, event: LoadEvent) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}
