//! The engine thread.
//!
//! One [`Engine`] owns the driver, the waveform backend, the ramp and the
//! position model. It is reachable only through the command channel, so no
//! state is ever shared with the control side beyond the busy flag.

mod busy;
mod controller;
mod protocol;
mod scheduler;

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

pub use busy::{BusyGuard, BusySignal};
pub use controller::Engine;
pub use protocol::{Command, MicrostepChange, Query, Reading, Reply, Tag, Verb};

pub(crate) use protocol::mismatch;

/// Control-side end of the link to an engine.
#[derive(Debug)]
pub(crate) struct ControlLink {
    pub commands: Sender<(Tag, Command)>,
    pub replies: Receiver<(Tag, Reply)>,
    pub busy: Arc<BusySignal>,
    /// Tag of the most recent request.
    pub last_tag: Tag,
}

/// Engine-side end of the link.
#[derive(Debug)]
pub(crate) struct EngineLink {
    pub commands: Receiver<(Tag, Command)>,
    pub replies: Sender<(Tag, Reply)>,
    pub busy: Arc<BusySignal>,
}

/// Create the two ends of a control/engine link.
pub(crate) fn link() -> (ControlLink, EngineLink) {
    let (command_tx, command_rx) = mpsc::channel();
    let (reply_tx, reply_rx) = mpsc::channel();
    let busy = Arc::new(BusySignal::new());

    (
        ControlLink {
            commands: command_tx,
            replies: reply_rx,
            busy: Arc::clone(&busy),
            last_tag: 0,
        },
        EngineLink {
            commands: command_rx,
            replies: reply_tx,
            busy,
        },
    )
}
