use std::collections::VecDeque;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::packets::ResponseFrame;

/// How many unmatched inbound frames are retained for a waiter that has not
/// registered yet. Beyond this the oldest frame is evicted.
const UNCLAIMED_RETENTION: usize = 32;

/// Matches inbound frames to the pending calls that triggered them.
///
/// The controller echoes only the command name (there is no sequence id on
/// this protocol), so matching is by name: exact equality first, substring
/// containment as a fallback for firmware that decorates the echo. With two
/// in-flight commands whose names overlap, or an unsolicited status push
/// containing a pending name, a frame can be attributed to the wrong caller;
/// the oldest matching waiter always wins, which keeps SEQ-mode traffic
/// correct. Frames matching no waiter are kept in a bounded buffer rather
/// than dropped, so a waiter registered a beat late can still claim them.
#[derive(Debug, Default)]
pub struct Correlator {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    waiting: VecDeque<Waiter>,
    unclaimed: VecDeque<ResponseFrame>,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    command: String,
    tx: oneshot::Sender<ResponseFrame>,
}

/// Handle for one registered wait. Dropping it abandons the wait; the
/// registration should then be removed with [`Correlator::forget`].
#[derive(Debug)]
pub struct WaitTicket {
    pub(crate) id: u64,
    pub(crate) rx: oneshot::Receiver<ResponseFrame>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for the next frame matching `command`. Must be
    /// called before the command is enqueued; registering after opens a
    /// window where the response arrives with nobody waiting for it. If a
    /// retained unclaimed frame already matches, the ticket resolves
    /// immediately.
    pub async fn register(&self, command: &str) -> WaitTicket {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id;
        inner.next_id += 1;
        let (tx, rx) = oneshot::channel();
        if let Some(idx) = inner.unclaimed.iter().position(|f| matches(command, &f.command)) {
            let frame = inner.unclaimed.remove(idx).expect("index from position");
            debug!(command, "claimed retained frame");
            let _ = tx.send(frame);
        } else {
            inner.waiting.push_back(Waiter { id, command: command.to_string(), tx });
        }
        WaitTicket { id, rx }
    }

    /// Routes one inbound frame to the oldest matching waiter, or retains it
    /// (bounded) when nothing matches.
    pub async fn resolve(&self, frame: ResponseFrame) {
        let mut inner = self.inner.lock().await;
        if let Some(idx) = inner.waiting.iter().position(|w| matches(&w.command, &frame.command)) {
            let waiter = inner.waiting.remove(idx).expect("index from position");
            if waiter.tx.send(frame).is_err() {
                // The caller timed out between our lookup and the send.
                debug!(command = %waiter.command, "waiter gone, response dropped");
            }
        } else {
            if inner.unclaimed.len() == UNCLAIMED_RETENTION {
                let evicted = inner.unclaimed.pop_front();
                warn!(?evicted, "unclaimed frame buffer full, evicting oldest");
            }
            inner.unclaimed.push_back(frame);
        }
    }

    /// Removes a registration whose caller gave up (timeout or shutdown).
    pub async fn forget(&self, id: u64) {
        self.inner.lock().await.waiting.retain(|w| w.id != id);
    }

    /// Drops every pending waiter; their receivers resolve with an error
    /// immediately. Called when the session dies so no wait outlives it.
    pub async fn fail_all(&self) {
        let mut inner = self.inner.lock().await;
        inner.waiting.clear();
        inner.unclaimed.clear();
    }
}

fn matches(expected: &str, received: &str) -> bool {
    received == expected || received.contains(expected)
}
