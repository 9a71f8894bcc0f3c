use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::protocol::OutgoingMessage;

/// Lifecycle of a session once its handshake has been accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Active,
  Paused,
  Terminated,
}

struct OutboxInner {
  state: SessionState,
  sender: Option<flume::Sender<String>>,
  queue: VecDeque<String>,
}

/// The session's send path.
///
/// All transitions and sends happen under one lock, so a flush on resume
/// can never interleave with a concurrent send.
pub struct Outbox {
  inner: Mutex<OutboxInner>,
}

impl Outbox {
  pub fn new(sender: flume::Sender<String>) -> Self {
    Self {
      inner: Mutex::new(OutboxInner {
        state: SessionState::Active,
        sender: Some(sender),
        queue: VecDeque::new(),
      }),
    }
  }

  /// Transmits immediately while active, queues while paused, drops once terminated.
  pub fn send(&self, json: String) {
    let mut inner = self.inner.lock();
    match inner.state {
      SessionState::Active => {
        if let Some(tx) = &inner.sender {
          // Transport already gone; the disconnect path will pause or terminate us.
          let _ = tx.send(json);
        }
      }
      SessionState::Paused => inner.queue.push_back(json),
      SessionState::Terminated => {}
    }
  }

  pub fn send_message(&self, msg: &OutgoingMessage) {
    self.send(msg.to_json());
  }

  /// Detaches the transport. Returns false unless the session was active.
  pub fn pause(&self) -> bool {
    let mut inner = self.inner.lock();
    if inner.state != SessionState::Active {
      return false;
    }
    inner.state = SessionState::Paused;
    inner.sender = None;
    true
  }

  /// Binds a new transport and replays the queue in order.
  ///
  /// Returns the number of replayed messages, or `None` if the session was not paused.
  pub fn resume(&self, sender: flume::Sender<String>) -> Option<usize> {
    let mut inner = self.inner.lock();
    if inner.state != SessionState::Paused {
      return None;
    }

    let replayed = inner.queue.len();
    for json in inner.queue.drain(..) {
      let _ = sender.send(json);
    }
    inner.sender = Some(sender);
    inner.state = SessionState::Active;
    Some(replayed)
  }

  /// Returns true only for the call that performed the transition.
  pub fn terminate(&self) -> bool {
    let mut inner = self.inner.lock();
    if inner.state == SessionState::Terminated {
      return false;
    }
    inner.state = SessionState::Terminated;
    inner.sender = None;
    inner.queue.clear();
    true
  }

  pub fn state(&self) -> SessionState {
    self.inner.lock().state
  }

  pub fn queued(&self) -> usize {
    self.inner.lock().queue.len()
  }
}
