//! Pending-request registry: maps outgoing message ids to reply handlers.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bfo_cbor::Value;

/// Receives every reply correlated to one outgoing message.
///
/// Return `true` once the reply is final; the entry is then dropped and any
/// later frame for the same id is ignored.  Returning `false` keeps the
/// handler registered for streamed, multi-part responses.
///
/// ```rust
/// use bfo_cbor::Value;
/// use bfo_publisher::PendingRequests;
///
/// let mut pending = PendingRequests::new();
/// pending.insert(1, |reply: Value| reply.get("complete").is_some());
/// assert_eq!(pending.len(), 1);
/// ```
pub trait ReplyHandler: Send + 'static {
    fn on_reply(&mut self, reply: Value) -> bool;
}

impl<F> ReplyHandler for F
where
    F: FnMut(Value) -> bool + Send + 'static,
{
    fn on_reply(&mut self, reply: Value) -> bool {
        self(reply)
    }
}

/// Outcome of routing one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// No handler for this id; the reply was dropped.
    Unmatched,
    /// The handler wants more replies.
    Retained,
    /// The handler signalled completion and was removed.
    Completed,
    /// The handler panicked.  It stays registered.
    Panicked(String),
}

#[derive(Default)]
pub struct PendingRequests {
    handlers: HashMap<u64, Box<dyn ReplyHandler>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for `id`.
    pub fn insert(&mut self, id: u64, handler: impl ReplyHandler) {
        self.handlers.insert(id, Box::new(handler));
    }

    pub(crate) fn insert_boxed(&mut self, id: u64, handler: Box<dyn ReplyHandler>) {
        self.handlers.insert(id, handler);
    }

    pub fn remove(&mut self, id: u64) -> bool {
        self.handlers.remove(&id).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Drop every handler.  Anything waiting on one observes its channel
    /// closing.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Route a reply (with `reply_to` already stripped) to the handler for
    /// `id`.
    pub fn dispatch(&mut self, id: u64, reply: Value) -> Dispatch {
        let Some(handler) = self.handlers.get_mut(&id) else {
            return Dispatch::Unmatched;
        };
        match catch_unwind(AssertUnwindSafe(|| handler.on_reply(reply))) {
            Ok(true) => {
                self.handlers.remove(&id);
                Dispatch::Completed
            }
            Ok(false) => Dispatch::Retained,
            Err(payload) => Dispatch::Panicked(panic_message(payload.as_ref())),
        }
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().collect();
        ids.sort();
        f.debug_struct("PendingRequests").field("ids", &ids).finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "reply handler panicked".to_string()
    }
}
