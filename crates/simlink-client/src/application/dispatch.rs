//! Inbound command queue and per-tick dispatch to registered handlers.
//!
//! # Threading model (for beginners)
//!
//! Commands are decoded on the network task and land in an [`InboundQueue`].
//! The application's own loop (a render or UI tick) calls
//! [`Dispatcher::dispatch`] once per tick, which swaps the queue's contents
//! out under the lock and then runs handlers with the lock released.  Handlers
//! therefore always run on the application side, never on the network task,
//! and a slow handler cannot stall the receive path.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use simlink_core::protocol::{Command, CommandId};
use tracing::{trace, warn};

// ── InboundQueue ──────────────────────────────────────────────────────────────

/// Unbounded, insertion-ordered buffer of decoded commands.
///
/// Only whole commands are ever pushed, so a consumer never observes a
/// partially decoded value.
pub struct InboundQueue<C> {
    items: Mutex<Vec<C>>,
}

impl<C> InboundQueue<C> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Appends a command at the back of the queue.
    pub fn push(&self, command: C) {
        self.lock().push(command);
    }

    /// Removes and returns every queued command in arrival order.
    ///
    /// The swap happens under the lock; pushes racing with a drain land either
    /// in the returned batch or in the next one, never in both or neither.
    pub fn drain(&self) -> Vec<C> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking handler never holds this lock, so a poisoned mutex still
    // guards a consistent Vec.
    fn lock(&self) -> MutexGuard<'_, Vec<C>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> Default for InboundQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for InboundQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundQueue").field("len", &self.len()).finish()
    }
}

// ── CommandRegistry ───────────────────────────────────────────────────────────

/// Handler invoked with ownership of one command.
pub type Handler<C> = Box<dyn FnMut(C) + Send>;

/// Maps command identifiers to application handlers.
pub struct CommandRegistry<C> {
    handlers: HashMap<CommandId, Handler<C>>,
}

impl<C> CommandRegistry<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Installs `handler` for `id`, replacing any earlier one.  Returns `true`
    /// if a handler was replaced.
    pub fn register<F>(&mut self, id: CommandId, handler: F) -> bool
    where
        F: FnMut(C) + Send + 'static,
    {
        self.handlers.insert(id, Box::new(handler)).is_some()
    }

    /// Removes the handler for `id`.  Returns `true` if one was installed.
    pub fn unregister(&mut self, id: CommandId) -> bool {
        self.handlers.remove(&id).is_some()
    }

    pub fn contains(&self, id: CommandId) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn handler_mut(&mut self, id: CommandId) -> Option<&mut Handler<C>> {
        self.handlers.get_mut(&id)
    }
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for CommandRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("CommandRegistry").field("ids", &ids).finish()
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Outcome of one [`Dispatcher::dispatch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Commands handed to a handler.
    pub dispatched: usize,
    /// Commands dropped because no handler was registered for their id.
    pub unhandled: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.dispatched + self.unhandled
    }
}

/// Drains an [`InboundQueue`] and routes each command to its handler.
pub struct Dispatcher<C> {
    queue: Arc<InboundQueue<C>>,
    registry: CommandRegistry<C>,
}

impl<C: Command> Dispatcher<C> {
    pub fn new(queue: Arc<InboundQueue<C>>) -> Self {
        Self {
            queue,
            registry: CommandRegistry::new(),
        }
    }

    /// See [`CommandRegistry::register`].
    pub fn register_handler<F>(&mut self, id: CommandId, handler: F) -> bool
    where
        F: FnMut(C) + Send + 'static,
    {
        self.registry.register(id, handler)
    }

    pub fn unregister_handler(&mut self, id: CommandId) -> bool {
        self.registry.unregister(id)
    }

    /// Runs handlers for everything queued since the previous call, in
    /// arrival order.  A command without a handler is logged and dropped.
    pub fn dispatch(&mut self) -> DispatchReport {
        let mut report = DispatchReport::default();
        for command in self.queue.drain() {
            let id = command.command_id();
            match self.registry.handler_mut(id) {
                Some(handler) => {
                    trace!(command_id = %id, "dispatching command");
                    handler(command);
                    report.dispatched += 1;
                }
                None => {
                    warn!(command_id = %id, "no handler registered, dropping command");
                    report.unhandled += 1;
                }
            }
        }
        report
    }
}

impl<C> fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queue", &self.queue)
            .field("registry", &self.registry)
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
