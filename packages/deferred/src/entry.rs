use std::any::type_name;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::{Arena, Deferred, Item, Options, Values};

/// A continuation as supplied to `attach()`, after any scope wrapping.
pub(crate) type Continuation<V, E> =
    Box<dyn FnMut(&mut Arena<V, E>, &[Item<V>]) -> Result<Values<V>, E>>;

/// A continuation bound to the deferred that receives its result.
pub(crate) type Callback<V, E> = Box<dyn FnMut(&mut Arena<V, E>, &[Item<V>]) -> Result<(), E>>;

/// An event handler. Shared because forwarding copies it onto the destination.
pub(crate) type Handler<V, E> = Rc<dyn Fn(&mut Arena<V, E>, E) -> Result<(), E>>;

/// The state of one deferred value.
pub(crate) struct Entry<V, E> {
    pub(crate) options: Options,

    /// Executed in insertion order.
    pub(crate) callbacks: Vec<Callback<V, E>>,

    /// Once set, never cleared. Every operation on this entry is redirected to the end of
    /// the forwarding chain.
    pub(crate) forward_target: Option<Deferred>,

    /// Once set, never replaced.
    pub(crate) event_handler: Option<Handler<V, E>>,

    /// Events signaled while no handler was installed, oldest first.
    pub(crate) pending_events: VecDeque<E>,

    pub(crate) resolved: bool,

    /// Shared with the callbacks that are running, which may mutate the arena meanwhile.
    pub(crate) result_values: Rc<[Item<V>]>,
}

impl<V, E> Entry<V, E> {
    pub(crate) fn new(options: Options) -> Self {
        Self {
            options,
            callbacks: Vec::new(),
            forward_target: None,
            event_handler: None,
            pending_events: VecDeque::new(),
            resolved: false,
            result_values: Rc::from(Vec::new()),
        }
    }
}

impl<V, E> fmt::Debug for Entry<V, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("options", &self.options)
            .field("callbacks", &self.callbacks.len())
            .field("forward_target", &self.forward_target)
            .field("has_event_handler", &self.event_handler.is_some())
            .field("pending_events", &self.pending_events.len())
            .field("resolved", &self.resolved)
            .field("result_values", &self.result_values.len())
            .finish()
    }
}
