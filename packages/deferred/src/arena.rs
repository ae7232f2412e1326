use std::any::type_name;
use std::fmt;
use std::mem;
use std::num::NonZero;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::{
    ArenaBuilder, Callback, Continuation, Deferred, Entry, Handler, Item, Options, ScopeFrame,
    Values,
};

/// Distinguishes arenas so that a handle can never silently address another arena's entry.
static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(0);

/// Owns a set of deferred values and runs their continuations.
///
/// Every deferred value is addressed by a copyable [`Deferred`] handle. All operations go
/// through `&mut Arena`, and every continuation and event handler receives `&mut Arena` when
/// it runs, so continuations can create, resolve and attach to further deferred values.
///
/// The arena is single-threaded. Continuations run synchronously: either when the deferred
/// they are attached to is resolved via [`finish()`][Self::finish], or immediately on
/// [`attach()`][Self::attach] if it already is. Nothing is ever scheduled for later.
///
/// `V` is the value type carried by resolutions and `E` is the event type carried by the
/// out-of-band event channel, which is also the error type of continuations.
///
/// # Example
///
/// ```
/// use deferred::{Arena, Condition, Item};
///
/// let mut arena = Arena::<u32, Condition>::new();
///
/// let request = arena.create();
/// let doubled = arena
///     .attach(Item::Deferred(request), |_, values| {
///         let value = values[0].as_value().copied().unwrap_or_default();
///         Ok(vec![Item::Value(value * 2)])
///     })
///     .unwrap();
///
/// // Some time later, the event loop delivers the result.
/// arena.finish(request, vec![Item::Value(21)]).unwrap();
///
/// assert_eq!(arena.values(doubled), Some(&[Item::Value(42)][..]));
/// ```
///
/// # Panics
///
/// Every method taking a [`Deferred`] panics if the handle was created by a different arena.
pub struct Arena<V, E> {
    id: u64,
    entries: Vec<Entry<V, E>>,
    default_options: Options,
    pending_events_warning_threshold: Option<NonZero<usize>>,

    /// Active error-routing scopes, innermost last.
    pub(crate) scopes: Vec<ScopeFrame<V, E>>,
}

impl<V, E> Arena<V, E>
where
    V: 'static,
    E: 'static,
{
    /// Creates an empty arena with default configuration.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building an arena with custom configuration.
    #[inline]
    pub fn builder() -> ArenaBuilder<V, E> {
        ArenaBuilder::new()
    }

    pub(crate) fn new_inner(
        default_options: Options,
        pending_events_warning_threshold: Option<NonZero<usize>>,
    ) -> Self {
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            entries: Vec::new(),
            default_options,
            pending_events_warning_threshold,
            scopes: Vec::new(),
        }
    }

    /// Creates a new unresolved deferred value with the arena's default options.
    #[must_use]
    #[inline]
    pub fn create(&mut self) -> Deferred {
        self.create_with(self.default_options)
    }

    /// Creates a new unresolved deferred value with the given options.
    #[must_use]
    pub fn create_with(&mut self, options: Options) -> Deferred {
        let deferred = Deferred::new(self.id, self.entries.len());
        self.entries.push(Entry::new(options));

        self.record_created(deferred);

        trace!(%deferred, ?options, "created");

        deferred
    }

    /// Number of deferred values ever created in this arena.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no deferred value has been created in this arena.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The options the deferred value was created with.
    ///
    /// This is the deferred value itself, not the end of its forwarding chain.
    #[must_use]
    pub fn options(&self, deferred: Deferred) -> Options {
        self.entry(deferred).options
    }

    /// Follows forwarding links from `deferred` to the deferred value that actually holds
    /// its state. Returns `deferred` itself if it has never been forwarded.
    #[must_use]
    pub fn terminal(&self, deferred: Deferred) -> Deferred {
        let mut current = deferred;

        while let Some(next) = self.entry(current).forward_target {
            current = next;
        }

        current
    }

    /// Whether the deferred value (or the end of its forwarding chain) has been resolved.
    #[must_use]
    pub fn is_resolved(&self, deferred: Deferred) -> bool {
        self.entry(self.terminal(deferred)).resolved
    }

    /// The most recently committed values, or [`None`] if not yet resolved.
    #[must_use]
    pub fn values(&self, deferred: Deferred) -> Option<&[Item<V>]> {
        let entry = self.entry(self.terminal(deferred));

        entry.resolved.then_some(&*entry.result_values)
    }

    /// Whether an event handler is installed on the deferred value (or the end of its
    /// forwarding chain).
    #[must_use]
    pub fn has_event_handler(&self, deferred: Deferred) -> bool {
        self.entry(self.terminal(deferred)).event_handler.is_some()
    }

    /// Number of events buffered because no handler has been installed yet.
    #[must_use]
    pub fn pending_event_count(&self, deferred: Deferred) -> usize {
        self.entry(self.terminal(deferred)).pending_events.len()
    }

    /// Attaches a continuation to `target` and returns a new deferred value that resolves
    /// with whatever the continuation returns.
    ///
    /// If `target` is a known value, the continuation runs immediately with that single value.
    /// If `target` is a deferred value that is already resolved, every callback attached to
    /// it runs immediately, in registration order, the new continuation last. Otherwise the
    /// continuation runs when `target` is resolved.
    ///
    /// If the continuation returns a deferred value as its first item, the returned deferred
    /// value follows it (see [`finish()`][Self::finish]).
    ///
    /// Inside [`with_error_handler()`][Self::with_error_handler], the continuation is bound to
    /// the active scope: whenever it runs, errors it returns are routed to the scope's
    /// recovery clauses and deferred values it creates receive the scope's event handler.
    ///
    /// # Errors
    ///
    /// Returns the error of any continuation that ran synchronously as part of this call and
    /// failed. Continuations that did not complete remain attached.
    pub fn attach<C>(&mut self, target: Item<V>, continuation: C) -> Result<Deferred, E>
    where
        C: FnMut(&mut Self, &[Item<V>]) -> Result<Values<V>, E> + 'static,
    {
        let mut continuation = self.bind_to_active_scope(Box::new(continuation));
        let result = self.create();

        match target {
            Item::Value(value) => {
                trace!(%result, "attached to known value, running immediately");

                let values = continuation(self, &[Item::Value(value)])?;
                self.finish(result, values)?;
            }
            Item::Deferred(deferred) => {
                let target = self.terminal(deferred);

                trace!(%deferred, %target, %result, "attached");

                let callback: Callback<V, E> = Box::new(move |arena, values| {
                    let values = continuation(arena, values)?;
                    arena.finish(result, values)
                });

                let entry = self.entry_mut(target);
                entry.callbacks.push(callback);

                if entry.resolved {
                    self.run_callbacks(target)?;
                }
            }
        }

        Ok(result)
    }

    /// Resolves a deferred value.
    ///
    /// If the first item is itself a deferred value and the deferred being resolved was
    /// created with [`Options::reattach_callbacks`] enabled, the deferred being resolved is
    /// instead forwarded onto the inner one: its callbacks move there and it resolves
    /// whenever the inner one does (immediately, if the inner one is already resolved).
    ///
    /// Otherwise the values are committed and every attached callback runs in order, each
    /// receiving the values. Callbacks are then detached unless the deferred was created with
    /// [`Options::preserve_callbacks`] enabled.
    ///
    /// Resolving twice is not prevented: the second resolution overwrites the committed
    /// values and runs whatever callbacks are attached at that time.
    ///
    /// # Errors
    ///
    /// Returns the first error returned by a callback. That callback and all callbacks after
    /// it remain attached. Also returns any error raised by an event handler while buffered
    /// events are delivered as part of forwarding.
    pub fn finish(&mut self, deferred: Deferred, values: Values<V>) -> Result<(), E> {
        let target = self.terminal(deferred);

        let inner = match values.first() {
            Some(Item::Deferred(inner)) if self.entry(target).options.reattaches_callbacks() => {
                Some(*inner)
            }
            _ => None,
        };

        if let Some(inner) = inner {
            trace!(%deferred, %inner, "resolved with a deferred value, forwarding");

            self.forward(target, inner)?;

            let inner = self.terminal(inner);

            if self.entry(inner).resolved {
                self.run_callbacks(inner)?;
            }

            return Ok(());
        }

        trace!(%deferred, count = values.len(), "resolved");

        let entry = self.entry_mut(target);
        entry.resolved = true;
        entry.result_values = Rc::from(values);

        self.run_callbacks(target)
    }

    /// Makes `from` a transparent alias of `to`.
    ///
    /// The callbacks attached to `from` replace those attached to `to`. If `to` has no event
    /// handler, it takes over the handler of `from`. Events still buffered on `from` are
    /// appended to the buffer of `to` and delivered if `to` has a handler. Every later
    /// operation on `from` acts on `to` instead.
    ///
    /// Both ends are first resolved through their own forwarding chains. Forwarding a deferred
    /// value onto itself (directly or through a chain) does nothing.
    ///
    /// # Errors
    ///
    /// Returns any error raised by the event handler while buffered events are delivered.
    pub fn forward(&mut self, from: Deferred, to: Deferred) -> Result<(), E> {
        let source = self.terminal(from);
        let destination = self.terminal(to);

        if source == destination {
            warn!(%from, %to, "ignoring forward that would make a deferred value its own alias");
            return Ok(());
        }

        let source_entry = self.entry_mut(source);
        let callbacks = mem::take(&mut source_entry.callbacks);
        let handler = source_entry.event_handler.clone();
        let events = mem::take(&mut source_entry.pending_events);
        source_entry.forward_target = Some(destination);

        let destination_entry = self.entry_mut(destination);
        let replaced = mem::replace(&mut destination_entry.callbacks, callbacks);

        if destination_entry.event_handler.is_none() {
            destination_entry.event_handler = handler;
        }

        destination_entry.pending_events.extend(events);

        trace!(
            %source,
            %destination,
            replaced_callbacks = replaced.len(),
            "forwarded"
        );

        self.drain_events(destination)
    }

    /// Installs the event handler of a deferred value (or of the end of its forwarding chain)
    /// and delivers every buffered event to it, oldest first.
    ///
    /// The first handler installed wins: if a handler is already present, this does nothing
    /// and `handler` never receives any event.
    ///
    /// Returns `deferred`, for chaining.
    ///
    /// # Errors
    ///
    /// Returns the first error the handler returns while buffered events are delivered. The
    /// events after it stay buffered.
    pub fn set_event_handler<H>(&mut self, deferred: Deferred, handler: H) -> Result<Deferred, E>
    where
        H: Fn(&mut Self, E) -> Result<(), E> + 'static,
    {
        self.install_event_handler(deferred, Rc::new(handler))
    }

    pub(crate) fn install_event_handler(
        &mut self,
        deferred: Deferred,
        handler: Handler<V, E>,
    ) -> Result<Deferred, E> {
        let target = self.terminal(deferred);
        let entry = self.entry_mut(target);

        if entry.event_handler.is_some() {
            trace!(%deferred, %target, "event handler already installed, ignoring new one");
            return Ok(deferred);
        }

        entry.event_handler = Some(handler);

        trace!(%deferred, %target, "event handler installed");

        self.drain_events(target)?;

        Ok(deferred)
    }

    /// Signals an event on a deferred value (or on the end of its forwarding chain).
    ///
    /// The event is delivered to the event handler immediately if one is installed.
    /// Otherwise it is buffered until a handler is installed.
    ///
    /// # Errors
    ///
    /// Returns the error the handler returns for this or any earlier buffered event.
    pub fn signal_event(&mut self, deferred: Deferred, event: E) -> Result<(), E> {
        let target = self.terminal(deferred);
        let threshold = self.pending_events_warning_threshold;

        let entry = self.entry_mut(target);
        entry.pending_events.push_back(event);

        let pending = entry.pending_events.len();

        if entry.event_handler.is_none() {
            debug!(%deferred, %target, pending, "event buffered until a handler is installed");

            if threshold.is_some_and(|threshold| threshold.get() == pending) {
                warn!(
                    %target,
                    pending,
                    "events keep accumulating on a deferred value that has no event handler"
                );
            }
        }

        self.drain_events(target)
    }

    fn drain_events(&mut self, target: Deferred) -> Result<(), E> {
        let Some(handler) = self.entry(target).event_handler.clone() else {
            return Ok(());
        };

        while let Some(event) = self.entry_mut(target).pending_events.pop_front() {
            trace!(%target, "delivering event");
            handler(self, event)?;
        }

        Ok(())
    }

    /// Runs the callbacks of a resolved deferred value with its committed values.
    fn run_callbacks(&mut self, deferred: Deferred) -> Result<(), E> {
        let target = self.terminal(deferred);
        let entry = self.entry_mut(target);

        let values = Rc::clone(&entry.result_values);
        let preserve = entry.options.preserves_callbacks();

        // Taken out for the duration of the run because callbacks receive `&mut self`.
        let mut callbacks = mem::take(&mut entry.callbacks);

        trace!(%target, count = callbacks.len(), "running callbacks");

        let mut failure = None;

        for (index, callback) in callbacks.iter_mut().enumerate() {
            if let Err(error) = callback(self, &*values) {
                failure = Some((index, error));
                break;
            }
        }

        match failure {
            Some((index, error)) => {
                let kept = if preserve {
                    callbacks
                } else {
                    callbacks.split_off(index)
                };

                self.restore_callbacks(target, kept);
                Err(error)
            }
            None => {
                if preserve {
                    self.restore_callbacks(target, callbacks);
                }

                Ok(())
            }
        }
    }

    /// Puts callbacks back in front of any that were attached while they were running.
    fn restore_callbacks(&mut self, deferred: Deferred, callbacks: Vec<Callback<V, E>>) {
        // The run may have forwarded the deferred value elsewhere.
        let target = self.terminal(deferred);
        let entry = self.entry_mut(target);

        let attached_meanwhile = mem::replace(&mut entry.callbacks, callbacks);
        entry.callbacks.extend(attached_meanwhile);
    }

    /// Wraps a continuation so it re-enters the innermost active error-routing scope, if any.
    fn bind_to_active_scope(
        &self,
        mut continuation: Continuation<V, E>,
    ) -> Continuation<V, E> {
        match self.active_scope() {
            Some(scope) => Box::new(move |arena, values| {
                arena.run_in_scope(&scope, |arena| continuation(arena, values))
            }),
            None => continuation,
        }
    }

    fn entry(&self, deferred: Deferred) -> &Entry<V, E> {
        self.check_owner(deferred);

        self.entries
            .get(deferred.index())
            .expect("a deferred value created by this arena always has an entry")
    }

    fn entry_mut(&mut self, deferred: Deferred) -> &mut Entry<V, E> {
        self.check_owner(deferred);

        self.entries
            .get_mut(deferred.index())
            .expect("a deferred value created by this arena always has an entry")
    }

    fn check_owner(&self, deferred: Deferred) {
        assert!(
            deferred.arena_id() == self.id,
            "{deferred} was created by a different arena"
        );
    }
}

impl<V, E> Default for Arena<V, E>
where
    V: 'static,
    E: 'static,
{
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for Arena<V, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("id", &self.id)
            .field("entries", &self.entries.len())
            .field("default_options", &self.default_options)
            .field(
                "pending_events_warning_threshold",
                &self.pending_events_warning_threshold,
            )
            .field("active_scopes", &self.scopes.len())
            .finish()
    }
}
