//! Scoped error routing.
//!
//! A scope unifies the two failure channels of the arena: errors returned synchronously by
//! code running inside the scope and events signaled on deferred values created inside the
//! scope are both dispatched to the same ordered list of recovery clauses.

use std::any::type_name;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::{Arena, Deferred, Handler, Values};

type Matcher<E> = Box<dyn Fn(&E) -> bool>;
type Recover<V, E> = Box<dyn Fn(&mut Arena<V, E>, E) -> Result<Values<V>, E>>;

struct Clause<V, E> {
    matches: Matcher<E>,
    recover: Recover<V, E>,
}

/// An ordered list of recovery clauses for [`Arena::with_error_handler()`].
///
/// Each clause pairs a predicate with a recovery function. An error is handled by the first
/// clause whose predicate accepts it; an error that no clause accepts is passed on unchanged.
///
/// When a clause handles a synchronous error, the values it returns take the place of the
/// values the failing code would have produced. When it handles a signaled event, the values
/// are discarded.
///
/// # Example
///
/// ```
/// use deferred::{Condition, Item, Recovery};
///
/// let recovery = Recovery::<u32, Condition>::new()
///     .on(
///         |error| error.message() == Some("not found"),
///         |_, _| Ok(vec![Item::Value(0)]),
///     )
///     .on_any(|_, error| {
///         eprintln!("unexpected failure: {error}");
///         Ok(Vec::new())
///     });
/// # let _ = recovery;
/// ```
#[must_use]
pub struct Recovery<V, E> {
    clauses: Vec<Clause<V, E>>,
}

impl<V, E> Recovery<V, E> {
    /// Creates an empty clause list, which passes every error on.
    #[inline]
    pub fn new() -> Self {
        Self {
            clauses: Vec::new(),
        }
    }

    /// Adds a clause handling every error for which `matches` returns `true`.
    pub fn on<M, R>(mut self, matches: M, recover: R) -> Self
    where
        M: Fn(&E) -> bool + 'static,
        R: Fn(&mut Arena<V, E>, E) -> Result<Values<V>, E> + 'static,
    {
        self.clauses.push(Clause {
            matches: Box::new(matches),
            recover: Box::new(recover),
        });
        self
    }

    /// Adds a clause handling every error not handled by an earlier clause.
    pub fn on_any<R>(self, recover: R) -> Self
    where
        R: Fn(&mut Arena<V, E>, E) -> Result<Values<V>, E> + 'static,
    {
        self.on(|_| true, recover)
    }

    /// Number of clauses.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Whether there are no clauses.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Dispatches `error` to the first matching clause.
    ///
    /// # Errors
    ///
    /// Returns `error` unchanged if no clause matches it, or whatever error the matching
    /// clause returns.
    pub fn recover(&self, arena: &mut Arena<V, E>, error: E) -> Result<Values<V>, E> {
        match self.clauses.iter().find(|clause| (clause.matches)(&error)) {
            Some(clause) => (clause.recover)(arena, error),
            None => Err(error),
        }
    }
}

impl<V, E> Default for Recovery<V, E> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for Recovery<V, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("clauses", &self.clauses.len())
            .finish()
    }
}

/// An error-routing scope, shared by every continuation registered inside it.
pub(crate) struct Scope<V, E> {
    recovery: Recovery<V, E>,

    /// The scope that was innermost when this one was entered. Errors this scope does not
    /// recover are passed on to it.
    parent: Option<Rc<Scope<V, E>>>,
}

/// One entry into a scope, collecting the deferred values created until it is exited.
pub(crate) struct ScopeFrame<V, E> {
    scope: Rc<Scope<V, E>>,
    created: Vec<Deferred>,
}

impl<V, E> Arena<V, E>
where
    V: 'static,
    E: 'static,
{
    /// Runs `body` with scoped error routing.
    ///
    /// For the dynamic extent of `body`:
    ///
    /// * If `body` returns an error, it is dispatched to `recovery` and the clause's values
    ///   become the result.
    /// * Every deferred value created (directly, or by [`attach()`][Self::attach] and the
    ///   combinators) receives an event handler that dispatches to `recovery`, unless it
    ///   already carries its own handler when `body` returns.
    /// * Every continuation attached is bound to the scope: whenever it later runs, the two
    ///   rules above apply to it as well.
    ///
    /// Scopes nest. Deferred values created in an inner scope receive the inner scope's
    /// handler, and errors the inner clauses do not match propagate to the outer scope. This
    /// holds for errors of continuations that run and events that are signaled after both
    /// scopes have been exited.
    ///
    /// # Errors
    ///
    /// Returns the error if no clause matches it (or the error a clause returns). Also
    /// returns the first error no clause matched among events that had been buffered on the
    /// deferred values the scope hands its handler to.
    ///
    /// # Example
    ///
    /// ```
    /// use deferred::{Arena, Condition, Item, Recovery};
    ///
    /// let mut arena = Arena::<&str, Condition>::new();
    ///
    /// let mut pending = None;
    ///
    /// let result = arena
    ///     .with_error_handler(
    ///         |arena| {
    ///             let request = arena.create();
    ///             pending = Some(request);
    ///             Err(Condition::failure("refused"))
    ///         },
    ///         Recovery::new().on_any(|_, _| Ok(vec![Item::Value("fallback")])),
    ///     )
    ///     .unwrap();
    ///
    /// assert_eq!(result, vec![Item::Value("fallback")]);
    ///
    /// // The deferred value created in the scope routes its events to the same clauses.
    /// arena
    ///     .signal_event(pending.unwrap(), Condition::failure("late"))
    ///     .unwrap();
    /// ```
    pub fn with_error_handler<B>(
        &mut self,
        body: B,
        recovery: Recovery<V, E>,
    ) -> Result<Values<V>, E>
    where
        B: FnOnce(&mut Self) -> Result<Values<V>, E>,
    {
        let scope = Rc::new(Scope {
            recovery,
            parent: self.active_scope(),
        });

        self.run_in_scope(&scope, body)
    }

    /// Runs `body` inside `scope`, then hands the scope's handler to what `body` created and
    /// routes any error `body` returned to the scope's clauses.
    pub(crate) fn run_in_scope<B>(
        &mut self,
        scope: &Rc<Scope<V, E>>,
        body: B,
    ) -> Result<Values<V>, E>
    where
        B: FnOnce(&mut Self) -> Result<Values<V>, E>,
    {
        self.scopes.push(ScopeFrame {
            scope: Rc::clone(scope),
            created: Vec::new(),
        });

        trace!(depth = self.scopes.len(), "entered error-routing scope");

        let result = body(self);

        let frame = self
            .scopes
            .pop()
            .expect("the frame pushed on entry is still on top when the body returns");

        let adopted = self.adopt_scope_handler(&frame);

        let result = match result {
            Ok(values) => Ok(values),
            Err(error) => {
                debug!("routing synchronous error to recovery clauses");
                self.route_to_scope(scope, error)
            }
        };

        adopted?;
        result
    }

    /// Dispatches `error` to the clauses of `scope`, then to those of each enclosing scope in
    /// turn until one recovers it.
    ///
    /// Escalation stops at the first enclosing scope that is currently executing, because the
    /// error is returned into that scope's body and reaches its clauses from there.
    fn route_to_scope(&mut self, scope: &Rc<Scope<V, E>>, error: E) -> Result<Values<V>, E> {
        let mut error = match scope.recovery.recover(self, error) {
            Ok(values) => return Ok(values),
            Err(error) => error,
        };

        let mut enclosing = scope.parent.clone();

        while let Some(current) = enclosing {
            if self.is_scope_active(&current) {
                break;
            }

            debug!("passing unrecovered error to enclosing scope");

            error = match current.recovery.recover(self, error) {
                Ok(values) => return Ok(values),
                Err(error) => error,
            };

            enclosing = current.parent.clone();
        }

        Err(error)
    }

    fn is_scope_active(&self, scope: &Rc<Scope<V, E>>) -> bool {
        self.scopes
            .iter()
            .any(|frame| Rc::ptr_eq(&frame.scope, scope))
    }

    /// Installs an event handler routing to the frame's scope on every deferred value created
    /// in the frame.
    ///
    /// All deferred values receive the handler even if delivering buffered events to it fails
    /// for some of them; the first such failure is returned.
    fn adopt_scope_handler(&mut self, frame: &ScopeFrame<V, E>) -> Result<(), E> {
        if frame.created.is_empty() {
            return Ok(());
        }

        let handler: Handler<V, E> = {
            let scope = Rc::clone(&frame.scope);

            Rc::new(move |arena: &mut Self, event: E| {
                arena.route_to_scope(&scope, event).map(drop)
            })
        };

        let mut first_error = None;

        for deferred in &frame.created {
            if let Err(error) = self.install_event_handler(*deferred, Rc::clone(&handler)) {
                first_error.get_or_insert(error);
            }
        }

        trace!(
            count = frame.created.len(),
            "handed scope handler to deferred values created in scope"
        );

        first_error.map_or(Ok(()), Err)
    }

    /// The innermost active scope, if any.
    pub(crate) fn active_scope(&self) -> Option<Rc<Scope<V, E>>> {
        self.scopes.last().map(|frame| Rc::clone(&frame.scope))
    }

    pub(crate) fn record_created(&mut self, deferred: Deferred) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.created.push(deferred);
        }
    }
}
