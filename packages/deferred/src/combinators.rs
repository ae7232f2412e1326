//! Higher-level composition built only from attach, finish, forwarding and events.

use std::any::type_name;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::{Arena, Bindings, Deferred, Item, Values};

type Step<V, E> = Box<dyn Fn(&mut Arena<V, E>, &Bindings<V>) -> Result<Item<V>, E>>;

/// The ordered steps of [`Arena::sequence()`].
///
/// Each step receives the bindings made by the steps before it and returns the target whose
/// first value is bound under the step's name.
///
/// # Example
///
/// ```
/// use deferred::{Chain, Condition, Item};
///
/// let chain = Chain::<u32, Condition>::new()
///     .then("base", |_, _| Ok(Item::Value(2)))
///     .then("squared", |_, bindings| {
///         let base = bindings.value("base").copied().unwrap_or_default();
///         Ok(Item::Value(base * base))
///     });
///
/// assert_eq!(chain.len(), 2);
/// ```
#[must_use]
pub struct Chain<V, E> {
    steps: Vec<(&'static str, Step<V, E>)>,
}

impl<V, E> Chain<V, E> {
    /// Creates a chain without steps.
    #[inline]
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Appends a step whose first value is bound to `name`.
    pub fn then<S>(mut self, name: &'static str, step: S) -> Self
    where
        S: Fn(&mut Arena<V, E>, &Bindings<V>) -> Result<Item<V>, E> + 'static,
    {
        self.steps.push((name, Box::new(step)));
        self
    }

    /// Number of steps.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the chain has no steps.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<V, E> Default for Chain<V, E> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for Chain<V, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.steps.iter().map(|(name, _)| *name).collect();

        f.debug_struct(type_name::<Self>())
            .field("steps", &names)
            .finish()
    }
}

/// Shared progress of one `join_all()`.
struct Join<V, B> {
    slots: Vec<Slot<V>>,
    remaining: usize,
    body: Option<B>,
}

struct Slot<V> {
    name: &'static str,
    item: Option<Item<V>>,
    completed: bool,
}

impl<V, B> Join<V, B>
where
    V: Clone,
{
    /// Records the result of a branch. Returns the body and the complete bindings once the
    /// last branch completes for the first time.
    fn complete(&mut self, index: usize, item: Option<Item<V>>) -> Option<(B, Bindings<V>)> {
        let slot = self.slots.get_mut(index)?;
        slot.item = item;

        if slot.completed {
            return None;
        }

        slot.completed = true;
        self.remaining = self
            .remaining
            .checked_sub(1)
            .expect("every branch completes at most once");

        if self.remaining > 0 {
            return None;
        }

        let body = self.body.take()?;
        let bindings = self
            .slots
            .iter()
            .filter_map(|slot| slot.item.clone().map(|item| (slot.name, item)))
            .collect();

        Some((body, bindings))
    }
}

impl<V, E> Arena<V, E>
where
    V: Clone + 'static,
    E: 'static,
{
    /// Waits for every branch and then runs `body` once, with each branch's first value bound
    /// under the branch's name.
    ///
    /// The branches are independent of each other and may complete in any order. The body
    /// runs when the last of them completes, and the returned deferred value resolves with
    /// what the body returns. A branch that resolves without values leaves its name unbound.
    ///
    /// Events signaled on a branch that has no event handler of its own are forwarded to the
    /// returned deferred value.
    ///
    /// # Errors
    ///
    /// Returns the error of a continuation or event handler that ran synchronously, including
    /// the body if every branch had already completed.
    ///
    /// # Example
    ///
    /// ```
    /// use deferred::{Arena, Condition, Item};
    ///
    /// let mut arena = Arena::<u32, Condition>::new();
    ///
    /// let width = arena.create();
    /// let height = arena.create();
    ///
    /// let area = arena
    ///     .join_all(
    ///         vec![("width", Item::Deferred(width)), ("height", Item::Deferred(height))],
    ///         |_, bindings| {
    ///             let width = bindings.value("width").copied().unwrap_or_default();
    ///             let height = bindings.value("height").copied().unwrap_or_default();
    ///             Ok(vec![Item::Value(width * height)])
    ///         },
    ///     )
    ///     .unwrap();
    ///
    /// arena.finish(height, vec![Item::Value(3)]).unwrap();
    /// arena.finish(width, vec![Item::Value(4)]).unwrap();
    ///
    /// assert_eq!(arena.values(area), Some(&[Item::Value(12)][..]));
    /// ```
    pub fn join_all<B>(
        &mut self,
        branches: Vec<(&'static str, Item<V>)>,
        body: B,
    ) -> Result<Deferred, E>
    where
        B: FnOnce(&mut Self, &Bindings<V>) -> Result<Values<V>, E> + 'static,
    {
        let combined = self.create();

        if branches.is_empty() {
            let values = body(self, &Bindings::new())?;
            self.finish(combined, values)?;
            return Ok(combined);
        }

        let join = Rc::new(RefCell::new(Join {
            slots: branches
                .iter()
                .map(|(name, _)| Slot {
                    name: *name,
                    item: None,
                    completed: false,
                })
                .collect(),
            remaining: branches.len(),
            body: Some(body),
        }));

        for (index, (_, branch)) in branches.into_iter().enumerate() {
            if let Item::Deferred(deferred) = branch {
                if !self.has_event_handler(deferred) {
                    self.set_event_handler(deferred, move |arena, event| {
                        arena.signal_event(combined, event)
                    })?;
                }
            }

            let join = Rc::clone(&join);

            self.attach(branch, move |arena, values| {
                let ready = join.borrow_mut().complete(index, values.first().cloned());

                if let Some((body, bindings)) = ready {
                    let values = body(arena, &bindings)?;
                    arena.finish(combined, values)?;
                }

                Ok(Vec::new())
            })?;
        }

        Ok(combined)
    }

    /// Runs the steps of `chain` one after another, each once the target of the previous one
    /// has resolved, then runs `body` with every step's first value bound under its name.
    ///
    /// This is the same as nesting [`attach()`][Self::attach] calls: if the target of a step
    /// never resolves, the steps after it and the body never run. Events need no special
    /// wiring, they follow the forwarding that nested attachment sets up.
    ///
    /// The returned deferred value resolves with what the body returns.
    ///
    /// # Errors
    ///
    /// Returns the error of a step, continuation or the body if it ran synchronously.
    ///
    /// # Example
    ///
    /// ```
    /// use deferred::{Arena, Chain, Condition, Item};
    ///
    /// let mut arena = Arena::<u32, Condition>::new();
    /// let lookup = arena.create();
    ///
    /// let total = arena
    ///     .sequence(
    ///         Chain::new()
    ///             .then("id", move |_, _| Ok(Item::Deferred(lookup)))
    ///             .then("score", |_, bindings| {
    ///                 let id = bindings.value("id").copied().unwrap_or_default();
    ///                 Ok(Item::Value(id * 10))
    ///             }),
    ///         |_, bindings| {
    ///             let score = bindings.value("score").copied().unwrap_or_default();
    ///             Ok(vec![Item::Value(score + 1)])
    ///         },
    ///     )
    ///     .unwrap();
    ///
    /// arena.finish(lookup, vec![Item::Value(5)]).unwrap();
    ///
    /// assert_eq!(arena.values(total), Some(&[Item::Value(51)][..]));
    /// ```
    pub fn sequence<B>(&mut self, chain: Chain<V, E>, body: B) -> Result<Deferred, E>
    where
        B: Fn(&mut Self, &Bindings<V>) -> Result<Values<V>, E> + 'static,
    {
        let steps: Rc<[(&'static str, Step<V, E>)]> = chain.steps.into();

        self.sequence_from(steps, 0, Bindings::new(), Rc::new(body))
    }

    fn sequence_from<B>(
        &mut self,
        steps: Rc<[(&'static str, Step<V, E>)]>,
        index: usize,
        bindings: Bindings<V>,
        body: Rc<B>,
    ) -> Result<Deferred, E>
    where
        B: Fn(&mut Self, &Bindings<V>) -> Result<Values<V>, E> + 'static,
    {
        let Some((name, step)) = steps.get(index) else {
            // Only an empty chain gets here, every other chain ends inside its last step.
            let values = body(self, &bindings)?;
            let done = self.create();
            self.finish(done, values)?;
            return Ok(done);
        };

        let name = *name;
        let target = step(self, &bindings)?;
        let next = index
            .checked_add(1)
            .expect("a chain cannot have more steps than fit in memory");

        self.attach(target, move |arena, values| {
            let mut bound = bindings.clone();

            if let Some(first) = values.first() {
                bound.bind(name, first.clone());
            }

            if next < steps.len() {
                let rest =
                    arena.sequence_from(Rc::clone(&steps), next, bound, Rc::clone(&body))?;
                Ok(vec![Item::Deferred(rest)])
            } else {
                body(arena, &bound)
            }
        })
    }

    /// Binds `names` positionally to the values `target` resolves with and runs `body`.
    ///
    /// Names without a corresponding value stay unbound, values without a corresponding name
    /// are ignored. The returned deferred value resolves with what the body returns.
    ///
    /// # Errors
    ///
    /// Returns the error of the body if it ran synchronously.
    pub fn destructure<B>(
        &mut self,
        names: &[&'static str],
        target: Item<V>,
        mut body: B,
    ) -> Result<Deferred, E>
    where
        B: FnMut(&mut Self, &Bindings<V>) -> Result<Values<V>, E> + 'static,
    {
        let names = names.to_vec();

        self.attach(target, move |arena, values| {
            let bindings: Bindings<V> = names
                .iter()
                .zip(values)
                .map(|(name, item)| (*name, item.clone()))
                .collect();

            body(arena, &bindings)
        })
    }

    /// Runs `body` once `target` resolves, ignoring the values it resolves with.
    ///
    /// The returned deferred value resolves with what the body returns.
    ///
    /// # Errors
    ///
    /// Returns the error of the body if it ran synchronously.
    pub fn wait_then<B>(&mut self, target: Item<V>, mut body: B) -> Result<Deferred, E>
    where
        B: FnMut(&mut Self) -> Result<Values<V>, E> + 'static,
    {
        self.attach(target, move |arena, _| body(arena))
    }
}
