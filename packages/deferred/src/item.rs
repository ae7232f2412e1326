use std::fmt::{self, Display};

/// Identifies a deferred value owned by an [`Arena`][crate::Arena].
///
/// A `Deferred` is a plain copyable key. All state (callbacks, result values, event handler,
/// buffered events) lives in the arena that created it, so the handle can be captured by any
/// number of continuations without sharing ownership of that state.
///
/// Using a `Deferred` with an arena other than the one that created it is a usage error and
/// causes a panic.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Deferred {
    arena_id: u64,
    index: usize,
}

impl Deferred {
    pub(crate) const fn new(arena_id: u64, index: usize) -> Self {
        Self { arena_id, index }
    }

    pub(crate) const fn arena_id(self) -> u64 {
        self.arena_id
    }

    pub(crate) const fn index(self) -> usize {
        self.index
    }
}

impl Display for Deferred {
    #[cfg_attr(test, mutants::skip)] // No API contract for the display format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deferred#{}", self.index)
    }
}

/// One value produced by a resolution: either an already known value or another
/// deferred value.
///
/// Continuations return a sequence of items and receive the committed sequence of items.
/// When the first item of a resolution is [`Item::Deferred`], the resolving deferred is by
/// default forwarded onto it instead of committing the sequence (see
/// [`Options::reattach_callbacks`][crate::Options::reattach_callbacks]).
#[derive(Clone, Debug, Eq, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "an item is either still deferred or already known, there is no third state"
)]
pub enum Item<V> {
    /// A value that is not yet known.
    Deferred(Deferred),

    /// A known value.
    Value(V),
}

impl<V> Item<V> {
    /// Whether this item is a deferred value rather than a known one.
    #[must_use]
    #[inline]
    pub const fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// The deferred value, if this item is one.
    #[must_use]
    #[inline]
    pub const fn as_deferred(&self) -> Option<Deferred> {
        match self {
            Self::Deferred(deferred) => Some(*deferred),
            Self::Value(_) => None,
        }
    }

    /// A reference to the known value, if this item is one.
    #[must_use]
    #[inline]
    pub const fn as_value(&self) -> Option<&V> {
        match self {
            Self::Value(value) => Some(value),
            Self::Deferred(_) => None,
        }
    }

    /// The known value, if this item is one.
    #[must_use]
    #[inline]
    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Value(value) => Some(value),
            Self::Deferred(_) => None,
        }
    }
}

impl<V> From<Deferred> for Item<V> {
    #[inline]
    fn from(deferred: Deferred) -> Self {
        Self::Deferred(deferred)
    }
}

/// The ordered sequence of items produced by one resolution.
pub type Values<V> = Vec<Item<V>>;
