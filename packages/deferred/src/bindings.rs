use crate::Item;

/// Named values made available to the body of a combinator.
///
/// Names are bound in order. Binding a name that is already bound shadows the earlier
/// binding, which is how [`Arena::sequence()`][crate::Arena::sequence] threads names from
/// step to step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Bindings<V> {
    entries: Vec<(&'static str, Item<V>)>,
}

impl<V> Bindings<V> {
    /// Creates an empty set of bindings.
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Binds `name` to `item`, shadowing any earlier binding of the same name.
    #[inline]
    pub fn bind(&mut self, name: &'static str, item: Item<V>) {
        self.entries.push((name, item));
    }

    /// The item bound to `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Item<V>> {
        self.entries
            .iter()
            .rev()
            .find(|(bound, _)| *bound == name)
            .map(|(_, item)| item)
    }

    /// The known value bound to `name`, if `name` is bound to a known value.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&V> {
        self.get(name).and_then(Item::as_value)
    }

    /// Whether `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of bindings made, including shadowed ones.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is bound.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the bindings in the order they were made.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Item<V>)> {
        self.entries.iter().map(|(name, item)| (*name, item))
    }
}

impl<V> Default for Bindings<V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<V> FromIterator<(&'static str, Item<V>)> for Bindings<V> {
    fn from_iter<I: IntoIterator<Item = (&'static str, Item<V>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
