use std::marker::PhantomData;
use std::num::NonZero;

use crate::{Arena, Options};

/// Builder for creating an instance of [`Arena`].
///
/// All settings are optional.
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use deferred::{Arena, Condition, Options};
///
/// let arena = Arena::<String, Condition>::builder()
///     .default_options(Options::new().preserve_callbacks(true))
///     .pending_events_warning_threshold(NonZero::new(1000).unwrap())
///     .build();
/// # let _ = arena;
/// ```
#[must_use]
pub struct ArenaBuilder<V, E> {
    default_options: Options,
    pending_events_warning_threshold: Option<NonZero<usize>>,

    _types: PhantomData<fn() -> (V, E)>,
}

impl<V, E> ArenaBuilder<V, E>
where
    V: 'static,
    E: 'static,
{
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            default_options: Options::new(),
            pending_events_warning_threshold: None,
            _types: PhantomData,
        }
    }

    /// Sets the options used by [`Arena::create()`].
    ///
    /// [`Arena::create_with()`] ignores this and uses the options it is given.
    #[inline]
    pub fn default_options(mut self, options: Options) -> Self {
        self.default_options = options;
        self
    }

    /// Logs a warning whenever the queue of events buffered on a single deferred value
    /// reaches this length.
    ///
    /// Events signaled before a handler attaches are buffered without bound. The warning does
    /// not change that, it only makes a growing queue visible.
    #[inline]
    pub fn pending_events_warning_threshold(mut self, threshold: NonZero<usize>) -> Self {
        self.pending_events_warning_threshold = Some(threshold);
        self
    }

    /// Builds the arena with the specified configuration.
    #[must_use]
    #[inline]
    pub fn build(self) -> Arena<V, E> {
        Arena::new_inner(self.default_options, self.pending_events_warning_threshold)
    }
}

impl<V, E> std::fmt::Debug for ArenaBuilder<V, E> {
    #[cfg_attr(test, mutants::skip)] // No API contract for debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(std::any::type_name::<Self>())
            .field("default_options", &self.default_options)
            .field(
                "pending_events_warning_threshold",
                &self.pending_events_warning_threshold,
            )
            .finish_non_exhaustive()
    }
}
