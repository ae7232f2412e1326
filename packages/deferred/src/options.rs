/// Per-deferred behavior, fixed when the deferred is created.
///
/// The defaults match the common case: callbacks run once and are then detached, and a
/// resolution whose first item is another deferred forwards onto that deferred.
///
/// # Examples
///
/// ```
/// use deferred::{Arena, Condition, Options};
///
/// let mut arena = Arena::<u32, Condition>::new();
///
/// // Callbacks stay attached after running, so every later resolution reaches them again.
/// let fan_out = arena.create_with(Options::new().preserve_callbacks(true));
/// # let _ = fan_out;
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Options {
    preserve_callbacks: bool,
    reattach_callbacks: bool,
}

impl Options {
    /// Default options: callbacks are detached after they run and deferred results are
    /// forwarded onto.
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            preserve_callbacks: false,
            reattach_callbacks: true,
        }
    }

    /// Whether callbacks stay attached after running.
    ///
    /// With this enabled, every resolution of the deferred runs every callback ever attached
    /// to it, which allows repeated fan-out of values to the same set of listeners.
    #[must_use]
    #[inline]
    pub const fn preserve_callbacks(mut self, preserve: bool) -> Self {
        self.preserve_callbacks = preserve;
        self
    }

    /// Whether a resolution whose first item is a deferred forwards onto that deferred.
    ///
    /// This is what allows a continuation to return another deferred and have its own result
    /// follow that deferred transparently. When disabled, the deferred handle is committed as
    /// an ordinary value.
    #[must_use]
    #[inline]
    pub const fn reattach_callbacks(mut self, reattach: bool) -> Self {
        self.reattach_callbacks = reattach;
        self
    }

    /// Whether callbacks stay attached after running.
    #[must_use]
    #[inline]
    pub const fn preserves_callbacks(&self) -> bool {
        self.preserve_callbacks
    }

    /// Whether a deferred first item is forwarded onto instead of committed.
    #[must_use]
    #[inline]
    pub const fn reattaches_callbacks(&self) -> bool {
        self.reattach_callbacks
    }
}

impl Default for Options {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
