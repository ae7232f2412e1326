#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Single-threaded deferred values with chained continuations.
//!
//! A deferred value stands for a result that an event loop will deliver later. Code attaches
//! continuations to it, and each attachment returns a new deferred value for whatever the
//! continuation returns, so chains of dependent steps read in order.
//!
//! All deferred values live in an [`Arena`] and are addressed by copyable [`Deferred`]
//! handles. Continuations receive `&mut Arena` when they run.
//!
//! # Resolution
//!
//! [`Arena::finish()`] resolves a deferred value with a list of [`Item`]s and synchronously runs
//! every continuation attached to it. A continuation attached to an already resolved deferred
//! value runs immediately.
//!
//! If a deferred value is resolved with another deferred value as its first item, it becomes a
//! transparent alias of that one ([`Arena::forward()`]), which lets a continuation return a
//! deferred value of its own without nesting.
//!
//! # Events
//!
//! Independently of resolution, every deferred value carries an event channel.
//! [`Arena::signal_event()`] delivers an event to the handler installed with
//! [`Arena::set_event_handler()`], or buffers it until one is installed. Events carry
//! failures and other out-of-band conditions; [`Condition`] is a ready-made event type.
//!
//! # Composition
//!
//! * [`Arena::join_all()`] waits for several independent deferred values.
//! * [`Arena::sequence()`] runs dependent steps in order, see [`Chain`].
//! * [`Arena::destructure()`] and [`Arena::wait_then()`] adapt a single result.
//! * [`Arena::with_error_handler()`] routes both synchronous errors and events raised within a
//!   dynamic extent to a shared list of [`Recovery`] clauses.
//!
//! # Example
//!
//! ```
//! use deferred::{Arena, Condition, Item};
//!
//! let mut arena = Arena::<String, Condition>::new();
//!
//! let greeting = arena.create();
//! let shouted = arena
//!     .attach(Item::Deferred(greeting), |_, values| {
//!         let text = values
//!             .first()
//!             .and_then(Item::as_value)
//!             .map(|text| text.to_uppercase())
//!             .unwrap_or_default();
//!
//!         Ok(vec![Item::Value(text)])
//!     })
//!     .unwrap();
//!
//! arena
//!     .finish(greeting, vec![Item::Value("hello".to_string())])
//!     .unwrap();
//!
//! assert_eq!(
//!     arena.values(shouted),
//!     Some(&[Item::Value("HELLO".to_string())][..])
//! );
//! ```

mod arena;
mod bindings;
mod builder;
mod combinators;
mod condition;
mod entry;
mod item;
mod options;
mod recovery;

pub use arena::*;
pub use bindings::*;
pub use builder::*;
pub use combinators::*;
pub use condition::*;
pub(crate) use entry::*;
pub use item::*;
pub use options::*;
pub use recovery::*;
pub(crate) use recovery::ScopeFrame;
