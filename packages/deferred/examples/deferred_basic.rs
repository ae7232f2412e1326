//! Basic example of driving deferred values from a hand-written event loop.
//!
//! Two lookups are issued up front and joined, a third one depends on their combined result,
//! and a failure reported by the loop is recovered by a scoped error handler. The arena's own
//! log output is printed at debug level.

#![expect(
    clippy::arithmetic_side_effects,
    reason = "example code, the numbers are tiny"
)]

use std::collections::VecDeque;

use deferred::{Arena, Condition, Deferred, Item, Recovery};
use tracing::Level;

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).init();

    println!("=== Deferred Basic Example ===");

    let mut arena = Arena::<u64, Condition>::new();

    // What the event loop will deliver, in arrival order.
    let mut completions: VecDeque<(Deferred, Result<u64, &str>)> = VecDeque::new();

    let apples = arena.create();
    let pears = arena.create();
    completions.push_back((pears, Ok(7)));
    completions.push_back((apples, Ok(5)));

    let total = arena
        .join_all(
            vec![("apples", Item::Deferred(apples)), ("pears", Item::Deferred(pears))],
            |_, bindings| {
                let apples = bindings.value("apples").copied().unwrap_or_default();
                let pears = bindings.value("pears").copied().unwrap_or_default();
                Ok(vec![Item::Value(apples + pears)])
            },
        )
        .expect("nothing has completed yet, so no continuation can fail");

    let mut price = None;

    arena
        .with_error_handler(
            |arena| {
                let quote = arena.create();
                completions.push_back((quote, Err("price service unavailable")));

                price = Some(arena.join_all(
                    vec![("total", Item::Deferred(total)), ("quote", Item::Deferred(quote))],
                    |_, bindings| {
                        let total = bindings.value("total").copied().unwrap_or_default();
                        let quote = bindings.value("quote").copied().unwrap_or_default();
                        Ok(vec![Item::Value(total * quote)])
                    },
                )?);

                Ok(Vec::new())
            },
            Recovery::new().on_any(|_, condition: Condition| {
                println!("Recovered from: {condition}");
                Ok(Vec::new())
            }),
        )
        .expect("the scope body does not fail");

    while let Some((deferred, outcome)) = completions.pop_front() {
        let delivered = match outcome {
            Ok(value) => arena.finish(deferred, vec![Item::Value(value)]),
            Err(message) => arena.signal_event(deferred, Condition::failure(message)),
        };

        if let Err(error) = delivered {
            println!("Unhandled failure: {error}");
        }
    }

    println!("Fruit total: {:?}", arena.values(total));
    println!(
        "Price resolved: {}",
        price.is_some_and(|price| arena.is_resolved(price))
    );
    println!("Example completed successfully!");
}
