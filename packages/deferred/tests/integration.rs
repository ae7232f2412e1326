//! Integration tests driving deferred values from a simulated event loop.
//!
//! The loop owns a queue of pending completions and delivers them in whatever order the test
//! asks for, the same way a real event loop delivers I/O results in arrival order.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use deferred::{Arena, Chain, Condition, Deferred, Item, Options, Recovery, Values};

type LoopArena = Arena<String, Condition>;

/// What the event loop will eventually report for a request.
enum Outcome {
    Done(Vec<String>),
    Failed(&'static str),
}

/// A minimal event loop: requests are queued and later completed one at a time.
#[derive(Default)]
struct EventLoop {
    pending: VecDeque<(Deferred, Outcome)>,
}

impl EventLoop {
    fn request(&mut self, arena: &mut LoopArena, outcome: Outcome) -> Deferred {
        let deferred = arena.create();
        self.pending.push_back((deferred, outcome));
        deferred
    }

    /// Delivers the oldest completion.
    fn step(&mut self, arena: &mut LoopArena) -> Result<(), Condition> {
        let Some((deferred, outcome)) = self.pending.pop_front() else {
            return Ok(());
        };

        match outcome {
            Outcome::Done(values) => {
                arena.finish(deferred, values.into_iter().map(Item::Value).collect())
            }
            Outcome::Failed(message) => {
                arena.signal_event(deferred, Condition::failure(message))
            }
        }
    }

    /// Delivers the newest completion first.
    fn step_newest(&mut self, arena: &mut LoopArena) -> Result<(), Condition> {
        if let Some(newest) = self.pending.pop_back() {
            self.pending.push_front(newest);
        }

        self.step(arena)
    }

    fn run(&mut self, arena: &mut LoopArena) -> Result<(), Condition> {
        while !self.pending.is_empty() {
            self.step(arena)?;
        }

        Ok(())
    }
}

fn text(arena: &LoopArena, deferred: Deferred) -> Option<String> {
    arena
        .values(deferred)?
        .first()
        .and_then(Item::as_value)
        .cloned()
}

#[test]
fn chained_requests_complete_in_order() {
    let mut arena = LoopArena::new();
    let event_loop = Rc::new(RefCell::new(EventLoop::default()));

    let login = event_loop
        .borrow_mut()
        .request(&mut arena, Outcome::Done(vec!["token".to_string()]));

    // The second request is only issued once the first one completes.
    let loop_for_profile = Rc::clone(&event_loop);
    let profile = arena
        .attach(Item::Deferred(login), move |arena, values| {
            let token = values[0].as_value().cloned().unwrap();
            let profile = loop_for_profile
                .borrow_mut()
                .request(arena, Outcome::Done(vec![format!("profile for {token}")]));

            Ok(vec![Item::Deferred(profile)])
        })
        .unwrap();

    let rendered = arena
        .attach(Item::Deferred(profile), |_, values| {
            let profile = values[0].as_value().cloned().unwrap();
            Ok(vec![Item::Value(format!("<{profile}>"))])
        })
        .unwrap();

    // Continuations borrow the loop to queue requests, so no borrow is held while delivering.
    loop {
        let next = event_loop.borrow_mut().pending.pop_front();
        let Some((deferred, Outcome::Done(values))) = next else {
            break;
        };

        arena
            .finish(deferred, values.into_iter().map(Item::Value).collect())
            .unwrap();
    }

    assert_eq!(text(&arena, rendered).as_deref(), Some("<profile for token>"));
}

#[test]
fn join_waits_for_out_of_order_completions() {
    let mut arena = LoopArena::new();
    let mut event_loop = EventLoop::default();

    let users = event_loop.request(&mut arena, Outcome::Done(vec!["alice".to_string()]));
    let groups = event_loop.request(&mut arena, Outcome::Done(vec!["admins".to_string()]));

    let summary = arena
        .join_all(
            vec![("user", Item::Deferred(users)), ("group", Item::Deferred(groups))],
            |_, bindings| {
                let user = bindings.value("user").cloned().unwrap();
                let group = bindings.value("group").cloned().unwrap();
                Ok(vec![Item::Value(format!("{user} in {group}"))])
            },
        )
        .unwrap();

    event_loop.step_newest(&mut arena).unwrap();
    assert!(!arena.is_resolved(summary));

    event_loop.step(&mut arena).unwrap();
    assert_eq!(text(&arena, summary).as_deref(), Some("alice in admins"));
}

#[test]
fn failure_event_reaches_scope_recovery() {
    let mut arena = LoopArena::new();
    let mut event_loop = EventLoop::default();
    let recovered = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&recovered);
    let mut fetch = None;

    arena
        .with_error_handler(
            |arena| {
                fetch = Some(event_loop.request(arena, Outcome::Failed("connection reset")));
                Ok(Vec::new())
            },
            Recovery::new()
                .on(
                    |condition: &Condition| condition.message() == Some("connection reset"),
                    move |_, condition: Condition| {
                        sink.borrow_mut().push(condition.to_string());
                        Ok(Vec::new())
                    },
                ),
        )
        .unwrap();

    assert!(arena.has_event_handler(fetch.unwrap()));

    event_loop.run(&mut arena).unwrap();

    assert_eq!(*recovered.borrow(), vec!["connection reset"]);
}

#[test]
fn unmatched_failure_surfaces_to_event_loop() {
    let mut arena = LoopArena::new();
    let mut event_loop = EventLoop::default();

    arena
        .with_error_handler(
            |arena| {
                let _fetch = event_loop.request(arena, Outcome::Failed("disk full"));
                Ok(Vec::new())
            },
            Recovery::new().on(
                |condition: &Condition| condition.message() == Some("timeout"),
                |_, _| Ok(Vec::new()),
            ),
        )
        .unwrap();

    let error = event_loop.run(&mut arena).unwrap_err();

    assert_eq!(error.message(), Some("disk full"));
}

#[test]
fn sequence_issues_dependent_requests() {
    let mut arena = LoopArena::new();
    let event_loop = Rc::new(RefCell::new(EventLoop::default()));

    let first_loop = Rc::clone(&event_loop);
    let second_loop = Rc::clone(&event_loop);

    let result = arena
        .sequence(
            Chain::new()
                .then("directory", move |arena, _| {
                    let request = first_loop
                        .borrow_mut()
                        .request(arena, Outcome::Done(vec!["/srv".to_string()]));
                    Ok(Item::Deferred(request))
                })
                .then("listing", move |arena, bindings| {
                    let directory = bindings.value("directory").cloned().unwrap();
                    let request = second_loop
                        .borrow_mut()
                        .request(arena, Outcome::Done(vec![format!("{directory}/a")]));
                    Ok(Item::Deferred(request))
                }),
            |_, bindings| {
                let listing = bindings.value("listing").cloned().unwrap();
                Ok(vec![Item::Value(listing)])
            },
        )
        .unwrap();

    // Only the first request exists until it completes.
    assert_eq!(event_loop.borrow().pending.len(), 1);

    loop {
        let next = event_loop.borrow_mut().pending.pop_front();
        let Some((deferred, Outcome::Done(values))) = next else {
            break;
        };

        arena
            .finish(deferred, values.into_iter().map(Item::Value).collect())
            .unwrap();
    }

    assert_eq!(text(&arena, result).as_deref(), Some("/srv/a"));
}

#[test]
fn preserved_callbacks_observe_every_delivery() {
    let mut arena = LoopArena::builder()
        .default_options(Options::new().preserve_callbacks(true))
        .build();
    let seen: Rc<RefCell<Vec<Values<String>>>> = Rc::new(RefCell::new(Vec::new()));

    let stream = arena.create();

    let sink = Rc::clone(&seen);
    arena
        .attach(Item::Deferred(stream), move |_, values| {
            sink.borrow_mut().push(values.to_vec());
            Ok(Vec::new())
        })
        .unwrap();

    for chunk in ["one", "two", "three"] {
        arena
            .finish(stream, vec![Item::Value(chunk.to_string())])
            .unwrap();
    }

    assert_eq!(seen.borrow().len(), 3);
    assert_eq!(
        seen.borrow().last(),
        Some(&vec![Item::Value("three".to_string())])
    );
}
