//=========================================================================
// Observers
//=========================================================================
//
// Typed broadcast registry for one event type.
//
// Architecture:
//   emit(&E) ──> snapshot callbacks ──> call in subscription order
//            └─> clone into every channel ──> prune disconnected receivers
//
// Contracts:
//   - Callbacks run in the order they subscribed.
//   - Subscriptions and removals made during an emit apply from the next
//     emit; the running emit works on its snapshot.
//   - No registry borrow is held while a callback runs, so callbacks may
//     subscribe, unsubscribe or trigger further work freely.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crossbeam_channel::{Receiver, Sender};
use log::{trace, warn};

//=== SubscriberId ========================================================

/// Token returned by [`Observers::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

//=== Observers ===========================================================

type Callback<E> = Rc<RefCell<dyn FnMut(&E)>>;

/// Ordered list of callbacks plus channel subscribers for event type `E`.
pub struct Observers<E> {
    callbacks: RefCell<Vec<(SubscriberId, Callback<E>)>>,
    channels: RefCell<Vec<Sender<E>>>,
    next_id: Cell<u64>,
}

impl<E: Clone + 'static> Observers<E> {
    pub fn new() -> Self {
        Self {
            callbacks: RefCell::new(Vec::new()),
            channels: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    //--- Registration -----------------------------------------------------

    /// Adds a callback at the end of the call order.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: FnMut(&E) + 'static,
    {
        let id = SubscriberId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.callbacks
            .borrow_mut()
            .push((id, Rc::new(RefCell::new(callback))));
        id
    }

    /// Removes a callback. Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut callbacks = self.callbacks.borrow_mut();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        before != callbacks.len()
    }

    /// Opens an unbounded channel that receives a clone of every event.
    ///
    /// The receiver may live on another thread. Dropping it unsubscribes
    /// at the next emit.
    pub fn subscribe_channel(&self) -> Receiver<E> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.channels.borrow_mut().push(tx);
        rx
    }

    //--- Broadcast --------------------------------------------------------

    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self
            .callbacks
            .borrow()
            .iter()
            .map(|(_, callback)| Rc::clone(callback))
            .collect();

        for callback in snapshot {
            match callback.try_borrow_mut() {
                Ok(mut callback) => (&mut *callback)(event),
                Err(_) => warn!("Skipping re-entrant observer call"),
            }
        }

        let mut channels = self.channels.borrow_mut();
        let before = channels.len();
        channels.retain(|tx| tx.send(event.clone()).is_ok());
        if channels.len() != before {
            trace!("Pruned {} disconnected channel subscribers", before - channels.len());
        }
    }

    //--- Queries ----------------------------------------------------------

    /// Callbacks plus live channel subscribers.
    pub fn len(&self) -> usize {
        self.callbacks.borrow().len() + self.channels.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone + 'static> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callbacks_run_in_subscription_order() {
        let observers = Observers::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Rc::clone(&seen);
            observers.subscribe(move |value: &u32| seen.borrow_mut().push(format!("{tag}{value}")));
        }

        observers.emit(&1);
        assert_eq!(*seen.borrow(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let observers = Observers::<u32>::new();
        let count = Rc::new(Cell::new(0));

        let seen = Rc::clone(&count);
        let id = observers.subscribe(move |_| seen.set(seen.get() + 1));

        observers.emit(&0);
        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        observers.emit(&0);

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn subscribe_during_emit_applies_next_time() {
        let observers = Rc::new(Observers::<u32>::new());
        let late_calls = Rc::new(Cell::new(0));

        let registry = Rc::clone(&observers);
        let seen = Rc::clone(&late_calls);
        let mut added = false;
        observers.subscribe(move |_| {
            if !added {
                added = true;
                let seen = Rc::clone(&seen);
                registry.subscribe(move |_| seen.set(seen.get() + 1));
            }
        });

        observers.emit(&0);
        assert_eq!(late_calls.get(), 0);

        observers.emit(&0);
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn channels_receive_clones_and_prune_on_drop() {
        let observers = Observers::<String>::new();
        let kept = observers.subscribe_channel();
        let dropped = observers.subscribe_channel();
        assert_eq!(observers.len(), 2);

        drop(dropped);
        observers.emit(&"loaded".to_string());

        assert_eq!(kept.try_recv().unwrap(), "loaded");
        assert_eq!(observers.len(), 1);
    }
}
