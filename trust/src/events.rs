use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountEvent {
    LoggedIn { uid: String },
    Verified { uid: String },
    LoggedOut,
    /// A new keypair and certificate were issued.
    AssertionGenerated { uid: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Rc<dyn Fn(&AccountEvent)>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    callbacks: Vec<(SubscriptionId, Callback)>,
}

/// Fans lifecycle events out to registered callbacks, synchronously and in
/// subscription order. Clones share subscribers.
#[derive(Clone, Default)]
pub struct EventSink {
    inner: Rc<RefCell<Subscribers>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl Fn(&AccountEvent) + 'static) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.callbacks.push((id, Rc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.callbacks.len();
        inner.callbacks.retain(|(other, _)| *other != id);
        inner.callbacks.len() != before
    }

    pub fn emit(&self, event: AccountEvent) {
        // Callbacks may subscribe or unsubscribe while we iterate
        let callbacks: Vec<Callback> = self
            .inner
            .borrow()
            .callbacks
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        log::debug!("Emitting {:?} to {} subscribers", event, callbacks.len());
        for cb in callbacks {
            cb(&event);
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("subscribers", &self.inner.borrow().callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_in_order() {
        let sink = EventSink::new();
        let seen = Rc::new(RefCell::new(vec![]));

        let a = seen.clone();
        sink.subscribe(move |e| a.borrow_mut().push(("a", e.clone())));
        let b = seen.clone();
        let id = sink.subscribe(move |e| b.borrow_mut().push(("b", e.clone())));

        sink.emit(AccountEvent::LoggedOut);
        assert!(sink.unsubscribe(id));
        assert!(!sink.unsubscribe(id));
        sink.emit(AccountEvent::LoggedIn { uid: "u".into() });

        assert_eq!(
            *seen.borrow(),
            vec![
                ("a", AccountEvent::LoggedOut),
                ("b", AccountEvent::LoggedOut),
                ("a", AccountEvent::LoggedIn { uid: "u".into() }),
            ]
        );
    }

    #[test]
    fn callback_can_unsubscribe_itself() {
        let sink = EventSink::new();
        let count = Rc::new(RefCell::new(0));
        let id_slot = Rc::new(RefCell::new(None));

        let (c, slot, s) = (count.clone(), id_slot.clone(), sink.clone());
        let id = sink.subscribe(move |_| {
            *c.borrow_mut() += 1;
            if let Some(id) = *slot.borrow() {
                s.unsubscribe(id);
            }
        });
        id_slot.replace(Some(id));

        sink.emit(AccountEvent::LoggedOut);
        sink.emit(AccountEvent::LoggedOut);
        assert_eq!(*count.borrow(), 1);
    }
}
