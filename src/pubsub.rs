//! Typed event subscription. Replaces the original driver's string-keyed
//! `protocol.on(name, callback)` dispatch table with a small publisher per
//! event type: subscribers are invoked synchronously, in registration order.

pub struct Publisher<T> {
    subscribers: Vec<Box<dyn FnMut(&T) + Send>>,
}

impl<T> Publisher<T> {
    pub fn new() -> Self {
        Self { subscribers: Vec::new() }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&T) + Send + 'static) {
        self.subscribers.push(Box::new(listener));
    }

    /// Invokes every subscriber with `event`, in the order they were registered.
    /// Subscribers must not block — this runs on the receive worker's hot path.
    pub fn publish(&mut self, event: &T) {
        for subscriber in &mut self.subscribers {
            subscriber(event);
        }
    }
}

impl<T> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn subscribers_fire_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut publisher: Publisher<u32> = Publisher::new();

        let seen_a = seen.clone();
        publisher.subscribe(move |event| seen_a.lock().expect("lock").push(("a", *event)));
        let seen_b = seen.clone();
        publisher.subscribe(move |event| seen_b.lock().expect("lock").push(("b", *event)));

        publisher.publish(&1);
        publisher.publish(&2);

        assert_eq!(
            *seen.lock().expect("lock"),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }
}
