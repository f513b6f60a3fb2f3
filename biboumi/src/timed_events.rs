//! Monotonic-clock priority queue of named, one-shot or repeating callbacks
//! (spec.md §4.2).
//!
//! This is deliberately a plain data structure rather than a tokio task: it
//! is driven from the [`crate::gateway::Gateway`] loop, which sleeps until
//! [`TimedEvents::get_timeout`] and then calls [`TimedEvents::execute_expired`],
//! mirroring the "compute timeout, poll, run expired" shape of spec.md §4.10
//! while staying unit-testable without a runtime.

use std::time::{Duration, Instant};

/// A single scheduled event.
pub struct TimedEvent {
    /// Free-form name; the empty name is never cancelable.
    pub name: String,
    expiry: Instant,
    /// `Some(period)` for a repeating event.
    period: Option<Duration>,
    callback: Box<dyn FnMut() + Send>,
}

impl TimedEvent {
    /// A one-shot event firing at `expiry`.
    pub fn once(name: impl Into<String>, expiry: Instant, callback: impl FnMut() + Send + 'static) -> Self {
        TimedEvent {
            name: name.into(),
            expiry,
            period: None,
            callback: Box::new(callback),
        }
    }

    /// A repeating event, first firing at `expiry`, then every `period`.
    pub fn repeating(
        name: impl Into<String>,
        expiry: Instant,
        period: Duration,
        callback: impl FnMut() + Send + 'static,
    ) -> Self {
        TimedEvent {
            name: name.into(),
            expiry,
            period: Some(period),
            callback: Box::new(callback),
        }
    }
}

/// Priority queue of [`TimedEvent`]s, kept in non-decreasing expiry order.
#[derive(Default)]
pub struct TimedEvents {
    events: Vec<TimedEvent>,
}

impl TimedEvents {
    /// Creates an empty queue.
    pub fn new() -> Self {
        TimedEvents { events: Vec::new() }
    }

    /// Inserts `event`, maintaining non-decreasing expiry order (head is the
    /// next event to fire).
    pub fn add(&mut self, event: TimedEvent) {
        let pos = self
            .events
            .iter()
            .position(|e| e.expiry > event.expiry)
            .unwrap_or(self.events.len());
        self.events.insert(pos, event);
    }

    /// Delay until the head's expiry, clamped at zero; `None` if empty.
    pub fn get_timeout(&self) -> Option<Duration> {
        self.events.first().map(|e| {
            let now = Instant::now();
            if e.expiry > now {
                e.expiry - now
            } else {
                Duration::ZERO
            }
        })
    }

    /// Runs every event whose expiry is `<= now`, in order; repeating
    /// events are reinserted with `expiry += period`. Returns the count
    /// executed. Tolerant of the callback adding or canceling events (the
    /// loop re-reads the head each iteration instead of iterating a
    /// snapshot).
    pub fn execute_expired(&mut self) -> usize {
        let now = Instant::now();
        let mut executed = 0;
        loop {
            match self.events.first() {
                Some(e) if e.expiry <= now => {
                    let mut event = self.events.remove(0);
                    (event.callback)();
                    executed += 1;
                    if let Some(period) = event.period {
                        event.expiry += period;
                        self.add(event);
                    }
                }
                _ => break,
            }
        }
        executed
    }

    /// Removes every event named `name`, returning how many were removed.
    /// The empty name is never cancelable and always returns 0.
    pub fn cancel(&mut self, name: &str) -> usize {
        if name.is_empty() {
            return 0;
        }
        let before = self.events.len();
        self.events.retain(|e| e.name != name);
        before - self.events.len()
    }

    /// Whether there is no scheduled event at all.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn executes_in_expiry_order() {
        let mut events = TimedEvents::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let now = Instant::now();
        for (name, delay) in [("b", 20), ("a", 10), ("c", 30)] {
            let order = order.clone();
            events.add(TimedEvent::once(
                name,
                now - Duration::from_millis(100) + Duration::from_millis(delay),
                move || order.lock().unwrap().push(name),
            ));
        }
        events.execute_expired();
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
        assert!(events.is_empty());
    }

    #[test]
    fn repeating_event_is_rescheduled_strictly_in_the_future() {
        let mut events = TimedEvents::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        events.add(TimedEvent::repeating(
            "ping",
            Instant::now() - Duration::from_millis(1),
            Duration::from_secs(240),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
        ));
        events.execute_expired();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        let now = Instant::now();
        assert!(events.get_timeout().unwrap() <= Duration::from_secs(240));
        assert!(events.events[0].expiry > now);
    }

    #[test]
    fn cancel_returns_exact_match_count() {
        let mut events = TimedEvents::new();
        let now = Instant::now();
        events.add(TimedEvent::once("dup", now, || {}));
        events.add(TimedEvent::once("dup", now, || {}));
        events.add(TimedEvent::once("other", now, || {}));
        assert_eq!(events.cancel("dup"), 2);
        assert_eq!(events.cancel("dup"), 0);
        assert_eq!(events.cancel(""), 0);
        assert_eq!(events.events.len(), 1);
    }
}
