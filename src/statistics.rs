//! Lightweight process counters, logged on session teardown. Mirrors the
//! shape of the teacher's `Stats`/`Monitor` split without the networked
//! admin surface, which is out of scope here.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy)]
pub enum Stat {
    SessionAccepted,
    SessionClosed,
    RequestHandled,
    CallbackDialFailed,
}

#[derive(Default)]
struct Count(AtomicUsize);

impl Count {
    fn add(&self, value: usize) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Process-wide counters. Cheap to clone (an `Arc` internally would be
/// overkill since every field is already a shared atomic); kept as a
/// `'static` instance instead.
#[derive(Default)]
pub struct Statistics {
    sessions_accepted: Count,
    sessions_closed: Count,
    requests_handled: Count,
    callback_dial_failures: Count,
}

impl Statistics {
    pub fn record(&self, stat: Stat) {
        match stat {
            Stat::SessionAccepted => self.sessions_accepted.add(1),
            Stat::SessionClosed => self.sessions_closed.add(1),
            Stat::RequestHandled => self.requests_handled.add(1),
            Stat::CallbackDialFailed => self.callback_dial_failures.add(1),
        }
    }

    pub fn snapshot(&self) -> (usize, usize, usize, usize) {
        (
            self.sessions_accepted.get(),
            self.sessions_closed.get(),
            self.requests_handled.get(),
            self.callback_dial_failures.get(),
        )
    }
}
