//! A counting semaphore used to fan work out to, and back in from, the
//! worker pool every render callback.
//!
//! The defining property this type must hold is "persistent signal": a
//! `post()` that happens before a `wait()` call is never lost, even if the
//! waiter hasn't reached the call yet. A plain condvar notify can be missed
//! if the notification arrives before the wait begins; counting the posts
//! in a mutex-guarded integer (rather than relying on the notify alone)
//! is what makes this type safe to use as a start/done barrier.

use parking_lot::{Condvar, Mutex};

pub struct Semaphore {
    count: Mutex<u64>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }

    /// Increments the count and wakes one waiter.
    pub fn post(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.condvar.notify_one();
    }

    /// Blocks until the count is nonzero, then decrements it.
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn post_before_wait_is_not_lost() {
        let sem = Semaphore::new();
        sem.post();
        sem.wait();
    }

    #[test]
    fn wakes_a_waiting_thread() {
        let sem = Arc::new(Semaphore::new());
        let waiter = sem.clone();
        let handle = thread::spawn(move || {
            waiter.wait();
        });
        thread::sleep(std::time::Duration::from_millis(20));
        sem.post();
        handle.join().unwrap();
    }

    #[test]
    fn n_posts_release_exactly_n_waiters() {
        let sem = Arc::new(Semaphore::new());
        for _ in 0..4 {
            sem.post();
        }
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let s = sem.clone();
                thread::spawn(move || s.wait())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
