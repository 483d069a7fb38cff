//! A single-producer, single-consumer bounded ring buffer.
//!
//! Backs both the `FadeCommand` queue (any thread -> driver callback) and
//! the `DriveMeasurement` queue (driver callback -> UI thread). Capacity is
//! rounded up to the next power of two; one slot is always kept empty, so
//! the effective capacity is `size - 1`. The producer does a relaxed load of
//! its own write index, an acquire load of the read index, then a release
//! store of the write index; the consumer mirrors this. This ordering is
//! what makes the "persistent signal" property hold: a push that happens
//! before a pop call is always observed by it.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct FixedSpscQueue<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

unsafe impl<T: Send> Send for FixedSpscQueue<T> {}
unsafe impl<T: Send> Sync for FixedSpscQueue<T> {}

impl<T> FixedSpscQueue<T> {
    pub fn new(requested_capacity: usize) -> Self {
        let capacity = requested_capacity.max(2).next_power_of_two();
        let mut buf = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            buf.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        Self {
            buf: buf.into_boxed_slice(),
            mask: capacity - 1,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        }
    }

    /// Effective capacity: the number of elements that can be buffered
    /// at once, one less than the backing slot count.
    pub fn capacity(&self) -> usize {
        self.buf.len() - 1
    }

    pub fn empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }

    /// Attempts to push a value. Returns `false` without blocking if the
    /// queue is full; the caller is expected to drop the value silently, per
    /// the soft-drop contract of both queues this type backs.
    pub fn try_push_back(&self, value: T) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let next = (write + 1) & self.mask;
        let read = self.read.load(Ordering::Acquire);
        if next == read {
            return false;
        }
        unsafe {
            (*self.buf[write].get()).write(value);
        }
        self.write.store(next, Ordering::Release);
        true
    }

    /// Returns a reference to the front element without removing it.
    pub fn front(&self) -> Option<&T> {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        Some(unsafe { (*self.buf[read].get()).assume_init_ref() })
    }

    /// Discards the front element, if any. Returns `true` if an element was
    /// removed.
    pub fn pop_front(&self) -> bool {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return false;
        }
        unsafe {
            ptr::drop_in_place((*self.buf[read].get()).as_mut_ptr());
        }
        self.read.store((read + 1) & self.mask, Ordering::Release);
        true
    }

    /// Removes and returns the front element by value.
    pub fn pop(&self) -> Option<T> {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        let value = unsafe { (*self.buf[read].get()).assume_init_read() };
        self.read.store((read + 1) & self.mask, Ordering::Release);
        Some(value)
    }
}

impl<T> Drop for FixedSpscQueue<T> {
    fn drop(&mut self) {
        let mut read = *self.read.get_mut();
        let write = *self.write.get_mut();
        while read != write {
            unsafe {
                ptr::drop_in_place((*self.buf[read].get()).as_mut_ptr());
            }
            read = (read + 1) & self.mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_up_and_reserves_one_slot() {
        let q: FixedSpscQueue<u32> = FixedSpscQueue::new(10);
        assert_eq!(q.capacity(), 15);
    }

    #[test]
    fn fifo_order_is_preserved() {
        let q = FixedSpscQueue::new(8);
        for i in 0..7 {
            assert!(q.try_push_back(i));
        }
        for i in 0..7 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn push_fails_silently_when_full() {
        let q = FixedSpscQueue::new(2);
        assert_eq!(q.capacity(), 1);
        assert!(q.try_push_back(1));
        assert!(!q.try_push_back(2));
        assert_eq!(q.pop(), Some(1));
        assert!(q.try_push_back(3));
    }

    #[test]
    fn front_peeks_without_removing() {
        let q = FixedSpscQueue::new(4);
        q.try_push_back(42);
        assert_eq!(q.front(), Some(&42));
        assert_eq!(q.front(), Some(&42));
        assert!(q.pop_front());
        assert_eq!(q.front(), None);
    }

    #[test]
    fn concurrent_producer_consumer_preserves_fifo() {
        use std::thread;

        let q = std::sync::Arc::new(FixedSpscQueue::<u32>::new(64));
        let producer_q = q.clone();
        let producer = thread::spawn(move || {
            let mut i = 0u32;
            while i < 10_000 {
                if producer_q.try_push_back(i) {
                    i += 1;
                }
            }
        });

        let mut received = Vec::with_capacity(10_000);
        while received.len() < 10_000 {
            if let Some(v) = q.pop() {
                received.push(v);
            }
        }
        producer.join().unwrap();
        assert_eq!(received, (0u32..10_000).collect::<Vec<_>>());
    }
}
