//! Background "busy" threads: a deliberate CPU-throttling mitigation.
//!
//! Each thread alternates between blocking (to respect a CPU-usage budget)
//! and spinning on a hardware low-energy-wait instruction (to keep the
//! performance controller from parking sibling audio threads on efficiency
//! cores). Neither phase does real work; the point is entirely about
//! keeping the core's clock state favorable for the audio threads.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use harmoniq_rt::low_energy_wait_batch;

/// Live-reconfigurable parameters shared by a running `BusyThread`. Changes
/// take effect within one period, per the same-mutex update rule.
pub struct BusyThreadConfig {
    period_nanos: AtomicU64,
    cpu_usage_bits: AtomicU32,
}

impl BusyThreadConfig {
    pub fn new(period: Duration, cpu_usage: f32) -> Self {
        Self {
            period_nanos: AtomicU64::new(period.as_nanos() as u64),
            cpu_usage_bits: AtomicU32::new(cpu_usage.clamp(0.0, 1.0).to_bits()),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.period_nanos.load(Ordering::Relaxed))
    }

    pub fn set_period(&self, period: Duration) {
        self.period_nanos.store(period.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn cpu_usage(&self) -> f32 {
        f32::from_bits(self.cpu_usage_bits.load(Ordering::Relaxed))
    }

    pub fn set_cpu_usage(&self, cpu_usage: f32) {
        self.cpu_usage_bits
            .store(cpu_usage.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

struct BusyThreadState {
    active: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
    config: Arc<BusyThreadConfig>,
}

fn busy_thread_loop(state: Arc<BusyThreadState>) {
    while state.active.load(Ordering::Acquire) {
        let period = state.config.period();
        let cpu_usage = state.config.cpu_usage();
        let block_duration = period.mul_f32(1.0 - cpu_usage);
        let work_duration = period.mul_f32(cpu_usage);

        let mut guard = state.mutex.lock();
        let timed_out = state
            .condvar
            .wait_while_for(&mut guard, |_| state.active.load(Ordering::Acquire), block_duration);
        drop(guard);
        if !timed_out.timed_out() {
            // Woken because `active` went false while blocking.
            break;
        }

        let work_deadline = Instant::now() + work_duration;
        while state.active.load(Ordering::Acquire) && Instant::now() < work_deadline {
            low_energy_wait_batch(16);
        }
    }
}

struct BusyThreadHandle {
    state: Arc<BusyThreadState>,
    join: Option<JoinHandle<()>>,
}

impl BusyThreadHandle {
    fn spawn(index: usize, config: Arc<BusyThreadConfig>) -> Self {
        let state = Arc::new(BusyThreadState {
            active: AtomicBool::new(true),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            config,
        });
        let thread_state = Arc::clone(&state);
        let join = thread::Builder::new()
            .name(format!("harmoniq-busy-{index}"))
            .spawn(move || busy_thread_loop(thread_state))
            .expect("failed to spawn busy thread");
        Self {
            state,
            join: Some(join),
        }
    }

    fn stop(mut self) {
        self.state.active.store(false, Ordering::Release);
        let _guard = self.state.mutex.lock();
        self.state.condvar.notify_all();
        drop(_guard);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Owns a pool of `BusyThread`s and keeps them reconfigurable without a
/// restart: period and CPU-usage changes are applied through the shared
/// `BusyThreadConfig`, visible to a running thread within one period;
/// changing the thread count rebuilds the pool.
pub struct BusyThreads {
    config: Arc<BusyThreadConfig>,
    threads: Vec<BusyThreadHandle>,
}

impl BusyThreads {
    pub fn new(count: u32, period: Duration, cpu_usage: f32) -> Self {
        let config = Arc::new(BusyThreadConfig::new(period, cpu_usage));
        let threads = (0..count)
            .map(|i| BusyThreadHandle::spawn(i as usize, Arc::clone(&config)))
            .collect();
        Self { config, threads }
    }

    pub fn count(&self) -> usize {
        self.threads.len()
    }

    pub fn period(&self) -> Duration {
        self.config.period()
    }

    pub fn cpu_usage(&self) -> f32 {
        self.config.cpu_usage()
    }

    pub fn set_period(&self, period: Duration) {
        self.config.set_period(period);
    }

    pub fn set_cpu_usage(&self, cpu_usage: f32) {
        self.config.set_cpu_usage(cpu_usage);
    }

    pub fn set_count(&mut self, count: u32) {
        if count as usize == self.threads.len() {
            return;
        }
        let old = std::mem::take(&mut self.threads);
        for handle in old {
            handle.stop();
        }
        self.threads = (0..count)
            .map(|i| BusyThreadHandle::spawn(i as usize, Arc::clone(&self.config)))
            .collect();
    }
}

impl Drop for BusyThreads {
    fn drop(&mut self) {
        let threads = std::mem::take(&mut self.threads);
        for handle in threads {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_with_requested_thread_count() {
        let pool = BusyThreads::new(2, Duration::from_millis(5), 0.5);
        assert_eq!(pool.count(), 2);
    }

    #[test]
    fn set_count_rebuilds_the_pool() {
        let mut pool = BusyThreads::new(1, Duration::from_millis(5), 0.5);
        pool.set_count(3);
        assert_eq!(pool.count(), 3);
        pool.set_count(0);
        assert_eq!(pool.count(), 0);
    }

    #[test]
    fn period_and_cpu_usage_update_live() {
        let pool = BusyThreads::new(1, Duration::from_millis(35), 0.5);
        pool.set_period(Duration::from_millis(10));
        pool.set_cpu_usage(0.2);
        assert_eq!(pool.period(), Duration::from_millis(10));
        assert_eq!(pool.cpu_usage(), 0.2);
    }

    #[test]
    fn drop_joins_all_threads_without_hanging() {
        let pool = BusyThreads::new(2, Duration::from_millis(2), 0.3);
        drop(pool);
    }
}
