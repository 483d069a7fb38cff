//! `AudioHost`: the fan-out/fan-in scheduler core.
//!
//! Owns the worker pool, the per-buffer semaphore handshake, and the render
//! callback installed on the driver. See [`crate::sine_bank::ParallelSineBank`]
//! for the work-stealing engine the workers drive.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use harmoniq_rt::{
    apply_time_constraint_policy, enable_ftz_daz, low_energy_wait_batch, mlock_process, pin_current_thread_to,
    TimeConstraintPolicy, Workgroup,
};

use crate::config::AudioConfig;
use crate::driver::{Driver, DriverStatus, IoBuffers};
use crate::error::EngineError;
use crate::fade::{FadeCommand, VolumeFader};
use crate::measurement::{DriveMeasurement, MAX_NUM_THREADS};
use crate::partial::Partial;
use crate::sem::Semaphore;
use crate::sine_bank::ParallelSineBank;
use crate::spsc::FixedSpscQueue;

/// Observable lifecycle state of the host, independent of the driver's own
/// `DriverStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stopped,
    Started,
}

#[cfg(target_os = "linux")]
fn current_cpu_number() -> i32 {
    unsafe { libc::sched_getcpu() }
}

#[cfg(not(target_os = "linux"))]
fn current_cpu_number() -> i32 {
    -1
}

/// Single-writer-at-a-time fader shared between the render callback and
/// `set_output_volume`'s fade-queue producer. Only the driver thread ever
/// dereferences the inner value, inside the render callback, so this is
/// never touched concurrently despite being `Sync`.
struct FaderCell(UnsafeCell<VolumeFader>);
unsafe impl Sync for FaderCell {}

struct HostShared {
    sine_bank: ParallelSineBank,
    start_sem: Semaphore,
    done_sem: Semaphore,
    host_epoch: Instant,
    num_frames: AtomicU32,
    sample_rate_bits: AtomicU64,
    minimum_load_bits: AtomicU64,
    process_in_driver_thread: AtomicBool,
    active: AtomicBool,
    cpu_numbers: [AtomicI32; MAX_NUM_THREADS],
    active_partials_processed: [AtomicI32; MAX_NUM_THREADS],
    measurements: FixedSpscQueue<DriveMeasurement>,
    fade_queue: FixedSpscQueue<FadeCommand>,
    fader: FaderCell,
    workgroup: Workgroup,
    base_active_partials: AtomicU32,
    burst_extra_partials: AtomicU32,
    burst_frames_remaining: AtomicU64,
    xrun_count: AtomicU64,
    last_duration_bits: AtomicU64,
    max_duration_bits: AtomicU64,
}

impl HostShared {
    fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate_bits.load(Ordering::Acquire))
    }

    fn minimum_load(&self) -> f64 {
        f64::from_bits(self.minimum_load_bits.load(Ordering::Acquire))
    }
}

/// Snapshot of the render callback's recent timing health: how many buffers
/// ran longer than their own nominal duration (an overrun, "xrun" in the
/// traditional digital-audio sense), and the most recent/worst-case wall
/// time spent in the callback. Read from any non-RT thread; the underlying
/// atomics are written once per buffer by the driver thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub xrun_count: u64,
    pub last_block_duration: Duration,
    pub max_block_duration: Duration,
}

fn ensure_minimum_load(shared: &HostShared, start: Instant, num_frames: usize) {
    let minimum_load = shared.minimum_load();
    if minimum_load <= 0.0 {
        return;
    }
    let sample_rate = shared.sample_rate();
    let target_end = start + Duration::from_secs_f64(num_frames as f64 / sample_rate * minimum_load);
    while Instant::now() < target_end {
        low_energy_wait_batch(16);
    }
}

fn worker_loop(thread_idx: usize, shared: Arc<HostShared>, nominal_buffer_duration: Duration, join_workgroup: bool) {
    enable_ftz_daz();
    if let Err(err) = mlock_process() {
        warn!(?err, thread_idx, "failed to lock worker thread memory");
    }
    pin_current_thread_to(thread_idx);
    apply_time_constraint_policy(&TimeConstraintPolicy::for_buffer_duration(nominal_buffer_duration));

    let mut membership = None;
    loop {
        shared.start_sem.wait();
        if !shared.active.load(Ordering::Acquire) {
            break;
        }
        if join_workgroup && membership.is_none() {
            membership = Some(shared.workgroup.join());
        }

        let loop_start = Instant::now();
        let num_frames = shared.num_frames.load(Ordering::Acquire) as usize;
        let active_count = shared.sine_bank.process(thread_idx, num_frames);
        shared.active_partials_processed[thread_idx].store(active_count as i32, Ordering::Relaxed);
        shared.cpu_numbers[thread_idx].store(current_cpu_number(), Ordering::Relaxed);

        shared.done_sem.post();
        ensure_minimum_load(&shared, loop_start, num_frames);
    }

    drop(membership);
}

/// A running or stopped fan-out/fan-in scheduler bound to one `Driver`.
pub struct AudioHost {
    shared: Arc<HostShared>,
    driver: Box<dyn Driver>,
    workers: Vec<JoinHandle<()>>,
    config: AudioConfig,
    status: Status,
    is_input_enabled: bool,
}

impl AudioHost {
    pub fn new(mut driver: Box<dyn Driver>, config: AudioConfig, partials: Vec<Partial>) -> Result<Self, EngineError> {
        if config.num_processing_threads == 0 {
            return Err(EngineError::InvalidConfig("num_processing_threads must be >= 1".into()));
        }
        if config.num_processing_threads as usize > MAX_NUM_THREADS {
            return Err(EngineError::InvalidConfig(format!(
                "num_processing_threads {} exceeds MAX_NUM_THREADS {MAX_NUM_THREADS}",
                config.num_processing_threads
            )));
        }

        let mut sine_bank = ParallelSineBank::new();
        sine_bank.set_num_threads(config.num_processing_threads as usize);
        sine_bank.set_partials(partials);

        let sample_rate = driver.sample_rate();
        let shared = Arc::new(HostShared {
            sine_bank,
            start_sem: Semaphore::new(),
            done_sem: Semaphore::new(),
            host_epoch: Instant::now(),
            num_frames: AtomicU32::new(0),
            sample_rate_bits: AtomicU64::new(sample_rate.to_bits()),
            minimum_load_bits: AtomicU64::new(config.minimum_load.to_bits()),
            process_in_driver_thread: AtomicBool::new(config.process_in_driver_thread),
            active: AtomicBool::new(false),
            cpu_numbers: std::array::from_fn(|_| AtomicI32::new(-1)),
            active_partials_processed: std::array::from_fn(|_| AtomicI32::new(-1)),
            measurements: FixedSpscQueue::new(64),
            fade_queue: FixedSpscQueue::new(16),
            fader: FaderCell(UnsafeCell::new(VolumeFader::new())),
            workgroup: if config.is_work_interval_on {
                Workgroup::discover()
            } else {
                Workgroup::Unavailable
            },
            base_active_partials: AtomicU32::new(0),
            burst_extra_partials: AtomicU32::new(0),
            burst_frames_remaining: AtomicU64::new(0),
            xrun_count: AtomicU64::new(0),
            last_duration_bits: AtomicU64::new(0),
            max_duration_bits: AtomicU64::new(0),
        });

        Ok(Self {
            shared,
            driver,
            workers: Vec::new(),
            config,
            status: Status::Stopped,
            is_input_enabled: false,
        })
    }

    pub fn is_audio_input_enabled(&self) -> bool {
        self.is_input_enabled
    }

    /// May block for up to ~500 ms: tears down and recreates the audio
    /// session on the driver. Never call from the render callback.
    pub fn set_is_audio_input_enabled(&mut self, enabled: bool) {
        self.is_input_enabled = enabled;
        self.driver.set_is_input_enabled(enabled);
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn driver_status(&self) -> DriverStatus {
        self.driver.status()
    }

    /// Exposes the underlying driver for tests that need to drive a
    /// [`crate::driver::NullDriver`] by hand via `as_any_mut`/`downcast_mut`.
    pub fn driver_mut(&mut self) -> &mut dyn Driver {
        self.driver.as_mut()
    }

    pub fn sample_rate(&self) -> f64 {
        self.shared.sample_rate()
    }

    pub fn num_active_partials(&self) -> u32 {
        self.shared.base_active_partials.load(Ordering::Acquire)
    }

    pub fn max_num_partials(&self) -> usize {
        self.shared.sine_bank.partials_len()
    }

    pub fn preferred_buffer_size(&self) -> u32 {
        (self.driver.nominal_buffer_duration().as_secs_f64() * self.shared.sample_rate()).round() as u32
    }

    /// May change the actual buffer size; the new value must be reobserved
    /// via subsequent callbacks rather than assumed to take effect exactly.
    pub fn set_preferred_buffer_size(&mut self, frames: u32) -> Result<(), EngineError> {
        self.driver.set_preferred_buffer_size(frames)
    }

    pub fn set_num_active_partials(&self, n: u32) {
        self.shared.base_active_partials.store(n, Ordering::Release);
    }

    pub fn set_minimum_load(&self, fraction: f64) {
        self.shared
            .minimum_load_bits
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }

    pub fn set_process_in_driver_thread(&self, enabled: bool) {
        self.shared.process_in_driver_thread.store(enabled, Ordering::Release);
    }

    /// Replaces the thread-count/work-interval shape of the host. Only
    /// valid while stopped: `num_processing_threads` governs how many
    /// worker threads `start()` spawns and `is_work_interval_on` governs
    /// whether they join the platform workgroup, both decided once per
    /// `start()` call rather than read live like `minimum_load` or
    /// `process_in_driver_thread`. Calling this while running is a no-op.
    pub fn reconfigure(&mut self, config: AudioConfig) -> Result<(), EngineError> {
        if self.status == Status::Started {
            return Err(EngineError::InvalidConfig(
                "cannot reconfigure thread count or work-interval membership while running".into(),
            ));
        }
        if config.num_processing_threads == 0 {
            return Err(EngineError::InvalidConfig("num_processing_threads must be >= 1".into()));
        }
        if config.num_processing_threads as usize > MAX_NUM_THREADS {
            return Err(EngineError::InvalidConfig(format!(
                "num_processing_threads {} exceeds MAX_NUM_THREADS {MAX_NUM_THREADS}",
                config.num_processing_threads
            )));
        }

        let shared = Arc::get_mut(&mut self.shared).expect("reconfigure called while shared state is aliased");
        shared.sine_bank.set_num_threads(config.num_processing_threads as usize);
        shared
            .process_in_driver_thread
            .store(config.process_in_driver_thread, Ordering::Release);
        shared.minimum_load_bits.store(config.minimum_load.to_bits(), Ordering::Release);
        shared.workgroup = if config.is_work_interval_on {
            Workgroup::discover()
        } else {
            Workgroup::Unavailable
        };

        self.config = config;
        Ok(())
    }

    /// Stages `additional_sines` active partials on top of the base count
    /// for the next `duration` seconds. Applied atomically starting on the
    /// next callback with a sample-accurate countdown.
    pub fn play_sine_burst(&self, duration_seconds: f64, additional_sines: u32) {
        let frames = (duration_seconds * self.shared.sample_rate()).round().max(0.0) as u64;
        self.shared.burst_extra_partials.store(additional_sines, Ordering::Release);
        self.shared.burst_frames_remaining.store(frames, Ordering::Release);
    }

    /// Current output volume. Reflects the fader's ramping value, not just
    /// the last requested target, matching spec.md §6's readable
    /// `outputVolume` property.
    pub fn output_volume(&self) -> f32 {
        let fader = unsafe { &*self.shared.fader.0.get() };
        fader.value()
    }

    /// Queues an output-volume fade. Real-time safe: posts to a bounded
    /// SPSC command queue; drops silently if the queue is full.
    pub fn set_output_volume(&self, target_volume: f32, fade_seconds: f64) {
        let num_frames = (fade_seconds * self.shared.sample_rate()).round().max(0.0) as u32;
        self.shared.fade_queue.try_push_back(FadeCommand {
            target_volume: target_volume.max(0.0),
            num_frames,
        });
    }

    pub fn fetch_measurements(&self, mut callback: impl FnMut(DriveMeasurement)) {
        while let Some(m) = self.shared.measurements.pop() {
            callback(m);
        }
    }

    /// Snapshot of recent callback timing health. Safe to call from any
    /// thread at any time, including while the host is stopped.
    pub fn stats(&self) -> Stats {
        Stats {
            xrun_count: self.shared.xrun_count.load(Ordering::Relaxed),
            last_block_duration: Duration::from_secs_f64(f64::from_bits(
                self.shared.last_duration_bits.load(Ordering::Relaxed),
            )),
            max_block_duration: Duration::from_secs_f64(f64::from_bits(
                self.shared.max_duration_bits.load(Ordering::Relaxed),
            )),
        }
    }

    pub fn set_partials(&self, partials: Vec<Partial>) {
        // Safe only while stopped: mirrors ParallelSineBank::set_partials's
        // own precondition.
        unsafe {
            let bank = &self.shared.sine_bank as *const ParallelSineBank as *mut ParallelSineBank;
            (*bank).set_partials(partials);
        }
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.status == Status::Started {
            return Ok(());
        }
        if self.driver.status() == DriverStatus::Invalid {
            return Err(EngineError::DriverInvalid);
        }

        self.shared.active.store(true, Ordering::Release);

        let total_threads = self.config.num_processing_threads;
        let driver_participates = self.config.process_in_driver_thread;
        let worker_count = total_threads - if driver_participates { 1 } else { 0 };
        let worker_start_idx = if driver_participates { 1 } else { 0 };
        let nominal_buffer_duration = self.driver.nominal_buffer_duration();
        let join_workgroup = self.config.is_work_interval_on;

        let mut workers = Vec::with_capacity(worker_count as usize);
        for offset in 0..worker_count {
            let thread_idx = (worker_start_idx + offset) as usize;
            let shared = Arc::clone(&self.shared);
            let handle = thread::Builder::new()
                .name(format!("harmoniq-worker-{thread_idx}"))
                .spawn(move || worker_loop(thread_idx, shared, nominal_buffer_duration, join_workgroup))
                .expect("failed to spawn audio worker thread");
            workers.push(handle);
        }
        self.workers = workers;

        let shared = Arc::clone(&self.shared);
        let callback: Box<dyn FnMut(&mut IoBuffers<'_>) + Send> = Box::new(move |io| {
            render_buffer(&shared, io, worker_count, driver_participates);
        });

        self.driver.start(callback)?;
        if self.driver.status() == DriverStatus::Invalid {
            warn!("driver transitioned to Invalid during start");
            self.shared.active.store(false, Ordering::Release);
            for _ in 0..worker_count {
                self.shared.start_sem.post();
            }
            for handle in self.workers.drain(..) {
                let _ = handle.join();
            }
            return Err(EngineError::DriverInvalid);
        }

        self.status = Status::Started;
        info!(worker_count, driver_participates, "audio host started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.status != Status::Started {
            return;
        }

        self.driver.stop();
        self.shared.active.store(false, Ordering::Release);

        let worker_count = self.workers.len();
        for _ in 0..worker_count {
            self.shared.start_sem.post();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }

        self.status = Status::Stopped;
        debug!("audio host stopped");
    }
}

impl Drop for AudioHost {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_buffer(shared: &Arc<HostShared>, io: &mut IoBuffers<'_>, worker_count: u32, driver_participates: bool) {
    let buffer_start = Instant::now();
    let num_frames = io.num_frames();
    shared.num_frames.store(num_frames as u32, Ordering::Release);

    // renderStarted: drain every pending fade command (only the newest
    // survives per spec.md §4.1/§7's soft-drop contract), read input peak,
    // and stage this buffer's active-partial count (base plus burst, if any).
    while let Some(cmd) = shared.fade_queue.pop() {
        let fader = unsafe { &mut *shared.fader.0.get() };
        fader.ramp_to(cmd.target_volume, cmd.num_frames);
    }

    let input_peak = io
        .input_left
        .iter()
        .chain(io.input_right.iter())
        .fold(0.0f32, |peak, &s| peak.max(s.abs()));

    let remaining = shared.burst_frames_remaining.load(Ordering::Acquire);
    let base = shared.base_active_partials.load(Ordering::Acquire);
    let effective_active = if remaining > 0 {
        base + shared.burst_extra_partials.load(Ordering::Acquire)
    } else {
        base
    };
    let consumed = (num_frames as u64).min(remaining);
    shared
        .burst_frames_remaining
        .store(remaining - consumed, Ordering::Release);

    shared.sine_bank.prepare(effective_active, num_frames);

    for _ in 0..worker_count {
        shared.start_sem.post();
    }
    if driver_participates {
        let active_count = shared.sine_bank.process(0, num_frames);
        shared.active_partials_processed[0].store(active_count as i32, Ordering::Relaxed);
        shared.cpu_numbers[0].store(current_cpu_number(), Ordering::Relaxed);
    }
    for _ in 0..worker_count {
        shared.done_sem.wait();
    }

    // renderEnded: zero the output, mix, apply the fader, publish a
    // measurement.
    io.output_left.fill(0.0);
    io.output_right.fill(0.0);
    shared.sine_bank.mix_to(io.output_left, io.output_right, num_frames);

    let fader = unsafe { &mut *shared.fader.0.get() };
    fader.apply(io.output_left, io.output_right);

    let mut cpu_numbers = [-1i32; MAX_NUM_THREADS];
    let mut active_partials_processed = [-1i32; MAX_NUM_THREADS];
    let total_threads = worker_count as usize + if driver_participates { 1 } else { 0 };
    for i in 0..total_threads.min(MAX_NUM_THREADS) {
        cpu_numbers[i] = shared.cpu_numbers[i].load(Ordering::Relaxed);
        active_partials_processed[i] = shared.active_partials_processed[i].load(Ordering::Relaxed);
    }

    let duration = buffer_start.elapsed().as_secs_f64();
    let measurement = DriveMeasurement {
        host_time: buffer_start.duration_since(shared.host_epoch).as_secs_f64(),
        duration,
        num_frames: num_frames as i32,
        cpu_numbers,
        num_active_partials_processed: active_partials_processed,
        input_peak_level: input_peak,
    };
    shared.measurements.try_push_back(measurement);

    shared.last_duration_bits.store(duration.to_bits(), Ordering::Relaxed);
    let max_so_far = f64::from_bits(shared.max_duration_bits.load(Ordering::Relaxed));
    if duration > max_so_far {
        shared.max_duration_bits.store(duration.to_bits(), Ordering::Relaxed);
    }
    let nominal = num_frames as f64 / shared.sample_rate();
    if duration > nominal {
        shared.xrun_count.fetch_add(1, Ordering::Relaxed);
    }

    if driver_participates {
        ensure_minimum_load(shared, buffer_start, num_frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NullDriver;

    fn tone_partial() -> Partial {
        let mut p = Partial::new(1.0, 0.0, 0.05, 1.0);
        p.target_amp = 1.0;
        p.amp = 1.0;
        p
    }

    fn test_config() -> AudioConfig {
        AudioConfig {
            num_processing_threads: 2,
            process_in_driver_thread: true,
            is_work_interval_on: true,
            minimum_load: 0.0,
        }
    }

    #[test]
    fn start_then_stop_is_idempotent_and_joins_workers() {
        let driver = Box::new(NullDriver::new(48_000.0, 64));
        let mut host = AudioHost::new(driver, test_config(), vec![tone_partial()]).unwrap();
        host.start().unwrap();
        assert_eq!(host.status(), Status::Started);
        host.start().unwrap();
        host.stop();
        assert_eq!(host.status(), Status::Stopped);
        host.stop();
    }

    #[test]
    fn reconfigure_rebuilds_scratch_and_workgroup_while_stopped() {
        let driver = Box::new(NullDriver::new(48_000.0, 64));
        let mut host = AudioHost::new(driver, test_config(), vec![tone_partial()]).unwrap();

        let mut reconfigured = test_config();
        reconfigured.num_processing_threads = 4;
        reconfigured.is_work_interval_on = false;
        host.reconfigure(reconfigured).unwrap();
        assert_eq!(host.shared.sine_bank.num_threads(), 4);

        host.start().unwrap();
        assert!(host.reconfigure(reconfigured).is_err());
        host.stop();
    }

    #[test]
    fn invalid_driver_refuses_to_start() {
        let mut driver = NullDriver::new(48_000.0, 64);
        driver.force_invalid();
        let mut host = AudioHost::new(Box::new(driver), test_config(), vec![]).unwrap();
        assert!(host.start().is_err());
        assert_eq!(host.status(), Status::Stopped);
    }

    #[test]
    fn rejects_thread_count_above_max() {
        let driver = Box::new(NullDriver::new(48_000.0, 64));
        let mut config = test_config();
        config.num_processing_threads = MAX_NUM_THREADS as u32 + 1;
        assert!(AudioHost::new(driver, config, vec![]).is_err());
    }

    #[test]
    fn minimum_load_enforces_a_floor_on_buffer_duration() {
        let driver = Box::new(NullDriver::new(48_000.0, 128));
        let host = AudioHost::new(driver, test_config(), vec![tone_partial()]).unwrap();
        host.set_minimum_load(0.5);

        let num_frames = 128usize;
        let expected_floor = Duration::from_secs_f64(num_frames as f64 / 48_000.0 * 0.5);
        let start = Instant::now();
        ensure_minimum_load(&host.shared, start, num_frames);
        assert!(start.elapsed() >= expected_floor);
    }

    #[test]
    fn zero_minimum_load_returns_immediately() {
        let driver = Box::new(NullDriver::new(48_000.0, 128));
        let host = AudioHost::new(driver, test_config(), vec![tone_partial()]).unwrap();
        host.set_minimum_load(0.0);

        let start = Instant::now();
        ensure_minimum_load(&host.shared, start, 128);
        assert!(start.elapsed() < Duration::from_millis(5));
    }

    #[test]
    fn stats_tracks_last_and_max_block_duration() {
        let driver = Box::new(NullDriver::new(48_000.0, 64));
        let mut host = AudioHost::new(driver, test_config(), vec![tone_partial()]).unwrap();
        host.start().unwrap();

        let null_driver = host.driver_mut().as_any_mut().downcast_mut::<NullDriver>().unwrap();
        null_driver.pump();
        null_driver.pump();

        let stats = host.stats();
        assert!(stats.last_block_duration >= Duration::ZERO);
        assert!(stats.max_block_duration >= stats.last_block_duration || stats.max_block_duration > Duration::ZERO);
        host.stop();
    }

    #[test]
    fn render_buffer_drains_every_queued_fade_command_keeping_only_the_newest() {
        let driver = Box::new(NullDriver::new(48_000.0, 64));
        let mut host = AudioHost::new(driver, test_config(), vec![]).unwrap();
        host.start().unwrap();

        host.set_output_volume(0.25, 0.0);
        host.set_output_volume(0.5, 0.0);
        host.set_output_volume(0.75, 0.0);

        let null_driver = host
            .driver_mut()
            .as_any_mut()
            .downcast_mut::<NullDriver>()
            .unwrap();
        null_driver.pump();

        assert_eq!(host.output_volume(), 0.75);
        assert!(host.shared.fade_queue.pop().is_none());
        host.stop();
    }

    #[test]
    fn output_volume_starts_at_unity_and_tracks_the_ramp() {
        let driver = Box::new(NullDriver::new(48_000.0, 64));
        let mut host = AudioHost::new(driver, test_config(), vec![]).unwrap();
        assert_eq!(host.output_volume(), 1.0);

        host.start().unwrap();
        host.set_output_volume(0.0, 0.0);
        let null_driver = host.driver_mut().as_any_mut().downcast_mut::<NullDriver>().unwrap();
        null_driver.pump();
        assert_eq!(host.output_volume(), 0.0);
        host.stop();
    }
}
