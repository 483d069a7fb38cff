//! Work-stealing parallel engine over a fixed list of sinusoidal partials.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::partial::{process_partial, Partial};

/// Hard upper bound on frames per buffer; `numFrames > K_MAX_NUM_FRAMES` is
/// a programmer error and aborts the process, per the scheduling core's
/// fatal-invariant-violation contract.
pub const K_MAX_NUM_FRAMES: usize = 1024;

/// Partials are claimed in chunks of this size to amortize the atomic
/// fetch-and-add, simulate coarser-grained DSP units, and bound how little
/// work a claim can do. The spec fixes the claim semantics but not this
/// constant; 256 matches the reference implementation's order of magnitude.
pub const K_NUM_PARTIALS_PER_PROCESSING_CHUNK: u32 = 256;

struct ScratchBuffer {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl ScratchBuffer {
    fn new() -> Self {
        Self {
            left: vec![0.0; K_MAX_NUM_FRAMES],
            right: vec![0.0; K_MAX_NUM_FRAMES],
        }
    }
}

/// Wraps the per-thread scratch buffers in interior mutability: each buffer
/// is written by exactly one worker and read by the driver thread only
/// after every worker has signaled completion (see `AudioHost`'s
/// happens-before chain), so the aliasing this enables is never exercised
/// concurrently.
struct ScratchCell(UnsafeCell<ScratchBuffer>);
unsafe impl Sync for ScratchCell {}

/// Same reasoning as [`ScratchCell`]: partials in a claimed chunk are
/// touched by exactly one worker per buffer, so shared, unsynchronized
/// mutable access across disjoint index ranges is sound.
struct PartialsCell(UnsafeCell<Vec<Partial>>);
unsafe impl Sync for PartialsCell {}

pub struct ParallelSineBank {
    partials: PartialsCell,
    scratch: Vec<ScratchCell>,
    num_active_partials: AtomicU32,
    num_taken_partials: AtomicU32,
}

impl ParallelSineBank {
    pub fn new() -> Self {
        Self {
            partials: PartialsCell(UnsafeCell::new(Vec::new())),
            scratch: Vec::new(),
            num_active_partials: AtomicU32::new(0),
            num_taken_partials: AtomicU32::new(0),
        }
    }

    /// Resizes the per-thread scratch buffer vector. Callable only when no
    /// audio is active (the caller, `AudioHost`, upholds this by only
    /// calling it from `Stopped` state).
    pub fn set_num_threads(&mut self, n: usize) {
        self.scratch = (0..n).map(|_| ScratchCell(UnsafeCell::new(ScratchBuffer::new()))).collect();
    }

    pub fn num_threads(&self) -> usize {
        self.scratch.len()
    }

    /// Replaces the partial list. `partials` must already be sorted
    /// ascending by `phase_increment`.
    pub fn set_partials(&mut self, partials: Vec<Partial>) {
        debug_assert!(
            partials.windows(2).all(|w| w[0].phase_increment <= w[1].phase_increment),
            "partials must be sorted ascending by phase_increment"
        );
        unsafe {
            *self.partials.0.get() = partials;
        }
    }

    pub fn partials_len(&self) -> usize {
        unsafe { (*self.partials.0.get()).len() }
    }

    pub fn num_active_partials(&self) -> u32 {
        self.num_active_partials.load(Ordering::Acquire)
    }

    /// Called by the driver thread at buffer start: sets the active-partial
    /// count, zeros every thread's scratch buffer up to `num_frames`, and
    /// resets the claim counter.
    pub fn prepare(&self, num_active: u32, num_frames: usize) {
        assert!(
            num_frames <= K_MAX_NUM_FRAMES,
            "numFrames {num_frames} exceeds K_MAX_NUM_FRAMES {K_MAX_NUM_FRAMES}"
        );
        self.num_active_partials.store(num_active, Ordering::Release);
        for cell in &self.scratch {
            let buf = unsafe { &mut *cell.0.get() };
            buf.left[..num_frames].fill(0.0);
            buf.right[..num_frames].fill(0.0);
        }
        self.num_taken_partials.store(0, Ordering::Release);
    }

    /// Claims and processes chunks of partials until none remain. Returns
    /// the number of *active* partials this thread processed.
    pub fn process(&self, thread_idx: usize, num_frames: usize) -> u32 {
        assert!(
            num_frames <= K_MAX_NUM_FRAMES,
            "numFrames {num_frames} exceeds K_MAX_NUM_FRAMES {K_MAX_NUM_FRAMES}"
        );
        assert!(
            thread_idx < self.scratch.len(),
            "thread index {thread_idx} out of range (have {} scratch buffers)",
            self.scratch.len()
        );

        let partials = unsafe { &mut *self.partials.0.get() };
        let scratch = unsafe { &mut *self.scratch[thread_idx].0.get() };
        let num_active = self.num_active_partials.load(Ordering::Acquire);
        let total = partials.len();
        let mut active_processed = 0u32;

        loop {
            let start = self
                .num_taken_partials
                .fetch_add(K_NUM_PARTIALS_PER_PROCESSING_CHUNK, Ordering::AcqRel) as usize;
            if start >= total {
                break;
            }
            let end = (start + K_NUM_PARTIALS_PER_PROCESSING_CHUNK as usize).min(total);
            for idx in start..end {
                let partial = &mut partials[idx];
                if (idx as u32) < num_active {
                    partial.target_amp = partial.amp_when_active;
                    active_processed += 1;
                } else {
                    partial.target_amp = 0.0;
                }
                process_partial(partial, num_frames, &mut scratch.left, &mut scratch.right);
            }
        }

        active_processed
    }

    /// Sums every scratch buffer into the output. The caller must have
    /// zeroed `out_left`/`out_right` first; this accumulates.
    pub fn mix_to(&self, out_left: &mut [f32], out_right: &mut [f32], num_frames: usize) {
        assert!(
            num_frames <= K_MAX_NUM_FRAMES,
            "numFrames {num_frames} exceeds K_MAX_NUM_FRAMES {K_MAX_NUM_FRAMES}"
        );
        let n = num_frames.min(out_left.len()).min(out_right.len());
        for cell in &self.scratch {
            let buf = unsafe { &*cell.0.get() };
            for i in 0..n {
                out_left[i] += buf.left[i];
                out_right[i] += buf.right[i];
            }
        }
    }
}

impl Default for ParallelSineBank {
    fn default() -> Self {
        Self::new()
    }
}
