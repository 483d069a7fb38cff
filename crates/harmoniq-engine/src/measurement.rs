//! Per-buffer diagnostics handed back to whatever observes the engine
//! (a UI, a benchmark harness, a test).

/// Upper bound on worker threads a single measurement can report on.
/// `AudioHost` rejects configurations that would exceed it.
pub const MAX_NUM_THREADS: usize = 8;

/// One render callback's worth of scheduling and workload data.
///
/// `cpu_numbers[i]` and `num_active_partials_processed[i]` are populated for
/// `i < num_threads`; the remaining slots are left at `-1` to make
/// "thread did not participate" distinguishable from "thread ran on core 0
/// and processed 0 partials".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveMeasurement {
    pub host_time: f64,
    pub duration: f64,
    pub num_frames: i32,
    pub cpu_numbers: [i32; MAX_NUM_THREADS],
    pub num_active_partials_processed: [i32; MAX_NUM_THREADS],
    pub input_peak_level: f32,
}

impl Default for DriveMeasurement {
    fn default() -> Self {
        Self {
            host_time: 0.0,
            duration: 0.0,
            num_frames: 0,
            cpu_numbers: [-1; MAX_NUM_THREADS],
            num_active_partials_processed: [-1; MAX_NUM_THREADS],
            input_peak_level: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_marks_every_thread_slot_unused() {
        let m = DriveMeasurement::default();
        assert!(m.cpu_numbers.iter().all(|&c| c == -1));
        assert!(m.num_active_partials_processed.iter().all(|&c| c == -1));
    }
}
