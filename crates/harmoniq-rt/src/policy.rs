//! Real-time scheduling policy for audio worker threads.
//!
//! The reference platform expresses this as a time-constraint thread policy
//! `(period, quantum, constraint, preemptible)`. Thread-policy syscalls are
//! an external collaborator per the scheduling core's contract; this module
//! gives the interface a Linux-realizable backing (`SCHED_FIFO`) and is a
//! no-op everywhere else.

use std::time::Duration;

/// Mirrors the platform's real-time time-constraint policy parameters.
#[derive(Debug, Clone, Copy)]
pub struct TimeConstraintPolicy {
    pub period: Duration,
    pub quantum: Duration,
    pub constraint: Duration,
    pub preemptible: bool,
}

impl TimeConstraintPolicy {
    /// The policy used by audio worker threads: period and constraint equal
    /// to the nominal buffer duration, a fixed 500 microsecond quantum.
    pub fn for_buffer_duration(nominal_buffer_duration: Duration) -> Self {
        Self {
            period: nominal_buffer_duration,
            quantum: Duration::from_micros(500),
            constraint: nominal_buffer_duration,
            preemptible: true,
        }
    }
}

/// Applies a real-time scheduling policy to the calling thread. Failures are
/// logged and swallowed: a thread that cannot get RT priority still
/// processes audio, just with a higher risk of dropouts under contention.
pub fn apply_time_constraint_policy(policy: &TimeConstraintPolicy) {
    #[cfg(target_os = "linux")]
    {
        linux::apply(policy);
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = policy;
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::TimeConstraintPolicy;

    pub fn apply(policy: &TimeConstraintPolicy) {
        // SCHED_FIFO priority is coarse compared to a true time-constraint
        // policy; pick a fixed high priority rather than deriving one from
        // `policy.period`, since Linux RT priorities aren't comparable to a
        // deadline quantum the way `thread_policy_set` parameters are.
        let _ = policy;
        unsafe {
            let sp = libc::sched_param { sched_priority: 48 };
            if libc::sched_setscheduler(0, libc::SCHED_FIFO, &sp) != 0 {
                let err = std::io::Error::last_os_error();
                tracing::warn!(?err, "failed to set SCHED_FIFO policy for RT thread");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_derives_quantum_and_constraint_from_buffer_duration() {
        let dur = Duration::from_micros(2667);
        let policy = TimeConstraintPolicy::for_buffer_duration(dur);
        assert_eq!(policy.period, dur);
        assert_eq!(policy.constraint, dur);
        assert_eq!(policy.quantum, Duration::from_micros(500));
        assert!(policy.preemptible);
    }
}
