//! Harmoniq RT
//! ============
//! Platform-facing real-time hygiene: FPU flags, memory locking, CPU
//! affinity, thread scheduling policy, and workgroup membership. This is the
//! one leaf of the scheduling core that is platform-specific in the
//! reference implementation; everywhere it can't act (non-Linux, missing
//! features) it degrades to a logged no-op rather than an error, since none
//! of it is load-bearing for correctness — only for keeping the performance
//! controller from throttling the audio threads.

pub mod affinity;
pub mod hygiene;
pub mod policy;
pub mod workgroup;

pub use affinity::{pick_cores, pin_current_thread_to};
pub use hygiene::{enable_ftz_daz, low_energy_wait, low_energy_wait_batch, mlock_process};
pub use policy::{apply_time_constraint_policy, TimeConstraintPolicy};
pub use workgroup::{ScopedMembership, Workgroup};
