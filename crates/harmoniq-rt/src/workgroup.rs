//! Workgroup / work-interval membership.
//!
//! Presented to the scheduler as a single capability:
//! `{ max_parallel_threads() -> usize, join() -> ScopedMembership }`. Behind
//! that surface is a tagged variant — a modern workgroup where the platform
//! supports one, or a "no facility discovered" fallback — so the scheduler
//! never has to branch on which kind it holds. The actual mach/XNU work
//! interval syscalls are an external collaborator outside this crate's
//! scope; [`Native`](Workgroup::Native) gives the interface a real,
//! testable join/leave bookkeeping so callers can be exercised without a
//! platform dependency.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct NativeWorkgroup {
    max_parallel_threads: usize,
    members: Arc<AtomicUsize>,
}

/// A workgroup (or the absence of one), discovered once at startup.
pub enum Workgroup {
    Native(NativeWorkgroup),
    Unavailable,
}

impl Workgroup {
    /// Attempts to discover a platform work-interval facility. Enumerating
    /// the process's port rights and joining each send-right is the
    /// legacy-port discovery strategy this models; since that facility does
    /// not exist outside the reference platform, discovery here always
    /// yields [`Unavailable`](Workgroup::Unavailable). Call sites must not
    /// branch on the result beyond the `max_parallel_threads`/`join`
    /// surface — swapping in a real platform backend later is purely an
    /// internal change to this function.
    pub fn discover() -> Self {
        Workgroup::Unavailable
    }

    /// Builds a workgroup with simulated join/leave bookkeeping, useful for
    /// tests and for embedders that want membership accounting without a
    /// platform facility.
    pub fn simulated(max_parallel_threads: usize) -> Self {
        Workgroup::Native(NativeWorkgroup {
            max_parallel_threads,
            members: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn max_parallel_threads(&self) -> usize {
        match self {
            Workgroup::Native(wg) => wg.max_parallel_threads,
            Workgroup::Unavailable => 0,
        }
    }

    /// Joins the workgroup, returning a move-only handle that leaves on
    /// drop. Joining an [`Unavailable`](Workgroup::Unavailable) workgroup is
    /// a harmless no-op.
    pub fn join(&self) -> ScopedMembership {
        match self {
            Workgroup::Native(wg) => {
                wg.members.fetch_add(1, Ordering::AcqRel);
                ScopedMembership {
                    members: Some(Arc::clone(&wg.members)),
                }
            }
            Workgroup::Unavailable => ScopedMembership { members: None },
        }
    }

    /// Current number of joined members; only meaningful for
    /// [`simulated`](Self::simulated) workgroups, used by tests.
    pub fn member_count(&self) -> usize {
        match self {
            Workgroup::Native(wg) => wg.members.load(Ordering::Acquire),
            Workgroup::Unavailable => 0,
        }
    }
}

/// Move-only handle to an active workgroup membership. Leaves the workgroup
/// exactly once, on drop.
pub struct ScopedMembership {
    members: Option<Arc<AtomicUsize>>,
}

impl Drop for ScopedMembership {
    fn drop(&mut self) {
        if let Some(members) = self.members.take() {
            members.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_workgroup_has_no_capacity() {
        let wg = Workgroup::discover();
        assert_eq!(wg.max_parallel_threads(), 0);
        let membership = wg.join();
        drop(membership);
    }

    #[test]
    fn join_then_drop_leaves_exactly_once() {
        let wg = Workgroup::simulated(4);
        assert_eq!(wg.member_count(), 0);
        let membership = wg.join();
        assert_eq!(wg.member_count(), 1);
        drop(membership);
        assert_eq!(wg.member_count(), 0);
    }

    #[test]
    fn multiple_members_join_independently() {
        let wg = Workgroup::simulated(4);
        let a = wg.join();
        let b = wg.join();
        assert_eq!(wg.member_count(), 2);
        drop(a);
        assert_eq!(wg.member_count(), 1);
        drop(b);
        assert_eq!(wg.member_count(), 0);
    }
}
