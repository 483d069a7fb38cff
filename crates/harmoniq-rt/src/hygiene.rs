//! CPU/FPU hygiene helpers for real-time audio threads.
//!
//! These routines keep the audio path free of denormal stalls and major page
//! faults. They are cheap enough to call once per thread at startup.

/// Enables flush-to-zero and denormals-are-zero on supported CPUs.
#[inline]
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn enable_ftz_daz() {
    unsafe {
        #[cfg(target_arch = "x86")]
        use std::arch::x86::{_mm_getcsr, _mm_setcsr};
        #[cfg(target_arch = "x86_64")]
        use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};

        const FTZ: u32 = 1 << 15;
        const DAZ: u32 = 1 << 6;
        let csr = _mm_getcsr();
        _mm_setcsr(csr | FTZ | DAZ);
    }
}

#[inline]
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn enable_ftz_daz() {}

/// Locks the process's address space into RAM to avoid major page faults
/// during real-time processing. No-op on platforms without `mlockall`.
#[cfg(target_os = "linux")]
pub fn mlock_process() -> std::io::Result<()> {
    unsafe {
        let flags = libc::MCL_CURRENT | libc::MCL_FUTURE;
        if libc::mlockall(flags) != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EPERM) {
                tracing::warn!("mlockall denied (EPERM); continuing without locked memory");
                return Ok(());
            }
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn mlock_process() -> std::io::Result<()> {
    Ok(())
}

/// A single hardware low-energy-wait "tick" (e.g. `pause`/`wfe`). Burns a
/// small, roughly constant amount of wall time with minimal power draw and
/// without descheduling the calling thread.
#[inline(always)]
pub fn low_energy_wait() {
    core::hint::spin_loop();
}

/// Issues a batch of [`low_energy_wait`] ticks. Batching amortizes the loop
/// overhead; callers spinning toward a deadline should call this in a loop
/// rather than issuing one tick per check.
#[inline]
pub fn low_energy_wait_batch(ticks: u32) {
    for _ in 0..ticks {
        low_energy_wait();
    }
}
