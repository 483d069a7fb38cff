//! CPU core selection and pinning.

/// Attempts to pin the current thread to the provided logical core. When
/// affinity management is not available (feature disabled, platform
/// unsupported, or the topology can't be queried), the call succeeds without
/// making changes — callers must not depend on pinning actually happening.
#[allow(unused_variables)]
pub fn pin_current_thread_to(core: usize) {
    #[cfg(all(target_os = "linux", feature = "core_affinity"))]
    {
        match core_affinity::get_core_ids() {
            Some(ids) if !ids.is_empty() => {
                let target = ids
                    .get(core)
                    .cloned()
                    .unwrap_or_else(|| ids[core % ids.len()].clone());
                if !core_affinity::set_for_current(target) {
                    tracing::warn!(core, "failed to apply CPU affinity");
                }
            }
            _ => tracing::warn!("failed to query CPU topology for affinity pinning"),
        }
    }
}

/// Picks an RT core and a list of worker cores given a requested worker
/// count and an optional explicit pin list. Mirrors the selection logic a
/// caller would use to keep the audio callback thread off SMT siblings of
/// the worker pool.
pub fn pick_cores(workers: u32, explicit: &[usize], pin_rt_core: Option<usize>, avoid_smt: bool) -> (Option<usize>, Vec<usize>) {
    if !explicit.is_empty() {
        let mut pool = explicit.to_vec();
        let rt = pin_rt_core
            .or_else(|| pool.first().copied())
            .map(|core| normalize_core(core, avoid_smt));
        if let Some(rt_core) = rt {
            pool.retain(|c| *c != rt_core);
        }
        pool.truncate(workers as usize);
        return (rt, pool);
    }

    let total = if avoid_smt {
        num_cpus::get_physical().max(1)
    } else {
        num_cpus::get().max(1)
    };

    let rt_core = pin_rt_core
        .map(|core| normalize_index(core, total))
        .or(Some(0));

    let mut pool = Vec::new();
    for idx in 0..total {
        if Some(idx) == rt_core {
            continue;
        }
        pool.push(idx);
        if pool.len() >= workers as usize {
            break;
        }
    }

    (rt_core, pool)
}

fn normalize_core(core: usize, avoid_smt: bool) -> usize {
    if avoid_smt {
        normalize_index(core, num_cpus::get_physical().max(1))
    } else {
        normalize_index(core, num_cpus::get().max(1))
    }
}

fn normalize_index(idx: usize, limit: usize) -> usize {
    if limit == 0 {
        0
    } else {
        idx % limit
    }
}
