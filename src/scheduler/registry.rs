use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

/// Set of workplaces that currently have a worker. Every read and write goes
/// through one mutex.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    running: Mutex<HashSet<i64>>,
}

impl WorkerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<i64>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claim the workplace. Returns `None` when a worker already holds it;
    /// the returned guard releases the claim when dropped.
    pub fn mark_running(self: &Arc<Self>, workplace_id: i64) -> Option<RunningGuard> {
        if !self.lock().insert(workplace_id) {
            return None;
        }
        Some(RunningGuard {
            registry: Arc::clone(self),
            workplace_id,
        })
    }

    pub fn mark_stopped(&self, workplace_id: i64) -> bool {
        self.lock().remove(&workplace_id)
    }

    pub fn is_running(&self, workplace_id: i64) -> bool {
        self.lock().contains(&workplace_id)
    }

    pub fn running_count(&self) -> usize {
        self.lock().len()
    }
}

#[derive(Debug)]
pub struct RunningGuard {
    registry: Arc<WorkerRegistry>,
    workplace_id: i64,
}

impl RunningGuard {
    pub fn workplace_id(&self) -> i64 {
        self.workplace_id
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.registry.mark_stopped(self.workplace_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_refused_until_release() {
        let registry = WorkerRegistry::new();

        let guard = registry.mark_running(7).unwrap();
        assert!(registry.is_running(7));
        assert!(registry.mark_running(7).is_none());
        assert_eq!(registry.running_count(), 1);

        drop(guard);
        assert!(!registry.is_running(7));
        assert!(registry.mark_running(7).is_some());
    }

    #[test]
    fn claims_are_per_workplace() {
        let registry = WorkerRegistry::new();

        let a = registry.mark_running(1).unwrap();
        let b = registry.mark_running(2).unwrap();
        assert_eq!(registry.running_count(), 2);
        assert_eq!(a.workplace_id(), 1);

        drop(b);
        assert_eq!(registry.running_count(), 1);
        assert!(!registry.mark_stopped(2));
    }

    #[test]
    fn concurrent_claims_yield_one_winner() {
        let registry = WorkerRegistry::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                // leak the guard so the winning claim outlives its thread
                std::thread::spawn(move || {
                    registry.mark_running(3).map(std::mem::forget).is_some()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(registry.is_running(3));
    }
}
