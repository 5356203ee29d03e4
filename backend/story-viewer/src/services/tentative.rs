//! Optimistic local mutation with exact rollback.
//!
//! The local value is replaced before the remote write is awaited. If the
//! write fails the prior snapshot is written back verbatim, so repeated
//! failures cannot drift the local value.

use std::future::Future;

/// Local storage slot a tentative mutation writes through.
pub trait TentativeSlot<T> {
    /// Write `value`. Returns false when the slot no longer exists
    /// (e.g. the story was evicted while the write was in flight).
    fn write(&self, value: T) -> bool;
}

impl<T, F> TentativeSlot<T> for F
where
    F: Fn(T) -> bool,
{
    fn write(&self, value: T) -> bool {
        self(value)
    }
}

/// Outcome of a failed tentative mutation.
#[derive(Debug)]
pub struct RolledBack<E> {
    pub error: E,
    /// False if the slot disappeared before the rollback landed
    pub restored: bool,
}

/// Apply `optimistic` locally, run `remote`, and restore `prior` if it fails.
pub async fn apply_tentatively<T, S, Fut, E>(
    slot: &S,
    prior: T,
    optimistic: T,
    remote: Fut,
) -> Result<T, RolledBack<E>>
where
    T: Clone,
    S: TentativeSlot<T> + ?Sized,
    Fut: Future<Output = Result<(), E>>,
{
    slot.write(optimistic.clone());

    match remote.await {
        Ok(()) => Ok(optimistic),
        Err(error) => {
            let restored = slot.write(prior);
            Err(RolledBack { error, restored })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_success_keeps_optimistic_value() {
        let value = Mutex::new(1);
        let slot = |v: i32| {
            *value.lock().unwrap() = v;
            true
        };

        let result = apply_tentatively(&slot, 1, 2, async { Ok::<_, String>(()) }).await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(*value.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failure_restores_prior_value() {
        let value = Mutex::new(1);
        let slot = |v: i32| {
            *value.lock().unwrap() = v;
            true
        };

        let result = apply_tentatively(&slot, 1, 2, async { Err::<(), _>("boom") }).await;

        let rolled_back = result.unwrap_err();
        assert_eq!(rolled_back.error, "boom");
        assert!(rolled_back.restored);
        assert_eq!(*value.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_slot_reports_not_restored() {
        let slot = |_v: i32| false;
        let result = apply_tentatively(&slot, 1, 2, async { Err::<(), _>("boom") }).await;
        assert!(!result.unwrap_err().restored);
    }
}
