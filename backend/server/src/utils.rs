use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// One async mutex per key, created on demand.
///
/// Entries nobody holds or waits on are dropped on the next acquire, so the table only
/// grows with the number of keys in flight.
#[derive(Default)]
pub struct KeyedLocks {
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut inflight = self.inflight.lock().await;
            inflight.retain(|_, lock| Arc::strong_count(lock) > 1);

            Arc::clone(
                inflight
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        lock.lock_owned().await
    }

    pub async fn tracked(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Email@X.com "), "email@x.com");
        assert_eq!(normalize_email("a@b.com"), "a@b.com");
        assert_eq!(normalize_email("   "), "");
    }

    #[tokio::test]
    async fn test_same_key_serializes() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.acquire("a@b.com").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("a@b.com").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_other_keys_independent() {
        let locks = KeyedLocks::new();
        let _a = locks.acquire("a@b.com").await;
        let _b = locks.acquire("c@d.com").await;

        assert_eq!(locks.tracked().await, 2);
    }

    #[tokio::test]
    async fn test_released_entries_pruned() {
        let locks = KeyedLocks::new();
        drop(locks.acquire("a@b.com").await);
        drop(locks.acquire("c@d.com").await);

        let _e = locks.acquire("e@f.com").await;
        assert_eq!(locks.tracked().await, 1);
    }
}
