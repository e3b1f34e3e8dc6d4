//! Per-order serialisation of state transitions within one process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
pub struct OrderLocks {
    locks: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self { Self::default() }

    /// Waits until no other transition holds `order_id`.
    pub async fn acquire(&self, order_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop entries nobody is holding or waiting on.
            locks.retain(|id, l| *id == order_id || Arc::strong_count(l) > 1);
            locks.entry(order_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_order_is_serialised() {
        let locks = Arc::new(OrderLocks::new());
        let id = Uuid::new_v4();
        let guard = locks.acquire(id).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(id).await; })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_different_orders_do_not_block() {
        let locks = OrderLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        tokio::time::timeout(Duration::from_millis(100), locks.acquire(Uuid::new_v4())).await.unwrap();
    }
}
