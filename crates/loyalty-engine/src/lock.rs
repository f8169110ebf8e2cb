//! 用户级锁
//!
//! 以 (organization_id, user_id) 为粒度的进程内异步互斥锁，
//! 保证同一用户的"读状态 → 判定 → 写状态"在并发请求下线性化。
//! 锁对象惰性创建后常驻表中；用户规模受组织体量约束，不做逐出。

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// 用户锁管理器
#[derive(Debug, Default)]
pub struct UserLockManager {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UserLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指定用户的锁，等待直到可用
    pub async fn acquire(&self, organization_id: &str, user_id: &str) -> OwnedMutexGuard<()> {
        let key = format!("{}:{}", organization_id, user_id);
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 同一用户的临界区互斥执行
    #[tokio::test]
    async fn test_same_user_serialized() {
        let manager = Arc::new(UserLockManager::new());
        let counter = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            let counter = Arc::clone(&counter);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = manager.acquire("org1", "u1").await;
                let inside = counter.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(inside, Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    /// 不同用户互不阻塞
    #[tokio::test]
    async fn test_different_users_independent() {
        let manager = UserLockManager::new();
        let _guard_a = manager.acquire("org1", "u1").await;
        // 持有 u1 锁时获取 u2 锁不应等待
        let _guard_b = manager.acquire("org1", "u2").await;
    }
}
