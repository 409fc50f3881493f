use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory map from user identity to the opaque proof value of that user's
/// one live session.
///
/// Clones share the same map. Every read and write goes through the one lock,
/// and the check-then-write operations (`rotate`, `remove_if`) run under a
/// single write guard so a concurrent logout can never be undone by a refresh.
#[derive(Clone, Debug, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<i64, String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `opaque` as the live session for `identity`, returning whatever
    /// it replaced. The replaced session is dead from this point on.
    pub async fn install(&self, identity: i64, opaque: String) -> Option<String> {
        self.inner.write().await.insert(identity, opaque)
    }

    /// Replace the live value only if it is still `expected`.
    pub async fn rotate(&self, identity: i64, expected: &str, replacement: String) -> bool {
        let mut sessions = self.inner.write().await;
        match sessions.get_mut(&identity) {
            Some(current) if current == expected => {
                *current = replacement;
                true
            }
            _ => false,
        }
    }

    /// Does `opaque` match the live session for `identity`?
    pub async fn matches(&self, identity: i64, opaque: &str) -> bool {
        self.inner
            .read()
            .await
            .get(&identity)
            .map(|current| current == opaque)
            .unwrap_or(false)
    }

    pub async fn current(&self, identity: i64) -> Option<String> {
        self.inner.read().await.get(&identity).cloned()
    }

    /// Drop the session for `identity` regardless of its value (logout).
    pub async fn remove(&self, identity: i64) -> bool {
        self.inner.write().await.remove(&identity).is_some()
    }

    /// Drop the session only if it still holds `opaque` (expiry purge).
    pub async fn remove_if(&self, identity: i64, opaque: &str) -> bool {
        let mut sessions = self.inner.write().await;
        if sessions.get(&identity).map(String::as_str) == Some(opaque) {
            sessions.remove(&identity);
            true
        } else {
            false
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Forget every session. Called on shutdown.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_overwrites_previous_session() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.install(1, "a".into()).await, None);
        assert_eq!(registry.install(1, "b".into()).await, Some("a".to_string()));
        assert!(!registry.matches(1, "a").await);
        assert!(registry.matches(1, "b").await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn rotate_requires_expected_value() {
        let registry = SessionRegistry::new();
        registry.install(7, "old".into()).await;

        assert!(!registry.rotate(7, "stale", "new".into()).await);
        assert_eq!(registry.current(7).await.as_deref(), Some("old"));

        assert!(registry.rotate(7, "old", "new".into()).await);
        assert_eq!(registry.current(7).await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn rotate_does_not_resurrect_removed_session() {
        let registry = SessionRegistry::new();
        registry.install(7, "old".into()).await;
        registry.remove(7).await;
        assert!(!registry.rotate(7, "old", "new".into()).await);
        assert!(registry.current(7).await.is_none());
    }

    #[tokio::test]
    async fn remove_if_leaves_newer_session_alone() {
        let registry = SessionRegistry::new();
        registry.install(3, "newer".into()).await;
        assert!(!registry.remove_if(3, "older").await);
        assert!(registry.matches(3, "newer").await);
        assert!(registry.remove_if(3, "newer").await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let a = SessionRegistry::new();
        let b = a.clone();
        a.install(5, "x".into()).await;
        assert!(b.matches(5, "x").await);
        b.clear().await;
        assert!(a.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_logins_leave_exactly_one_session() {
        let registry = SessionRegistry::new();
        let mut tasks = Vec::new();
        for n in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.install(9, format!("opaque-{}", n)).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.len().await, 1);
        let live = registry.current(9).await.unwrap();
        assert!(live.starts_with("opaque-"));
    }
}
