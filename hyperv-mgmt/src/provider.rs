//! Session providers: where reconciliation calls get their sessions from.

use crate::error::Result;
use crate::session::ManagementSession;
use crate::transport::ManagementTransport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Hands out sessions that are exclusively owned until released.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self, host: &str) -> Result<ManagementSession>;

    /// Return a session obtained from `acquire`.
    async fn release(&self, session: ManagementSession);
}

/// Opens a new session per call and closes it on release.
pub struct FreshSessions {
    transport: Arc<dyn ManagementTransport>,
}

impl FreshSessions {
    pub fn new(transport: Arc<dyn ManagementTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl SessionProvider for FreshSessions {
    async fn acquire(&self, host: &str) -> Result<ManagementSession> {
        ManagementSession::open(self.transport.as_ref(), host).await
    }

    async fn release(&self, mut session: ManagementSession) {
        session.close().await;
    }
}

/// Keeps idle sessions per host and checks them out exclusively.
pub struct PooledSessions {
    transport: Arc<dyn ManagementTransport>,
    max_idle_per_host: usize,
    idle: Mutex<HashMap<String, Vec<ManagementSession>>>,
}

impl PooledSessions {
    pub fn new(transport: Arc<dyn ManagementTransport>, max_idle_per_host: usize) -> Self {
        Self {
            transport,
            max_idle_per_host,
            idle: Mutex::new(HashMap::new()),
        }
    }

    pub fn idle_count(&self, host: &str) -> usize {
        self.idle
            .lock()
            .map(|idle| idle.get(&pool_key(host)).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Close every idle session.
    pub async fn drain(&self) {
        let sessions: Vec<ManagementSession> = match self.idle.lock() {
            Ok(mut idle) => idle.drain().flat_map(|(_, v)| v).collect(),
            Err(_) => Vec::new(),
        };
        for mut session in sessions {
            session.close().await;
        }
    }

    fn checkout(&self, host: &str) -> Option<ManagementSession> {
        let mut idle = self.idle.lock().ok()?;
        let sessions = idle.get_mut(&pool_key(host))?;
        while let Some(session) = sessions.pop() {
            if session.is_open() {
                return Some(session);
            }
        }
        None
    }

    /// Returns the session back when the pool for its host is full.
    fn checkin(&self, key: String, session: ManagementSession) -> Option<ManagementSession> {
        let Ok(mut idle) = self.idle.lock() else {
            return Some(session);
        };
        let sessions = idle.entry(key).or_default();
        if sessions.len() >= self.max_idle_per_host {
            return Some(session);
        }
        sessions.push(session);
        None
    }
}

#[async_trait]
impl SessionProvider for PooledSessions {
    async fn acquire(&self, host: &str) -> Result<ManagementSession> {
        if let Some(session) = self.checkout(host) {
            debug!(session = %session.id(), host = %session.host(), "Reusing pooled session");
            return Ok(session);
        }
        ManagementSession::open(self.transport.as_ref(), host).await
    }

    async fn release(&self, session: ManagementSession) {
        if !session.is_open() {
            return;
        }
        let key = pool_key(session.target());
        if let Some(mut overflow) = self.checkin(key, session) {
            overflow.close().await;
        }
    }
}

fn pool_key(host: &str) -> String {
    let host = host.trim();
    if host.is_empty() || host == "." || host.eq_ignore_ascii_case("localhost") {
        ".".to_string()
    } else {
        host.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ServiceRole;
    use crate::sim::SimulatedHost;

    #[tokio::test]
    async fn test_fresh_sessions_close_on_release() {
        let host = SimulatedHost::new();
        let provider = FreshSessions::new(Arc::new(host.clone()));

        for _ in 0..2 {
            let session = provider.acquire("").await.unwrap();
            provider.release(session).await;
        }

        let stats = host.stats();
        assert_eq!(stats.connects, 2);
        assert_eq!(stats.closes, 2);
    }

    #[tokio::test]
    async fn test_pooled_sessions_are_reused() {
        let host = SimulatedHost::new();
        let pool = PooledSessions::new(Arc::new(host.clone()), 2);

        let session = pool.acquire("").await.unwrap();
        let first_id = session.id();
        session.service(ServiceRole::VirtualSystemManagement).await.unwrap();
        pool.release(session).await;
        assert_eq!(pool.idle_count("localhost"), 1);

        let session = pool.acquire(".").await.unwrap();
        assert_eq!(session.id(), first_id);
        assert_eq!(pool.idle_count(""), 0);
        pool.release(session).await;

        assert_eq!(host.stats().connects, 1);
        assert_eq!(host.stats().closes, 0);

        pool.drain().await;
        assert_eq!(host.stats().closes, 1);
    }

    #[tokio::test]
    async fn test_pooled_sessions_are_exclusive() {
        let host = SimulatedHost::new();
        let pool = PooledSessions::new(Arc::new(host.clone()), 1);

        let a = pool.acquire("hv-01").await.unwrap();
        let b = pool.acquire("HV-01").await.unwrap();
        assert_ne!(a.id(), b.id());

        pool.release(a).await;
        pool.release(b).await;

        // Second release overflowed the pool and was closed.
        assert_eq!(pool.idle_count("hv-01"), 1);
        assert_eq!(host.stats().closes, 1);
    }
}
