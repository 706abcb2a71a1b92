//! Scriptable session doubles shared by the cast module tests.

use crate::cast::session::{MediaSession, SessionError, SessionFactory};
use async_trait::async_trait;
use minaret_types::{Device, MediaSnapshot};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn device_at(name: &str, addr: SocketAddr) -> Device {
    Device {
        id: format!("test-{}", name.to_lowercase()),
        name: name.to_string(),
        address: addr.ip(),
        port: addr.port(),
        model: "Google Nest Mini".to_string(),
        manufacturer: "Google Inc.".to_string(),
        available: true,
        consecutive_failures: 0,
    }
}

/// Session whose status reports are scripted ahead of time.
///
/// `refresh_status` pops queued snapshots in order and repeats the last
/// one (or idle) once the queue runs dry.
#[derive(Default)]
pub struct ScriptedSession {
    statuses: Mutex<VecDeque<MediaSnapshot>>,
    last_status: Mutex<Option<MediaSnapshot>>,
    pub loads: Mutex<Vec<String>>,
    stop_calls: AtomicU32,
    close_calls: AtomicU32,
    status_calls: AtomicU32,
    fail_loads: AtomicU32,
}

impl ScriptedSession {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedSession::default())
    }

    pub fn with_statuses(statuses: Vec<MediaSnapshot>) -> Arc<Self> {
        let session = ScriptedSession::default();
        *session.statuses.lock() = statuses.into();
        Arc::new(session)
    }

    pub fn push_status(&self, snapshot: MediaSnapshot) {
        self.statuses.lock().push_back(snapshot);
    }

    /// Make the next `n` load calls fail with a protocol error.
    pub fn fail_next_loads(&self, n: u32) {
        self.fail_loads.store(n, Ordering::SeqCst);
    }

    pub fn load_calls(&self) -> u32 {
        self.loads.lock().len() as u32
    }

    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSession for ScriptedSession {
    async fn load(&self, url: &str, _content_type: &str) -> Result<(), SessionError> {
        if self
            .fail_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SessionError::Protocol("load rejected".to_string()));
        }
        self.loads.lock().push(url.to_string());
        Ok(())
    }

    async fn stop(&self) -> Result<(), SessionError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh_status(&self) -> Result<MediaSnapshot, SessionError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last_status.lock();
        if let Some(next) = self.statuses.lock().pop_front() {
            *last = Some(next.clone());
            return Ok(next);
        }
        Ok(last.clone().unwrap_or_else(MediaSnapshot::idle))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory that hands out [`ScriptedSession`]s, optionally failing or
/// delaying the first opens.
pub struct ScriptedFactory {
    queued: Mutex<VecDeque<Arc<ScriptedSession>>>,
    created: Mutex<Vec<Arc<ScriptedSession>>>,
    failures_remaining: AtomicU32,
    open_delay: Duration,
    open_calls: AtomicU32,
}

impl ScriptedFactory {
    fn base(open_delay: Duration) -> ScriptedFactory {
        ScriptedFactory {
            queued: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
            failures_remaining: AtomicU32::new(0),
            open_delay,
            open_calls: AtomicU32::new(0),
        }
    }

    pub fn ok() -> Arc<Self> {
        Arc::new(Self::base(Duration::ZERO))
    }

    pub fn ok_with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self::base(delay))
    }

    pub fn failing_times(n: u32) -> Arc<Self> {
        let factory = Self::base(Duration::ZERO);
        factory.failures_remaining.store(n, Ordering::SeqCst);
        Arc::new(factory)
    }

    /// Serve these sessions, in order, before minting defaults.
    pub fn with_sessions(sessions: Vec<Arc<ScriptedSession>>) -> Arc<Self> {
        let factory = ScriptedFactory::ok();
        *factory.queued.lock() = sessions.into();
        factory
    }

    pub fn queue_session(&self, session: Arc<ScriptedSession>) {
        self.queued.lock().push_back(session);
    }

    pub fn open_calls(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    /// Every session handed out so far, in creation order.
    pub fn sessions(&self) -> Vec<Arc<ScriptedSession>> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(
        &self,
        _device: &Device,
        _timeout: Duration,
    ) -> Result<Arc<dyn MediaSession>, SessionError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SessionError::Protocol("handshake refused".to_string()));
        }
        let session = self
            .queued
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedSession::new());
        self.created.lock().push(session.clone());
        Ok(session)
    }
}
