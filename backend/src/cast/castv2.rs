//! Production session implementation over the CASTV2 protocol.
//!
//! The `rust_cast` client is blocking, so each session owns a dedicated
//! worker thread that holds the `CastDevice` and serves commands sent
//! over a channel. The async side only ever waits on a reply with a
//! deadline, which keeps the orchestration core off the blocking calls.

use crate::cast::session::{MediaSession, SessionError, SessionFactory};
use async_trait::async_trait;
use minaret_types::{Device, MediaSnapshot, PlayerState};
use rust_cast::channels::media::{Media, Status, StreamType};
use rust_cast::channels::receiver::CastDeviceApp;
use rust_cast::CastDevice;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Well-known receiver id for the device-level virtual connection.
const DEFAULT_RECEIVER_ID: &str = "receiver-0";

enum Command {
    Load {
        url: String,
        content_type: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Status {
        reply: oneshot::Sender<Result<MediaSnapshot, SessionError>>,
    },
    Close {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Handle to a live CASTV2 session served by a worker thread.
pub struct CastV2Session {
    device_name: String,
    tx: mpsc::SyncSender<Command>,
    op_timeout: Duration,
}

impl CastV2Session {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, SessionError>>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| SessionError::Closed)?;
        match tokio::time::timeout(self.op_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => Err(SessionError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl MediaSession for CastV2Session {
    async fn load(&self, url: &str, content_type: &str) -> Result<(), SessionError> {
        let url = url.to_string();
        let content_type = content_type.to_string();
        self.request(|reply| Command::Load {
            url,
            content_type,
            reply,
        })
        .await
    }

    async fn stop(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    async fn refresh_status(&self) -> Result<MediaSnapshot, SessionError> {
        self.request(|reply| Command::Status { reply }).await
    }

    async fn close(&self) -> Result<(), SessionError> {
        debug!("closing session to {}", self.device_name);
        self.request(|reply| Command::Close { reply }).await
    }
}

/// Opens CASTV2 sessions against real devices.
pub struct CastV2SessionFactory {
    op_timeout: Duration,
}

impl CastV2SessionFactory {
    pub fn new(op_timeout: Duration) -> Self {
        CastV2SessionFactory { op_timeout }
    }
}

#[async_trait]
impl SessionFactory for CastV2SessionFactory {
    async fn open(
        &self,
        device: &Device,
        timeout: Duration,
    ) -> Result<Arc<dyn MediaSession>, SessionError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (cmd_tx, cmd_rx) = mpsc::sync_channel(32);
        let host = device.address.to_string();
        let port = device.port;
        let name = device.name.clone();

        std::thread::Builder::new()
            .name(format!("castv2-{}", name))
            .spawn(move || worker(host, port, cmd_rx, ready_tx))
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(Arc::new(CastV2Session {
                device_name: device.name.clone(),
                tx: cmd_tx,
                op_timeout: self.op_timeout,
            })),
            Ok(Ok(Err(e))) => Err(e),
            // Worker died before reporting readiness.
            Ok(Err(_)) => Err(SessionError::Closed),
            // Handshake deadline passed; dropping cmd_tx makes the
            // worker exit once it notices the channel is gone.
            Err(_) => Err(SessionError::Timeout(timeout)),
        }
    }
}

fn worker(
    host: String,
    port: u16,
    rx: mpsc::Receiver<Command>,
    ready: oneshot::Sender<Result<(), SessionError>>,
) {
    let (device, transport_id, session_id) = match open_receiver(&host, port) {
        Ok(parts) => {
            if ready.send(Ok(())).is_err() {
                // Factory gave up waiting; nothing to serve.
                return;
            }
            parts
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while let Ok(command) = rx.recv() {
        match command {
            Command::Load {
                url,
                content_type,
                reply,
            } => {
                let media = Media {
                    content_id: url,
                    stream_type: StreamType::Buffered,
                    content_type,
                    metadata: None,
                    duration: None,
                };
                let result = device
                    .media
                    .load(transport_id.as_str(), session_id.as_str(), &media)
                    .map(|_| ())
                    .map_err(map_cast_error);
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let _ = reply.send(stop_current(&device, &transport_id));
            }
            Command::Status { reply } => {
                let result = device
                    .media
                    .get_status(transport_id.as_str(), None)
                    .map(|status| snapshot_from(&status))
                    .map_err(map_cast_error);
                let _ = reply.send(result);
            }
            Command::Close { reply } => {
                if let Err(e) = device.connection.disconnect(transport_id.as_str()) {
                    debug!("disconnect from {} failed: {}", host, e);
                }
                let _ = reply.send(Ok(()));
                return;
            }
        }
    }
    warn!("session handle to {} dropped without close", host);
}

/// Connect, launch the default media receiver and join its transport.
fn open_receiver(
    host: &str,
    port: u16,
) -> Result<(CastDevice<'static>, String, String), SessionError> {
    let device = CastDevice::connect_without_host_verification(host.to_string(), port)
        .map_err(map_cast_error)?;
    device
        .connection
        .connect(DEFAULT_RECEIVER_ID.to_string())
        .map_err(map_cast_error)?;
    let app = device
        .receiver
        .launch_app(&CastDeviceApp::DefaultMediaReceiver)
        .map_err(map_cast_error)?;
    device
        .connection
        .connect(app.transport_id.to_string())
        .map_err(map_cast_error)?;
    Ok((device, app.transport_id, app.session_id))
}

/// Stop whatever media session is current, treating "nothing playing"
/// as success.
fn stop_current(device: &CastDevice<'_>, transport_id: &str) -> Result<(), SessionError> {
    let status = device
        .media
        .get_status(transport_id, None)
        .map_err(map_cast_error)?;
    match status.entries.first() {
        Some(entry) => device
            .media
            .stop(transport_id, entry.media_session_id)
            .map(|_| ())
            .map_err(map_cast_error),
        None => Ok(()),
    }
}

fn snapshot_from(status: &Status) -> MediaSnapshot {
    match status.entries.first() {
        Some(entry) => MediaSnapshot {
            player_state: PlayerState::from_report(&format!("{:?}", entry.player_state)),
            content_id: entry.media.as_ref().map(|m| m.content_id.clone()),
        },
        None => MediaSnapshot::idle(),
    }
}

fn map_cast_error(e: rust_cast::errors::Error) -> SessionError {
    match e {
        rust_cast::errors::Error::Io(io) => SessionError::Transport(io.to_string()),
        other => SessionError::Protocol(other.to_string()),
    }
}
