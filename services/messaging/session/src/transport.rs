//! Duplex transport for the messaging session.
//!
//! The [`Transport`] trait is the only capability the rest of the crate needs
//! from the IPC channel. [`PipeTransport`] realizes it over a Unix domain
//! socket; [`accept_as_server`] and [`connect_as_client`] build one for each
//! side of the rendezvous.

use crate::error::IoError;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures::FutureExt;
use gogoc_wire::{peek_frame_len, FrameError, HEADER_SIZE, MAX_PAYLOAD};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace};

/// Well-known name of the IPC rendezvous point
pub const PIPE_NAME: &str = "gogocmessaging-ipc";

/// Interval between connect attempts while the acceptor is not up yet
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Bytes pulled off the socket per non-blocking read
const READ_CHUNK: usize = 4096;

/// Default rendezvous path, under the system temp directory
pub fn default_pipe_path() -> PathBuf {
    std::env::temp_dir().join(PIPE_NAME)
}

/// Which side of the rendezvous a manager plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Connects to an existing rendezvous point (GUI side)
    Initiator,
    /// Creates the rendezvous point and waits for a peer (daemon side)
    Acceptor,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Acceptor => f.write_str("acceptor"),
        }
    }
}

/// Duplex byte channel carrying whole frames
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Whether inbound data is pending. Never blocks.
    fn can_read(&self) -> Result<bool, IoError>;

    /// Whether a write would proceed without blocking. Never blocks.
    fn can_write(&self) -> Result<bool, IoError>;

    /// Read exactly one frame into `buf`, returning its size
    async fn read(&self, buf: &mut [u8]) -> Result<usize, IoError>;

    /// Write one frame, returning the bytes written
    async fn write(&self, buf: &[u8]) -> Result<usize, IoError>;

    /// Close the channel and unblock pending reads and writes
    async fn shutdown(&self);
}

/// Builds a connected transport for a role
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Establish a transport, signalling `ready` once the rendezvous has begun
    async fn establish(&self, role: Role, ready: &ReadySignal)
        -> Result<Arc<dyn Transport>, IoError>;
}

/// Binary signal raised once initialization has started
#[derive(Debug)]
pub struct ReadySignal {
    permits: Semaphore,
}

impl ReadySignal {
    /// Create an unsignalled instance
    pub fn new() -> Self {
        Self {
            permits: Semaphore::new(0),
        }
    }

    /// Raise the signal. Idempotent.
    pub fn signal(&self) {
        if self.permits.available_permits() == 0 {
            self.permits.add_permits(1);
        }
    }

    /// Whether the signal has been raised
    pub fn is_signalled(&self) -> bool {
        self.permits.available_permits() > 0
    }

    /// Wait up to `timeout` for the signal without consuming it
    pub async fn wait(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.permits.acquire()).await {
            // Dropping the permit hands it back for the next waiter.
            Ok(Ok(_permit)) => true,
            _ => false,
        }
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport over a connected Unix domain socket.
///
/// The stream carries back-to-back frames; the frame header delimits them.
/// Bytes are pulled off the socket only while `pending` is locked, and that
/// lock is never held across an await.
pub struct PipeTransport {
    half: OwnedReadHalf,
    pending: StdMutex<BytesMut>,
    read_lock: Mutex<()>,
    writer: Mutex<OwnedWriteHalf>,
    closed: Semaphore,
}

impl fmt::Debug for PipeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeTransport")
            .field("closed", &self.closed.is_closed())
            .finish()
    }
}

impl PipeTransport {
    /// Wrap a connected stream
    pub fn new(stream: UnixStream) -> Self {
        let (half, writer) = stream.into_split();
        Self {
            half,
            pending: StdMutex::new(BytesMut::with_capacity(READ_CHUNK)),
            read_lock: Mutex::new(()),
            writer: Mutex::new(writer),
            closed: Semaphore::new(0),
        }
    }

    fn check_open(&self) -> Result<(), IoError> {
        if self.closed.is_closed() {
            Err(IoError::Closed)
        } else {
            Ok(())
        }
    }

    fn pending(&self) -> MutexGuard<'_, BytesMut> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Move whatever the socket holds into `pending` without blocking.
    /// `Ok(None)` means nothing was available.
    fn fill(&self, pending: &mut BytesMut) -> std::io::Result<Option<usize>> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.half.try_read(&mut chunk) {
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                Ok(Some(n))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolves once `shutdown` has been called
    async fn closed(&self) {
        // No permits are ever added, so acquire only returns once closed.
        let _ = self.closed.acquire().await;
    }
}

#[async_trait]
impl Transport for PipeTransport {
    fn can_read(&self) -> Result<bool, IoError> {
        self.check_open()?;

        let mut pending = self.pending();
        if !pending.is_empty() {
            return Ok(true);
        }
        match self.fill(&mut pending) {
            Ok(Some(0)) => Err(IoError::PeekFailed(std::io::ErrorKind::UnexpectedEof.into())),
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(IoError::PeekFailed(e)),
        }
    }

    fn can_write(&self) -> Result<bool, IoError> {
        self.check_open()?;

        let Ok(guard) = self.writer.try_lock() else {
            return Ok(false);
        };
        match guard.writable().now_or_never() {
            Some(Ok(())) => Ok(true),
            Some(Err(e)) => Err(IoError::PeekFailed(e)),
            None => Ok(false),
        }
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, IoError> {
        self.check_open()?;
        let _reading = self.read_lock.lock().await;

        loop {
            {
                let mut pending = self.pending();
                if let Some(frame_len) = peek_frame_len(&pending) {
                    if frame_len - HEADER_SIZE >= MAX_PAYLOAD {
                        return Err(FrameError::PayloadTooLarge(frame_len - HEADER_SIZE).into());
                    }
                    if frame_len > buf.len() {
                        return Err(IoError::BufferTooSmall(frame_len));
                    }
                    if pending.len() >= frame_len {
                        buf[..frame_len].copy_from_slice(&pending[..frame_len]);
                        pending.advance(frame_len);
                        trace!("Read frame of {} bytes", frame_len);
                        return Ok(frame_len);
                    }
                }

                match self.fill(&mut pending) {
                    Ok(Some(0)) => {
                        return Err(IoError::ReadFailed(
                            std::io::ErrorKind::UnexpectedEof.into(),
                        ))
                    }
                    Ok(Some(_)) => continue,
                    Ok(None) => {}
                    Err(e) => return Err(IoError::ReadFailed(e)),
                }
            }

            tokio::select! {
                res = self.half.readable() => res.map_err(IoError::ReadFailed)?,
                _ = self.closed() => return Err(IoError::Closed),
            }
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize, IoError> {
        self.check_open()?;
        let mut writer = self.writer.lock().await;

        tokio::select! {
            res = writer.write_all(buf) => res.map_err(IoError::WriteFailed)?,
            _ = self.closed() => return Err(IoError::Closed),
        }
        trace!("Wrote frame of {} bytes", buf.len());
        Ok(buf.len())
    }

    async fn shutdown(&self) {
        if self.closed.is_closed() {
            return;
        }
        self.closed.close();

        // Best effort: the writer may be held by a write that is now unwinding.
        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.shutdown().await;
        }
        debug!("Pipe transport shut down");
    }
}

/// Create the rendezvous point at `path` and wait for one peer
pub async fn accept_as_server(path: &Path, ready: &ReadySignal) -> Result<PipeTransport, IoError> {
    // A previous daemon may have left its socket file behind.
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed stale pipe {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(IoError::CreateServerFailed(e)),
    }

    let listener = UnixListener::bind(path).map_err(IoError::CreateServerFailed)?;
    info!("Pipe server listening on {:?}", path);
    ready.signal();

    let (stream, _) = listener.accept().await.map_err(IoError::AcceptFailed)?;
    info!("Pipe client connected on {:?}", path);

    // One peer per rendezvous; the next initialization binds afresh.
    let _ = std::fs::remove_file(path);

    Ok(PipeTransport::new(stream))
}

/// Connect to the rendezvous point at `path`, waiting up to `connect_timeout` for it to appear
pub async fn connect_as_client(
    path: &Path,
    ready: &ReadySignal,
    connect_timeout: Duration,
) -> Result<PipeTransport, IoError> {
    ready.signal();

    let deadline = Instant::now() + connect_timeout;
    loop {
        match UnixStream::connect(path).await {
            Ok(stream) => {
                info!("Connected to pipe server on {:?}", path);
                return Ok(PipeTransport::new(stream));
            }
            Err(e) if Instant::now() + CONNECT_RETRY_INTERVAL < deadline => {
                trace!("Pipe server on {:?} not ready: {}", path, e);
                sleep(CONNECT_RETRY_INTERVAL).await;
            }
            Err(e) => return Err(IoError::ConnectFailed(e)),
        }
    }
}

/// Production connector over a Unix domain socket path
#[derive(Debug, Clone)]
pub struct PipeConnector {
    path: PathBuf,
    connect_timeout: Duration,
}

impl PipeConnector {
    /// Create a connector for `path`
    pub fn new(path: impl Into<PathBuf>, connect_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            connect_timeout,
        }
    }

    /// Rendezvous path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Connector for PipeConnector {
    async fn establish(
        &self,
        role: Role,
        ready: &ReadySignal,
    ) -> Result<Arc<dyn Transport>, IoError> {
        let transport = match role {
            Role::Acceptor => accept_as_server(&self.path, ready).await?,
            Role::Initiator => connect_as_client(&self.path, ready, self.connect_timeout).await?,
        };
        Ok(Arc::new(transport))
    }
}
