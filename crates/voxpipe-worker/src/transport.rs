//! IPC transport layer
//!
//! Length-prefixed bincode frames between the pipeline process and a worker
//! process, over Unix sockets or Windows named pipes.

use crate::error::Result;
use crate::protocol::{HostMessage, WorkerMessage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

#[cfg(windows)]
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions};

/// Upper bound on a single frame. Guards against reading a garbage length.
const MAX_FRAME_BYTES: u64 = 4 << 30;

/// Message transport for IPC
pub enum MessageTransport {
    #[cfg(unix)]
    Unix(UnixStream),
    #[cfg(windows)]
    WindowsClient(NamedPipeClient),
    #[cfg(windows)]
    WindowsServer(NamedPipeServer),
}

impl MessageTransport {
    /// Connect to socket path (Unix) or named pipe (Windows)
    #[cfg(unix)]
    pub async fn connect(socket_path: &std::path::Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        Ok(Self::Unix(stream))
    }

    #[cfg(windows)]
    pub async fn connect(pipe_name: &std::path::Path) -> Result<Self> {
        let client = ClientOptions::new().open(pipe_name)?;
        Ok(Self::WindowsClient(client))
    }

    pub async fn send_host_message(&mut self, msg: &HostMessage) -> Result<()> {
        self.send(msg).await
    }

    pub async fn recv_host_message(&mut self) -> Result<HostMessage> {
        self.recv().await
    }

    pub async fn send_worker_message(&mut self, msg: &WorkerMessage) -> Result<()> {
        self.send(msg).await
    }

    pub async fn recv_worker_message(&mut self) -> Result<WorkerMessage> {
        self.recv().await
    }

    async fn send<T: Serialize>(&mut self, msg: &T) -> Result<()> {
        let data = bincode::serialize(msg)?;
        match self {
            #[cfg(unix)]
            Self::Unix(s) => write_frame(s, &data).await,
            #[cfg(windows)]
            Self::WindowsClient(c) => write_frame(c, &data).await,
            #[cfg(windows)]
            Self::WindowsServer(s) => write_frame(s, &data).await,
        }
    }

    async fn recv<T: DeserializeOwned>(&mut self) -> Result<T> {
        let data = match self {
            #[cfg(unix)]
            Self::Unix(s) => read_frame(s).await?,
            #[cfg(windows)]
            Self::WindowsClient(c) => read_frame(c).await?,
            #[cfg(windows)]
            Self::WindowsServer(s) => read_frame(s).await?,
        };
        Ok(bincode::deserialize(&data)?)
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, data: &[u8]) -> Result<()> {
    stream.write_u64(data.len() as u64).await?;
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}

async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Vec<u8>> {
    let len = stream.read_u64().await?;
    if len > MAX_FRAME_BYTES {
        return Err(crate::WorkerError::ProtocolError(format!(
            "frame of {} bytes exceeds limit",
            len
        )));
    }
    let mut data = vec![0u8; len as usize];
    stream.read_exact(&mut data).await?;
    Ok(data)
}

/// Server-side transport listener
pub struct TransportListener {
    #[cfg(unix)]
    listener: UnixListener,
    #[cfg(unix)]
    socket_path: std::path::PathBuf,
    #[cfg(windows)]
    pipe_name: std::path::PathBuf,
}

impl TransportListener {
    /// Bind to socket path (Unix) or prepare named pipe (Windows)
    #[cfg(unix)]
    pub async fn bind(socket_path: &std::path::Path) -> Result<Self> {
        // Remove stale socket if it exists
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path)?;
        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    #[cfg(windows)]
    pub async fn bind(pipe_name: &std::path::Path) -> Result<Self> {
        Ok(Self {
            pipe_name: pipe_name.to_path_buf(),
        })
    }

    #[cfg(unix)]
    pub async fn accept(&self) -> Result<MessageTransport> {
        let (stream, _) = self.listener.accept().await?;
        Ok(MessageTransport::Unix(stream))
    }

    /// Creates the server pipe and waits for the client.
    #[cfg(windows)]
    pub async fn accept(&self) -> Result<MessageTransport> {
        let server = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&self.pipe_name)?;
        server.connect().await?;
        Ok(MessageTransport::WindowsServer(server))
    }
}

#[cfg(unix)]
impl Drop for TransportListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}
