//! Byte-stream link for documents that live outside this process.
//!
//! Frames are a 4-byte big-endian length prefix followed by a UTF-8 JSON
//! payload:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! A [`FrameLink`] opens a proxy window on the local bus that stands in for the
//! remote document. Messages the local peer posts to the proxy are written to
//! the stream; frames read from the stream are posted from the proxy to the
//! local peer. The proxy's origin is fixed by whoever sets up the link, never
//! taken from the wire.

use super::bus::{MessageBus, Window};
use super::window::{Origin, WindowId};
use crate::config::RpcConfig;
use crate::error::{PhotonError, Result};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Read a length-prefixed frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > RpcConfig::MAX_FRAME_SIZE {
        return Err(PhotonError::Validation {
            field: "frame".to_string(),
            message: format!(
                "frame size {} exceeds maximum {}",
                len,
                RpcConfig::MAX_FRAME_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| PhotonError::Validation {
        field: "frame".to_string(),
        message: format!("frame size {} does not fit a u32 prefix", payload.len()),
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Handle to a running link. Dropping it tears the link and its proxy window down.
pub struct FrameLinkHandle {
    proxy: WindowId,
    task: Option<JoinHandle<()>>,
}

impl FrameLinkHandle {
    /// Window id local documents use to address the remote peer.
    pub fn proxy_id(&self) -> WindowId {
        self.proxy
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }
}

impl Drop for FrameLinkHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Bridges a byte stream into a local bus.
///
/// Opening and connecting are separate so a local document can be opened as a
/// child of the proxy before the link starts pumping.
pub struct FrameLink {
    proxy: Window,
}

impl FrameLink {
    /// Open the proxy window that stands in for the remote peer.
    pub fn open(bus: &MessageBus, remote_origin: Origin, parent: Option<WindowId>) -> Self {
        Self {
            proxy: bus.open_window(remote_origin, parent),
        }
    }

    /// Window id local documents use to address the remote peer.
    pub fn proxy_id(&self) -> WindowId {
        self.proxy.id()
    }

    /// Start pumping frames between `stream` and `local_peer`.
    ///
    /// Only messages from `local_peer` are forwarded to the stream.
    pub fn connect<S>(self, local_peer: WindowId, stream: S) -> FrameLinkHandle
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let proxy = self.proxy;
        let proxy_id = proxy.id();
        let bus = proxy.bus().clone();

        // Both pumps live inside this task, so aborting it drops the proxy.
        let task = tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(stream);
            tokio::select! {
                _ = Self::pump_inbound(bus, proxy_id, local_peer, reader) => {}
                _ = Self::pump_outbound(proxy, local_peer, writer) => {}
            }
            debug!("Frame link for {} closed", proxy_id);
        });

        FrameLinkHandle {
            proxy: proxy_id,
            task: Some(task),
        }
    }

    async fn pump_inbound<R: AsyncRead + Unpin>(
        bus: MessageBus,
        proxy: WindowId,
        local_peer: WindowId,
        mut reader: R,
    ) {
        loop {
            let frame = match read_frame(&mut reader).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return,
                Err(e) => {
                    warn!("Frame link {} read failed: {}", proxy, e);
                    return;
                }
            };
            match serde_json::from_slice::<Value>(&frame) {
                Ok(data) => {
                    bus.post(proxy, local_peer, data);
                }
                Err(e) => warn!("Frame link {} dropped malformed frame: {}", proxy, e),
            }
        }
    }

    async fn pump_outbound<W: AsyncWrite + Unpin>(
        mut proxy: Window,
        local_peer: WindowId,
        mut writer: W,
    ) {
        while let Some(envelope) = proxy.rx.recv().await {
            if envelope.source != local_peer {
                debug!(
                    "Frame link {} ignoring message from {}",
                    proxy.id(),
                    envelope.source
                );
                continue;
            }
            let bytes = match serde_json::to_vec(&envelope.data) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Frame link {} could not encode message: {}", proxy.id(), e);
                    continue;
                }
            };
            if let Err(e) = write_frame(&mut writer, &bytes).await {
                warn!("Frame link {} write failed: {}", proxy.id(), e);
                return;
            }
        }
    }
}
