//! TCP transport for the peer protocol
//!
//! Outbound traffic is one dial per send: connect, write one frame,
//! close. Inbound connections are accepted by [`serve`], which decodes
//! frames and forwards them to the dispatch channel. A read or decode
//! failure aborts only the connection it happened on.

use crate::framing::{FrameError, MessageCodec};
use futures::SinkExt;
use std::net::SocketAddr;
use syncmesh_core::Message;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind failed on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("dispatch channel closed")]
    ChannelClosed,
}

/// Accept inbound connections on `addr` and forward every decoded
/// envelope to `inbound`.
///
/// Only a bind failure makes this return; it consumes the channel
/// sender, so the dispatch channel closes with it and downstream
/// consumers see the shutdown. Accept and per-connection errors are
/// logged and absorbed.
pub async fn serve(addr: String, inbound: mpsc::Sender<Message>) -> Result<(), TransportError> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| TransportError::Bind { addr: addr.clone(), source })?;
    info!(%addr, "peer listener up");

    serve_listener(listener, inbound).await;
    Ok(())
}

/// Accept loop over an already-bound listener. Never returns; accept
/// errors are logged and skipped.
pub async fn serve_listener(listener: TcpListener, inbound: mpsc::Sender<Message>) {
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept failed: {e}");
                continue;
            }
        };

        debug!(%remote, "accepted connection");
        let inbound = inbound.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, inbound).await {
                warn!(%remote, "connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    inbound: mpsc::Sender<Message>,
) -> Result<(), TransportError> {
    let mut frames = FramedRead::new(stream, MessageCodec);
    while let Some(frame) = frames.next().await {
        let msg = frame?;
        inbound
            .send(msg)
            .await
            .map_err(|_| TransportError::ChannelClosed)?;
    }
    Ok(())
}

/// Dial `addr`, write one envelope, and close the connection.
///
/// No pooling, no retry, no timeout; the caller decides what a failure
/// means.
pub async fn send(addr: &str, msg: &Message) -> Result<(), TransportError> {
    let stream = TcpStream::connect(addr).await?;
    let mut sink = FramedWrite::new(stream, MessageCodec);
    sink.send(msg.clone()).await?;
    sink.into_inner().shutdown().await?;
    Ok(())
}

/// Outcome of a single send within a broadcast.
#[derive(Debug)]
pub struct SendOutcome {
    pub addr: String,
    pub result: Result<(), TransportError>,
}

/// Fan one envelope out to every address in parallel.
///
/// Returns only once every send has completed or failed, with one
/// outcome per address. A dead peer delays nothing but its own slot.
pub async fn broadcast(addrs: Vec<String>, msg: Message) -> Vec<SendOutcome> {
    let mut tasks = JoinSet::new();
    for addr in addrs {
        let msg = msg.clone();
        tasks.spawn(async move {
            let result = send(&addr, &msg).await;
            SendOutcome { addr, result }
        });
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!("broadcast task failed to join: {e}"),
        }
    }
    outcomes
}

/// Bind an ephemeral local listener and return it with its address.
/// Exists for callers that need the port before starting the loop.
pub async fn bind_local() -> Result<(TcpListener, SocketAddr), TransportError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|source| TransportError::Bind {
            addr: "127.0.0.1:0".to_string(),
            source,
        })?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}
