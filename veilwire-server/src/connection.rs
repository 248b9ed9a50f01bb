//! Per-connection worker.
//!
//! Lifecycle: `Handshake → Ready → Closing → Closed`. In `Ready` the
//! worker runs a strict read-dispatch-write loop; the next frame is not
//! read until the previous response has been written, so responses leave
//! in request order. Every failure path ends only this connection.

use std::net::SocketAddr;
use std::string::FromUtf8Error;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use veilwire_crypto::{DhPool, SealError};

use crate::codec::{self, WireError};
use crate::dispatch::Dispatcher;
use crate::handshake::{self, HandshakeError};

/// Why a worker stopped serving. All variants close the socket without a
/// response frame.
#[derive(Debug)]
pub(crate) enum ConnError {
    Wire(WireError),
    Handshake(HandshakeError),
    /// Session sealer rejected an incoming blob.
    Seal(SealError),
    /// Transaction code was not valid UTF-8.
    BadTransCode(FromUtf8Error),
    /// A handler panicked; the panic is contained here.
    HandlerPanicked,
}

impl std::fmt::Display for ConnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "{e}"),
            Self::Handshake(e) => write!(f, "{e}"),
            Self::Seal(e) => write!(f, "request rejected by session cipher: {e}"),
            Self::BadTransCode(e) => write!(f, "transaction code is not UTF-8: {e}"),
            Self::HandlerPanicked => write!(f, "request handler panicked"),
        }
    }
}
impl std::error::Error for ConnError {}

impl From<WireError> for ConnError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}
impl From<HandshakeError> for ConnError {
    fn from(e: HandshakeError) -> Self {
        Self::Handshake(e)
    }
}
impl From<SealError> for ConnError {
    fn from(e: SealError) -> Self {
        Self::Seal(e)
    }
}
impl From<FromUtf8Error> for ConnError {
    fn from(e: FromUtf8Error) -> Self {
        Self::BadTransCode(e)
    }
}

/// One accepted client connection.
pub(crate) struct Worker {
    peer: SocketAddr,
    pool: Arc<DhPool>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        peer: SocketAddr,
        pool: Arc<DhPool>,
        dispatcher: Arc<Dispatcher>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { peer, pool, dispatcher, shutdown }
    }

    /// Drive the connection to completion. Never propagates errors; the
    /// acceptor only observes task completion.
    pub(crate) async fn run(self, stream: TcpStream) {
        match self.serve(stream).await {
            Ok(()) => tracing::info!(peer = %self.peer, "client disconnected"),
            Err(e) => tracing::warn!(peer = %self.peer, "connection closed: {e}"),
        }
    }

    async fn serve(&self, mut stream: TcpStream) -> Result<(), ConnError> {
        let sealer = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(()),
            handshake = handshake::run_server(&mut stream, &self.pool) => {
                match handshake? {
                    Some(sealer) => sealer,
                    // Peer left before completing the exchange.
                    None => return Ok(()),
                }
            }
        };
        tracing::debug!(peer = %self.peer, "session key established, connection ready");

        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                frame = codec::read_frame(&mut stream) => frame?,
            };
            let Some(frame) = frame else {
                // Clean close at a frame boundary.
                return Ok(());
            };

            let trans_code = String::from_utf8(sealer.open(&frame.trans_code)?)?;
            let payload = sealer.open(&frame.payload)?;
            tracing::info!(peer = %self.peer, code = %trans_code, "client request");

            // Handlers block on storage I/O; keep them off the runtime.
            let dispatcher = self.dispatcher.clone();
            let (body, response_code) =
                tokio::task::spawn_blocking(move || dispatcher.dispatch(&trans_code, &payload))
                    .await
                    .map_err(|_| ConnError::HandlerPanicked)?;

            let sealed_code = sealer.seal(response_code.as_bytes());
            let sealed_body = sealer.seal(&body);
            codec::write_frame(&mut stream, &sealed_code, &sealed_body).await?;
        }
    }
}
