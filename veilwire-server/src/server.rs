//! TCP endpoint: bind, accept, spawn workers, shut down cleanly.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use veilwire_crypto::DhPool;

use crate::config::EndpointConfig;
use crate::connection::Worker;
use crate::dispatch::Dispatcher;

// How long shutdown waits for each worker before abandoning it.
const WORKER_JOIN_CAP: Duration = Duration::from_secs(5);

/// The listening endpoint. [`run`](Self::run) consumes it; stop it by
/// cancelling the token passed to [`bind`](Self::bind).
pub struct TcpEndpoint {
    listener: TcpListener,
    pool: Arc<DhPool>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
}

impl TcpEndpoint {
    /// Bind with address reuse and the configured backlog.
    pub async fn bind(
        config: &EndpointConfig,
        dispatcher: Arc<Dispatcher>,
        pool: Arc<DhPool>,
        shutdown: CancellationToken,
    ) -> io::Result<Self> {
        let addr: SocketAddr = tokio::net::lookup_host((config.host.as_str(), config.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("bind host {:?} did not resolve", config.host),
                )
            })?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(config.max_available_connections as i32)?;
        socket.set_nonblocking(true)?;
        let listener = TcpListener::from_std(socket.into())?;

        Ok(Self { listener, pool, dispatcher, shutdown })
    }

    /// The bound address; useful when the port was 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept until shutdown, then join every worker with a per-worker
    /// cap. Accept errors are logged and never end the loop.
    pub async fn run(self) {
        match self.local_addr() {
            Ok(addr) => tracing::info!("endpoint started on {addr}"),
            Err(_) => tracing::info!("endpoint started"),
        }
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        loop {
            workers.retain(|handle| !handle.is_finished());

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::info!(%peer, "connected client");
                        let worker = Worker::new(
                            peer,
                            self.pool.clone(),
                            self.dispatcher.clone(),
                            self.shutdown.child_token(),
                        );
                        workers.push(tokio::spawn(worker.run(stream)));
                    }
                    Err(e) => tracing::warn!("error accepting client connection: {e}"),
                },
            }
        }

        tracing::info!("stopping endpoint, joining {} workers", workers.len());
        for handle in workers {
            if tokio::time::timeout(WORKER_JOIN_CAP, handle).await.is_err() {
                tracing::warn!("worker did not stop within {WORKER_JOIN_CAP:?}, abandoning");
            }
        }
        drop(self.listener);
        tracing::info!("endpoint shut down");
    }
}
