//! Per-connection Diffie–Hellman key exchange.
//!
//! Runs once, immediately after accept:
//!
//! ```text
//! S→C:  4B len(p)   ‖ p
//! S→C:  4B len(g)   ‖ g
//! S→C:  4B len(y_s) ‖ y_s
//! C→S:  4B len(y_c) ‖ y_c
//! ```
//!
//! The session key is `BLAKE2b-512(shared)[..32]` and seeds the
//! connection's [`Sealer`]. The exchange carries no peer identity; a
//! session token presented over the sealed channel is what
//! authenticates the client.

use num_bigint::BigUint;
use tokio::io::{AsyncRead, AsyncWrite};
use veilwire_crypto::{DhError, DhPool, DhPrivate, Sealer};

use crate::codec::{self, WireError};

/// Fatal handshake failures. A peer that just goes away is not one of
/// these; that surfaces as a clean close.
#[derive(Debug)]
pub enum HandshakeError {
    Wire(WireError),
    BadPublic(DhError),
}

impl std::fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wire(e) => write!(f, "handshake wire error: {e}"),
            Self::BadPublic(e) => write!(f, "handshake rejected: {e}"),
        }
    }
}
impl std::error::Error for HandshakeError {}

impl From<WireError> for HandshakeError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

/// Run the server side of the exchange. `Ok(None)` means the peer closed
/// before sending its public value — a clean close, not an error.
pub async fn run_server<S>(stream: &mut S, pool: &DhPool) -> Result<Option<Sealer>, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (p_bytes, g_bytes) = pool.parameter_bytes();
    codec::write_record(stream, &p_bytes).await?;
    codec::write_record(stream, &g_bytes).await?;

    let private = pool.take_private_key();
    let outcome = exchange(stream, pool, &private).await;
    pool.return_private_key(private);
    outcome
}

async fn exchange<S>(
    stream: &mut S,
    pool: &DhPool,
    private: &DhPrivate,
) -> Result<Option<Sealer>, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    codec::write_record(stream, &pool.public_bytes(private)).await?;

    let Some(client_public) = codec::read_record(stream).await? else {
        return Ok(None);
    };
    let peer = BigUint::from_bytes_be(&client_public);
    let session_key = pool.derive(private, &peer).map_err(HandshakeError::BadPublic)?;

    Ok(Some(Sealer::new(session_key)))
}
