//! Length-framed wire records.
//!
//! Every record on the wire is `4B big-endian length ‖ value`. A sealed
//! request/response frame is two records with the lengths up front:
//!
//! ```text
//! 4B  payload_len (N)
//! 4B  trans_code_len (M)
//! M   sealed trans_code
//! N   sealed payload
//! ```
//!
//! EOF discipline: a peer that closes before the first byte of a record
//! performed a clean close; EOF anywhere inside a record is fatal.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound for any single length field. Anything larger is a
/// malformed or hostile frame.
pub const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

/// Transport-level framing failures. All of them are fatal for the
/// connection they occur on.
#[derive(Debug)]
pub enum WireError {
    Io(io::Error),
    /// Peer closed mid-record.
    TruncatedRecord,
    /// A length field exceeded [`MAX_RECORD_LEN`].
    OversizedRecord { len: u32 },
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "wire I/O error: {e}"),
            Self::TruncatedRecord => write!(f, "peer closed connection mid-record"),
            Self::OversizedRecord { len } => write!(f, "record length {len} exceeds limit"),
        }
    }
}
impl std::error::Error for WireError {}

impl From<io::Error> for WireError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// One sealed request/response frame.
#[derive(Debug, PartialEq)]
pub struct Frame {
    /// Sealed transaction code bytes.
    pub trans_code: Vec<u8>,
    /// Sealed payload bytes.
    pub payload: Vec<u8>,
}

// Read a 4-byte big-endian length. `None` on clean EOF before the first
// byte; EOF after at least one byte is a truncated record.
async fn read_len<R>(r: &mut R) -> Result<Option<u32>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(WireError::TruncatedRecord)
            };
        }
        filled += n;
    }
    let len = u32::from_be_bytes(buf);
    if len > MAX_RECORD_LEN {
        return Err(WireError::OversizedRecord { len });
    }
    Ok(Some(len))
}

// Exact read of a record body; EOF here is always truncation.
async fn read_body<R>(r: &mut R, len: u32) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            WireError::TruncatedRecord
        } else {
            WireError::Io(e)
        }
    })?;
    Ok(buf)
}

/// Read one `len ‖ value` record. `Ok(None)` when the peer closed before
/// sending anything.
pub async fn read_record<R>(r: &mut R) -> Result<Option<Vec<u8>>, WireError>
where
    R: AsyncRead + Unpin,
{
    match read_len(r).await? {
        Some(len) => Ok(Some(read_body(r, len).await?)),
        None => Ok(None),
    }
}

/// Write one `len ‖ value` record.
pub async fn write_record<W>(w: &mut W, value: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(4 + value.len());
    buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
    buf.extend_from_slice(value);
    w.write_all(&buf).await?;
    w.flush().await?;
    Ok(())
}

/// Read one full frame. `Ok(None)` when the peer closed cleanly at a
/// frame boundary.
pub async fn read_frame<R>(r: &mut R) -> Result<Option<Frame>, WireError>
where
    R: AsyncRead + Unpin,
{
    let Some(payload_len) = read_len(r).await? else {
        return Ok(None);
    };
    let trans_len = read_len(r).await?.ok_or(WireError::TruncatedRecord)?;
    let trans_code = read_body(r, trans_len).await?;
    let payload = read_body(r, payload_len).await?;
    Ok(Some(Frame { trans_code, payload }))
}

/// Write one full frame as a single buffered write.
pub async fn write_frame<W>(w: &mut W, trans_code: &[u8], payload: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(8 + trans_code.len() + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&(trans_code.len() as u32).to_be_bytes());
    buf.extend_from_slice(trans_code);
    buf.extend_from_slice(payload);
    w.write_all(&buf).await?;
    w.flush().await?;
    Ok(())
}
