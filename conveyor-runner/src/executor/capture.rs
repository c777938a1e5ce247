//! Bounded output capture

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

const CHUNK_SIZE: usize = 8 * 1024;

/// Bytes read from one stream
#[derive(Debug, Default)]
pub(crate) struct Captured {
    pub bytes: Vec<u8>,
    pub truncated: bool,
}

impl Captured {
    pub fn into_string(self) -> String {
        match String::from_utf8(self.bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        }
    }
}

/// Reads `reader` to EOF, keeping at most `limit` bytes
///
/// Bytes past the limit are still read, so the writer never blocks on a
/// full pipe, but they are dropped. Reading ends early when `stop` fires.
pub(crate) async fn capture<R>(mut reader: R, limit: usize, stop: CancellationToken) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let read = tokio::select! {
            read = reader.read(&mut chunk) => read,
            _ = stop.cancelled() => break,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("Error reading job output: {}", e);
                break;
            }
        };

        let room = limit.saturating_sub(captured.bytes.len());
        if n > room {
            captured.bytes.extend_from_slice(&chunk[..room]);
            captured.truncated = true;
        } else {
            captured.bytes.extend_from_slice(&chunk[..n]);
        }
    }

    captured
}
