//! Stream-to-disk spooling with a bounded memory window.

use std::io;
use std::path::Path;

use tempfile::{NamedTempFile, TempPath};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Read window used while spooling. Peak memory per file stays at one
/// window regardless of how large the source is.
pub const SPOOL_WINDOW: usize = 1024 * 1024;

/// Streams `source` into a fresh temp file under `dir` and returns the
/// file's RAII path guard together with the byte count.
///
/// The returned [`TempPath`] deletes the file when dropped, so the buffer
/// is cleaned up on every exit path of the caller, including panics and
/// futures dropped mid-flight.
pub async fn spool_to_temp<S>(source: &mut S, dir: &Path) -> io::Result<(TempPath, u64)>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let tmp = NamedTempFile::new_in(dir)?;
    let writer = tmp.reopen()?;
    let buffer = tmp.into_temp_path();
    let mut file = tokio::fs::File::from_std(writer);

    let mut window = vec![0u8; SPOOL_WINDOW];
    let mut written: u64 = 0;
    loop {
        let n = source.read(&mut window).await?;
        if n == 0 {
            break;
        }
        file.write_all(&window[..n]).await?;
        written += n as u64;
    }
    file.flush().await?;

    debug!(bytes = written, path = %buffer.display(), "source spooled to temp buffer");
    Ok((buffer, written))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
