use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::sources::ProgressObserver;

pub const CHUNK_SIZE: usize = 1024;

/// Copies `reader` into `dest` in [`CHUNK_SIZE`] pieces, never holding more
/// than one chunk in memory. A body shorter than `content_length` is an
/// error; the partial file stays on disk.
pub fn write_chunked<R: Read>(
    mut reader: R,
    dest: &Path,
    content_length: Option<u64>,
    progress: &mut dyn ProgressObserver,
) -> Result<u64> {
    let mut file = BufWriter::new(File::create(dest)?);
    progress.start(content_length.map(|len| len.div_ceil(CHUNK_SIZE as u64)));

    let mut buf = [0u8; CHUNK_SIZE];
    let mut written: u64 = 0;
    loop {
        let n = fill_chunk(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        written += n as u64;
        progress.chunk(n);
    }
    file.flush()?;
    progress.finish();

    if let Some(expected) = content_length {
        if written < expected {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ended after {} of {} bytes", written, expected),
            )
            .into());
        }
    }

    debug!(bytes = written, path = %dest.display(), "stream written");
    Ok(written)
}

/// Reads until `buf` is full or the stream ends. Only the last chunk of a
/// body can come back short.
fn fill_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
