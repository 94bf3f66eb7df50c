//! Read loop: bytes from the channel, through the framer, out as lines.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

use crate::protocol::LineFramer;

/// Why a read loop ended
#[derive(Debug)]
pub(crate) enum ReadEnd {
    /// The session was closed locally
    Shutdown,
    /// The remote closed the stream
    EndOfStream,
    /// The stream failed
    Failed(io::Error),
}

/// Pump `reader` until shutdown, end of stream or an error
///
/// Every completed frame is handed to `on_frame` in wire order.
pub(crate) async fn pump<R, F>(
    reader: &mut R,
    buffer_size: usize,
    shutdown: &mut watch::Receiver<bool>,
    mut on_frame: F,
) -> ReadEnd
where
    R: AsyncRead + Unpin + ?Sized,
    F: FnMut(String),
{
    let mut buffer = vec![0u8; buffer_size];
    let mut framer = LineFramer::new();

    loop {
        let read = tokio::select! {
            biased;
            _ = shutdown.changed() => return ReadEnd::Shutdown,
            read = reader.read(&mut buffer) => read,
        };

        match read {
            Ok(0) => return ReadEnd::EndOfStream,
            Ok(n) => {
                for line in framer.push(&buffer[..n]) {
                    on_frame(line);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return ReadEnd::Failed(e),
        }

        if *shutdown.borrow() {
            return ReadEnd::Shutdown;
        }
    }
}
