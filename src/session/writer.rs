//! Write path: one command at a time, written and flushed.

use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::protocol::Command;

/// Write one command with its terminator and flush it
pub(crate) async fn write_command<W>(writer: &mut W, command: &Command) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(&command.encode()).await?;
    writer.flush().await
}
