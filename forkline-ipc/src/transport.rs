//! IPC transport implementations
//!
//! Messages travel as newline-delimited JSON. The two directions are handled by
//! separate halves so one task can block on reading while others write.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::IpcError;
use crate::protocol::MessageEnvelope;

/// Sending half of a transport
#[async_trait]
pub trait MessageSender: Send {
    /// Send a message to the other end
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError>;

    /// Close the sending half
    async fn close(&mut self) -> Result<(), IpcError>;
}

/// Receiving half of a transport
#[async_trait]
pub trait MessageReceiver: Send {
    /// Receive a message from the other end.
    ///
    /// A malformed line fails with a message-scoped error and is consumed, so
    /// the caller may keep receiving. End of input fails with
    /// [`IpcError::ConnectionClosed`].
    async fn receive<T: for<'de> Deserialize<'de> + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError>;
}

/// Writes one JSON message per line
pub struct JsonLineWriter<W> {
    writer: Option<W>,
}

impl<W> JsonLineWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
        }
    }
}

#[async_trait]
impl<W> MessageSender for JsonLineWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send<T: Serialize + Send + Sync>(
        &mut self,
        message: &MessageEnvelope<T>,
    ) -> Result<(), IpcError> {
        let writer = self.writer.as_mut().ok_or(IpcError::ConnectionClosed)?;

        let mut json = serde_json::to_string(message)
            .map_err(|e| IpcError::SerializationError(e.to_string()))?;
        json.push('\n');

        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), IpcError> {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}

/// Reads one JSON message per line
pub struct JsonLineReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R> JsonLineReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
        }
    }
}

#[async_trait]
impl<R> MessageReceiver for JsonLineReader<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn receive<T: for<'de> Deserialize<'de> + Send>(
        &mut self,
    ) -> Result<MessageEnvelope<T>, IpcError> {
        loop {
            self.line.clear();
            let read = self.reader.read_line(&mut self.line).await?;
            if read == 0 {
                return Err(IpcError::ConnectionClosed);
            }

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }

            return serde_json::from_str(trimmed).map_err(|e| {
                IpcError::DeserializationError(format!("{} (line: {})", e, trimmed))
            });
        }
    }
}

/// Transport halves over this process's stdin/stdout, as used by workers
pub fn stdio() -> (JsonLineReader<tokio::io::Stdin>, JsonLineWriter<tokio::io::Stdout>) {
    (
        JsonLineReader::new(tokio::io::stdin()),
        JsonLineWriter::new(tokio::io::stdout()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ControllerMessage, WorkerMessage};
    use forkline_core::EventKind;

    #[tokio::test]
    async fn test_round_trip_over_duplex() {
        let (near, far) = tokio::io::duplex(1024);
        let (_near_read, near_write) = tokio::io::split(near);
        let (far_read, _far_write) = tokio::io::split(far);

        let mut writer = JsonLineWriter::new(near_write);
        let mut reader = JsonLineReader::new(far_read);

        writer
            .send(&MessageEnvelope::new(0, WorkerMessage::register(EventKind::Done)))
            .await
            .unwrap();
        writer
            .send(&MessageEnvelope::new(1, WorkerMessage::start()))
            .await
            .unwrap();

        let first: MessageEnvelope<WorkerMessage> = reader.receive().await.unwrap();
        let second: MessageEnvelope<WorkerMessage> = reader.receive().await.unwrap();
        assert_eq!(first.id, 0);
        assert_eq!(first.message, WorkerMessage::register(EventKind::Done));
        assert_eq!(second.id, 1);
        assert_eq!(second.message, WorkerMessage::start());
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped() {
        let input: &[u8] = b"not json\n\n{\"id\":2,\"type\":\"acknowledge\",\"payload\":{\"ackId\":1}}\n";
        let mut reader = JsonLineReader::new(input);

        let bad: Result<MessageEnvelope<ControllerMessage>, _> = reader.receive().await;
        assert!(matches!(bad, Err(IpcError::DeserializationError(_))));

        let good: MessageEnvelope<ControllerMessage> = reader.receive().await.unwrap();
        assert_eq!(good.id, 2);
        assert_eq!(good.message, ControllerMessage::acknowledge(1));

        let eof: Result<MessageEnvelope<ControllerMessage>, _> = reader.receive().await;
        assert!(matches!(eof, Err(IpcError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (near, _far) = tokio::io::duplex(64);
        let mut writer = JsonLineWriter::new(near);
        writer.close().await.unwrap();

        let result = writer
            .send(&MessageEnvelope::new(0, WorkerMessage::start()))
            .await;
        assert!(matches!(result, Err(IpcError::ConnectionClosed)));
    }
}
