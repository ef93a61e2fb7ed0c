use std::sync::Arc;

use bytes::Bytes;
use flume::{Receiver, Sender};
use tokio::{
    io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    select,
    task::JoinError,
};
use tracing::debug;

use crate::{
    error::SessionError,
    registry::{Registry, SessionId},
};

/// One accepted connection and the mailbox the broadcast loop fills for it.
pub struct Session<T> {
    id: SessionId,
    transport: T,
    mailbox: Receiver<Bytes>,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(id: SessionId, transport: T, mailbox: Receiver<Bytes>) -> Self {
        Self {
            id,
            transport,
            mailbox,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Runs the reader and writer tasks until either one stops, then removes
    /// the session from `registry` and stops the other. Returning drops both
    /// transport halves, closing the connection.
    pub async fn run(self, registry: Arc<Registry>, read_buffer_size: usize) -> Result<(), SessionError> {
        let Session {
            id,
            transport,
            mailbox,
        } = self;
        let (read_half, write_half) = io::split(transport);

        // Writer first, so it is usually already waiting on the mailbox when
        // the first chunk from this client is broadcast.
        let mut writer = tokio::spawn(write_loop(write_half, mailbox));
        let mut reader = tokio::spawn(read_loop(read_half, registry.inbound(), read_buffer_size));

        let outcome = select! {
            result = &mut reader => {
                debug!(session = id, "reader finished");
                writer.abort();
                flatten(result)
            }
            result = &mut writer => {
                debug!(session = id, "writer finished");
                reader.abort();
                flatten(result)
            }
        };

        registry.deregister(id).await;
        outcome
    }
}

fn flatten(result: Result<Result<(), SessionError>, JoinError>) -> Result<(), SessionError> {
    result.map_err(SessionError::Task)?
}

/// Forwards whatever each read returns, up to `buffer_size` bytes, to the
/// inbound channel. A zero-length read means the peer closed.
async fn read_loop<R>(
    mut reader: R,
    inbound: Sender<Bytes>,
    buffer_size: usize,
) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; buffer_size];
    loop {
        let read = reader.read(&mut buffer).await.map_err(SessionError::Read)?;
        if read == 0 {
            return Ok(());
        }

        inbound
            .send_async(Bytes::copy_from_slice(&buffer[..read]))
            .await
            .map_err(|_| SessionError::InboundClosed)?;
    }
}

async fn write_loop<W>(mut writer: W, mailbox: Receiver<Bytes>) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    while let Ok(message) = mailbox.recv_async().await {
        writer.write_all(&message).await.map_err(SessionError::Write)?;
        writer.flush().await.map_err(SessionError::Write)?;
    }
    Ok(())
}
