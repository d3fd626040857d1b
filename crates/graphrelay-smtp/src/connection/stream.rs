//! Low-level SMTP stream handling.

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

use crate::error::{Error, Result};
use crate::types::Reply;

/// Server side of an SMTP connection (plaintext or TLS).
#[derive(Debug)]
pub enum SmtpStream<S> {
    /// Plaintext connection.
    Plain(BufReader<S>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<TlsStream<S>>>),
}

impl<S> SmtpStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a plaintext connection.
    pub fn plain(io: S) -> Self {
        Self::Plain(BufReader::new(io))
    }

    /// Performs the TLS handshake on a fresh connection (implicit TLS).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the handshake fails.
    pub async fn accept_tls(io: S, acceptor: &TlsAcceptor) -> Result<Self> {
        let tls = acceptor.accept(io).await.map_err(Error::Handshake)?;
        Ok(Self::Tls(Box::new(BufReader::new(tls))))
    }

    /// Returns true once the connection is encrypted.
    pub const fn is_encrypted(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Reads one line, without its line terminator.
    ///
    /// Returns `None` on end of stream. A line longer than `limit` is
    /// consumed up to its terminator and reported as
    /// [`Error::LineTooLong`], so the next read starts on a fresh line.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the line is too long.
    pub async fn read_line(&mut self, limit: usize) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Plain(reader) => read_limited(reader, limit).await,
            Self::Tls(reader) => read_limited(&mut **reader, limit).await,
        }
    }

    /// Writes a reply and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_reply(&mut self, reply: &Reply) -> Result<()> {
        let data = reply.to_bytes();
        match self {
            Self::Plain(reader) => {
                reader.get_mut().write_all(&data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(&data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Upgrades a plaintext stream to TLS (STARTTLS).
    ///
    /// Plaintext the client pipelined after STARTTLS is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted or the
    /// handshake fails.
    pub async fn upgrade_to_tls(self, acceptor: &TlsAcceptor) -> Result<Self> {
        let io = match self {
            Self::Plain(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::InvalidState("Already using TLS".into())),
        };
        Self::accept_tls(io, acceptor).await
    }

    /// Shuts down the write side of the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<()> {
        match self {
            Self::Plain(reader) => reader.get_mut().shutdown().await?,
            Self::Tls(reader) => reader.get_mut().shutdown().await?,
        }
        Ok(())
    }
}

async fn read_limited<R>(reader: &mut R, limit: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    // room for the CRLF on top of the payload limit
    let cap = limit.saturating_add(2);
    let mut line = Vec::new();
    let read = (&mut *reader)
        .take(cap as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if read == 0 {
        return Ok(None);
    }

    if line.last() != Some(&b'\n') && read >= cap {
        discard_line(reader).await?;
        return Err(Error::LineTooLong(limit));
    }

    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }

    if line.len() > limit {
        return Err(Error::LineTooLong(limit));
    }

    Ok(Some(line))
}

async fn discard_line<R>(reader: &mut R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = buf.len();
        reader.consume(len);
    }
}
