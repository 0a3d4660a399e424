//! Stream and datagram traits for the transport layer

use async_trait::async_trait;
use sr86x_core::{Sr86xError, Sr86xResult};
use std::time::Duration;

/// Stream accessor interface to a connected byte stream
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    /// Set the read/write timeout
    ///
    /// # Arguments
    ///
    /// * `timeout` - The timeout duration. None means infinite timeout.
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> Sr86xResult<()>;

    /// Read data from the stream
    ///
    /// # Returns
    ///
    /// Number of bytes read, or 0 if EOF
    async fn read(&mut self, buf: &mut [u8]) -> Sr86xResult<usize>;

    /// Read exact number of bytes from the stream
    ///
    /// # Returns
    ///
    /// Returns error if the peer closes before `buf` is filled
    async fn read_exact(&mut self, mut buf: &mut [u8]) -> Sr86xResult<()> {
        while !buf.is_empty() {
            let n = self.read(buf).await?;
            if n == 0 {
                return Err(Sr86xError::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "Failed to read exact number of bytes",
                )));
            }
            buf = &mut buf[n..];
        }
        Ok(())
    }

    /// Write data to the stream
    ///
    /// # Returns
    ///
    /// Number of bytes written
    async fn write(&mut self, buf: &[u8]) -> Sr86xResult<usize>;

    /// Write all data to the stream
    async fn write_all(&mut self, buf: &[u8]) -> Sr86xResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(Sr86xError::Connection(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "Failed to write all data",
                )));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered data
    async fn flush(&mut self) -> Sr86xResult<()>;

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream
    async fn close(&mut self) -> Sr86xResult<()>;
}

/// Transport layer trait that extends StreamAccessor
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the physical layer connection
    async fn open(&mut self) -> Sr86xResult<()>;
}

/// Creates unopened transports to one host on a chosen port
///
/// VXI-11 bring-up talks to the portmapper first and then to whichever port
/// it returns, so a client needs to make more than one stream to the same
/// instrument.
pub trait TransportFactory: Send + Sync {
    type Transport: TransportLayer;

    /// Build a transport for `port`; the caller opens it
    fn create(&self, port: u16) -> Sr86xResult<Self::Transport>;
}

/// Source of whole datagrams
#[async_trait]
pub trait DatagramSource: Send {
    /// Receive one datagram into `buf`, truncating anything that does not fit
    ///
    /// # Returns
    ///
    /// Number of bytes stored
    async fn recv(&mut self, buf: &mut [u8]) -> Sr86xResult<usize>;

    /// Local port the source is bound to
    fn local_port(&self) -> Option<u16>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Chunked {
        input: Vec<u8>,
        pos: usize,
        chunk: usize,
        written: Vec<u8>,
    }

    #[async_trait]
    impl StreamAccessor for Chunked {
        async fn set_timeout(&mut self, _timeout: Option<Duration>) -> Sr86xResult<()> {
            Ok(())
        }

        async fn read(&mut self, buf: &mut [u8]) -> Sr86xResult<usize> {
            let n = buf.len().min(self.chunk).min(self.input.len() - self.pos);
            buf[..n].copy_from_slice(&self.input[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        async fn write(&mut self, buf: &[u8]) -> Sr86xResult<usize> {
            let n = buf.len().min(self.chunk);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        async fn flush(&mut self) -> Sr86xResult<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }

        async fn close(&mut self) -> Sr86xResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_read_exact_across_chunks() {
        let mut s = Chunked {
            input: (0..10).collect(),
            pos: 0,
            chunk: 3,
            written: Vec::new(),
        };
        let mut buf = [0u8; 8];
        s.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);

        let mut rest = [0u8; 4];
        let err = s.read_exact(&mut rest).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_write_all_across_chunks() {
        let mut s = Chunked {
            input: Vec::new(),
            pos: 0,
            chunk: 2,
            written: Vec::new(),
        };
        s.write_all(b"hello").await.unwrap();
        assert_eq!(s.written, b"hello");
    }
}
