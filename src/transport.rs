//! Byte-stream transport over TCP or Unix-domain sockets.

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::error::{Error, Result};

/// Default directory PostgreSQL places its Unix-domain socket in.
const DEFAULT_UNIX_SOCKET_DIR: &str = "/var/run/postgresql";

enum Stream {
    Tcp(BufReader<TcpStream>, BufWriter<TcpStream>),
    #[cfg(unix)]
    Unix(BufReader<UnixStream>, BufWriter<UnixStream>),
}

/// Byte-stream abstraction over the socket carrying the wire protocol.
///
/// TLS is deliberately not modeled here: this spec treats encryption as a transport
/// placeholder a higher layer may provide by wrapping `send`/`receive`.
pub struct Transport {
    stream: Stream,
}

/// A cloned socket handle that can shut a transport's connection down from another
/// thread without owning the `Transport` itself. Used to interrupt a receiver worker
/// blocked in `receive` when the owning connection handle is closed.
enum ShutdownSocket {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

pub struct ShutdownHandle(ShutdownSocket);

impl ShutdownHandle {
    /// Shut down both halves of the socket, unblocking any in-flight read/write.
    /// Idempotent: a second call observes `ENOTCONN` from the OS, which is swallowed.
    pub fn shutdown(&self) {
        match &self.0 {
            ShutdownSocket::Tcp(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
            #[cfg(unix)]
            ShutdownSocket::Unix(stream) => {
                let _ = stream.shutdown(std::net::Shutdown::Both);
            }
        }
    }
}

impl Transport {
    /// Resolve `host`/`port` to a transport per the selection rules: a blank host uses
    /// the default Unix socket directory, a host starting with `/` is a Unix socket
    /// directory, anything else is a TCP host/IP.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        if host.is_empty() {
            Self::connect_unix(DEFAULT_UNIX_SOCKET_DIR, port)
        } else if let Some(dir) = host.strip_prefix('/') {
            Self::connect_unix(&format!("/{dir}"), port)
        } else {
            Self::connect_tcp(host, port)
        }
    }

    fn connect_tcp(host: &str, port: u16) -> Result<Self> {
        use std::net::ToSocketAddrs;

        let host_port = format!("{host}:{port}");
        let mut addrs = host_port
            .to_socket_addrs()
            .map_err(Error::AuthAddressException)?;
        let Some(addr) = addrs.next() else {
            return Err(Error::AuthInvalidAddress);
        };

        let stream = TcpStream::connect(addr).map_err(|e| {
            tracing::warn!(%host, port, error = %e, "tcp connect failed");
            Error::AuthAddressException(e)
        })?;
        stream.set_nodelay(true).map_err(Error::AuthAddressException)?;

        let reader = stream.try_clone().map_err(|e| {
            Self::close_on_connect_failure(&stream);
            Error::AuthAddressException(e)
        })?;

        Ok(Self {
            stream: Stream::Tcp(BufReader::new(reader), BufWriter::new(stream)),
        })
    }

    fn close_on_connect_failure(stream: &TcpStream) {
        let _ = stream.shutdown(std::net::Shutdown::Both);
    }

    #[cfg(unix)]
    fn connect_unix(dir: &str, port: u16) -> Result<Self> {
        let dir = dir.trim_end_matches('/');
        let path = format!("{dir}/.s.PGSQL.{port}");

        let stream = UnixStream::connect(&path).map_err(|e| {
            tracing::warn!(%path, error = %e, "unix socket connect failed");
            Error::AuthAddressException(e)
        })?;

        let reader = stream.try_clone().map_err(|e| {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            Error::AuthAddressException(e)
        })?;

        Ok(Self {
            stream: Stream::Unix(BufReader::new(reader), BufWriter::new(stream)),
        })
    }

    #[cfg(not(unix))]
    fn connect_unix(_dir: &str, _port: u16) -> Result<Self> {
        Err(Error::AuthInvalidAddress)
    }

    /// Send raw bytes, unbuffered beyond the stream's own `BufWriter`.
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        match &mut self.stream {
            Stream::Tcp(_, writer) => writer.write_all(bytes)?,
            #[cfg(unix)]
            Stream::Unix(_, writer) => writer.write_all(bytes)?,
        }
        Ok(())
    }

    /// Flush any buffered outbound bytes.
    pub fn flush(&mut self) -> Result<()> {
        match &mut self.stream {
            Stream::Tcp(_, writer) => writer.flush()?,
            #[cfg(unix)]
            Stream::Unix(_, writer) => writer.flush()?,
        }
        Ok(())
    }

    /// Read up to `buf.len()` bytes, blocking until at least one byte arrives or EOF.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match &mut self.stream {
            Stream::Tcp(reader, _) => reader.read(buf)?,
            #[cfg(unix)]
            Stream::Unix(reader, _) => reader.read(buf)?,
        };
        Ok(n)
    }

    /// Read and append up to `max` bytes to `buf`, growing it. Used by the decoder's
    /// `read_more` callback.
    pub fn receive_more(&mut self, mut buf: Vec<u8>, max: usize) -> Result<Vec<u8>> {
        let start = buf.len();
        buf.resize(start + max, 0);
        let n = self.receive(&mut buf[start..])?;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )));
        }
        buf.truncate(start + n);
        Ok(buf)
    }

    /// Duplicate the underlying socket into an independent `Transport`. Used to hand
    /// the background worker its own read/write handles while the connection keeps
    /// one for sends.
    pub fn try_clone(&self) -> Result<Self> {
        let stream = match &self.stream {
            Stream::Tcp(_, writer) => {
                let w = writer.get_ref().try_clone().map_err(Error::Io)?;
                let r = writer.get_ref().try_clone().map_err(Error::Io)?;
                Stream::Tcp(BufReader::new(r), BufWriter::new(w))
            }
            #[cfg(unix)]
            Stream::Unix(_, writer) => {
                let w = writer.get_ref().try_clone().map_err(Error::Io)?;
                let r = writer.get_ref().try_clone().map_err(Error::Io)?;
                Stream::Unix(BufReader::new(r), BufWriter::new(w))
            }
        };
        Ok(Self { stream })
    }

    /// A cloned handle that another thread can use to shut this transport's socket
    /// down, unblocking a worker parked in `receive`.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        let socket = match &self.stream {
            Stream::Tcp(_, writer) => {
                ShutdownSocket::Tcp(writer.get_ref().try_clone().map_err(Error::Io)?)
            }
            #[cfg(unix)]
            Stream::Unix(_, writer) => {
                ShutdownSocket::Unix(writer.get_ref().try_clone().map_err(Error::Io)?)
            }
        };
        Ok(ShutdownHandle(socket))
    }

    /// Shut down both halves of the underlying socket. Idempotent: a second call is a
    /// harmless no-op (the OS reports `ENOTCONN`, which is swallowed).
    pub fn close(&mut self) {
        match &mut self.stream {
            Stream::Tcp(_, writer) => {
                let _ = writer.get_ref().shutdown(std::net::Shutdown::Both);
            }
            #[cfg(unix)]
            Stream::Unix(_, writer) => {
                let _ = writer.get_ref().shutdown(std::net::Shutdown::Both);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_socket_path_layout() {
        let dir = "/var/run/postgresql";
        let port = 5432u16;
        let path = format!("{dir}/.s.PGSQL.{port}");
        assert_eq!(path, "/var/run/postgresql/.s.PGSQL.5432");
    }

    #[test]
    fn connect_with_no_listener_reports_address_exception() {
        // Port 1 is reserved and nothing listens there in test environments.
        match Transport::connect("127.0.0.1", 1) {
            Err(Error::AuthAddressException(_)) => {}
            other => panic!("expected AuthAddressException, got a different outcome: {}", other.is_ok()),
        }
    }
}
