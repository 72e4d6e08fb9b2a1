use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};

/// Bytes pulled from the socket per read call.
const READ_CHUNK: usize = 16 * 1024;

enum Socket {
    Tcp(TcpStream),
    Unix(UnixStream),
    #[cfg(test)]
    Memory(memory::MemorySocket),
}

impl Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Socket::Tcp(s) => s.read(buf),
            Socket::Unix(s) => s.read(buf),
            #[cfg(test)]
            Socket::Memory(s) => s.read(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.write_all(buf),
            Socket::Unix(s) => s.write_all(buf),
            #[cfg(test)]
            Socket::Memory(s) => s.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.flush(),
            Socket::Unix(s) => s.flush(),
            #[cfg(test)]
            Socket::Memory(s) => s.flush(),
        }
    }

    fn set_nonblocking(&mut self, on: bool) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.set_nonblocking(on),
            Socket::Unix(s) => s.set_nonblocking(on),
            #[cfg(test)]
            Socket::Memory(s) => {
                s.nonblocking = on;
                Ok(())
            }
        }
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Socket::Tcp(s) => s.set_read_timeout(timeout),
            Socket::Unix(s) => s.set_read_timeout(timeout),
            #[cfg(test)]
            Socket::Memory(_) => Ok(()),
        }
    }
}

/// Socket plus an inbox of bytes received but not yet framed.
///
/// Messages are framed out of the inbox, so a non-blocking read that stops in
/// the middle of a message loses nothing.
pub struct Stream {
    socket: Socket,
    inbox: Vec<u8>,
    /// Start of the unconsumed part of `inbox`
    pos: usize,
}

impl Stream {
    fn new(socket: Socket) -> Self {
        Self {
            socket,
            inbox: Vec::with_capacity(READ_CHUNK),
            pos: 0,
        }
    }

    /// Connect over TCP, trying every resolved address in turn.
    pub fn tcp(host: &str, port: u16, timeout: Option<Duration>) -> io::Result<Self> {
        let mut last_error = None;
        for addr in (host, port).to_socket_addrs()? {
            let connected = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match connected {
                Ok(tcp) => {
                    tcp.set_nodelay(true)?;
                    return Ok(Self::new(Socket::Tcp(tcp)));
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                ErrorKind::NotFound,
                format!("could not resolve host {:?}", host),
            )
        }))
    }

    pub fn unix(path: &str) -> io::Result<Self> {
        Ok(Self::new(Socket::Unix(UnixStream::connect(path)?)))
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.socket.set_read_timeout(timeout)?)
    }

    /// Write everything; `write_all` already retries `Interrupted`.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        Ok(self.socket.write_all(buf)?)
    }

    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.socket.flush() {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                other => return Ok(other?),
            }
        }
    }

    /// Type byte of the next complete message already in the inbox.
    pub fn peek_type(&self) -> Option<u8> {
        let pending = self.inbox.get(self.pos..)?;
        let (&type_byte, rest) = pending.split_first()?;
        let len = i32::from_be_bytes(rest.get(..4)?.try_into().ok()?);
        (len >= 4 && rest.len() >= len as usize).then_some(type_byte)
    }

    /// Move one complete message from the inbox into `buffer_set`.
    fn take_message(&mut self, buffer_set: &mut BufferSet) -> Result<bool> {
        let pending = self.inbox.get(self.pos..).unwrap_or_default();
        let Some((&type_byte, rest)) = pending.split_first() else {
            return Ok(false);
        };
        let Some(len_bytes) = rest.get(..4) else {
            return Ok(false);
        };
        let len = i32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
        if len < 4 {
            return Err(Error::Protocol(format!("Invalid message length: {}", len)));
        }
        let Some(payload) = rest.get(4..len as usize) else {
            return Ok(false);
        };

        buffer_set.type_byte = type_byte;
        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.extend_from_slice(payload);
        self.pos += 1 + len as usize;

        if self.pos == self.inbox.len() {
            self.inbox.clear();
            self.pos = 0;
        }
        Ok(true)
    }

    /// Append one read's worth of bytes. `Ok(0)` means the read would block.
    fn fill_once(&mut self) -> io::Result<usize> {
        if self.pos > 0 && self.pos * 2 > self.inbox.len() {
            self.inbox.drain(..self.pos);
            self.pos = 0;
        }
        let start = self.inbox.len();
        self.inbox.resize(start + READ_CHUNK, 0);
        let read = loop {
            match self.socket.read(&mut self.inbox[start..]) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        let n = match read {
            Ok(n) => n,
            Err(e) => {
                self.inbox.truncate(start);
                if e.kind() == ErrorKind::WouldBlock {
                    return Ok(0);
                }
                return Err(e);
            }
        };
        self.inbox.truncate(start + n);
        if n == 0 {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "server closed the connection",
            ));
        }
        Ok(n)
    }

    /// Block until one full message is available.
    pub fn read_message(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        while !self.take_message(buffer_set)? {
            if self.fill_once()? == 0 {
                // A read timeout surfaces as WouldBlock on a blocking socket
                return Err(Error::Transport(io::Error::new(
                    ErrorKind::TimedOut,
                    "timed out waiting for the server",
                )));
            }
        }
        Ok(())
    }

    /// Pull whatever the socket has without blocking.
    pub fn fill_nonblocking(&mut self) -> Result<()> {
        self.socket.set_nonblocking(true)?;
        let filled = loop {
            match self.fill_once() {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) => break Err(e),
            }
        };
        self.socket.set_nonblocking(false)?;
        Ok(filled?)
    }

    /// Take a message if one can be assembled without blocking.
    pub fn try_read_message(&mut self, buffer_set: &mut BufferSet) -> Result<bool> {
        if self.take_message(buffer_set)? {
            return Ok(true);
        }
        self.fill_nonblocking()?;
        self.take_message(buffer_set)
    }
}

#[cfg(test)]
impl Stream {
    /// In-memory stream replaying `input` as server output.
    pub fn memory(input: Vec<u8>) -> Self {
        Self::new(Socket::Memory(memory::MemorySocket::new(input)))
    }

    /// Bytes the client wrote so far.
    pub fn written(&self) -> &[u8] {
        match &self.socket {
            Socket::Memory(s) => &s.output,
            _ => &[],
        }
    }

    /// Append more server output.
    pub fn feed(&mut self, bytes: &[u8]) {
        if let Socket::Memory(s) = &mut self.socket {
            s.input.extend_from_slice(bytes);
        }
    }
}
