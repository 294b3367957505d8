//! Byte-stream transports a [`Session`](crate::Session) runs over.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// A reliable, ordered byte stream.
///
/// Non-blocking transports report `io::ErrorKind::WouldBlock`; the session
/// turns that into [`Error::WouldBlock`](crate::Error::WouldBlock) and
/// resumes on the next call.
pub trait Transport: Read + Write {
    /// Close both directions. Further reads and writes fail.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            // Already closed by the peer.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn shutdown(&mut self) -> io::Result<()> {
        (**self).shutdown()
    }
}

// ============================================================================
// In-memory duplex
// ============================================================================

/// One direction of a [`MemoryTransport`] pair.
#[derive(Default)]
struct Pipe {
    state: Mutex<PipeState>,
    ready: Condvar,
}

#[derive(Default)]
struct PipeState {
    data: VecDeque<u8>,
    /// The writing end is gone, the reader sees EOF once drained.
    writer_closed: bool,
    /// The reading end is gone, writes fail and blocked reads wake up.
    reader_closed: bool,
}

impl Pipe {
    fn lock(&self) -> MutexGuard<'_, PipeState> {
        // A panic while holding the lock leaves the byte queue consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn close_writer(&self) {
        self.lock().writer_closed = true;
        self.ready.notify_all();
    }

    fn close_reader(&self) {
        self.lock().reader_closed = true;
        self.ready.notify_all();
    }
}

/// One end of an in-memory duplex stream, created with
/// [`MemoryTransport::pair`].
///
/// Blocking by default. Dropping or shutting down an end gives the other
/// end EOF on read and `BrokenPipe` on write.
pub struct MemoryTransport {
    incoming: Arc<Pipe>,
    outgoing: Arc<Pipe>,
    nonblocking: bool,
}

impl MemoryTransport {
    /// Two connected ends.
    pub fn pair() -> (MemoryTransport, MemoryTransport) {
        let a_to_b = Arc::new(Pipe::default());
        let b_to_a = Arc::new(Pipe::default());

        let a = MemoryTransport {
            incoming: b_to_a.clone(),
            outgoing: a_to_b.clone(),
            nonblocking: false,
        };
        let b = MemoryTransport {
            incoming: a_to_b,
            outgoing: b_to_a,
            nonblocking: false,
        };
        (a, b)
    }

    /// In non-blocking mode a read with nothing buffered fails with
    /// `WouldBlock` instead of waiting.
    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.nonblocking = nonblocking;
    }

    pub fn is_nonblocking(&self) -> bool {
        self.nonblocking
    }

    /// Number of bytes written by the peer and not read yet.
    pub fn available(&self) -> usize {
        self.incoming.lock().data.len()
    }

    /// A handle that closes this end from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            incoming: self.incoming.clone(),
            outgoing: self.outgoing.clone(),
        }
    }

    fn close(&self) {
        self.outgoing.close_writer();
        self.incoming.close_reader();
    }
}

impl Read for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.incoming.lock();
        loop {
            if state.reader_closed {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "transport closed",
                ));
            }

            if !state.data.is_empty() {
                let n = buf.len().min(state.data.len());
                for (dst, src) in buf.iter_mut().zip(state.data.drain(..n)) {
                    *dst = src;
                }
                return Ok(n);
            }

            if state.writer_closed {
                return Ok(0);
            }

            if self.nonblocking {
                return Err(io::ErrorKind::WouldBlock.into());
            }

            state = self
                .incoming
                .ready
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl Write for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        {
            let mut state = self.outgoing.lock();
            if state.writer_closed || state.reader_closed {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            state.data.extend(buf);
        }
        self.outgoing.ready.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MemoryTransport {
    fn shutdown(&mut self) -> io::Result<()> {
        self.close();
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Closes a [`MemoryTransport`] end from any thread.
///
/// A read blocked on that end wakes up with `ConnectionAborted`.
#[derive(Clone)]
pub struct CloseHandle {
    incoming: Arc<Pipe>,
    outgoing: Arc<Pipe>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.outgoing.close_writer();
        self.incoming.close_reader();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn bytes_flow_both_ways() {
        let (mut a, mut b) = MemoryTransport::pair();

        a.write_all(b"ping").unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(b.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"ping");

        b.write_all(b"pong").unwrap();
        assert_eq!(a.available(), 4);
        assert_eq!(a.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], b"pong");
    }

    #[test]
    fn nonblocking_read_would_block() {
        let (mut a, _b) = MemoryTransport::pair();
        a.set_nonblocking(true);

        let mut buf = [0u8; 4];
        let err = a.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn drop_gives_eof_and_broken_pipe() {
        let (mut a, b) = MemoryTransport::pair();
        drop(b);

        let mut buf = [0u8; 4];
        assert_eq!(a.read(&mut buf).unwrap(), 0);
        assert_eq!(
            a.write(b"x").unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
    }

    #[test]
    fn close_handle_wakes_blocked_read() {
        let (mut a, _b) = MemoryTransport::pair();
        let handle = a.close_handle();

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 4];
            a.read(&mut buf)
        });

        thread::sleep(Duration::from_millis(50));
        handle.close();

        let err = reader.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    }
}
