use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};

use crate::{Error, Manager};

use super::Quad;

/// A connected TCP stream. Reads and writes block on the manager's mutex and
/// wake on the condvars the background segment loop notifies as data arrives
/// or buffer space frees up.
#[derive(Debug)]
pub struct TcpStream {
    pub(crate) manager: Arc<Mutex<Manager>>,
    pub(crate) quad: Quad,
    pub(crate) rvar: Arc<Condvar>,
    pub(crate) wvar: Arc<Condvar>,
    pub(crate) write_closed: bool,
}

fn gone() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, Error::ConnectionReset)
}

impl TcpStream {
    /// Half-closes the write side, letting the connection flush its FIN once
    /// any buffered outbound data drains.
    pub fn shutdown_write(&mut self) {
        if self.write_closed {
            return;
        }
        self.write_closed = true;
        let mut manager = self.manager.lock().unwrap();
        if let Some(entry) = manager.streams.get_mut(&self.quad) {
            entry.conn.outbound_stream().close();
        }
        self.wvar.notify_all();
    }
}

impl Read for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut manager = self.manager.lock().unwrap();

        manager = self
            .rvar
            .wait_while(manager, |manager| match manager.streams.get(&self.quad) {
                Some(entry) => {
                    entry.conn.inbound_stream().bytes_buffered() == 0
                        && !entry.conn.inbound_stream().is_finished()
                        && !entry.conn.has_error()
                }
                None => false,
            })
            .unwrap();

        let entry = manager.streams.get_mut(&self.quad).ok_or_else(gone)?;

        if entry.conn.has_error() {
            return Err(gone());
        }

        let n = entry.conn.inbound_stream().peek().len().min(buf.len());
        buf[..n].copy_from_slice(&entry.conn.inbound_stream().peek()[..n]);
        entry.conn.inbound_stream_mut().pop(n);
        Ok(n)
    }
}

impl Write for TcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.write_closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "write half is closed"));
        }

        let mut manager = self.manager.lock().unwrap();

        manager = self
            .wvar
            .wait_while(manager, |manager| match manager.streams.get(&self.quad) {
                Some(entry) => entry.conn.outbound_stream().available_capacity() == 0 && !entry.conn.has_error(),
                None => false,
            })
            .unwrap();

        let entry = manager.streams.get_mut(&self.quad).ok_or_else(gone)?;

        if entry.conn.has_error() {
            return Err(gone());
        }

        let before = entry.conn.outbound_stream().bytes_pushed();
        entry.conn.outbound_stream().push(buf);
        let accepted = (entry.conn.outbound_stream().bytes_pushed() - before) as usize;
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut manager = self.manager.lock().unwrap();

        manager = self
            .wvar
            .wait_while(manager, |manager| match manager.streams.get(&self.quad) {
                Some(entry) => entry.conn.outbound_stream().bytes_buffered() != 0 && !entry.conn.has_error(),
                None => false,
            })
            .unwrap();

        match manager.streams.get(&self.quad) {
            Some(entry) if entry.conn.has_error() => Err(gone()),
            _ => Ok(()),
        }
    }
}

impl Drop for TcpStream {
    fn drop(&mut self) {
        self.shutdown_write();
    }
}
