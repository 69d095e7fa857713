use std::sync::{Arc, Condvar, Mutex};

use crate::{Error, Manager};

use super::stream::TcpStream;

/// A bound, listening TCP port. Connections that complete a passive open land
/// in the manager's per-port backlog, which `accept` drains.
#[derive(Debug)]
pub struct TcpListener {
    pub(crate) port: u16,
    pub(crate) manager: Arc<Mutex<Manager>>,
    pub(crate) cvar: Arc<Condvar>,
}

impl TcpListener {
    pub fn accept(&self) -> Result<TcpStream, Error> {
        let mut manager = self.manager.lock().unwrap();

        manager = self
            .cvar
            .wait_while(manager, |manager| {
                manager
                    .established
                    .get(&self.port)
                    .map(|entry| entry.elts.is_empty())
                    .unwrap_or(false)
            })
            .unwrap();

        let entry = manager
            .established
            .get_mut(&self.port)
            .ok_or(Error::PortClosed(self.port))?;

        let elt = entry.elts.pop().ok_or(Error::PortClosed(self.port))?;

        Ok(TcpStream {
            manager: self.manager.clone(),
            quad: elt.quad,
            rvar: elt.rvar,
            wvar: elt.wvar,
            write_closed: false,
        })
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        let mut manager = self.manager.lock().unwrap();
        manager.bounded.remove(&self.port);
        manager.established.remove(&self.port);
    }
}
