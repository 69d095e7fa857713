/// A single retransmission timer driven by explicit `tick` calls — no OS timer is
/// involved. [`TCPSender`](super::TCPSender) owns exactly one of these.
#[derive(Debug, Clone)]
pub struct RetransmissionTimer {
    rto: u64,
    elapsed: u64,
    active: bool,
}

impl RetransmissionTimer {
    pub fn new(initial_rto_ms: u64) -> Self {
        RetransmissionTimer {
            rto: initial_rto_ms,
            elapsed: 0,
            active: false,
        }
    }

    pub fn start(&mut self) {
        self.active = true;
        self.reset();
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.elapsed = 0;
    }

    pub fn reload_rto(&mut self, initial_rto_ms: u64) {
        self.rto = initial_rto_ms;
    }

    pub fn exponential_backoff(&mut self) {
        self.rto *= 2;
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed >= self.rto
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn tick(&mut self, ms_since_last_tick: u64) {
        self.elapsed += ms_since_last_tick;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_only_once_rto_elapses() {
        let mut t = RetransmissionTimer::new(100);
        t.start();
        t.tick(99);
        assert!(!t.is_expired());
        t.tick(2);
        assert!(t.is_expired());
    }

    #[test]
    fn backoff_doubles_rto_without_resetting_elapsed() {
        let mut t = RetransmissionTimer::new(100);
        t.start();
        t.tick(150);
        assert!(t.is_expired());
        t.exponential_backoff();
        assert!(t.is_expired(), "elapsed time is untouched by backoff");
        t.reset();
        assert!(!t.is_expired());
        t.tick(150);
        assert!(!t.is_expired());
        t.tick(50);
        assert!(t.is_expired());
    }

    #[test]
    fn stop_deactivates_and_resets() {
        let mut t = RetransmissionTimer::new(50);
        t.start();
        t.tick(10);
        t.stop();
        assert!(!t.is_active());
        assert!(!t.is_expired());
    }
}
