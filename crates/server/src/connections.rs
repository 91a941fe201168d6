//! Subscriber admission control.
//!
//! Enforces a global cap and a per-address cap on live subscribers.
//! Admission hands out a [`ConnectionPermit`]; dropping it releases the slot,
//! so counters stay correct however the socket task ends.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

/// Error returned when a connection limit is exceeded.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConnectionLimitError {
    #[error("global connection limit exceeded ({0} max)")]
    GlobalLimitExceeded(usize),
    #[error("per-address connection limit exceeded ({max} max for {ip})")]
    AddressLimitExceeded { ip: IpAddr, max: usize },
}

impl ConnectionLimitError {
    /// Metric label for the rejection.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::GlobalLimitExceeded(_) => "global",
            Self::AddressLimitExceeded { .. } => "per_ip",
        }
    }
}

pub struct ConnectionLimiter {
    max_total: usize,
    max_per_ip: usize,
    /// ip -> open subscribers. Entries are removed at zero.
    active: Mutex<HashMap<IpAddr, usize>>,
}

impl ConnectionLimiter {
    pub fn new(max_total: usize, max_per_ip: usize) -> Self {
        Self {
            max_total,
            max_per_ip,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve a slot for a subscriber from `ip`.
    pub fn admit(self: &Arc<Self>, ip: IpAddr) -> Result<ConnectionPermit, ConnectionLimitError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);

        let total: usize = active.values().sum();
        if total >= self.max_total {
            return Err(ConnectionLimitError::GlobalLimitExceeded(self.max_total));
        }

        let current = active.get(&ip).copied().unwrap_or(0);
        if current >= self.max_per_ip {
            return Err(ConnectionLimitError::AddressLimitExceeded {
                ip,
                max: self.max_per_ip,
            });
        }

        *active.entry(ip).or_insert(0) += 1;
        crate::metrics::set_subscribers(total + 1);
        Ok(ConnectionPermit {
            limiter: Arc::clone(self),
            ip,
        })
    }

    fn release(&self, ip: IpAddr) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = active.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                active.remove(&ip);
            }
        }
        crate::metrics::set_subscribers(active.values().sum());
    }

    pub fn count_for(&self, ip: IpAddr) -> usize {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.get(&ip).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.values().sum()
    }
}

/// RAII guard for one admitted subscriber.
pub struct ConnectionPermit {
    limiter: Arc<ConnectionLimiter>,
    ip: IpAddr,
}

impl ConnectionPermit {
    pub fn ip(&self) -> IpAddr {
        self.ip
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.limiter.release(self.ip);
    }
}
