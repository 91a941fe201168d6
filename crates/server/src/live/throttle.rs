use std::time::Duration;
use tokio::time::Instant;

/// What to do with a snapshot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotDecision {
    SendNow,
    /// Schedule one trailing send at this instant.
    ScheduleAt(Instant),
    /// A trailing send is already scheduled and will cover this request.
    Coalesced,
}

/// Leading-edge plus single-trailing-edge throttle for snapshot sends.
///
/// The first request after a quiet cool-down sends immediately. Requests
/// inside the cool-down collapse into one send at its end. That bounds a
/// window to two sends no matter how many requests arrive.
#[derive(Debug)]
pub struct SnapshotThrottle {
    cooldown: Duration,
    last_sent: Option<Instant>,
    trailing: Option<Instant>,
}

impl SnapshotThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_sent: None,
            trailing: None,
        }
    }

    pub fn on_request(&mut self, now: Instant) -> SnapshotDecision {
        if self.trailing.is_some() {
            return SnapshotDecision::Coalesced;
        }
        match self.last_sent {
            Some(last) if now < last + self.cooldown => {
                let at = last + self.cooldown;
                self.trailing = Some(at);
                SnapshotDecision::ScheduleAt(at)
            }
            _ => {
                self.last_sent = Some(now);
                SnapshotDecision::SendNow
            }
        }
    }

    /// The scheduled trailing send is going out.
    pub fn on_trailing_fire(&mut self, now: Instant) {
        self.trailing = None;
        self.last_sent = Some(now);
    }

    pub fn has_pending(&self) -> bool {
        self.trailing.is_some()
    }

    /// Forget a scheduled trailing send that was cancelled.
    pub fn reset_pending(&mut self) {
        self.trailing = None;
    }
}
