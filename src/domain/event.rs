//! Event records and their lifecycle states.

use chrono::NaiveDate;
use std::fmt;

/// One row of an event table as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    /// 1-based line in the source file, header included.
    pub line: u64,
    pub event_date: NaiveDate,
    pub symbol: String,
    pub signal_rank: f64,
    pub bucket: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Pending,
    Active,
    Closed,
}

impl fmt::Display for EventState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventState::Pending => "pending",
            EventState::Active => "active",
            EventState::Closed => "closed",
        };
        f.write_str(s)
    }
}

pub type EventId = usize;

/// A tilt held on one symbol for a fixed number of sessions.
///
/// `close_session` is exclusive: the tilt applies on sessions
/// `open_session..close_session`. A forced close pulls it in.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub symbol: String,
    pub open_session: usize,
    pub close_session: usize,
    pub horizon: usize,
    pub magnitude: f64,
    pub signal_rank: Option<f64>,
    pub state: EventState,
}

impl Event {
    pub fn covers(&self, session: usize) -> bool {
        self.open_session <= session && session < self.close_session
    }
}

/// Ledger entry written when an event leaves the book.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedEvent {
    pub id: EventId,
    pub symbol: String,
    pub open_date: NaiveDate,
    pub close_date: NaiveDate,
    pub magnitude: f64,
    /// Closed by the terminal date rather than by its horizon.
    pub forced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(open: usize, close: usize) -> Event {
        Event {
            id: 0,
            symbol: "A".into(),
            open_session: open,
            close_session: close,
            horizon: close - open,
            magnitude: 0.1,
            signal_rank: None,
            state: EventState::Pending,
        }
    }

    #[test]
    fn covers_is_half_open() {
        let e = event(3, 6);
        assert!(!e.covers(2));
        assert!(e.covers(3));
        assert!(e.covers(5));
        assert!(!e.covers(6));
    }

    #[test]
    fn state_display() {
        assert_eq!(EventState::Active.to_string(), "active");
    }
}
