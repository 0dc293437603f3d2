//! Event lifecycle book for one tilt source.
//!
//! Events live in an arena and are reached through two indices keyed by
//! session: one by opening session, one by (exclusive) closing session. The
//! per-date step is [`EventBook::roll`], which promotes newly opened events and
//! expires finished ones; [`EventBook::active_tilts`] answers the tilt on any
//! session by probing only the opening-index window that can still cover it.

use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

use super::config::SourceConfig;
use super::error::{EventError, TiltbookError};
use super::event::{ClosedEvent, Event, EventId, EventRow, EventState};
use super::timeline::Timeline;

#[derive(Debug, Clone)]
pub struct EventBook<'a> {
    timeline: &'a Timeline,
    events: Vec<Event>,
    by_open: BTreeMap<usize, Vec<EventId>>,
    by_close: BTreeMap<usize, Vec<EventId>>,
    /// Longest open..close span in the book; bounds the coverage probe.
    max_span: usize,
    /// First session whose openings have not been promoted yet.
    next_open: usize,
    /// First session whose closings have not been processed yet.
    next_close: usize,
    history: Vec<ClosedEvent>,
}

impl<'a> EventBook<'a> {
    pub fn new(timeline: &'a Timeline) -> Self {
        Self {
            timeline,
            events: Vec::new(),
            by_open: BTreeMap::new(),
            by_close: BTreeMap::new(),
            max_span: 0,
            next_open: 0,
            next_close: 0,
            history: Vec::new(),
        }
    }

    /// Builds a book from raw event rows.
    ///
    /// Each row becomes usable `publication_lag_days` calendar days after its
    /// event date and opens `entry_delay` sessions after that. Rows below the
    /// rank floor, outside the accepted buckets, known before the first
    /// session, or opening past the last session are skipped.
    pub fn from_rows(
        timeline: &'a Timeline,
        source: &SourceConfig,
        rows: &[EventRow],
    ) -> Result<Self, TiltbookError> {
        let mut book = Self::new(timeline);
        let mut skipped = 0usize;

        for row in rows {
            let invalid = |reason: EventError| TiltbookError::InvalidEvent {
                source_name: source.name.clone(),
                line: row.line,
                reason,
            };

            let symbol = row.symbol.trim().to_uppercase();
            if symbol.is_empty() {
                return Err(invalid(EventError::EmptySymbol));
            }
            if !row.signal_rank.is_finite() {
                return Err(invalid(EventError::Malformed {
                    field: "signal_rank",
                    value: row.signal_rank.to_string(),
                }));
            }
            if row.signal_rank < source.min_rank || !accepts_bucket(source, &row.bucket) {
                skipped += 1;
                continue;
            }
            let Some(open_date) = open_date_for(timeline, source, row.event_date) else {
                skipped += 1;
                continue;
            };

            let id = book
                .add_event(&symbol, open_date, source.horizon, source.tilt_size)
                .map_err(invalid)?;
            book.events[id].signal_rank = Some(row.signal_rank);
        }

        tracing::info!(
            source = %source.name,
            accepted = book.len(),
            skipped,
            "event table loaded"
        );
        Ok(book)
    }

    /// Registers an event opening on `open_date` for `horizon` sessions.
    pub fn add_event(
        &mut self,
        symbol: &str,
        open_date: NaiveDate,
        horizon: i64,
        magnitude: f64,
    ) -> Result<EventId, EventError> {
        if symbol.trim().is_empty() {
            return Err(EventError::EmptySymbol);
        }
        if horizon < 1 {
            return Err(EventError::NonPositiveHorizon(horizon));
        }
        if magnitude == 0.0 || !magnitude.is_finite() {
            return Err(EventError::InvalidMagnitude(magnitude));
        }
        let open_session = self
            .timeline
            .session(open_date)
            .ok_or(EventError::OutsideTimeline(open_date))?;
        let horizon =
            usize::try_from(horizon).map_err(|_| EventError::NonPositiveHorizon(horizon))?;
        let close_session = open_session.saturating_add(horizon);

        let id = self.events.len();
        let state = if open_session < self.next_open {
            EventState::Active
        } else {
            EventState::Pending
        };
        self.events.push(Event {
            id,
            symbol: symbol.trim().to_string(),
            open_session,
            close_session,
            horizon,
            magnitude,
            signal_rank: None,
            state,
        });
        self.by_open.entry(open_session).or_default().push(id);
        self.by_close.entry(close_session).or_default().push(id);
        self.max_span = self.max_span.max(horizon);

        // Added behind the roll cursor: settle immediately.
        if close_session < self.next_close {
            self.close_event(id, false);
        }
        Ok(id)
    }

    /// Per-symbol sum of magnitudes of every event covering `date`.
    ///
    /// Non-trading dates resolve to the preceding session.
    pub fn active_tilts(&self, date: NaiveDate) -> BTreeMap<String, f64> {
        let mut tilts = BTreeMap::new();
        if let Some(session) = self.timeline.session_on_or_before(date) {
            for event in self.covering(session) {
                *tilts.entry(event.symbol.clone()).or_insert(0.0) += event.magnitude;
            }
        }
        tilts
    }

    pub fn active_count(&self, date: NaiveDate) -> usize {
        self.timeline
            .session_on_or_before(date)
            .map_or(0, |session| self.covering(session).count())
    }

    /// Promotes events opening through `date` and expires finished ones.
    ///
    /// Rolling is monotone; rolling to an earlier date is a no-op.
    pub fn roll(&mut self, date: NaiveDate) {
        let Some(session) = self.timeline.session_on_or_before(date) else {
            return;
        };
        if session >= self.next_open {
            let opened: Vec<EventId> = self
                .by_open
                .range(self.next_open..=session)
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect();
            for id in opened {
                if self.events[id].state == EventState::Pending {
                    self.events[id].state = EventState::Active;
                }
            }
            self.next_open = session + 1;
        }
        self.expire(date);
    }

    /// Closes every event whose closing session is at or before `date`.
    pub fn expire(&mut self, date: NaiveDate) {
        let Some(session) = self.timeline.session_on_or_before(date) else {
            return;
        };
        if session < self.next_close {
            return;
        }
        let due: Vec<EventId> = self
            .by_close
            .range(self.next_close..=session)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        for id in due {
            if self.events[id].state != EventState::Closed {
                self.close_event(id, false);
            }
        }
        self.next_close = session + 1;
    }

    /// Force-closes everything still open as of `date`, including events
    /// that would have opened later. Nothing carries past this date.
    pub fn close_all(&mut self, date: NaiveDate) {
        let Some(session) = self.timeline.session_on_or_before(date) else {
            return;
        };
        self.roll(date);

        let open: Vec<EventId> = self
            .by_close
            .range(session + 1..)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        for id in open {
            if self.events[id].state == EventState::Closed {
                continue;
            }
            let old_close = self.events[id].close_session;
            let new_close = session.max(self.events[id].open_session);
            if let Some(ids) = self.by_close.get_mut(&old_close) {
                ids.retain(|&other| other != id);
                if ids.is_empty() {
                    self.by_close.remove(&old_close);
                }
            }
            self.by_close.entry(new_close).or_default().push(id);
            self.events[id].close_session = new_close;
            self.close_event(id, true);
        }
    }

    pub fn event(&self, id: EventId) -> Option<&Event> {
        self.events.get(id)
    }

    pub fn state(&self, id: EventId) -> Option<EventState> {
        self.events.get(id).map(|e| e.state)
    }

    pub fn history(&self) -> &[ClosedEvent] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn covering(&self, session: usize) -> impl Iterator<Item = &Event> + '_ {
        let lo = (session + 1).saturating_sub(self.max_span);
        self.by_open
            .range(lo..=session)
            .flat_map(|(_, ids)| ids.iter())
            .map(|&id| &self.events[id])
            .filter(move |e| e.covers(session))
    }

    fn close_event(&mut self, id: EventId, forced: bool) {
        let timeline = self.timeline;
        let event = &mut self.events[id];
        event.state = EventState::Closed;

        let (Some(open_date), Some(close_date)) = (
            timeline
                .date(event.open_session)
                .or_else(|| timeline.last()),
            timeline
                .date(event.close_session)
                .or_else(|| timeline.last()),
        ) else {
            return;
        };
        tracing::debug!(symbol = %event.symbol, %open_date, %close_date, forced, "event closed");
        self.history.push(ClosedEvent {
            id,
            symbol: event.symbol.clone(),
            open_date,
            close_date,
            magnitude: event.magnitude,
            forced,
        });
    }
}

fn accepts_bucket(source: &SourceConfig, bucket: &str) -> bool {
    source.buckets.is_empty()
        || source
            .buckets
            .iter()
            .any(|b| b.eq_ignore_ascii_case(bucket.trim()))
}

fn open_date_for(
    timeline: &Timeline,
    source: &SourceConfig,
    event_date: NaiveDate,
) -> Option<NaiveDate> {
    let lag = u64::try_from(source.publication_lag_days).ok()?;
    let known = event_date.checked_add_days(Days::new(lag))?;
    if known < timeline.first()? {
        return None;
    }
    let session = timeline.session_on_or_after(known)? + source.entry_delay;
    timeline.date(session)
}
