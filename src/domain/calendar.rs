use std::ops::Range;

use async_trait::async_trait;
use bio::data_structures::interval_tree::IntervalTree;
use chrono::NaiveDate;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};

use crate::domain::{Aggregation, DataAccessError, Entity, Event, EventQueue};

use super::booking::BookingId;
use super::listing::ListingId;

#[async_trait]
pub trait CalendarRepository {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Calendar>, DataAccessError>;
    async fn save(&mut self, entity: &mut Calendar) -> Result<bool, DataAccessError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalendarEvent {
    HoldPlaced {
        id: ListingId,
        booking_id: BookingId,
        span: Range<NaiveDate>,
    },
    HoldReleased {
        id: ListingId,
        booking_id: BookingId,
    },
}

impl Event for CalendarEvent {
    type Id = ListingId;
}

/// A confirmed stay's claim on a listing's dates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    booking_id: BookingId,
    span: Range<NaiveDate>,
}

impl Hold {
    pub fn booking_id(&self) -> BookingId {
        self.booking_id
    }

    pub fn span(&self) -> Range<NaiveDate> {
        self.span.clone()
    }
}

/// Per-listing ledger of confirmed stay intervals. Keeping every confirmed
/// span in one aggregate makes the overlap re-check and the status write a
/// single conditional append, so two racing confirmations cannot both win.
#[derive(Debug, Default, Clone)]
pub struct Calendar {
    id: ListingId,
    holds: Vec<Hold>,
    events: EventQueue<CalendarEvent>,
    stored_revision: Option<u64>,
}

impl Calendar {
    pub fn new(id: ListingId) -> Self {
        Calendar {
            id,
            ..Calendar::default()
        }
    }

    /// Claims `[span.start, span.end)` for `booking_id`. Placing the hold a
    /// second time for the same booking is a no-op, so a retried
    /// confirmation does not conflict with itself.
    pub fn place_hold(
        &mut self,
        booking_id: BookingId,
        span: Range<NaiveDate>,
    ) -> Result<(), CalendarError> {
        if span.start >= span.end {
            return Err(CalendarError::EmptySpan);
        }
        if self.holds.iter().any(|h| h.booking_id == booking_id) {
            return Ok(());
        }
        self.validate_no_overlap(booking_id, &span)?;
        self.holds.push(Hold {
            booking_id,
            span: span.clone(),
        });
        self.events.push(CalendarEvent::HoldPlaced {
            id: self.id,
            booking_id,
            span,
        });
        Ok(())
    }

    /// Releases the hold owned by `booking_id`, if any.
    pub fn release_hold(&mut self, booking_id: BookingId) {
        let before = self.holds.len();
        self.holds.retain(|h| h.booking_id != booking_id);
        if self.holds.len() != before {
            self.events.push(CalendarEvent::HoldReleased {
                id: self.id,
                booking_id,
            });
        }
    }

    pub fn holds(&self) -> &[Hold] {
        &self.holds
    }

    fn validate_no_overlap(
        &self,
        booking_id: BookingId,
        span: &Range<NaiveDate>,
    ) -> Result<(), CalendarError> {
        let mut tree = IntervalTree::new();
        for hold in &self.holds {
            tree.insert(hold.span.clone(), hold.booking_id);
        }
        match tree
            .find(span.clone())
            .map(|entry| *entry.data())
            .find(|held_by| *held_by != booking_id)
        {
            Some(conflicting) => Err(CalendarError::OverlappingHold { conflicting }),
            None => Ok(()),
        }
    }
}

impl Entity for Calendar {
    type Id = ListingId;

    const ENTITY_NAME: &'static str = "calendar";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Aggregation for Calendar {
    type Event = CalendarEvent;
    type Error = CalendarError;

    fn apply(&mut self, event: Self::Event) {
        match event {
            CalendarEvent::HoldPlaced {
                id,
                booking_id,
                span,
            } => {
                self.id = id;
                if !self.holds.iter().any(|h| h.booking_id == booking_id) {
                    self.holds.push(Hold { booking_id, span });
                }
            }
            CalendarEvent::HoldReleased { id, booking_id } => {
                self.id = id;
                self.holds.retain(|h| h.booking_id != booking_id);
            }
        }
    }

    fn events(&self) -> &EventQueue<Self::Event> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventQueue<Self::Event> {
        &mut self.events
    }

    fn stored_revision(&self) -> Option<u64> {
        self.stored_revision
    }

    fn set_stored_revision(&mut self, revision: Option<u64>) {
        self.stored_revision = revision;
    }
}

#[derive(Error, Display, Debug)]
pub enum CalendarError {
    #[display(fmt = "Stay interval is empty")]
    EmptySpan,
    #[display(fmt = "Dates overlap booking {}", conflicting)]
    OverlappingHold { conflicting: BookingId },
}
