use std::fmt;
use std::ops::Range;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::domain::{Aggregation, DataAccessError, Entity, Event, EventQueue, Id, UserId};

use super::listing::{Listing, ListingId};
use super::money::Money;

/// Longest stay accepted at creation.
pub const MAX_STAY_NIGHTS: i64 = 365;

#[async_trait]
pub trait BookingRepository {
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, DataAccessError>;
    /// Confirmed bookings whose check-out lies strictly before `day`;
    /// the completion sweep feeds on this.
    async fn find_confirmed_ending_before(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<Booking>, DataAccessError>;
    async fn save(&mut self, entity: &mut Booking) -> Result<bool, DataAccessError>;
    /// Removes the booking together with its status history.
    async fn delete(&mut self, entity: &mut Booking) -> Result<bool, DataAccessError>;
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct BookingId(u64);

impl Id for BookingId {
    type Inner = u64;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Rejected,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Transition table. Every status change in the system goes through
    /// here; anything the table does not list is a conflict.
    pub fn next(self, action: BookingAction) -> Option<BookingStatus> {
        use BookingAction::*;
        use BookingStatus::*;
        match (self, action) {
            (Pending, Confirm) => Some(Confirmed),
            (Pending, Reject) => Some(Rejected),
            (Pending, Cancel) | (Confirmed, Cancel) => Some(Cancelled),
            (Confirmed, Complete) => Some(Completed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Rejected | BookingStatus::Cancelled | BookingStatus::Completed
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BookingAction {
    Confirm,
    Reject,
    Cancel,
    Complete,
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingAction::Confirm => "confirmed",
            BookingAction::Reject => "rejected",
            BookingAction::Cancel => "cancelled",
            BookingAction::Complete => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingEvent {
    BookingCreated {
        id: BookingId,
        listing_id: ListingId,
        tenant: UserId,
        stayers: u32,
        check_in: NaiveDate,
        check_out: NaiveDate,
        total_price: Money,
        changed_at: DateTime<Utc>,
    },
    BookingConfirmed {
        id: BookingId,
        changed_by: UserId,
        changed_at: DateTime<Utc>,
    },
    BookingRejected {
        id: BookingId,
        changed_by: UserId,
        reason: String,
        changed_at: DateTime<Utc>,
    },
    BookingCancelled {
        id: BookingId,
        changed_by: UserId,
        changed_at: DateTime<Utc>,
    },
    BookingCompleted {
        id: BookingId,
        comment: String,
        changed_at: DateTime<Utc>,
    },
}

impl Event for BookingEvent {
    type Id = BookingId;
}

/// One row of the append-only status history. The first record is written
/// at creation, one more at every transition; records are never mutated
/// and are deleted only together with the booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: BookingStatus,
    pub comment: String,
    pub changed_by: Option<UserId>,
    pub changed_at: DateTime<Utc>,
}

/// A tenant's stay request against a listing, from pending through the
/// terminal statuses.
#[derive(Debug, Default, Clone)]
pub struct Booking {
    id: BookingId,
    listing_id: ListingId,
    tenant: UserId,
    stayers: u32,
    check_in: NaiveDate,
    check_out: NaiveDate,
    total_price: Money,
    status: BookingStatus,
    history: Vec<StatusRecord>,
    created_at: DateTime<Utc>,
    events: EventQueue<BookingEvent>,
    stored_revision: Option<u64>,
}

impl Booking {
    /// Creates a pending booking. `today` is the caller's current date;
    /// the price is fixed here as nights x nightly rate and never
    /// recomputed afterwards.
    pub fn create(
        id: BookingId,
        listing: &Listing,
        tenant: UserId,
        stayers: u32,
        check_in: NaiveDate,
        check_out: NaiveDate,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self, BookingError> {
        if check_out <= check_in {
            return Err(BookingError::CheckOutNotAfterCheckIn);
        }
        if check_in < today {
            return Err(BookingError::CheckInInPast);
        }
        if (check_out - check_in).num_days() > MAX_STAY_NIGHTS {
            return Err(BookingError::StayTooLong);
        }
        if stayers == 0 {
            return Err(BookingError::NoStayers);
        }
        if stayers > listing.max_stayers() {
            return Err(BookingError::TooManyStayers {
                max: listing.max_stayers(),
            });
        }
        if tenant == listing.owner() {
            return Err(BookingError::OwnBooking);
        }
        let nights = (check_out - check_in).num_days() as u32;
        let total_price = listing.price_per_night() * nights;
        let mut entity = Booking {
            id,
            listing_id: listing.id(),
            tenant,
            stayers,
            check_in,
            check_out,
            total_price,
            status: BookingStatus::Pending,
            created_at: now,
            ..Booking::default()
        };
        entity.record(BookingStatus::Pending, String::new(), Some(tenant), now);
        entity.events.push(BookingEvent::BookingCreated {
            id,
            listing_id: listing.id(),
            tenant,
            stayers,
            check_in,
            check_out,
            total_price,
            changed_at: now,
        });
        Ok(entity)
    }

    pub fn confirm(&mut self, changed_by: UserId, now: DateTime<Utc>) -> Result<(), BookingError> {
        let next = self.transition(BookingAction::Confirm)?;
        self.status = next;
        self.record(next, String::new(), Some(changed_by), now);
        self.events.push(BookingEvent::BookingConfirmed {
            id: self.id,
            changed_by,
            changed_at: now,
        });
        Ok(())
    }

    pub fn reject(
        &mut self,
        changed_by: UserId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let next = self.transition(BookingAction::Reject)?;
        self.status = next;
        self.record(next, reason.clone(), Some(changed_by), now);
        self.events.push(BookingEvent::BookingRejected {
            id: self.id,
            changed_by,
            reason,
            changed_at: now,
        });
        Ok(())
    }

    /// Tenant-side cancellation, only while check-in is still in the future.
    pub fn cancel(
        &mut self,
        changed_by: UserId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let next = self.transition(BookingAction::Cancel)?;
        if self.check_in <= today {
            return Err(BookingError::CancelationWindowClosed);
        }
        self.status = next;
        self.record(next, String::new(), Some(changed_by), now);
        self.events.push(BookingEvent::BookingCancelled {
            id: self.id,
            changed_by,
            changed_at: now,
        });
        Ok(())
    }

    /// System-side completion after check-out has elapsed; no acting user.
    pub fn complete(&mut self, comment: String, now: DateTime<Utc>) -> Result<(), BookingError> {
        let next = self.transition(BookingAction::Complete)?;
        self.status = next;
        self.record(next, comment.clone(), None, now);
        self.events.push(BookingEvent::BookingCompleted {
            id: self.id,
            comment,
            changed_at: now,
        });
        Ok(())
    }

    pub fn listing_id(&self) -> ListingId {
        self.listing_id
    }

    pub fn tenant(&self) -> UserId {
        self.tenant
    }

    pub fn stayers(&self) -> u32 {
        self.stayers
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    /// Half-open stay interval `[check_in, check_out)`.
    pub fn span(&self) -> Range<NaiveDate> {
        self.check_in..self.check_out
    }

    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn history(&self) -> &[StatusRecord] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn nights_to_stay(&self) -> u32 {
        (self.check_out - self.check_in).num_days().max(0) as u32
    }

    /// Whether the tenant may still cancel: pending or confirmed, and
    /// check-in strictly in the future.
    pub fn cancelation(&self, today: NaiveDate) -> bool {
        matches!(
            self.status,
            BookingStatus::Pending | BookingStatus::Confirmed
        ) && self.check_in > today
    }

    fn transition(&self, action: BookingAction) -> Result<BookingStatus, BookingError> {
        self.status
            .next(action)
            .ok_or(BookingError::InvalidTransition {
                from: self.status,
                action,
            })
    }

    fn record(
        &mut self,
        status: BookingStatus,
        comment: String,
        changed_by: Option<UserId>,
        changed_at: DateTime<Utc>,
    ) {
        self.history.push(StatusRecord {
            status,
            comment,
            changed_by,
            changed_at,
        });
    }
}

impl Entity for Booking {
    type Id = BookingId;

    const ENTITY_NAME: &'static str = "booking";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Aggregation for Booking {
    type Event = BookingEvent;
    type Error = BookingError;

    fn apply(&mut self, event: Self::Event) {
        match event {
            BookingEvent::BookingCreated {
                id,
                listing_id,
                tenant,
                stayers,
                check_in,
                check_out,
                total_price,
                changed_at,
            } => {
                self.id = id;
                self.listing_id = listing_id;
                self.tenant = tenant;
                self.stayers = stayers;
                self.check_in = check_in;
                self.check_out = check_out;
                self.total_price = total_price;
                self.status = BookingStatus::Pending;
                self.created_at = changed_at;
                self.history.clear();
                self.record(BookingStatus::Pending, String::new(), Some(tenant), changed_at);
            }
            BookingEvent::BookingConfirmed {
                changed_by,
                changed_at,
                ..
            } => {
                if let Some(next) = self.status.next(BookingAction::Confirm) {
                    self.status = next;
                    self.record(next, String::new(), Some(changed_by), changed_at);
                }
            }
            BookingEvent::BookingRejected {
                changed_by,
                reason,
                changed_at,
                ..
            } => {
                if let Some(next) = self.status.next(BookingAction::Reject) {
                    self.status = next;
                    self.record(next, reason, Some(changed_by), changed_at);
                }
            }
            BookingEvent::BookingCancelled {
                changed_by,
                changed_at,
                ..
            } => {
                if let Some(next) = self.status.next(BookingAction::Cancel) {
                    self.status = next;
                    self.record(next, String::new(), Some(changed_by), changed_at);
                }
            }
            BookingEvent::BookingCompleted {
                comment,
                changed_at,
                ..
            } => {
                if let Some(next) = self.status.next(BookingAction::Complete) {
                    self.status = next;
                    self.record(next, comment, None, changed_at);
                }
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

impl PartialEq for Booking {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.listing_id == other.listing_id
            && self.tenant == other.tenant
            && self.stayers == other.stayers
            && self.check_in == other.check_in
            && self.check_out == other.check_out
            && self.total_price == other.total_price
            && self.status == other.status
            && self.history == other.history
    }
}

impl Eq for Booking {}

#[derive(Error, Display, Debug)]
pub enum BookingError {
    #[display(fmt = "Check-out must be after check-in")]
    CheckOutNotAfterCheckIn,
    #[display(fmt = "Check-in cannot be in the past")]
    CheckInInPast,
    #[display(fmt = "Maximum booking length is {} nights", MAX_STAY_NIGHTS)]
    StayTooLong,
    #[display(fmt = "At least one stayer is required")]
    NoStayers,
    #[display(fmt = "Maximum {} stayers allowed", max)]
    TooManyStayers { max: u32 },
    #[display(fmt = "Owners cannot book their own listing")]
    OwnBooking,
    #[display(fmt = "A {} booking cannot be {}", from, action)]
    InvalidTransition {
        from: BookingStatus,
        action: BookingAction,
    },
    #[display(fmt = "Check-in date is not in the future anymore")]
    CancelationWindowClosed,
}
