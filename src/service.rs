use chrono::{NaiveDate, Utc};
use derive_more::{Display, Error};
use tracing::{info, warn};

use crate::domain::booking::{
    Booking, BookingError, BookingId, BookingRepository, BookingStatus,
};
use crate::domain::calendar::{Calendar, CalendarError, CalendarRepository};
use crate::domain::listing::{ListingDirectory, ListingId};
use crate::domain::{DataAccessError, Entity, IdGenerator, IdGeneratorTask, UserId};

/// Comment written by the completion sweep.
const COMPLETED_COMMENT: &str = "Automatically completed after check-out date";

/// What a tenant submits to open a booking.
#[derive(Clone, Debug)]
pub struct BookingRequest {
    pub listing_id: ListingId,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub stayers: u32,
}

/// Drives the booking lifecycle over the persistence ports: creation,
/// the owner/tenant transitions and the completion sweep. Every operation
/// either commits or leaves state unchanged. Clones share the underlying
/// stores and the id generator task.
#[derive(Clone)]
pub struct BookingService<B, C, L> {
    bookings: B,
    calendars: C,
    listings: L,
    ids: IdGeneratorTask,
}

impl<B, C, L> BookingService<B, C, L>
where
    B: BookingRepository + Send,
    C: CalendarRepository + Send,
    L: ListingDirectory + Send,
{
    /// Must be called from within a tokio runtime; the id generator runs
    /// as a task on it.
    pub fn new(bookings: B, calendars: C, listings: L) -> Self {
        Self {
            bookings,
            calendars,
            listings,
            ids: IdGeneratorTask::spawn(IdGenerator::default()),
        }
    }

    pub async fn booking(&self, id: BookingId) -> Result<Booking, ServiceError> {
        self.bookings
            .find_by_id(id)
            .await?
            .ok_or(ServiceError::NotFound { what: "booking" })
    }

    /// Opens a pending booking for `tenant` and writes the initial status
    /// history record. The total price is fixed here.
    pub async fn create_booking(
        &mut self,
        tenant: UserId,
        request: BookingRequest,
    ) -> Result<Booking, ServiceError> {
        let listing = self
            .listings
            .find_by_id(request.listing_id)
            .await?
            .filter(|l| l.is_active())
            .ok_or(ServiceError::NotFound { what: "listing" })?;
        let id = self.ids.generate::<BookingId>().await;
        let mut booking = Booking::create(
            id,
            &listing,
            tenant,
            request.stayers,
            request.check_in,
            request.check_out,
            Utc::now().date_naive(),
            Utc::now(),
        )?;
        self.bookings.save(&mut booking).await?;
        info!(booking = %booking.id(), listing = %listing.id(), "booking created");
        Ok(booking)
    }

    /// Owner accepts a pending booking. The overlap check runs against the
    /// listing calendar inside the same conditional append that claims the
    /// dates, so a concurrent confirmation surfaces as a conflict instead
    /// of a double booking.
    pub async fn confirm_booking(
        &mut self,
        id: BookingId,
        actor: UserId,
    ) -> Result<Booking, ServiceError> {
        let mut booking = self.booking(id).await?;
        let listing = self
            .listings
            .find_by_id(booking.listing_id())
            .await?
            .ok_or(ServiceError::NotFound { what: "listing" })?;
        if listing.owner() != actor {
            return Err(ServiceError::Forbidden {
                action: "confirm this booking",
            });
        }
        booking.confirm(actor, Utc::now())?;
        let mut calendar = self
            .calendars
            .find_by_id(listing.id())
            .await?
            .unwrap_or_else(|| Calendar::new(listing.id()));
        calendar.place_hold(booking.id(), booking.span())?;
        self.calendars.save(&mut calendar).await?;
        if let Err(e) = self.bookings.save(&mut booking).await {
            // The dates are claimed but the status write lost; give the
            // hold back before surfacing the error.
            calendar.release_hold(booking.id());
            if let Err(release) = self.calendars.save(&mut calendar).await {
                warn!(booking = %booking.id(), error = %release, "failed to release hold after lost confirmation");
            }
            return Err(e.into());
        }
        info!(booking = %booking.id(), "booking confirmed");
        Ok(booking)
    }

    /// Owner declines a pending booking, recording the reason in the
    /// status history. Rejection is only possible while the booking is
    /// pending; a confirmed stay ends through cancel or the sweep.
    pub async fn reject_booking(
        &mut self,
        id: BookingId,
        actor: UserId,
        reason: String,
    ) -> Result<Booking, ServiceError> {
        let mut booking = self.booking(id).await?;
        let listing = self
            .listings
            .find_by_id(booking.listing_id())
            .await?
            .ok_or(ServiceError::NotFound { what: "listing" })?;
        if listing.owner() != actor {
            return Err(ServiceError::Forbidden {
                action: "reject this booking",
            });
        }
        booking.reject(actor, reason, Utc::now())?;
        self.bookings.save(&mut booking).await?;
        info!(booking = %booking.id(), "booking rejected");
        Ok(booking)
    }

    /// Tenant withdraws a pending or confirmed booking while check-in is
    /// still in the future. A confirmed booking gives its dates back.
    pub async fn cancel_booking(
        &mut self,
        id: BookingId,
        actor: UserId,
    ) -> Result<Booking, ServiceError> {
        let mut booking = self.booking(id).await?;
        if booking.tenant() != actor {
            return Err(ServiceError::Forbidden {
                action: "cancel this booking",
            });
        }
        let was_confirmed = booking.status() == BookingStatus::Confirmed;
        booking.cancel(actor, Utc::now().date_naive(), Utc::now())?;
        // The status write goes first: until it lands the booking is still
        // confirmed and must keep its hold, or a racing confirmation could
        // claim the same dates.
        self.bookings.save(&mut booking).await?;
        if was_confirmed {
            if let Err(e) = self.release_hold(&booking).await {
                warn!(booking = %booking.id(), error = %e, "failed to release hold after cancellation");
            }
        }
        info!(booking = %booking.id(), "booking cancelled");
        Ok(booking)
    }

    /// Completes every confirmed booking whose check-out lies before
    /// `today` and returns how many were moved. Safe to re-run: a second
    /// pass with the same `today` finds nothing left to complete.
    pub async fn sweep_complete_bookings(
        &mut self,
        today: NaiveDate,
    ) -> Result<u64, ServiceError> {
        let due = self.bookings.find_confirmed_ending_before(today).await?;
        let mut count = 0;
        for mut booking in due {
            if let Err(e) = booking.complete(COMPLETED_COMMENT.to_owned(), Utc::now()) {
                warn!(booking = %booking.id(), error = %e, "skipping booking in sweep");
                continue;
            }
            self.bookings.save(&mut booking).await?;
            // An elapsed stay no longer needs its hold; dropping it keeps
            // the calendar bounded by the active bookings.
            if let Err(e) = self.release_hold(&booking).await {
                warn!(booking = %booking.id(), error = %e, "failed to release hold after completion");
            }
            count += 1;
        }
        info!(count, "completed bookings past their check-out date");
        Ok(count)
    }

    /// A failed release leaves a stale hold; it cannot confirm anything by
    /// itself and only blocks its dates until cleanup.
    async fn release_hold(&mut self, booking: &Booking) -> Result<(), ServiceError> {
        if let Some(mut calendar) = self.calendars.find_by_id(booking.listing_id()).await? {
            calendar.release_hold(booking.id());
            self.calendars.save(&mut calendar).await?;
        }
        Ok(())
    }
}

/// Caller-facing failure taxonomy. `Forbidden` deliberately names only the
/// attempted action, never the guarded resource.
#[derive(Error, Display, Debug)]
pub enum ServiceError {
    #[display(fmt = "{}: {}", field, message)]
    Validation {
        field: &'static str,
        message: String,
    },
    #[display(fmt = "{}", message)]
    Conflict {
        message: String,
        conflicting: Option<BookingId>,
    },
    #[display(fmt = "Not allowed to {}", action)]
    Forbidden { action: &'static str },
    #[display(fmt = "{} not found", what)]
    NotFound { what: &'static str },
    #[display(fmt = "Data access error: {}", _0)]
    DataAccess(#[error(source)] DataAccessError),
}

impl From<DataAccessError> for ServiceError {
    fn from(e: DataAccessError) -> Self {
        match e {
            // A lost compare-and-set append means another transaction got
            // there first; callers may retry.
            DataAccessError::Conflict => ServiceError::Conflict {
                message: "Booking was changed concurrently".to_owned(),
                conflicting: None,
            },
            other => ServiceError::DataAccess(other),
        }
    }
}

impl From<BookingError> for ServiceError {
    fn from(e: BookingError) -> Self {
        let field = match e {
            BookingError::CheckOutNotAfterCheckIn | BookingError::StayTooLong => "check_out",
            BookingError::CheckInInPast => "check_in",
            BookingError::NoStayers | BookingError::TooManyStayers { .. } => "stayers",
            BookingError::OwnBooking => "listing_id",
            BookingError::InvalidTransition { .. } | BookingError::CancelationWindowClosed => {
                return ServiceError::Conflict {
                    message: e.to_string(),
                    conflicting: None,
                }
            }
        };
        ServiceError::Validation {
            field,
            message: e.to_string(),
        }
    }
}

impl From<CalendarError> for ServiceError {
    fn from(e: CalendarError) -> Self {
        let conflicting = match e {
            CalendarError::OverlappingHold { conflicting } => Some(conflicting),
            CalendarError::EmptySpan => None,
        };
        ServiceError::Conflict {
            message: e.to_string(),
            conflicting,
        }
    }
}
