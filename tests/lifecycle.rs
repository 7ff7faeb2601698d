//! End-to-end booking lifecycle scenarios through `BookingService` over
//! the in-memory repositories.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};

use bleibe::domain::booking::{Booking, BookingId, BookingRepository, BookingStatus};
use bleibe::domain::calendar::CalendarRepository;
use bleibe::domain::DataAccessError;
use bleibe::domain::listing::{Listing, ListingId};
use bleibe::domain::money::{Currency, Money};
use bleibe::domain::{Entity, UserId};
use bleibe::infrastructure::memory::{
    InMemoryBookingRepository, InMemoryCalendarRepository, InMemoryListingDirectory,
};
use bleibe::service::{BookingRequest, BookingService, ServiceError};

type Service =
    BookingService<InMemoryBookingRepository, InMemoryCalendarRepository, InMemoryListingDirectory>;

const OWNER: u64 = 1;
const TENANT_A: u64 = 2;
const TENANT_B: u64 = 3;
const LISTING: u64 = 10;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Listing priced at 100 EUR per night, four stayers max.
fn service() -> Service {
    let listings = InMemoryListingDirectory::new();
    listings.insert(
        Listing::register(
            ListingId::from(LISTING),
            UserId::from(OWNER),
            Money::new(10_000, Currency::Eur),
            4,
        )
        .unwrap(),
    );
    BookingService::new(
        InMemoryBookingRepository::new(),
        InMemoryCalendarRepository::new(),
        listings,
    )
}

fn request(check_in_offset: i64, check_out_offset: i64) -> BookingRequest {
    BookingRequest {
        listing_id: ListingId::from(LISTING),
        check_in: today() + Duration::days(check_in_offset),
        check_out: today() + Duration::days(check_out_offset),
        stayers: 2,
    }
}

#[tokio::test]
async fn create_booking_fixes_price_and_starts_pending() {
    let mut service = service();
    let booking = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    assert_eq!(booking.total_price(), Money::new(20_000, Currency::Eur));
    assert_eq!(booking.status(), BookingStatus::Pending);
    assert_eq!(booking.nights_to_stay(), 2);
    assert!(booking.cancelation(today()));

    let stored = service.booking(booking.id()).await.unwrap();
    assert_eq!(stored.history().len(), 1);
    assert_eq!(stored.history()[0].status, BookingStatus::Pending);
}

#[tokio::test]
async fn owner_cannot_book_own_listing() {
    let mut service = service();
    let result = service
        .create_booking(UserId::from(OWNER), request(10, 12))
        .await;
    assert!(matches!(
        result,
        Err(ServiceError::Validation {
            field: "listing_id",
            ..
        })
    ));
}

#[tokio::test]
async fn inactive_listing_is_not_found() {
    let listings = InMemoryListingDirectory::new();
    let mut listing = Listing::register(
        ListingId::from(LISTING),
        UserId::from(OWNER),
        Money::new(10_000, Currency::Eur),
        4,
    )
    .unwrap();
    listing.deactivate();
    listings.insert(listing);
    let mut service = BookingService::new(
        InMemoryBookingRepository::new(),
        InMemoryCalendarRepository::new(),
        listings,
    );
    let result = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await;
    assert!(matches!(
        result,
        Err(ServiceError::NotFound { what: "listing" })
    ));
}

#[tokio::test]
async fn only_the_owner_confirms() {
    let mut service = service();
    let booking = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();

    let result = service.confirm_booking(booking.id(), UserId::from(TENANT_B)).await;
    assert!(matches!(result, Err(ServiceError::Forbidden { .. })));

    let confirmed = service
        .confirm_booking(booking.id(), UserId::from(OWNER))
        .await
        .unwrap();
    assert_eq!(confirmed.status(), BookingStatus::Confirmed);
    assert_eq!(confirmed.history().len(), 2);
}

#[tokio::test]
async fn overlapping_confirmation_conflicts_and_leaves_pending() {
    let mut service = service();
    let first = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    let second = service
        .create_booking(UserId::from(TENANT_B), request(11, 13))
        .await
        .unwrap();

    service
        .confirm_booking(first.id(), UserId::from(OWNER))
        .await
        .unwrap();
    let result = service.confirm_booking(second.id(), UserId::from(OWNER)).await;
    match result {
        Err(ServiceError::Conflict { conflicting, .. }) => {
            assert_eq!(conflicting, Some(first.id()));
        }
        other => panic!("expected conflict, got {:?}", other.map(|b| b.status())),
    }
    // The loser stays pending; only its confirmation was refused.
    let second = service.booking(second.id()).await.unwrap();
    assert_eq!(second.status(), BookingStatus::Pending);
}

#[tokio::test]
async fn back_to_back_stays_both_confirm() {
    let mut service = service();
    let first = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    let second = service
        .create_booking(UserId::from(TENANT_B), request(12, 14))
        .await
        .unwrap();
    service
        .confirm_booking(first.id(), UserId::from(OWNER))
        .await
        .unwrap();
    let second = service
        .confirm_booking(second.id(), UserId::from(OWNER))
        .await
        .unwrap();
    assert_eq!(second.status(), BookingStatus::Confirmed);
}

#[tokio::test]
async fn cancelled_booking_cannot_be_confirmed() {
    let mut service = service();
    let booking = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    let cancelled = service
        .cancel_booking(booking.id(), UserId::from(TENANT_A))
        .await
        .unwrap();
    assert_eq!(cancelled.status(), BookingStatus::Cancelled);

    let result = service.confirm_booking(booking.id(), UserId::from(OWNER)).await;
    assert!(matches!(result, Err(ServiceError::Conflict { .. })));
}

#[tokio::test]
async fn only_the_tenant_cancels() {
    let mut service = service();
    let booking = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    let result = service.cancel_booking(booking.id(), UserId::from(OWNER)).await;
    assert!(matches!(result, Err(ServiceError::Forbidden { .. })));
}

#[tokio::test]
async fn cancel_needs_future_check_in() {
    let mut service = service();
    // Check-in today: creation is fine, cancellation is too late.
    let booking = service
        .create_booking(UserId::from(TENANT_A), request(0, 2))
        .await
        .unwrap();
    assert!(!booking.cancelation(today()));
    let result = service.cancel_booking(booking.id(), UserId::from(TENANT_A)).await;
    assert!(matches!(result, Err(ServiceError::Conflict { .. })));
}

#[tokio::test]
async fn cancelling_confirmed_booking_frees_the_dates() {
    let mut service = service();
    let first = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    service
        .confirm_booking(first.id(), UserId::from(OWNER))
        .await
        .unwrap();
    service
        .cancel_booking(first.id(), UserId::from(TENANT_A))
        .await
        .unwrap();

    let second = service
        .create_booking(UserId::from(TENANT_B), request(11, 13))
        .await
        .unwrap();
    let second = service
        .confirm_booking(second.id(), UserId::from(OWNER))
        .await
        .unwrap();
    assert_eq!(second.status(), BookingStatus::Confirmed);
}

#[tokio::test]
async fn rejection_records_reason_and_is_terminal() {
    let mut service = service();
    let booking = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    let rejected = service
        .reject_booking(booking.id(), UserId::from(OWNER), "renovating".to_owned())
        .await
        .unwrap();
    assert_eq!(rejected.status(), BookingStatus::Rejected);
    assert_eq!(rejected.history().last().unwrap().comment, "renovating");

    let result = service.cancel_booking(booking.id(), UserId::from(TENANT_A)).await;
    assert!(matches!(result, Err(ServiceError::Conflict { .. })));
}

#[tokio::test]
async fn confirmed_booking_cannot_be_rejected() {
    let mut service = service();
    let booking = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    service
        .confirm_booking(booking.id(), UserId::from(OWNER))
        .await
        .unwrap();
    let result = service
        .reject_booking(booking.id(), UserId::from(OWNER), String::new())
        .await;
    assert!(matches!(result, Err(ServiceError::Conflict { .. })));
}

/// Delegates to the in-memory store but fails the next `save` when armed,
/// standing in for a transport error at the worst moment.
#[derive(Clone)]
struct FlakyBookingRepository {
    inner: InMemoryBookingRepository,
    fail_next_save: Arc<AtomicBool>,
}

impl FlakyBookingRepository {
    fn new() -> Self {
        Self {
            inner: InMemoryBookingRepository::new(),
            fail_next_save: Arc::new(AtomicBool::new(false)),
        }
    }

    fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BookingRepository for FlakyBookingRepository {
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, DataAccessError> {
        self.inner.find_by_id(id).await
    }

    async fn find_confirmed_ending_before(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<Booking>, DataAccessError> {
        self.inner.find_confirmed_ending_before(day).await
    }

    async fn save(&mut self, entity: &mut Booking) -> Result<bool, DataAccessError> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(DataAccessError::WriteError("injected write failure".into()));
        }
        self.inner.save(entity).await
    }

    async fn delete(&mut self, entity: &mut Booking) -> Result<bool, DataAccessError> {
        self.inner.delete(entity).await
    }
}

#[tokio::test]
async fn failed_cancel_write_keeps_the_hold() {
    let bookings = FlakyBookingRepository::new();
    let listings = InMemoryListingDirectory::new();
    listings.insert(
        Listing::register(
            ListingId::from(LISTING),
            UserId::from(OWNER),
            Money::new(10_000, Currency::Eur),
            4,
        )
        .unwrap(),
    );
    let mut service = BookingService::new(
        bookings.clone(),
        InMemoryCalendarRepository::new(),
        listings,
    );

    let first = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    service
        .confirm_booking(first.id(), UserId::from(OWNER))
        .await
        .unwrap();

    bookings.fail_next_save();
    let result = service.cancel_booking(first.id(), UserId::from(TENANT_A)).await;
    assert!(matches!(result, Err(ServiceError::DataAccess(_))));

    // The status write never landed, so the booking is still confirmed and
    // its dates must still be claimed.
    let first = service.booking(first.id()).await.unwrap();
    assert_eq!(first.status(), BookingStatus::Confirmed);
    let second = service
        .create_booking(UserId::from(TENANT_B), request(11, 13))
        .await
        .unwrap();
    let result = service.confirm_booking(second.id(), UserId::from(OWNER)).await;
    assert!(matches!(result, Err(ServiceError::Conflict { .. })));

    // Once the write goes through the dates free up.
    service
        .cancel_booking(first.id(), UserId::from(TENANT_A))
        .await
        .unwrap();
    let second = service
        .confirm_booking(second.id(), UserId::from(OWNER))
        .await
        .unwrap();
    assert_eq!(second.status(), BookingStatus::Confirmed);
}

#[tokio::test]
async fn sweep_releases_completed_holds() {
    let listings = InMemoryListingDirectory::new();
    listings.insert(
        Listing::register(
            ListingId::from(LISTING),
            UserId::from(OWNER),
            Money::new(10_000, Currency::Eur),
            4,
        )
        .unwrap(),
    );
    let calendars = InMemoryCalendarRepository::new();
    let mut service = BookingService::new(
        InMemoryBookingRepository::new(),
        calendars.clone(),
        listings,
    );

    let booking = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    service
        .confirm_booking(booking.id(), UserId::from(OWNER))
        .await
        .unwrap();

    let later = today() + Duration::days(15);
    assert_eq!(service.sweep_complete_bookings(later).await.unwrap(), 1);

    // The elapsed stay's hold is gone; the calendar tracks active
    // bookings only.
    let calendar = calendars
        .find_by_id(ListingId::from(LISTING))
        .await
        .unwrap()
        .unwrap();
    assert!(calendar.holds().is_empty());
}

#[tokio::test]
async fn service_clones_share_the_stores() {
    let service = service();
    let mut creator = service.clone();
    let mut confirmer = service.clone();

    let booking = creator
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    let confirmed = confirmer
        .confirm_booking(booking.id(), UserId::from(OWNER))
        .await
        .unwrap();
    assert_eq!(confirmed.status(), BookingStatus::Confirmed);

    let seen = service.booking(booking.id()).await.unwrap();
    assert_eq!(seen.status(), BookingStatus::Confirmed);
}

#[tokio::test]
async fn sweep_completes_elapsed_stays_once() {
    let mut service = service();
    let booking = service
        .create_booking(UserId::from(TENANT_A), request(10, 12))
        .await
        .unwrap();
    service
        .confirm_booking(booking.id(), UserId::from(OWNER))
        .await
        .unwrap();
    let pending_only = service
        .create_booking(UserId::from(TENANT_B), request(20, 22))
        .await
        .unwrap();

    // Nothing has elapsed yet.
    assert_eq!(service.sweep_complete_bookings(today()).await.unwrap(), 0);

    let later = today() + Duration::days(15);
    assert_eq!(service.sweep_complete_bookings(later).await.unwrap(), 1);

    let completed = service.booking(booking.id()).await.unwrap();
    assert_eq!(completed.status(), BookingStatus::Completed);
    let last = completed.history().last().unwrap();
    assert_eq!(last.comment, "Automatically completed after check-out date");
    assert_eq!(last.changed_by, None);

    // Pending bookings are never completed by the sweep.
    let untouched = service.booking(pending_only.id()).await.unwrap();
    assert_eq!(untouched.status(), BookingStatus::Pending);

    // Re-running with the same date finds nothing left.
    assert_eq!(service.sweep_complete_bookings(later).await.unwrap(), 0);
}
