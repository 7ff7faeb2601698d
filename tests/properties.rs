use chrono::{Duration, Utc};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

use bleibe::domain::booking::{Booking, BookingId, BookingStatus};
use bleibe::domain::listing::{Listing, ListingId};
use bleibe::domain::money::{Currency, Money};
use bleibe::domain::{Entity, UserId};
use bleibe::infrastructure::memory::{
    InMemoryBookingRepository, InMemoryCalendarRepository, InMemoryListingDirectory,
};
use bleibe::service::{BookingRequest, BookingService};

proptest! {
    /// The total price is always the nightly rate times the number of
    /// nights, whatever the span and rate.
    #[test]
    fn total_price_is_rate_times_nights(
        rate_cents in 1u64..=1_000_000,
        start_offset in 0i64..=60,
        nights in 1i64..=365,
    ) {
        let today = Utc::now().date_naive();
        let listing = Listing::register(
            ListingId::from(10),
            UserId::from(1),
            Money::new(rate_cents, Currency::Eur),
            4,
        )
        .unwrap();
        let check_in = today + Duration::days(start_offset);
        let booking = Booking::create(
            BookingId::from(1),
            &listing,
            UserId::from(2),
            2,
            check_in,
            check_in + Duration::days(nights),
            today,
            Utc::now(),
        )
        .unwrap();
        prop_assert_eq!(
            booking.total_price(),
            Money::new(rate_cents * nights as u64, Currency::Eur)
        );
        prop_assert_eq!(booking.nights_to_stay(), nights as u32);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However the owner tries to confirm a batch of requests, no two
    /// bookings that end up confirmed ever overlap.
    #[test]
    fn confirmed_bookings_never_overlap(
        spans in prop::collection::vec((1i64..=30, 1i64..=5), 1..12),
    ) {
        let rt = tokio::runtime::Runtime::new().map_err(|e| {
            TestCaseError::fail(e.to_string())
        })?;
        rt.block_on(async move {
            let listings = InMemoryListingDirectory::new();
            listings.insert(
                Listing::register(
                    ListingId::from(10),
                    UserId::from(1),
                    Money::new(10_000, Currency::Eur),
                    4,
                )
                .unwrap(),
            );
            let mut service = BookingService::new(
                InMemoryBookingRepository::new(),
                InMemoryCalendarRepository::new(),
                listings,
            );

            let today = Utc::now().date_naive();
            let mut ids = Vec::new();
            for (offset, nights) in spans {
                let booking = service
                    .create_booking(
                        UserId::from(2),
                        BookingRequest {
                            listing_id: ListingId::from(10),
                            check_in: today + Duration::days(offset),
                            check_out: today + Duration::days(offset + nights),
                            stayers: 2,
                        },
                    )
                    .await
                    .unwrap();
                ids.push(booking.id());
                // Losing confirmations conflict; that is the point.
                let _ = service.confirm_booking(booking.id(), UserId::from(1)).await;
            }

            let mut confirmed = Vec::new();
            for id in ids {
                let booking = service.booking(id).await.unwrap();
                if booking.status() == BookingStatus::Confirmed {
                    confirmed.push(booking.span());
                }
            }
            for (i, a) in confirmed.iter().enumerate() {
                for b in confirmed.iter().skip(i + 1) {
                    prop_assert!(
                        a.end <= b.start || b.end <= a.start,
                        "confirmed spans {:?} and {:?} overlap",
                        a,
                        b
                    );
                }
            }
            Ok(())
        })?;
    }
}
