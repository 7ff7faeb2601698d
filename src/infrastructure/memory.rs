//! In-memory repositories for tests and local development. They keep the
//! same optimistic-concurrency contract as the event-store ones: a save
//! whose stored revision no longer matches fails with
//! [`DataAccessError::Conflict`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::booking::{Booking, BookingId, BookingRepository, BookingStatus};
use crate::domain::calendar::{Calendar, CalendarRepository};
use crate::domain::listing::{Listing, ListingDirectory, ListingId};
use crate::domain::{Aggregation, DataAccessError, Entity};

fn poisoned() -> DataAccessError {
    DataAccessError::ClientSideError("memory store lock poisoned".into())
}

/// Snapshot plus the revision of the last applied event.
#[derive(Debug, Clone)]
struct Versioned<T> {
    entity: T,
    revision: u64,
}

fn store<A: Aggregation + Clone>(
    slot: Option<&mut Versioned<A>>,
    entity: &mut A,
) -> Result<bool, DataAccessError> {
    let events = entity.pop_all();
    if events.is_empty() {
        return Ok(false);
    }
    let appended = events.len() as u64;
    match (slot, entity.stored_revision()) {
        (Some(stored), Some(expected)) if stored.revision == expected => {
            stored.revision += appended;
            entity.set_stored_revision(Some(stored.revision));
            stored.entity = entity.clone();
            Ok(true)
        }
        _ => Err(DataAccessError::Conflict),
    }
}

#[derive(Clone, Default)]
pub struct InMemoryBookingRepository {
    bookings: Arc<Mutex<HashMap<BookingId, Versioned<Booking>>>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, DataAccessError> {
        let bookings = self.bookings.lock().map_err(|_| poisoned())?;
        Ok(bookings.get(&id).map(|v| {
            let mut entity = v.entity.clone();
            entity.set_stored_revision(Some(v.revision));
            entity
        }))
    }

    async fn find_confirmed_ending_before(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<Booking>, DataAccessError> {
        let bookings = self.bookings.lock().map_err(|_| poisoned())?;
        Ok(bookings
            .values()
            .filter(|v| {
                v.entity.status() == BookingStatus::Confirmed && v.entity.check_out() < day
            })
            .map(|v| {
                let mut entity = v.entity.clone();
                entity.set_stored_revision(Some(v.revision));
                entity
            })
            .collect())
    }

    async fn save(&mut self, entity: &mut Booking) -> Result<bool, DataAccessError> {
        let mut bookings = self.bookings.lock().map_err(|_| poisoned())?;
        let events = entity.events().len() as u64;
        if events == 0 {
            return Ok(false);
        }
        match (bookings.get_mut(&entity.id()), entity.stored_revision()) {
            (slot @ Some(_), Some(_)) => store(slot, entity),
            (None, None) => {
                entity.clear();
                entity.set_stored_revision(Some(events - 1));
                bookings.insert(
                    entity.id(),
                    Versioned {
                        entity: entity.clone(),
                        revision: events - 1,
                    },
                );
                Ok(true)
            }
            _ => Err(DataAccessError::Conflict),
        }
    }

    async fn delete(&mut self, entity: &mut Booking) -> Result<bool, DataAccessError> {
        let mut bookings = self.bookings.lock().map_err(|_| poisoned())?;
        entity.set_stored_revision(None);
        Ok(bookings.remove(&entity.id()).is_some())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCalendarRepository {
    calendars: Arc<Mutex<HashMap<ListingId, Versioned<Calendar>>>>,
}

impl InMemoryCalendarRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CalendarRepository for InMemoryCalendarRepository {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Calendar>, DataAccessError> {
        let calendars = self.calendars.lock().map_err(|_| poisoned())?;
        Ok(calendars.get(&id).map(|v| {
            let mut entity = v.entity.clone();
            entity.set_stored_revision(Some(v.revision));
            entity
        }))
    }

    async fn save(&mut self, entity: &mut Calendar) -> Result<bool, DataAccessError> {
        let mut calendars = self.calendars.lock().map_err(|_| poisoned())?;
        let events = entity.events().len() as u64;
        if events == 0 {
            return Ok(false);
        }
        match (calendars.get_mut(&entity.id()), entity.stored_revision()) {
            (slot @ Some(_), Some(_)) => store(slot, entity),
            (None, None) => {
                entity.clear();
                entity.set_stored_revision(Some(events - 1));
                calendars.insert(
                    entity.id(),
                    Versioned {
                        entity: entity.clone(),
                        revision: events - 1,
                    },
                );
                Ok(true)
            }
            _ => Err(DataAccessError::Conflict),
        }
    }
}

/// Listing lookup over a fixed in-memory set; tests seed it through
/// [`InMemoryListingDirectory::insert`].
#[derive(Clone, Default)]
pub struct InMemoryListingDirectory {
    listings: Arc<Mutex<HashMap<ListingId, Listing>>>,
}

impl InMemoryListingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, listing: Listing) {
        if let Ok(mut listings) = self.listings.lock() {
            listings.insert(listing.id(), listing);
        }
    }
}

#[async_trait]
impl ListingDirectory for InMemoryListingDirectory {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>, DataAccessError> {
        let listings = self.listings.lock().map_err(|_| poisoned())?;
        Ok(listings.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::domain::money::{Currency, Money};
    use crate::domain::UserId;

    fn listing() -> Listing {
        Listing::register(
            ListingId::from(10),
            UserId::from(1),
            Money::new(10_000, Currency::Eur),
            4,
        )
        .unwrap()
    }

    fn booking(id: u64) -> Booking {
        let today = Utc::now().date_naive();
        Booking::create(
            BookingId::from(id),
            &listing(),
            UserId::from(2),
            2,
            today + Duration::days(10),
            today + Duration::days(12),
            today,
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_then_find_round_trips() {
        let mut repo = InMemoryBookingRepository::new();
        let mut entity = booking(1);
        assert!(repo.save(&mut entity).await.unwrap());
        let found = repo.find_by_id(entity.id()).await.unwrap().unwrap();
        assert_eq!(found, entity);
        assert_eq!(found.stored_revision(), Some(0));
    }

    #[tokio::test]
    async fn test_stale_save_conflicts() {
        let mut repo = InMemoryBookingRepository::new();
        let mut entity = booking(1);
        repo.save(&mut entity).await.unwrap();

        let mut first = repo.find_by_id(entity.id()).await.unwrap().unwrap();
        let mut second = repo.find_by_id(entity.id()).await.unwrap().unwrap();
        first.confirm(UserId::from(1), Utc::now()).unwrap();
        second.confirm(UserId::from(1), Utc::now()).unwrap();
        assert!(repo.save(&mut first).await.is_ok());
        assert!(matches!(
            repo.save(&mut second).await,
            Err(DataAccessError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_booking_and_history() {
        let mut repo = InMemoryBookingRepository::new();
        let mut entity = booking(1);
        repo.save(&mut entity).await.unwrap();
        assert!(repo.delete(&mut entity).await.unwrap());
        assert!(repo.find_by_id(entity.id()).await.unwrap().is_none());
    }
}
