use async_trait::async_trait;
use derive_more::{Deref, Display, Error, From};
use serde::{Deserialize, Serialize};

use crate::domain::{Aggregation, DataAccessError, Entity, Event, EventQueue, Id, UserId};

use super::money::Money;

/// Listing lookup port. The listings application owns the full records
/// (address, amenities, photos); bookings only need this summary.
#[async_trait]
pub trait ListingDirectory {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>, DataAccessError>;
}

#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct ListingId(u64);

impl Id for ListingId {
    type Inner = u64;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingEvent {
    ListingRegistered {
        id: ListingId,
        owner: UserId,
        price_per_night: Money,
        max_stayers: u32,
    },
    ListingActivated {
        id: ListingId,
    },
    ListingDeactivated {
        id: ListingId,
    },
    NightlyPriceChanged {
        id: ListingId,
        price_per_night: Money,
    },
}

impl Event for ListingEvent {
    type Id = ListingId;
}

/// Booking-facing summary of a rental listing.
#[derive(Debug, Default, Clone)]
pub struct Listing {
    id: ListingId,
    owner: UserId,
    price_per_night: Money,
    max_stayers: u32,
    is_active: bool,
    events: EventQueue<ListingEvent>,
    stored_revision: Option<u64>,
}

impl Listing {
    pub fn register(
        id: ListingId,
        owner: UserId,
        price_per_night: Money,
        max_stayers: u32,
    ) -> Result<Self, ListingError> {
        if price_per_night.is_zero() {
            return Err(ListingError::PriceNotPositive);
        }
        if max_stayers == 0 {
            return Err(ListingError::NoCapacity);
        }
        let mut entity = Listing {
            id,
            owner,
            price_per_night,
            max_stayers,
            is_active: true,
            ..Listing::default()
        };
        entity.events.push(ListingEvent::ListingRegistered {
            id,
            owner,
            price_per_night,
            max_stayers,
        });
        Ok(entity)
    }

    pub fn activate(&mut self) {
        if !self.is_active {
            self.is_active = true;
            self.events
                .push(ListingEvent::ListingActivated { id: self.id });
        }
    }

    pub fn deactivate(&mut self) {
        if self.is_active {
            self.is_active = false;
            self.events
                .push(ListingEvent::ListingDeactivated { id: self.id });
        }
    }

    pub fn change_nightly_price(&mut self, price_per_night: Money) -> Result<(), ListingError> {
        if price_per_night.is_zero() {
            return Err(ListingError::PriceNotPositive);
        }
        self.price_per_night = price_per_night;
        self.events.push(ListingEvent::NightlyPriceChanged {
            id: self.id,
            price_per_night,
        });
        Ok(())
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn price_per_night(&self) -> Money {
        self.price_per_night
    }

    pub fn max_stayers(&self) -> u32 {
        self.max_stayers
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }
}

impl Entity for Listing {
    type Id = ListingId;

    const ENTITY_NAME: &'static str = "listing";

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Aggregation for Listing {
    type Event = ListingEvent;
    type Error = ListingError;

    fn apply(&mut self, event: Self::Event) {
        match event {
            ListingEvent::ListingRegistered {
                id,
                owner,
                price_per_night,
                max_stayers,
            } => {
                self.id = id;
                self.owner = owner;
                self.price_per_night = price_per_night;
                self.max_stayers = max_stayers;
                self.is_active = true;
            }
            ListingEvent::ListingActivated { .. } => self.is_active = true,
            ListingEvent::ListingDeactivated { .. } => self.is_active = false,
            ListingEvent::NightlyPriceChanged {
                price_per_night, ..
            } => self.price_per_night = price_per_night,
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

impl PartialEq for Listing {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.owner == other.owner
            && self.price_per_night == other.price_per_night
            && self.max_stayers == other.max_stayers
            && self.is_active == other.is_active
    }
}

impl Eq for Listing {}

#[derive(Error, Display, Debug)]
pub enum ListingError {
    #[display(fmt = "Nightly price must be positive")]
    PriceNotPositive,
    #[display(fmt = "Listing must accommodate at least one stayer")]
    NoCapacity,
}
