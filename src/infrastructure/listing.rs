use async_trait::async_trait;
use eventstore::{Client, ResolvedEvent};

use crate::domain::listing::{Listing, ListingDirectory, ListingEvent, ListingId};
use crate::domain::{Aggregation, DataAccessError};
use crate::infrastructure::{stream_name, try_from_resolved_event, EventConvertError};

/// Read-only view over the listing streams written by the listings
/// application; bookings never write here.
#[derive(Clone)]
pub struct EventStoreListingDirectory {
    client: Client,
}

impl EventStoreListingDirectory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ListingDirectory for EventStoreListingDirectory {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Listing>, DataAccessError> {
        match self
            .client
            .read_stream(stream_name::<Listing>(id), &Default::default())
            .await
        {
            Ok(mut stream) => {
                let mut entity = Listing::default();
                let mut revision = None;
                loop {
                    match stream.next().await {
                        Ok(Some(e)) => {
                            revision = Some(e.get_original_event().revision);
                            entity.apply(TryFrom::try_from(&e)?);
                        }
                        Ok(_) => break,
                        Err(eventstore::Error::ResourceDeleted) => return Ok(None),
                        Err(eventstore::Error::ResourceNotFound) => return Ok(None),
                        Err(e) => return Err(e.into()),
                    }
                }
                match revision {
                    None => Ok(None),
                    Some(_) => {
                        entity.set_stored_revision(revision);
                        Ok(Some(entity))
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl TryFrom<&ResolvedEvent> for ListingEvent {
    type Error = EventConvertError;

    fn try_from(value: &ResolvedEvent) -> Result<Self, Self::Error> {
        try_from_resolved_event(value)
    }
}
