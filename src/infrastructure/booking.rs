use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use eventstore::{
    AppendToStreamOptions, Client, EventData, ExpectedRevision, ReadAllOptions, ResolvedEvent,
};

use crate::domain::booking::{Booking, BookingEvent, BookingId, BookingRepository, BookingStatus};
use crate::domain::{Aggregation, DataAccessError, Entity};
use crate::infrastructure::{from_event, stream_name, try_from_resolved_event, EventConvertError};

/// Bookings as EventStoreDB streams, one stream per booking. The status
/// history is the stream itself, which also gives the append-only and
/// cascade-delete guarantees for free.
#[derive(Clone)]
pub struct EventStoreBookingRepository {
    client: Client,
}

impl EventStoreBookingRepository {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BookingRepository for EventStoreBookingRepository {
    async fn find_by_id(&self, id: BookingId) -> Result<Option<Booking>, DataAccessError> {
        match self
            .client
            .read_stream(stream_name::<Booking>(id), &Default::default())
            .await
        {
            Ok(mut stream) => {
                let mut entity = Booking::default();
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

    async fn find_confirmed_ending_before(
        &self,
        day: NaiveDate,
    ) -> Result<Vec<Booking>, DataAccessError> {
        let prefix = Booking::ENTITY_NAME.to_owned() + "-";
        let mut folded: HashMap<String, Booking> = HashMap::new();
        let mut stream = self.client.read_all(&ReadAllOptions::default()).await?;
        loop {
            match stream.next().await {
                Ok(Some(resolved)) => {
                    let event = resolved.get_original_event();
                    if !event.stream_id.starts_with(&prefix)
                        || event.event_type.starts_with('$')
                    {
                        continue;
                    }
                    let entity = folded.entry(event.stream_id.clone()).or_default();
                    entity.apply(TryFrom::try_from(&resolved)?);
                    entity.set_stored_revision(Some(event.revision));
                }
                Ok(None) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(folded
            .into_values()
            .filter(|b| b.status() == BookingStatus::Confirmed && b.check_out() < day)
            .collect())
    }

    async fn save(&mut self, entity: &mut Booking) -> Result<bool, DataAccessError> {
        let stream_name = stream_name::<Booking>(entity.id());
        // The exact expected revision turns the save into a compare-and-set
        // against what was read, instead of merely "stream exists".
        let expected = match entity.stored_revision() {
            Some(revision) => ExpectedRevision::Exact(revision),
            None => ExpectedRevision::NoStream,
        };
        let events = entity.pop_all();
        if events.is_empty() {
            return Ok(false);
        }
        let result = self
            .client
            .append_to_stream(
                &stream_name,
                &AppendToStreamOptions::default().expected_revision(expected),
                events
                    .into_iter()
                    .map(EventData::from)
                    .collect::<Vec<_>>(),
            )
            .await?;
        entity.set_stored_revision(Some(result.next_expected_version));
        Ok(true)
    }

    async fn delete(&mut self, entity: &mut Booking) -> Result<bool, DataAccessError> {
        let stream_name = stream_name::<Booking>(entity.id());
        // The history lives in the stream, so deleting the stream is the
        // cascade.
        self.client
            .delete_stream(&stream_name, &Default::default())
            .await?;
        entity.set_stored_revision(None);
        Ok(true)
    }
}

impl From<BookingEvent> for EventData {
    fn from(value: BookingEvent) -> Self {
        from_event(value)
    }
}

impl TryFrom<&ResolvedEvent> for BookingEvent {
    type Error = EventConvertError;

    fn try_from(value: &ResolvedEvent) -> Result<Self, Self::Error> {
        try_from_resolved_event(value)
    }
}
