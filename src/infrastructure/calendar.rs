use async_trait::async_trait;
use eventstore::{AppendToStreamOptions, Client, EventData, ExpectedRevision, ResolvedEvent};

use crate::domain::calendar::{Calendar, CalendarEvent, CalendarRepository};
use crate::domain::listing::ListingId;
use crate::domain::{Aggregation, DataAccessError, Entity};
use crate::infrastructure::{from_event, stream_name, try_from_resolved_event, EventConvertError};

/// One stream per listing holding the confirmed stay intervals. Appending
/// with the exact expected revision is what makes "re-check the overlaps,
/// then claim the dates" one atomic step: the losing confirmation gets a
/// wrong-expected-version error instead of a double booking.
#[derive(Clone)]
pub struct EventStoreCalendarRepository {
    client: Client,
}

impl EventStoreCalendarRepository {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CalendarRepository for EventStoreCalendarRepository {
    async fn find_by_id(&self, id: ListingId) -> Result<Option<Calendar>, DataAccessError> {
        match self
            .client
            .read_stream(stream_name::<Calendar>(id), &Default::default())
            .await
        {
            Ok(mut stream) => {
                let mut entity = Calendar::new(id);
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

    async fn save(&mut self, entity: &mut Calendar) -> Result<bool, DataAccessError> {
        let stream_name = stream_name::<Calendar>(entity.id());
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
}

impl From<CalendarEvent> for EventData {
    fn from(value: CalendarEvent) -> Self {
        from_event(value)
    }
}

impl TryFrom<&ResolvedEvent> for CalendarEvent {
    type Error = EventConvertError;

    fn try_from(value: &ResolvedEvent) -> Result<Self, Self::Error> {
        try_from_resolved_event(value)
    }
}
