//! Completion sweep: moves confirmed bookings whose check-out date has
//! passed to `completed`. Meant to run once per invocation from an
//! external scheduler (cron or similar); re-running is harmless because a
//! completed booking never matches the scan again.

use std::error::Error;

use chrono::Utc;
use tracing::{error, info, Level};

use bleibe::infrastructure::booking::EventStoreBookingRepository;
use bleibe::infrastructure::calendar::EventStoreCalendarRepository;
use bleibe::infrastructure::listing::EventStoreListingDirectory;
use bleibe::service::BookingService;
use bleibe::BleibeConfig;

#[tokio::main]
async fn main() {
    match BleibeConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = sweep(&config).await {
                error!("application error: {}", error);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("application error: {}", error)
        }
    }
}

async fn sweep(config: &BleibeConfig) -> Result<(), Box<dyn Error>> {
    let settings = config.eventstore.url.parse::<eventstore::ClientSettings>()?;
    let client = eventstore::Client::new(settings)?;
    let mut service = BookingService::new(
        EventStoreBookingRepository::new(client.clone()),
        EventStoreCalendarRepository::new(client.clone()),
        EventStoreListingDirectory::new(client),
    );
    let count = service
        .sweep_complete_bookings(Utc::now().date_naive())
        .await?;
    info!("completed {} bookings", count);
    Ok(())
}
