//! Acquisition: turning a download request into daemon work.
//!
//! `AcquisitionService` runs download requests on behalf of a session and
//! records where each download lands in the pre-match table.
//! `StatusAggregator` maps active torrents back to catalog entries through
//! that table.

mod events;
mod orchestrator;
mod provider;
mod status;
mod types;

pub use events::{
    BroadcastEventSink, EventEnvelope, EventSink, REFRESHED_ANIME_COLLECTION,
    TORRENT_PREMATCHES_CLEARED,
};
pub use orchestrator::AcquisitionService;
pub use provider::{DirectMagnetProvider, MagnetProvider, ProviderRegistry};
pub use status::StatusAggregator;
pub use types::*;
