//! Download daemon abstraction.
//!
//! The `TorrentClient` trait is the narrow command interface to an external
//! daemon (qBittorrent). `DownloadClientGateway` layers the restart, peek,
//! batch and smart-select policies on top of it.

mod episode;
mod gateway;
mod qbittorrent;
mod smart_select;
mod types;

pub use episode::{EpisodeParser, FilenameEpisodeParser};
pub use gateway::{
    DeselectRequest, DownloadClientGateway, SmartSelectRequest, TorrentAction,
    DEFAULT_METADATA_WAIT, DEFAULT_POLL_INTERVAL,
};
pub use qbittorrent::QBittorrentClient;
pub use smart_select::{plan_deselection, plan_smart_selection, SelectionPlan};
pub use types::*;
