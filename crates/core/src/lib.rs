pub mod acquisition;
pub mod config;
pub mod metrics;
pub mod platform;
pub mod prematch;
pub mod session;
pub mod testing;
pub mod torrent_client;

pub use acquisition::{
    AcquisitionError, AcquisitionService, BroadcastEventSink, DirectMagnetProvider,
    DownloadOutcome, DownloadRequest, EventSink, MagnetProvider, MediaDownloadStatus,
    ProviderRegistry, ProviderTorrent, StatusAggregator,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use platform::{
    AnilistClient, ClientFactory, ClientPlatform, DefaultPlatform, MediaId, Platform,
    PlatformClient, PlatformError, PlatformResolver, User, Viewer,
};
pub use prematch::{PreMatch, PreMatchError, PreMatchStore, SqlitePreMatchStore};
pub use session::{AuthService, Session, SessionError, SessionRegistry, SessionSweeper};
pub use torrent_client::{
    DownloadClientGateway, FilenameEpisodeParser, QBittorrentClient, TorrentAction,
    TorrentClient, TorrentClientError, TorrentInfo, TorrentState,
};
