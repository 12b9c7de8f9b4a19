use super::{types::Config, ConfigError};

/// Upper bound for day-count settings (a century).
pub const MAX_DAYS: u32 = 36_500;

/// Validate configuration
/// Currently validates:
/// - Session retention and sweep interval are not 0
/// - Day-count settings stay within [`MAX_DAYS`]
/// - Download daemon URL is set
/// - Metadata poll interval is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.session.retention_days == 0 {
        return Err(ConfigError::ValidationError(
            "session.retention_days cannot be 0".to_string(),
        ));
    }
    if config.session.retention_days > MAX_DAYS {
        return Err(ConfigError::ValidationError(format!(
            "session.retention_days cannot exceed {}",
            MAX_DAYS
        )));
    }
    if let Some(days) = config.prematch.max_age_days {
        if days > MAX_DAYS {
            return Err(ConfigError::ValidationError(format!(
                "prematch.max_age_days cannot exceed {}",
                MAX_DAYS
            )));
        }
    }
    if config.session.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "session.sweep_interval_secs cannot be 0".to_string(),
        ));
    }

    if config.torrent_client.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "torrent_client.url cannot be empty".to_string(),
        ));
    }
    if config.torrent_client.metadata_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "torrent_client.metadata_poll_interval_ms cannot be 0".to_string(),
        ));
    }

    Ok(())
}
