//! Episode-number extraction from release filenames.

/// Extracts an episode number from a filename.
///
/// Implementations must be cheap enough to call once per torrent file.
pub trait EpisodeParser: Send + Sync {
    /// Returns the episode number the filename refers to, if any.
    fn extract_episode_number(&self, filename: &str) -> Option<u32>;
}

/// Pattern-based parser for common fansub and scene naming.
///
/// Handles names such as:
/// - `[Group] Show - 01 (1080p) [ABCD1234].mkv`
/// - `Show.S01E02.1080p.WEB.mkv`
/// - `Show 1x03.mkv`
/// - `Show Episode 4.mkv`
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameEpisodeParser;

impl FilenameEpisodeParser {
    pub fn new() -> Self {
        Self
    }

    fn season_episode(&self, name: &str) -> Option<u32> {
        let re = regex_lite::Regex::new(r"(?i)\bs\d{1,2}\s*e(\d{1,4})").ok()?;
        capture_number(&re, name)
    }

    fn cross_notation(&self, name: &str) -> Option<u32> {
        let re = regex_lite::Regex::new(r"\b\d{1,2}x(\d{2,3})\b").ok()?;
        capture_number(&re, name)
    }

    fn episode_keyword(&self, name: &str) -> Option<u32> {
        let re = regex_lite::Regex::new(r"(?i)\b(?:episode|ep)\.?\s*(\d{1,4})\b").ok()?;
        capture_number(&re, name)
    }

    fn bare_e_prefix(&self, name: &str) -> Option<u32> {
        let re = regex_lite::Regex::new(r"(?i)\be(\d{1,4})\b").ok()?;
        capture_number(&re, name)
    }

    fn dash_separated(&self, name: &str) -> Option<u32> {
        let re = regex_lite::Regex::new(r"\s-\s(\d{1,4})(?:v\d)?(?:\s|\[|\(|$)").ok()?;
        capture_number(&re, name)
    }

    /// Last standalone 1-3 digit number once bracketed tags are removed.
    fn trailing_number(&self, name: &str) -> Option<u32> {
        let tags = regex_lite::Regex::new(r"\[[^\]]*\]|\([^)]*\)").ok()?;
        let stripped = tags.replace_all(name, " ");
        let re = regex_lite::Regex::new(r"\b(\d{1,3})(?:v\d)?\b").ok()?;

        re.captures_iter(&stripped)
            .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
            .last()
    }
}

fn capture_number(re: &regex_lite::Regex, text: &str) -> Option<u32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Drop directories and the extension; turn dots and underscores into spaces.
fn clean_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem = match base.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.len() <= 4 && !stem.is_empty() => stem,
        _ => base,
    };
    stem.replace(['.', '_'], " ")
}

impl EpisodeParser for FilenameEpisodeParser {
    fn extract_episode_number(&self, filename: &str) -> Option<u32> {
        let name = clean_filename(filename);

        self.season_episode(&name)
            .or_else(|| self.cross_notation(&name))
            .or_else(|| self.episode_keyword(&name))
            .or_else(|| self.dash_separated(&name))
            .or_else(|| self.bare_e_prefix(&name))
            .or_else(|| self.trailing_number(&name))
    }
}
