//! File-selection policies for partial torrent downloads.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::{EpisodeParser, TorrentFile};

/// Which files of a torrent to download and which to skip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionPlan {
    /// File indices to download, ascending.
    pub selected: Vec<usize>,
    /// File indices to skip, ascending.
    pub deselected: Vec<usize>,
    /// Requested episodes no file matched.
    pub missing_episodes: Vec<u32>,
}

impl SelectionPlan {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Pick one file per requested episode.
///
/// When several files parse to the same episode (an episode and its preview,
/// say) the larger one wins; on equal size the lower index wins. Episodes with
/// no matching file are reported in `missing_episodes` and otherwise ignored.
pub fn plan_smart_selection(
    files: &[TorrentFile],
    episodes: &[u32],
    parser: &dyn EpisodeParser,
) -> SelectionPlan {
    let wanted: BTreeSet<u32> = episodes.iter().copied().collect();
    let mut best: BTreeMap<u32, &TorrentFile> = BTreeMap::new();

    for file in files {
        let Some(episode) = parser.extract_episode_number(file.file_name()) else {
            continue;
        };
        if !wanted.contains(&episode) {
            continue;
        }

        best.entry(episode)
            .and_modify(|current| {
                if file.size_bytes > current.size_bytes {
                    *current = file;
                }
            })
            .or_insert(file);
    }

    let selected: BTreeSet<usize> = best.values().map(|f| f.index).collect();
    let deselected = files
        .iter()
        .map(|f| f.index)
        .filter(|i| !selected.contains(i))
        .collect::<BTreeSet<_>>();
    let missing_episodes = wanted
        .iter()
        .filter(|e| !best.contains_key(e))
        .copied()
        .collect();

    SelectionPlan {
        selected: selected.into_iter().collect(),
        deselected: deselected.into_iter().collect(),
        missing_episodes,
    }
}

/// Download everything except the listed indices.
///
/// Indices that do not exist in the torrent are ignored.
pub fn plan_deselection(files: &[TorrentFile], excluded: &[usize]) -> SelectionPlan {
    let excluded: BTreeSet<usize> = excluded.iter().copied().collect();
    let (deselected, selected): (BTreeSet<usize>, BTreeSet<usize>) = files
        .iter()
        .map(|f| f.index)
        .partition(|i| excluded.contains(i));

    SelectionPlan {
        selected: selected.into_iter().collect(),
        deselected: deselected.into_iter().collect(),
        missing_episodes: Vec::new(),
    }
}
