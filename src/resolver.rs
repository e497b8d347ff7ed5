use tracing::{debug, info};

use crate::catalog::{CatalogClient, CatalogEpisodeRef, CatalogError, CatalogSeries};

/// What the local library knows about the item being played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MediaItem {
    pub(crate) series_name: String,
    pub(crate) original_title: Option<String>,
    /// 1-based.
    pub(crate) season_index: u32,
    /// 1-based; `None` when the library does not know the episode number.
    pub(crate) episode_index: Option<u32>,
}

impl MediaItem {
    pub(crate) fn new(series_name: impl Into<String>) -> Self {
        Self {
            series_name: series_name.into(),
            original_title: None,
            season_index: 1,
            episode_index: None,
        }
    }

    pub(crate) fn with_original_title(mut self, title: impl Into<String>) -> Self {
        self.original_title = Some(title.into());
        self
    }

    pub(crate) fn with_season(mut self, season_index: u32) -> Self {
        self.season_index = season_index;
        self
    }

    pub(crate) fn with_episode(mut self, episode_index: u32) -> Self {
        self.episode_index = Some(episode_index);
        self
    }
}

fn fallback_title(item: &MediaItem) -> Option<&str> {
    let title = item.original_title.as_deref()?.trim();
    if title.is_empty() || title == item.series_name.trim() {
        None
    } else {
        Some(title)
    }
}

fn search_with_fallback<C: CatalogClient + ?Sized>(
    catalog: &C,
    item: &MediaItem,
) -> Result<Vec<CatalogSeries>, CatalogError> {
    let primary = item.series_name.trim();
    if !primary.is_empty() {
        let series = catalog.search_series(primary)?;
        if !series.is_empty() {
            return Ok(series);
        }
    }
    match fallback_title(item) {
        Some(title) => {
            debug!(series = primary, fallback = title, "retrying search with original title");
            catalog.search_series(title)
        }
        None => Ok(Vec::new()),
    }
}

fn position(index: u32) -> Option<usize> {
    usize::try_from(index).ok()?.checked_sub(1)
}

/// Picks one catalog episode for `item`. Season `n` is the `n`-th search
/// result and episode `m` the `m`-th episode of that result; there is no
/// fuzzy matching. A miss is `Ok(None)`; only catalog transport failures
/// are errors.
pub(crate) fn resolve<C: CatalogClient + ?Sized>(
    catalog: &C,
    item: &MediaItem,
) -> Result<Option<CatalogEpisodeRef>, CatalogError> {
    let candidates = search_with_fallback(catalog, item)?;
    if candidates.is_empty() {
        info!(series = %item.series_name, "no catalog match");
        return Ok(None);
    }

    let Some(series) = position(item.season_index).and_then(|idx| candidates.get(idx)) else {
        info!(
            season = item.season_index,
            candidates = candidates.len(),
            "season index outside catalog results"
        );
        return Ok(None);
    };

    let Some(episode_index) = item.episode_index else {
        info!(series = %series.title, "episode index unknown");
        return Ok(None);
    };
    let Some(episode) = position(episode_index).and_then(|idx| series.episodes.get(idx)) else {
        info!(
            series = %series.title,
            episode = episode_index,
            available = series.episodes.len(),
            "episode index outside series"
        );
        return Ok(None);
    };

    Ok(Some(CatalogEpisodeRef {
        episode_id: episode.id,
        episode_title: episode.title.clone(),
        series_id: series.id,
        series_title: series.title.clone(),
        series_type: series.type_tag.clone(),
    }))
}
