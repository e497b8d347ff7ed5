use std::time::Duration;

use tracing::{debug, warn};

use super::{CatalogClient, CatalogError, CatalogSeries, RawComment};
use crate::db::CommentCache;

/// Serves comment fetches from the local cache when fresh enough. Cache
/// failures only cost a network round trip.
pub(crate) struct CachedCatalog<C> {
    inner: C,
    cache: Option<CommentCache>,
    max_age: Duration,
}

impl<C: CatalogClient> CachedCatalog<C> {
    pub(crate) fn new(inner: C, cache: Option<CommentCache>, max_age: Duration) -> Self {
        Self {
            inner,
            cache,
            max_age,
        }
    }

    fn cached_comments(&self, episode_id: i64) -> Option<Vec<RawComment>> {
        let cache = self.cache.as_ref()?;
        match cache.load_fresh(episode_id, self.max_age) {
            Ok(Some(comments)) => {
                debug!(episode_id, count = comments.len(), "comment cache hit");
                Some(comments)
            }
            Ok(None) => {
                debug!(episode_id, "comment cache miss");
                None
            }
            Err(err) => {
                warn!(episode_id, error = %err, "comment cache unreadable, refetching");
                None
            }
        }
    }
}

impl<C: CatalogClient> CatalogClient for CachedCatalog<C> {
    fn search_series(&self, keyword: &str) -> Result<Vec<CatalogSeries>, CatalogError> {
        self.inner.search_series(keyword)
    }

    fn fetch_comments(&self, episode_id: i64) -> Result<Vec<RawComment>, CatalogError> {
        if let Some(comments) = self.cached_comments(episode_id) {
            return Ok(comments);
        }

        let comments = self.inner.fetch_comments(episode_id)?;
        if let Some(cache) = &self.cache
            && let Err(err) = cache.store(episode_id, &comments)
        {
            warn!(episode_id, error = %err, "failed to cache comments");
        }
        Ok(comments)
    }
}
