mod cached;
mod dandan;

pub(crate) use cached::CachedCatalog;
pub(crate) use dandan::DandanCatalog;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::HttpError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogSeries {
    pub(crate) id: i64,
    pub(crate) title: String,
    pub(crate) type_tag: String,
    pub(crate) episodes: Vec<CatalogEpisode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogEpisode {
    pub(crate) id: i64,
    pub(crate) title: String,
}

/// A resolved episode together with the series it was picked from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogEpisodeRef {
    pub(crate) episode_id: i64,
    pub(crate) episode_title: String,
    pub(crate) series_id: i64,
    pub(crate) series_title: String,
    pub(crate) series_type: String,
}

/// One comment exactly as the catalog delivers it. `position` is the packed
/// `time,mode,color,author` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RawComment {
    pub(crate) id: i64,
    pub(crate) position: String,
    pub(crate) text: String,
}

#[derive(Debug, Error)]
pub(crate) enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] HttpError),
    #[error("catalog returned a malformed response: {0}")]
    MalformedResponse(String),
}

/// Request/response contract of the comment catalog. "Not found" is an empty
/// list, never an error.
pub(crate) trait CatalogClient {
    fn search_series(&self, keyword: &str) -> Result<Vec<CatalogSeries>, CatalogError>;

    fn fetch_comments(&self, episode_id: i64) -> Result<Vec<RawComment>, CatalogError>;
}

impl<C: CatalogClient + ?Sized> CatalogClient for &C {
    fn search_series(&self, keyword: &str) -> Result<Vec<CatalogSeries>, CatalogError> {
        (**self).search_series(keyword)
    }

    fn fetch_comments(&self, episode_id: i64) -> Result<Vec<RawComment>, CatalogError> {
        (**self).fetch_comments(episode_id)
    }
}
