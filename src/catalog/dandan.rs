use serde_json::Value;
use tracing::debug;

use super::{CatalogClient, CatalogEpisode, CatalogError, CatalogSeries, RawComment};
use crate::config::Config;
use crate::http::{RequestPolicy, get_text_with_retries};

/// HTTP client for a dandanplay-compatible comment catalog.
#[derive(Debug, Clone)]
pub(crate) struct DandanCatalog {
    base_url: String,
    app_id: Option<String>,
    app_secret: Option<String>,
    ch_convert: u8,
    policy: RequestPolicy,
}

impl DandanCatalog {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            base_url: config.api_base.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            ch_convert: config.ch_convert,
            policy: config.request_policy(),
        }
    }

    fn auth_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(app_id) = &self.app_id {
            headers.push(("X-AppId", app_id.clone()));
        }
        if let Some(secret) = &self.app_secret {
            headers.push(("X-AppSecret", secret.clone()));
        }
        headers
    }
}

impl CatalogClient for DandanCatalog {
    fn search_series(&self, keyword: &str) -> Result<Vec<CatalogSeries>, CatalogError> {
        let url = format!("{}/api/v2/search/episodes", self.base_url);
        let raw = get_text_with_retries(
            &url,
            &self.auth_headers(),
            &[("anime", keyword.to_string())],
            &self.policy,
        )?;
        let series = parse_search_response(&raw)?;
        debug!(keyword, matches = series.len(), "catalog search finished");
        Ok(series)
    }

    fn fetch_comments(&self, episode_id: i64) -> Result<Vec<RawComment>, CatalogError> {
        let url = format!("{}/api/v2/comment/{episode_id}", self.base_url);
        let raw = get_text_with_retries(
            &url,
            &self.auth_headers(),
            &[
                ("withRelated", "true".to_string()),
                ("chConvert", self.ch_convert.to_string()),
            ],
            &self.policy,
        )?;
        let comments = parse_comment_response(&raw)?;
        debug!(episode_id, count = comments.len(), "fetched comments");
        Ok(comments)
    }
}

fn parse_json(raw: &str) -> Result<Value, CatalogError> {
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|err| CatalogError::MalformedResponse(format!("invalid JSON: {err}")))?;
    if parsed.get("success").and_then(Value::as_bool) == Some(false) {
        let message = parsed
            .get("errorMessage")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .unwrap_or("request was not successful");
        return Err(CatalogError::MalformedResponse(message.to_string()));
    }
    Ok(parsed)
}

fn json_id(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn json_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn parse_search_response(raw: &str) -> Result<Vec<CatalogSeries>, CatalogError> {
    let parsed = parse_json(raw)?;
    let animes = parsed
        .get("animes")
        .and_then(Value::as_array)
        .ok_or_else(|| CatalogError::MalformedResponse("missing `animes` array".to_string()))?;

    Ok(animes
        .iter()
        .filter_map(|anime| {
            let id = json_id(anime.get("animeId"))?;
            let episodes = anime
                .get("episodes")
                .and_then(Value::as_array)
                .map(|episodes| {
                    episodes
                        .iter()
                        .filter_map(|episode| {
                            Some(CatalogEpisode {
                                id: json_id(episode.get("episodeId"))?,
                                title: json_text(episode.get("episodeTitle")),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Some(CatalogSeries {
                id,
                title: json_text(anime.get("animeTitle")),
                type_tag: json_text(anime.get("type")),
                episodes,
            })
        })
        .collect())
}

pub(crate) fn parse_comment_response(raw: &str) -> Result<Vec<RawComment>, CatalogError> {
    let parsed = parse_json(raw)?;
    let comments = parsed
        .get("comments")
        .and_then(Value::as_array)
        .ok_or_else(|| CatalogError::MalformedResponse("missing `comments` array".to_string()))?;

    Ok(comments
        .iter()
        .map(|comment| RawComment {
            id: json_id(comment.get("cid")).unwrap_or_default(),
            position: json_text(comment.get("p")),
            text: json_text(comment.get("m")),
        })
        .collect())
}
