use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::comment::{AuthorCategory, CommentMode};

pub(crate) const FILTER_BILIBILI: u8 = 1;
pub(crate) const FILTER_GAMER: u8 = 1 << 1;
pub(crate) const FILTER_NATIVE: u8 = 1 << 2;
pub(crate) const FILTER_OTHER: u8 = 1 << 3;
const AUTHOR_FILTER_MASK: u8 = FILTER_BILIBILI | FILTER_GAMER | FILTER_NATIVE | FILTER_OTHER;

pub(crate) const MODE_FILTER_BOTTOM: u8 = 1;
pub(crate) const MODE_FILTER_TOP: u8 = 1 << 1;
pub(crate) const MODE_FILTER_SCROLL: u8 = 1 << 2;
const MODE_FILTER_MASK: u8 = MODE_FILTER_BOTTOM | MODE_FILTER_TOP | MODE_FILTER_SCROLL;

const MIN_SPEED: f64 = 1.0;
const MIN_FONT_SIZE: u32 = 1;
const MAX_FONT_SIZE: u32 = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct DanmakuSettings {
    pub(crate) opacity: f64,
    /// Horizontal scroll speed in pixels per second.
    pub(crate) speed: f64,
    pub(crate) font_size: u32,
    pub(crate) height_ratio: f64,
    /// Excluded author categories, see the `FILTER_*` bits.
    pub(crate) danmaku_filter: u8,
    /// Excluded display modes, see the `MODE_FILTER_*` bits.
    #[serde(rename = "danmakuModeFilter")]
    pub(crate) mode_filter: u8,
    /// Maximum comments emitted per second bucket; 0 means unlimited.
    pub(crate) density_limit: i64,
    pub(crate) cur_ep_offset: f64,
    pub(crate) font_family: String,
    pub(crate) font_options: String,
}

impl Default for DanmakuSettings {
    fn default() -> Self {
        Self {
            opacity: 0.7,
            speed: 200.0,
            font_size: 25,
            height_ratio: 0.9,
            danmaku_filter: 0,
            mode_filter: 0,
            density_limit: 0,
            cur_ep_offset: 0.0,
            font_family: "sans-serif".to_string(),
            font_options: String::new(),
        }
    }
}

fn clamp_unit(value: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl DanmakuSettings {
    /// Clamps every field into its valid range. Out-of-range values are never
    /// rejected.
    pub(crate) fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.opacity = clamp_unit(self.opacity, defaults.opacity);
        self.height_ratio = clamp_unit(self.height_ratio, defaults.height_ratio);
        self.speed = if self.speed.is_finite() {
            self.speed.max(MIN_SPEED)
        } else {
            defaults.speed
        };
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.danmaku_filter &= AUTHOR_FILTER_MASK;
        self.mode_filter &= MODE_FILTER_MASK;
        self.density_limit = self.density_limit.max(0);
        if !self.cur_ep_offset.is_finite() {
            self.cur_ep_offset = 0.0;
        }
        if self.font_family.trim().is_empty() {
            self.font_family = defaults.font_family;
        }
        self
    }

    pub(crate) fn excludes_author(&self, category: AuthorCategory) -> bool {
        let bit = match category {
            AuthorCategory::Bilibili => FILTER_BILIBILI,
            AuthorCategory::Gamer => FILTER_GAMER,
            AuthorCategory::Native => FILTER_NATIVE,
            AuthorCategory::Other => FILTER_OTHER,
        };
        self.danmaku_filter & bit != 0
    }

    pub(crate) fn excludes_mode(&self, mode: CommentMode) -> bool {
        let bit = match mode {
            CommentMode::Bottom => MODE_FILTER_BOTTOM,
            CommentMode::Top => MODE_FILTER_TOP,
            CommentMode::Scroll => MODE_FILTER_SCROLL,
            CommentMode::Other(_) => return false,
        };
        self.mode_filter & bit != 0
    }

    /// Per-bucket cap, `None` when unlimited.
    pub(crate) fn density_cap(&self) -> Option<usize> {
        match self.density_limit {
            limit if limit <= 0 => None,
            limit => Some(usize::try_from(limit).unwrap_or(usize::MAX)),
        }
    }

    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings at {}", path.display()))?;
        let parsed: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse settings at {}", path.display()))?;
        Ok(parsed.sanitized())
    }
}

/// Settings handle shared between the settings editor and the scheduler.
/// Writers swap in a whole new value; readers take the current `Arc`, so a
/// tick sees one consistent snapshot however often settings change.
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedSettings {
    current: Arc<RwLock<Arc<DanmakuSettings>>>,
}

impl SharedSettings {
    pub(crate) fn new(settings: DanmakuSettings) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(settings.sanitized()))),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<DanmakuSettings> {
        Arc::clone(&self.current.read())
    }

    pub(crate) fn replace(&self, settings: DanmakuSettings) {
        *self.current.write() = Arc::new(settings.sanitized());
    }

    /// Edits a copy of the current settings under the write lock, so
    /// concurrent editors never overwrite each other's changes.
    pub(crate) fn update<F>(&self, edit: F)
    where
        F: FnOnce(&mut DanmakuSettings),
    {
        let mut current = self.current.write();
        let mut next = DanmakuSettings::clone(&current);
        edit(&mut next);
        *current = Arc::new(next.sanitized());
    }
}
