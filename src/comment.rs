use std::collections::HashMap;

use tracing::debug;

use crate::catalog::RawComment;

const DEFAULT_MODE_CODE: i64 = 1;
const DEFAULT_COLOR: u32 = 0xFF_FF_FF;

/// Display mode of a comment, as encoded by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum CommentMode {
    Scroll,
    Bottom,
    Top,
    Other(i64),
}

impl CommentMode {
    pub(crate) fn from_code(code: i64) -> Self {
        match code {
            1..=3 => Self::Scroll,
            4 => Self::Bottom,
            5 => Self::Top,
            other => Self::Other(other),
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Scroll => "scroll",
            Self::Bottom => "bottom",
            Self::Top => "top",
            Self::Other(_) => "other",
        }
    }
}

/// Where a comment was originally posted, derived from the `[Source]` prefix
/// of its author tag. Untagged authors are native to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum AuthorCategory {
    Bilibili,
    Gamer,
    Native,
    Other,
}

impl AuthorCategory {
    pub(crate) fn from_tag(tag: &str) -> Self {
        let Some(rest) = tag.trim().strip_prefix('[') else {
            return Self::Native;
        };
        let Some((source, _)) = rest.split_once(']') else {
            return Self::Native;
        };
        match source.trim().to_ascii_lowercase().as_str() {
            "bilibili" => Self::Bilibili,
            "gamer" => Self::Gamer,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Comment {
    pub(crate) id: i64,
    pub(crate) time_offset_secs: f64,
    pub(crate) mode_code: i64,
    pub(crate) color_hex: String,
    pub(crate) author_tag: String,
    pub(crate) text: String,
}

impl Comment {
    pub(crate) fn mode(&self) -> CommentMode {
        CommentMode::from_code(self.mode_code)
    }

    pub(crate) fn author_category(&self) -> AuthorCategory {
        AuthorCategory::from_tag(&self.author_tag)
    }

    pub(crate) fn bucket(&self) -> u64 {
        bucket_of(self.time_offset_secs)
    }
}

/// Second bucket a non-negative time belongs to. Always floors: 12.999 is
/// bucket 12.
pub(crate) fn bucket_of(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        secs.floor() as u64
    } else {
        0
    }
}

fn parse_time(field: &str) -> f64 {
    match field.trim().parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => secs,
        _ => 0.0,
    }
}

fn parse_color(field: Option<&str>) -> String {
    let color = field
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .filter(|value| *value <= DEFAULT_COLOR)
        .unwrap_or(DEFAULT_COLOR);
    format!("{color:06x}")
}

/// Decodes one catalog comment. Returns `None` when the time field is missing
/// or the text is empty; every other malformed field falls back to its
/// default.
pub(crate) fn decode_comment(raw: &RawComment) -> Option<Comment> {
    if raw.text.is_empty() {
        return None;
    }

    let mut fields = raw.position.split(',');
    let time_field = fields.next().map(str::trim).filter(|field| !field.is_empty())?;
    let mode_code = fields
        .next()
        .and_then(|field| field.trim().parse::<i64>().ok())
        .unwrap_or(DEFAULT_MODE_CODE);
    let color_hex = parse_color(fields.next());
    let author_tag = fields.next().map(|field| field.trim().to_string()).unwrap_or_default();

    Some(Comment {
        id: raw.id,
        time_offset_secs: parse_time(time_field),
        mode_code,
        color_hex,
        author_tag,
        text: raw.text.clone(),
    })
}

/// Comments grouped by whole second. Bucket contents keep catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CommentIndex {
    buckets: HashMap<u64, Vec<Comment>>,
    len: usize,
    dropped: usize,
}

impl CommentIndex {
    pub(crate) fn decode(raw_comments: &[RawComment]) -> Self {
        let mut index = Self::default();
        for raw in raw_comments {
            match decode_comment(raw) {
                Some(comment) => index.push(comment),
                None => index.dropped += 1,
            }
        }
        if index.dropped > 0 {
            debug!(
                dropped = index.dropped,
                kept = index.len,
                "dropped undecodable comments"
            );
        }
        index
    }

    fn push(&mut self, comment: Comment) {
        self.buckets.entry(comment.bucket()).or_default().push(comment);
        self.len += 1;
    }

    pub(crate) fn bucket(&self, second: u64) -> &[Comment] {
        self.buckets.get(&second).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn dropped(&self) -> usize {
        self.dropped
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket key and size of the most crowded second, lowest key on ties.
    pub(crate) fn busiest_bucket(&self) -> Option<(u64, usize)> {
        self.buckets
            .iter()
            .map(|(second, comments)| (*second, comments.len()))
            .max_by(|left, right| left.1.cmp(&right.1).then(right.0.cmp(&left.0)))
    }

    pub(crate) fn last_second(&self) -> Option<u64> {
        self.buckets.keys().max().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: i64, position: &str, text: &str) -> RawComment {
        RawComment {
            id,
            position: position.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn decodes_missing_author_with_defaults() {
        let comment = decode_comment(&raw(1, "12.5,1,16777215", "hi")).expect("decodes");
        assert_eq!(comment.time_offset_secs, 12.5);
        assert_eq!(comment.mode_code, 1);
        assert_eq!(comment.mode(), CommentMode::Scroll);
        assert_eq!(comment.color_hex, "ffffff");
        assert_eq!(comment.author_tag, "");
    }

    #[test]
    fn unparseable_fields_fall_back_to_defaults() {
        let comment = decode_comment(&raw(2, "abc,x,nope,[Gamer]u1", "text")).expect("decodes");
        assert_eq!(comment.time_offset_secs, 0.0);
        assert_eq!(comment.mode_code, 1);
        assert_eq!(comment.color_hex, "ffffff");
        assert_eq!(comment.author_category(), AuthorCategory::Gamer);
    }

    #[test]
    fn color_is_rendered_as_six_hex_digits() {
        let comment = decode_comment(&raw(3, "1,5,255,u", "blue")).expect("decodes");
        assert_eq!(comment.color_hex, "0000ff");
        assert_eq!(comment.mode(), CommentMode::Top);

        let oversized = decode_comment(&raw(4, "1,4,99999999", "x")).expect("decodes");
        assert_eq!(oversized.color_hex, "ffffff");
        assert_eq!(oversized.mode(), CommentMode::Bottom);
    }

    #[test]
    fn negative_and_non_finite_times_clamp_to_zero() {
        assert_eq!(
            decode_comment(&raw(5, "-3.0,1", "a")).map(|c| c.time_offset_secs),
            Some(0.0)
        );
        assert_eq!(
            decode_comment(&raw(6, "NaN,1", "a")).map(|c| c.time_offset_secs),
            Some(0.0)
        );
        assert_eq!(
            decode_comment(&raw(7, "inf,1", "a")).map(|c| c.time_offset_secs),
            Some(0.0)
        );
    }

    #[test]
    fn missing_time_or_empty_text_is_dropped() {
        assert!(decode_comment(&raw(8, "", "text")).is_none());
        assert!(decode_comment(&raw(9, " ,1,255", "text")).is_none());
        assert!(decode_comment(&raw(10, "3.0,1,255", "")).is_none());
    }

    #[test]
    fn whitespace_text_is_kept_verbatim() {
        let comment =
            decode_comment(&raw(11, "3.0,1,255", "   ")).expect("non-empty text decodes");
        assert_eq!(comment.text, "   ");
        assert_eq!(comment.bucket(), 3);

        let index = CommentIndex::decode(&[raw(12, "3.0,1", " "), raw(13, "3.5,1", "x")]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.dropped(), 0);
        assert_eq!(index.bucket(3).iter().map(|c| c.id).collect::<Vec<_>>(), vec![12, 13]);
    }

    #[test]
    fn author_categories_follow_source_prefix() {
        assert_eq!(AuthorCategory::from_tag("[BiliBili]e6860b30"), AuthorCategory::Bilibili);
        assert_eq!(AuthorCategory::from_tag("[Gamer]someone"), AuthorCategory::Gamer);
        assert_eq!(AuthorCategory::from_tag("[Acfun]x"), AuthorCategory::Other);
        assert_eq!(AuthorCategory::from_tag("a1b2c3"), AuthorCategory::Native);
        assert_eq!(AuthorCategory::from_tag("[unterminated"), AuthorCategory::Native);
        assert_eq!(AuthorCategory::from_tag(""), AuthorCategory::Native);
    }

    #[test]
    fn buckets_floor_and_keep_catalog_order() {
        let index = CommentIndex::decode(&[
            raw(1, "12.999,1", "late twelve"),
            raw(2, "13.0,1", "thirteen"),
            raw(3, "12.0,1", "early twelve"),
            raw(4, "", "dropped"),
        ]);

        let twelve: Vec<i64> = index.bucket(12).iter().map(|c| c.id).collect();
        assert_eq!(twelve, vec![1, 3]);
        assert!(index.bucket(13).iter().all(|c| c.id != 1));
        assert_eq!(index.len(), 3);
        assert_eq!(index.dropped(), 1);
        assert_eq!(index.bucket_count(), 2);
        assert_eq!(index.busiest_bucket(), Some((12, 2)));
        assert_eq!(index.last_second(), Some(13));
        assert!(index.bucket(99).is_empty());
    }

    #[test]
    fn decoding_is_idempotent() {
        let input = vec![
            raw(1, "5.1,1,255,[BiliBili]a", "one"),
            raw(2, "5.7,4,65280,b", "two"),
            raw(3, "6.2,5,16711680", "three"),
            raw(4, "bad", ""),
        ];
        assert_eq!(CommentIndex::decode(&input), CommentIndex::decode(&input));
    }

    #[test]
    fn empty_input_builds_empty_index() {
        let index = CommentIndex::decode(&[]);
        assert!(index.is_empty());
        assert_eq!(index.busiest_bucket(), None);
    }
}
