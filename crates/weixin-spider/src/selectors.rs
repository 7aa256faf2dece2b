//! Ordered selector fallback lists for each article field.
//!
//! Each field carries its candidates in priority order: the site-specific
//! id first, then semantic class names, then generic tags. The first
//! candidate yielding non-empty text wins; otherwise the field default.

use crate::types::{UNKNOWN_AUTHOR, UNKNOWN_PUBLISH_TIME, UNKNOWN_TITLE};

/// Priority-ordered selectors for one field, plus its fallback value.
#[derive(Debug, Clone, Copy)]
pub struct FieldSelectors {
    pub field: &'static str,
    pub candidates: &'static [&'static str],
    pub default: &'static str,
}

pub const TITLE: FieldSelectors = FieldSelectors {
    field: "title",
    candidates: &[
        "#activity-name",
        ".rich_media_title",
        "#js_title",
        "h1",
        "[class*='title']",
    ],
    default: UNKNOWN_TITLE,
};

pub const AUTHOR: FieldSelectors = FieldSelectors {
    field: "author",
    candidates: &[
        "#js_name",
        ".rich_media_meta_text",
        "[class*='author']",
        "[id*='author']",
    ],
    default: UNKNOWN_AUTHOR,
};

pub const PUBLISH_TIME: FieldSelectors = FieldSelectors {
    field: "publish_time",
    candidates: &[
        "#publish_time",
        ".rich_media_meta_text",
        "[class*='time']",
        "[id*='time']",
    ],
    default: UNKNOWN_PUBLISH_TIME,
};

/// Content region candidates. The first selector that exists wins,
/// text or not.
pub const CONTENT: &[&str] = &[
    "#js_content",
    ".rich_media_content",
    "[class*='content']",
    "article",
];

/// Selector the page-load wait looks for first.
pub const READY_PRIMARY: &str = "#activity-name";

/// Selectors accepted as "title is present" when the primary is missing.
pub const READY_FALLBACK: &[&str] = &["h1", ".rich_media_title", "#js_title"];

/// Return the first candidate for which `lookup` yields a value.
pub fn first_match<'a, T>(
    candidates: &[&'a str],
    mut lookup: impl FnMut(&'a str) -> Option<T>,
) -> Option<T> {
    candidates.iter().find_map(|candidate| lookup(candidate))
}

impl FieldSelectors {
    /// Resolve this field: first non-empty trimmed text, else the default.
    pub fn resolve(&self, mut lookup: impl FnMut(&str) -> Option<String>) -> String {
        first_match(self.candidates, |selector| {
            lookup(selector)
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        })
        .unwrap_or_else(|| {
            tracing::debug!("No selector matched for {}, using default", self.field);
            self.default.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_first_match_respects_priority() {
        let found = first_match(&["a", "b", "c"], |s| (s != "a").then(|| s.to_uppercase()));
        assert_eq!(found.as_deref(), Some("B"));
    }

    #[test]
    fn test_first_match_none() {
        let found: Option<()> = first_match(&["a", "b"], |_| None);
        assert!(found.is_none());
    }

    #[test]
    fn test_resolve_skips_blank_text() {
        let page: HashMap<&str, &str> = [("#activity-name", "   "), ("h1", " Fallback title ")]
            .into_iter()
            .collect();
        let title = TITLE.resolve(|sel| page.get(sel).map(|s| s.to_string()));
        assert_eq!(title, "Fallback title");
    }

    #[test]
    fn test_resolve_falls_back_to_sentinel() {
        let author = AUTHOR.resolve(|_| None);
        assert_eq!(author, UNKNOWN_AUTHOR);
    }

    #[test]
    fn test_primary_selectors_are_site_ids() {
        assert_eq!(TITLE.candidates[0], READY_PRIMARY);
        assert_eq!(AUTHOR.candidates[0], "#js_name");
        assert_eq!(PUBLISH_TIME.candidates[0], "#publish_time");
        assert_eq!(CONTENT[0], "#js_content");
    }
}
