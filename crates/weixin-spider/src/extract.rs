//! Article extraction from a rendered DOM snapshot.
//!
//! Everything here is a pure function of the page markup, so it runs the
//! same against a live browser snapshot and against fixtures in tests.

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::selectors::{first_match, FieldSelectors, AUTHOR, CONTENT, PUBLISH_TIME, TITLE};
use crate::types::{ArticleRecord, ImageRef};

/// Subtrees dropped from the plain-text projection.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start and end their own line in the projection.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary", "table", "tbody",
    "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Separator placed between blocks of body text.
pub const BLOCK_SEPARATOR: &str = "\n";

/// Extract an article record from the rendered page markup.
///
/// `page_url` is the browser's current URL, used for provenance and to
/// resolve relative image references.
pub fn extract_article(html: &str, page_url: &str, retrieved_at: &str) -> ArticleRecord {
    let document = Html::parse_document(html);

    let title = resolve_field(&document, &TITLE);
    let author = resolve_field(&document, &AUTHOR);
    let publish_time = resolve_field(&document, &PUBLISH_TIME);
    tracing::debug!("Extracted title: {title}");

    let content = first_match(CONTENT, |selector| first_element(&document, selector));

    let (body_markup, images) = match content {
        Some(element) => {
            let markup = element.inner_html();
            let images = enumerate_images(element, page_url);
            (markup, images)
        }
        None => {
            tracing::warn!("No content region found on {page_url}");
            (String::new(), Vec::new())
        }
    };
    let body_text = project_text(&body_markup);
    tracing::debug!(
        "Body: {} chars of text, {} images",
        body_text.chars().count(),
        images.len()
    );

    ArticleRecord {
        title,
        author,
        publish_time,
        body_markup,
        body_text,
        images,
        source_url: page_url.to_string(),
        retrieved_at: retrieved_at.to_string(),
    }
}

fn resolve_field(document: &Html, field: &FieldSelectors) -> String {
    field.resolve(|selector| {
        first_element(document, selector).map(|el| el.text().collect::<String>())
    })
}

fn first_element<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(parsed) => document.select(&parsed).next(),
        Err(e) => {
            tracing::debug!("Skipping unparsable selector {selector}: {e:?}");
            None
        }
    }
}

/// Plain-text projection of a markup fragment.
///
/// Script and style subtrees are dropped, whitespace runs collapse to one
/// space, and each block-level element gets its own line. Empty lines are
/// omitted.
pub fn project_text(markup: &str) -> String {
    if markup.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(markup);
    let mut lines = Vec::new();
    let mut current = String::new();
    collect_text(fragment.root_element(), &mut current, &mut lines);
    flush_line(&mut current, &mut lines);
    lines.join(BLOCK_SEPARATOR)
}

fn collect_text(element: ElementRef<'_>, current: &mut String, lines: &mut Vec<String>) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => current.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    flush_line(current, lines);
                    continue;
                }
                let Some(child_element) = ElementRef::wrap(child) else {
                    continue;
                };
                let is_block = BLOCK_TAGS.contains(&name);
                if is_block {
                    flush_line(current, lines);
                }
                collect_text(child_element, current, lines);
                if is_block {
                    flush_line(current, lines);
                }
            }
            _ => {}
        }
    }
}

fn flush_line(current: &mut String, lines: &mut Vec<String>) {
    let line = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !line.is_empty() {
        lines.push(line);
    }
    current.clear();
}

/// Walk `<img>` elements under the content region in document order.
///
/// The lazy-load `data-src` attribute is preferred over `src`. Images
/// with neither are skipped; the remaining ones are numbered from 1.
pub fn enumerate_images(content: ElementRef<'_>, page_url: &str) -> Vec<ImageRef> {
    let Ok(img_selector) = Selector::parse("img") else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for img in content.select(&img_selector) {
        let attrs = img.value();
        let raw = attrs
            .attr("data-src")
            .filter(|s| !s.trim().is_empty())
            .or_else(|| attrs.attr("src").filter(|s| !s.trim().is_empty()));
        let Some(raw) = raw else {
            continue;
        };

        let index = images.len() + 1;
        let locator = normalize_image_url(raw.trim(), page_url);
        let alt_text = attrs
            .attr("alt")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("图片_{index}"));
        let title_text = attrs.attr("title").unwrap_or_default().to_string();

        images.push(ImageRef::new(index, locator, alt_text, title_text));
    }
    images
}

/// Turn a possibly relative image reference into a fully qualified URL.
///
/// Inline `data:` locators and absolute URLs are returned unchanged;
/// protocol-relative references get `https:`.
pub fn normalize_image_url(raw: &str, page_url: &str) -> String {
    if raw.starts_with("data:") || raw.starts_with("http://") || raw.starts_with("https://") {
        return raw.to_string();
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return format!("https://{rest}");
    }
    match Url::parse(page_url).and_then(|base| base.join(raw)) {
        Ok(resolved) => resolved.to_string(),
        Err(e) => {
            tracing::debug!("Could not resolve {raw} against {page_url}: {e}");
            raw.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{UNKNOWN_AUTHOR, UNKNOWN_PUBLISH_TIME, UNKNOWN_TITLE};

    const PAGE_URL: &str = "https://mp.weixin.qq.com/s/KJl2oTMaKRra2l0PV7IIiA";

    const FULL_PAGE: &str = r#"
        <html><head><title>ignored</title></head><body>
          <h1 id="activity-name">
              春天的第一篇文章
          </h1>
          <a id="js_name"> 某公众号 </a>
          <em id="publish_time">2024-03-01 08:00</em>
          <div id="js_content">
            <section><p>第一段 <strong>加粗</strong> 文字</p></section>
            <script>var hidden = 1;</script>
            <style>.x { color: red }</style>
            <p>第二段<br>换行之后</p>
            <img data-src="https://mmbiz.qpic.cn/a.jpg" src="data:image/gif;base64,R0lGOD" alt="封面">
            <img src="//mmbiz.qpic.cn/b.png" title="图二">
            <img alt="no source">
            <img src="/static/c.gif">
          </div>
        </body></html>
    "#;

    #[test]
    fn test_extracts_primary_fields() {
        let record = extract_article(FULL_PAGE, PAGE_URL, "2024-03-01 09:00:00");
        assert_eq!(record.title, "春天的第一篇文章");
        assert_eq!(record.author, "某公众号");
        assert_eq!(record.publish_time, "2024-03-01 08:00");
        assert_eq!(record.source_url, PAGE_URL);
        assert_eq!(record.retrieved_at, "2024-03-01 09:00:00");
    }

    #[test]
    fn test_body_text_drops_scripts_and_separates_blocks() {
        let record = extract_article(FULL_PAGE, PAGE_URL, "");
        assert_eq!(record.body_text, "第一段 加粗 文字\n第二段\n换行之后");
        assert!(record.body_markup.contains("<script>"));
    }

    #[test]
    fn test_body_text_rederives_from_markup() {
        let record = extract_article(FULL_PAGE, PAGE_URL, "");
        assert_eq!(project_text(&record.body_markup), record.body_text);
        assert_eq!(record.derive_body_text(), record.body_text);
    }

    #[test]
    fn test_images_in_document_order() {
        let record = extract_article(FULL_PAGE, PAGE_URL, "");
        let urls: Vec<_> = record.images.iter().map(|i| i.source_locator.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://mmbiz.qpic.cn/a.jpg",
                "https://mmbiz.qpic.cn/b.png",
                "https://mp.weixin.qq.com/static/c.gif",
            ]
        );
        let indices: Vec<_> = record.images.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(record.images[0].alt_text, "封面");
        assert_eq!(record.images[1].alt_text, "图片_2");
        assert_eq!(record.images[1].title_text, "图二");
        assert!(record.images.iter().all(|i| !i.resolved));
    }

    #[test]
    fn test_title_fallback_selector() {
        let html = r#"<html><body>
            <h2 class="rich_media_title">  备用标题 </h2>
            <div class="rich_media_content"><p>正文</p></div>
        </body></html>"#;
        let record = extract_article(html, PAGE_URL, "");
        assert_eq!(record.title, "备用标题");
        assert_eq!(record.body_text, "正文");
    }

    #[test]
    fn test_empty_primary_falls_through() {
        let html = r#"<html><body>
            <h1 id="activity-name">   </h1>
            <div id="js_title">JS 标题</div>
        </body></html>"#;
        let record = extract_article(html, PAGE_URL, "");
        assert_eq!(record.title, "JS 标题");
    }

    #[test]
    fn test_sentinels_when_nothing_matches() {
        let record = extract_article("<html><body><p>bare</p></body></html>", PAGE_URL, "");
        assert_eq!(record.title, UNKNOWN_TITLE);
        assert_eq!(record.author, UNKNOWN_AUTHOR);
        assert_eq!(record.publish_time, UNKNOWN_PUBLISH_TIME);
        assert!(record.body_markup.is_empty());
        assert!(record.body_text.is_empty());
        assert!(record.images.is_empty());
    }

    #[test]
    fn test_project_text_empty_input() {
        assert_eq!(project_text(""), "");
        assert_eq!(project_text("   "), "");
        assert_eq!(project_text("<script>x()</script>"), "");
    }

    #[test]
    fn test_project_text_collapses_whitespace() {
        let text =
            project_text("<p>  a \n\n  b&nbsp;c </p><div><span>d</span><span>e</span></div>");
        assert_eq!(text, "a b c\nde");
    }

    #[test]
    fn test_normalize_image_url() {
        assert_eq!(
            normalize_image_url("//cdn.example/x.png", PAGE_URL),
            "https://cdn.example/x.png"
        );
        assert_eq!(
            normalize_image_url("/img/y.png", PAGE_URL),
            "https://mp.weixin.qq.com/img/y.png"
        );
        assert_eq!(
            normalize_image_url("https://a/b.png", PAGE_URL),
            "https://a/b.png"
        );
        assert_eq!(
            normalize_image_url("data:image/png;base64,AAAA", PAGE_URL),
            "data:image/png;base64,AAAA"
        );
    }
}
