//! HTML → citation-indexed plain text.
//!
//! Both real fetched pages and the synthetic result pages built from search
//! APIs go through [`process_html`], so citation ids mean the same thing
//! everywhere: the n-th distinct href in document order gets id `n`.

use html_scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashMap;
use webcite_core::{get_domain, Extract, PageContents};

/// Subtrees that never contribute visible text.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "svg", "math", "iframe", "object",
];

const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "dd",
    "details",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "header",
    "hr",
    "main",
    "nav",
    "ol",
    "p",
    "section",
    "summary",
    "table",
    "tbody",
    "thead",
    "tfoot",
    "tr",
    "ul",
];

/// Ordered, deduplicating href → id map.
///
/// Ids are handed out 0, 1, 2, ... in first-appearance order; a repeated href
/// gets its original id back and never consumes a new one.
#[derive(Debug, Default, Clone)]
pub struct CitationIndex {
    ids: HashMap<String, usize>,
    extracts: Vec<Extract>,
}

impl CitationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `url`, allocating the next one on first sight.
    ///
    /// `text` is only recorded for the first appearance.
    pub fn cite(&mut self, url: &str, text: &str) -> usize {
        if let Some(&id) = self.ids.get(url) {
            return id;
        }
        let id = self.extracts.len();
        self.ids.insert(url.to_string(), id);
        self.extracts.push(Extract {
            id,
            url: url.to_string(),
            text: text.to_string(),
        });
        id
    }

    pub fn get(&self, url: &str) -> Option<usize> {
        self.ids.get(url).copied()
    }

    pub fn len(&self) -> usize {
        self.extracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extracts.is_empty()
    }

    pub fn into_extracts(self) -> Vec<Extract> {
        self.extracts
    }
}

/// One entry of a synthetic search-results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub url: String,
    pub title: String,
    pub summary: String,
}

/// Render search hits as a minimal HTML page: one `<li>` per hit.
///
/// Anchor text falls back to the url when a provider sends no title.
pub fn search_results_html(items: &[ResultItem]) -> String {
    let mut out = String::from("<html><body>\n<h1>Search Results</h1>\n<ul>\n");
    for item in items {
        let anchor = if item.title.trim().is_empty() {
            &item.url
        } else {
            &item.title
        };
        out.push_str(&format!(
            "<li><a href='{}'>{}</a> {}</li>\n",
            escape_html(&item.url),
            escape_html(anchor),
            escape_html(&item.summary)
        ));
    }
    out.push_str("</ul>\n</body></html>\n");
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize `html` into a [`PageContents`].
///
/// - `url` is the page's own address; relative hrefs resolve against it and an
///   empty `url` drops relative links to plain text.
/// - `title` wins when non-empty; otherwise `<title>`, then the page domain.
/// - `display_urls` adds `【id】` markers after each cited anchor (with
///   `†domain` for off-site links) and a leading `URL:` line.
pub fn process_html(html: &str, url: &str, title: &str, display_urls: bool) -> PageContents {
    let doc = Html::parse_document(html);

    let mut renderer = Renderer {
        base: url::Url::parse(url).ok(),
        page_domain: get_domain(url),
        display_urls,
        citations: CitationIndex::new(),
        out: String::new(),
        pending_space: false,
        pre_depth: 0,
    };
    renderer.element(doc.root_element());

    let body = renderer
        .out
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let text = if display_urls && !url.is_empty() {
        format!("\nURL: {url}\n{body}")
    } else {
        body
    };

    let final_title = if !title.trim().is_empty() {
        title.trim().to_string()
    } else {
        document_title(&doc).unwrap_or_else(|| get_domain(url))
    };

    let extracts = renderer.citations.into_extracts();
    tracing::debug!(
        url,
        citations = extracts.len(),
        text_chars = text.chars().count(),
        "normalized html"
    );
    PageContents::new(url, final_title, text, extracts)
}

fn document_title(doc: &Html) -> Option<String> {
    let sel = Selector::parse("title").ok()?;
    let el = doc.select(&sel).next()?;
    let t = norm_ws(&el.text().collect::<String>());
    (!t.is_empty()).then_some(t)
}

struct Renderer {
    base: Option<url::Url>,
    page_domain: String,
    display_urls: bool,
    citations: CitationIndex,
    out: String,
    pending_space: bool,
    pre_depth: usize,
}

impl Renderer {
    fn walk(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            match child.value() {
                Node::Text(t) => self.push_text(t),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.element(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIPPED_TAGS.contains(&name) {
            return;
        }
        match name {
            "a" => self.anchor(el),
            "br" => self.break_line(),
            "img" => {
                if let Some(alt) = el.value().attr("alt").map(norm_ws) {
                    if !alt.is_empty() {
                        self.pending_space = true;
                        self.push_text(&format!("[Image: {alt}]"));
                    }
                }
            }
            "pre" => {
                self.break_line();
                self.pre_depth += 1;
                self.walk(el);
                self.pre_depth -= 1;
                self.break_line();
            }
            "li" => {
                self.break_line();
                self.push_raw("* ");
                self.walk(el);
                self.break_line();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                self.break_line();
                self.push_raw(&format!("{} ", "#".repeat(level)));
                self.walk(el);
                self.break_line();
            }
            "td" | "th" => {
                self.pending_space = true;
                self.walk(el);
                self.pending_space = true;
            }
            _ if BLOCK_TAGS.contains(&name) => {
                self.break_line();
                self.walk(el);
                self.break_line();
            }
            _ => self.walk(el),
        }
    }

    fn anchor(&mut self, el: ElementRef<'_>) {
        // Render children with the normal rules into a scratch buffer, so
        // skipped tags stay skipped and images keep their alt text.
        let outer = std::mem::take(&mut self.out);
        let outer_pending = std::mem::replace(&mut self.pending_space, false);
        self.walk(el);
        let trailing_space = self.pending_space;
        let rendered = std::mem::replace(&mut self.out, outer);
        self.pending_space = outer_pending;

        let text = norm_ws(&rendered);
        if text.is_empty() {
            self.pending_space |= trailing_space;
            return;
        }
        if el.text().next().is_some_and(|t| t.starts_with(char::is_whitespace)) {
            self.pending_space = true;
        }

        let resolved = el.value().attr("href").and_then(|h| self.resolve(h));
        self.push_text(&text);
        if let Some(resolved) = resolved {
            let id = self.citations.cite(&resolved, &text);
            if self.display_urls {
                let domain = get_domain(&resolved);
                if domain.is_empty() || domain == self.page_domain {
                    self.push_raw(&format!("【{id}】"));
                } else {
                    self.push_raw(&format!("【{id}†{domain}】"));
                }
            }
        }
        self.pending_space |= trailing_space;
    }

    /// Absolute url for a citable href, `None` for in-page/script/mail links
    /// and anything that cannot be resolved to a host.
    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            return None;
        }
        let lc = href.to_ascii_lowercase();
        if lc.starts_with("javascript:") || lc.starts_with("mailto:") {
            return None;
        }
        match url::Url::parse(href) {
            // Keep absolute hrefs verbatim so callers see the url they linked.
            Ok(u) => u.has_host().then(|| href.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let joined = self.base.as_ref()?.join(href).ok()?;
                joined.has_host().then(|| joined.to_string())
            }
            Err(_) => None,
        }
    }

    fn push_text(&mut self, s: &str) {
        if self.pre_depth > 0 {
            self.push_raw(s);
            return;
        }
        for c in s.chars() {
            if c.is_whitespace() {
                self.pending_space = true;
                continue;
            }
            if self.pending_space && !self.out.is_empty() && !self.out.ends_with([' ', '\n']) {
                self.out.push(' ');
            }
            self.pending_space = false;
            self.out.push(c);
        }
    }

    fn push_raw(&mut self, s: &str) {
        if self.pending_space && !self.out.is_empty() && !self.out.ends_with([' ', '\n']) {
            self.out.push(' ');
        }
        self.pending_space = false;
        self.out.push_str(s);
    }

    fn break_line(&mut self) {
        self.pending_space = false;
        let trimmed = self.out.trim_end_matches(' ').len();
        self.out.truncate(trimmed);
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }
}
