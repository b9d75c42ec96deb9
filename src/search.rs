use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Characters escaped in the `q` parameter. `+` is left alone because it
/// already separates the keywords.
const QUERY_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'<')
    .add(b'>');

/// Join the non-blank keywords with `+` and scope the search to the forum.
///
/// Returns `None` when no keyword survives trimming.
pub fn compose_query(keywords: &[String], scope: &str) -> Option<String> {
    let terms: Vec<&str> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect();
    if terms.is_empty() {
        return None;
    }
    Some(format!("{}+{}", terms.join("+"), scope))
}

pub fn build_search_url(search_url: &str, query: &str) -> String {
    format!("{}?q={}", search_url, utf8_percent_encode(query, QUERY_ESCAPE))
}

/// Destination of a search result link.
///
/// Result pages wrap targets as `/url?q=<target>&...`; anything else is
/// taken as the target itself.
pub fn resolve_target(href: &str) -> String {
    let base = Url::parse("https://www.google.com/").ok();
    if let Some(joined) = base.and_then(|b| b.join(href).ok()) {
        if joined.path() == "/url" {
            if let Some((_, target)) = joined
                .query_pairs()
                .find(|(key, _)| key == "q" || key == "url")
            {
                return target.into_owned();
            }
        }
    }
    href.to_string()
}

/// Every result link pointing into the forum, in document order.
pub fn forum_links(document: &Html, forum_prefix: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let links: Vec<String> = document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .map(resolve_target)
        .filter(|target| target.starts_with(forum_prefix))
        .collect();
    debug!("Search page has {} forum links", links.len());
    links
}
