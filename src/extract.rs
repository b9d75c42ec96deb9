//! Flattens a PTT thread page into line-oriented plain text.
//!
//! Only the direct children of `#main-content` are considered. Each child is
//! classified into a [`ForumNode`] first and then rendered to at most one
//! line, so partial or malformed markup drops lines instead of failing.

use scraper::{ElementRef, Html, Node, Selector};

const MAIN_CONTENT: &str = "div#main-content";
const PUSH_USER_ID: &str = "span.push-userid";
const PUSH_CONTENT: &str = "span.push-content";
const META_TAG: &str = "span.article-meta-tag";
const META_VALUE: &str = "span.article-meta-value";

/// Structural role of a direct child of the main content container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForumNode {
    /// Bare text between elements, already trimmed.
    Text(String),
    /// A push (vote/comment) line. Both parts keep their spacing as written.
    Vote {
        user_id: Option<String>,
        content: Option<String>,
    },
    /// Author/board/title/time header.
    MetadataLine {
        tag: Option<String>,
        value: Option<String>,
    },
    /// Inline spans, right-hand metadata and comments.
    Noise,
    /// Any other element, rendered as its trimmed text.
    Other(String),
}

impl ForumNode {
    pub fn classify(node: ego_tree::NodeRef<'_, Node>) -> Self {
        match node.value() {
            Node::Text(text) => ForumNode::Text(text.trim().to_string()),
            Node::Element(_) => match ElementRef::wrap(node) {
                Some(element) => Self::classify_element(element),
                None => ForumNode::Noise,
            },
            _ => ForumNode::Noise,
        }
    }

    fn classify_element(element: ElementRef<'_>) -> Self {
        let value = element.value();
        let has_class = |name: &str| value.classes().any(|c| c == name);

        if value.name() == "span" || has_class("article-metaline-right") {
            ForumNode::Noise
        } else if has_class("push") {
            ForumNode::Vote {
                user_id: find_text(element, PUSH_USER_ID),
                content: find_text(element, PUSH_CONTENT),
            }
        } else if has_class("article-metaline") {
            ForumNode::MetadataLine {
                tag: find_text(element, META_TAG),
                value: find_text(element, META_VALUE),
            }
        } else {
            ForumNode::Other(element.text().collect::<String>().trim().to_string())
        }
    }

    /// The line this node contributes, if any.
    pub fn render(&self) -> Option<String> {
        match self {
            ForumNode::Text(text) | ForumNode::Other(text) => Some(text.clone()),
            ForumNode::Vote {
                user_id: Some(user_id),
                content: Some(content),
            } => Some(format!("{user_id}{content}")),
            ForumNode::MetadataLine {
                tag: Some(tag),
                value: Some(value),
            } => Some(format!("{tag} {value}")),
            ForumNode::Vote { .. } | ForumNode::MetadataLine { .. } | ForumNode::Noise => None,
        }
    }
}

/// Text of the first descendant matching `css`, untrimmed.
fn find_text(element: ElementRef<'_>, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    element
        .select(&selector)
        .next()
        .map(|found| found.text().collect::<String>())
}

/// Classify every direct child of the main content container, in document order.
///
/// Returns an empty list when the page has no main content container.
pub fn classify_children(document: &Html) -> Vec<ForumNode> {
    let Ok(selector) = Selector::parse(MAIN_CONTENT) else {
        return Vec::new();
    };
    match document.select(&selector).next() {
        Some(main) => main.children().map(ForumNode::classify).collect(),
        None => Vec::new(),
    }
}

/// Render a forum thread page as newline-joined text.
pub fn extract(document: &Html) -> String {
    classify_children(document)
        .iter()
        .filter_map(ForumNode::render)
        .collect::<Vec<_>>()
        .join("\n")
}
