//! Page content model and extraction.
//!
//! The host describes what is on screen as a [`ContentNode`] tree (usually
//! deserialized from JSON). Extraction only ever looks at visible nodes: a
//! node flagged `hidden` or rendered with a zero-sized box is pruned together
//! with its whole subtree.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use crate::error::{NavError, Result};

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

const CONTAINER_TAGS: &[&str] = &[
    "section", "article", "aside", "nav", "main", "div", "header", "footer", "form", "ul", "ol",
    "table", "dialog",
];

/// `data-*` attributes that name a region.
const REGION_DATA_KEYS: &[&str] = &["section", "voice-region", "region"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct BoxSize {
    pub width: f32,
    pub height: f32,
}

/// One element of the displayed page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContentNode {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub role: Option<String>,
    pub aria_label: Option<String>,
    /// `data-*` attributes without the prefix.
    pub data: BTreeMap<String, String>,
    /// Text directly inside this element, before its children.
    pub text: Option<String>,
    pub alt: Option<String>,
    pub hidden: bool,
    /// Rendered box; `None` when the host does not report layout.
    pub size: Option<BoxSize>,
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| NavError::Page(e.to_string()))
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.aria_label = Some(label.into());
        self
    }

    pub fn with_data(mut self, key: &str, value: &str) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_alt(mut self, alt: &str) -> Self {
        self.alt = Some(alt.into());
        self
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.size = Some(BoxSize { width, height });
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn child(mut self, child: ContentNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_visible(&self) -> bool {
        if self.hidden {
            return false;
        }
        !matches!(self.size, Some(b) if b.width <= 0.0 && b.height <= 0.0)
    }

    pub fn is_heading(&self) -> bool {
        if matches!(self.tag.as_str(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
            return true;
        }
        if self.role.as_deref() == Some("heading") {
            return true;
        }
        self.classes.iter().any(|c| {
            let c = c.to_ascii_lowercase();
            c.contains("title") || c.contains("heading")
        })
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c.eq_ignore_ascii_case(class))
    }

    fn is_container(&self) -> bool {
        CONTAINER_TAGS.contains(&self.tag.as_str())
            || matches!(
                self.role.as_deref(),
                Some("region" | "main" | "complementary" | "navigation" | "dialog")
            )
    }

    /// Visible descendants in document order, this node first.
    fn visible_nodes(&self) -> Vec<&ContentNode> {
        let mut out = Vec::new();
        collect_visible(self, &mut out);
        out
    }

    /// All visible text under this node, whitespace collapsed.
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        collect_text(self, &mut parts);
        collapse_whitespace(&parts.join(" "))
    }
}

fn collect_visible<'a>(node: &'a ContentNode, out: &mut Vec<&'a ContentNode>) {
    if !node.is_visible() || SKIPPED_TAGS.contains(&node.tag.as_str()) {
        return;
    }
    out.push(node);
    for child in &node.children {
        collect_visible(child, out);
    }
}

fn collect_text<'a>(node: &'a ContentNode, parts: &mut Vec<&'a str>) {
    if !node.is_visible() || SKIPPED_TAGS.contains(&node.tag.as_str()) {
        return;
    }
    if let Some(text) = &node.text {
        parts.push(text);
    }
    for child in &node.children {
        collect_text(child, parts);
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn slug(name: &str) -> String {
    collapse_whitespace(&name.to_lowercase()).replace(' ', "-")
}

/// Terminate a fragment so it reads as its own sentence.
fn sentence(text: &str) -> String {
    let text = text.trim();
    if text.ends_with(['.', '!', '?', ':']) {
        text.to_string()
    } else {
        format!("{text}.")
    }
}

/// A selectable entry on the current page, e.g. one course card.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentItem {
    pub title: String,
    /// Host-side position used when the item is opened.
    pub index: usize,
}

/// Supplies the page currently on screen.
///
/// Asked afresh for every read so the narration reflects the live page.
pub trait PageContentProvider {
    fn snapshot(&self) -> Result<ContentNode>;
}

/// A fixed tree, for hosts that push page updates themselves.
impl PageContentProvider for ContentNode {
    fn snapshot(&self) -> Result<ContentNode> {
        Ok(self.clone())
    }
}

/// Re-reads a JSON page description from disk on every request.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PageContentProvider for JsonFileProvider {
    fn snapshot(&self) -> Result<ContentNode> {
        let json = std::fs::read_to_string(&self.path)?;
        ContentNode::from_json(&json)
    }
}

/// Heading texts in document order. A collected heading is not searched for nested headings.
pub fn extract_headings(root: &ContentNode) -> Vec<String> {
    fn walk(node: &ContentNode, out: &mut Vec<String>) {
        if !node.is_visible() || SKIPPED_TAGS.contains(&node.tag.as_str()) {
            return;
        }
        if node.is_heading() {
            let text = node.text_content();
            if !text.is_empty() {
                out.push(text);
            }
            return;
        }
        for child in &node.children {
            walk(child, out);
        }
    }

    let mut headings = Vec::new();
    walk(root, &mut headings);
    headings
}

/// Intro sentence with the count, then the headings as a spoken list.
pub fn narrate_headings(headings: &[String]) -> String {
    match headings.len() {
        0 => "I couldn't find any headings on this page.".into(),
        n => {
            let noun = if n == 1 { "heading" } else { "headings" };
            let list: Vec<String> = headings.iter().map(|h| sentence(h)).collect();
            format!("This page has {n} {noun}. {}", list.join(" "))
        }
    }
}

/// Find the element a spoken region name refers to.
///
/// Tried in order: id, class slug, region data attribute, a fuzzy pass over
/// containers (label, nested heading, class), then the sidebar and main
/// content aliases.
pub fn resolve_region<'a>(root: &'a ContentNode, name: &str) -> Option<&'a ContentNode> {
    let target = collapse_whitespace(&name.to_lowercase());
    if target.is_empty() {
        return None;
    }
    let target_slug = slug(&target);
    let nodes = root.visible_nodes();

    let found = nodes
        .iter()
        .find(|n| {
            n.id
                .as_deref()
                .is_some_and(|id| id.eq_ignore_ascii_case(&target) || id.eq_ignore_ascii_case(&target_slug))
        })
        .or_else(|| nodes.iter().find(|n| n.has_class(&target_slug)))
        .or_else(|| {
            nodes.iter().find(|n| {
                REGION_DATA_KEYS.iter().any(|key| {
                    n.data
                        .get(*key)
                        .is_some_and(|v| slug(v) == target_slug)
                })
            })
        })
        .or_else(|| nodes.iter().find(|n| n.is_container() && container_mentions(n, &target, &target_slug)))
        .copied();

    if let Some(node) = found {
        debug!("Region '{name}' resolved to <{}>", node.tag);
        return Some(node);
    }

    resolve_alias(&nodes, &target)
}

fn container_mentions(node: &ContentNode, target: &str, target_slug: &str) -> bool {
    let mentions = |text: &str| {
        let text = collapse_whitespace(&text.to_lowercase());
        !text.is_empty() && (text.contains(target) || target.contains(text.as_str()))
    };

    if node.aria_label.as_deref().is_some_and(mentions) {
        return true;
    }
    if extract_headings(node).first().is_some_and(|h| mentions(h)) {
        return true;
    }
    node.classes
        .iter()
        .any(|c| c.to_ascii_lowercase().contains(target_slug))
}

fn resolve_alias<'a>(nodes: &[&'a ContentNode], target: &str) -> Option<&'a ContentNode> {
    let found = match target {
        "sidebar" | "side bar" | "side panel" | "menu" => nodes.iter().find(|n| {
            n.tag == "aside"
                || n.role.as_deref() == Some("complementary")
                || n.classes.iter().any(|c| c.to_ascii_lowercase().contains("sidebar"))
        }),
        "main" | "content" | "main content" | "main section" => nodes.iter().find(|n| {
            n.tag == "main"
                || n.role.as_deref() == Some("main")
                || n.id.as_deref().is_some_and(|id| id == "main-content" || id == "content")
        }),
        _ => None,
    };
    if found.is_some() {
        debug!("Region '{target}' resolved by alias");
    }
    found.copied()
}

/// Narratable text for a subtree, with structure spoken as role words.
pub fn narrate(root: &ContentNode) -> String {
    let mut fragments = Vec::new();
    narrate_into(root, &mut fragments);
    collapse_whitespace(&fragments.join(" "))
}

fn narrate_into(node: &ContentNode, out: &mut Vec<String>) {
    if !node.is_visible() || SKIPPED_TAGS.contains(&node.tag.as_str()) {
        return;
    }

    let framed = |prefix: &str, text: String| {
        let text = collapse_whitespace(&text);
        (!text.is_empty()).then(|| sentence(&format!("{prefix}: {text}")))
    };

    let role = node.role.as_deref();
    let fragment = if node.is_heading() {
        Some(framed("Heading", node.text_content()))
    } else if node.tag == "li" || role == Some("listitem") {
        Some(framed("List item", node.text_content()))
    } else if node.tag == "button" || role == Some("button") {
        let label = node.aria_label.clone().unwrap_or_else(|| node.text_content());
        Some(framed("Button", label))
    } else if node.tag == "a" || role == Some("link") {
        Some(framed("Link", node.text_content()))
    } else if node.tag == "img" {
        Some(framed("Image", node.alt.clone().unwrap_or_default()))
    } else {
        None
    };

    match fragment {
        Some(text) => out.extend(text),
        None => {
            if let Some(text) = node.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                out.push(sentence(text));
            }
            for child in &node.children {
                narrate_into(child, out);
            }
        }
    }
}
