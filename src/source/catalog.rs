//! Catalog page scraping (author and table of contents)

use super::{MetadataSource, endpoint};
use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::types::{DocumentId, DocumentMetadata, TocNode};
use async_trait::async_trait;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use reqwest::header::COOKIE;

const AUTHOR_CLASSES: &[&str] = &["book-link", "qa_booklist_autors"];
const TOC_WRAP_CLASS: &str = "book-single__headers-wrap";
const TOC_ITEM_CLASS: &str = "book-single__header-item";

/// Reads author and table of contents from the reader's catalog page
#[derive(Clone, Debug)]
pub struct HttpCatalog {
    client: reqwest::Client,
    catalog_endpoint: url::Url,
    cookie: Option<String>,
}

impl HttpCatalog {
    /// Catalog lookup using `client` against `config.base_url`
    pub fn new(client: reqwest::Client, config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client,
            catalog_endpoint: endpoint(config, &config.catalog_path)?,
            cookie: config.cookie.clone(),
        })
    }
}

#[async_trait]
impl MetadataSource for HttpCatalog {
    async fn document_metadata(
        &self,
        source_id: &DocumentId,
    ) -> std::result::Result<DocumentMetadata, FetchError> {
        let mut url = self.catalog_endpoint.clone();
        url.query_pairs_mut().append_pair("id", source_id.as_str());

        let mut request = self.client.get(url);
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::Http {
                status: response.status().as_u16(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(parse_catalog(&html))
    }
}

/// Extract author and table of contents from a catalog page
///
/// Author is the first link inside the author block. The table of contents is the tree of
/// header items, each contributing a node only when it has both a title and a page number.
/// An empty tree counts as no table of contents.
pub fn parse_catalog(html: &str) -> DocumentMetadata {
    let dom = parse_document(RcDom::default(), Default::default()).one(html);

    let author = find_descendant(&dom.document, &|n| has_classes(n, AUTHOR_CLASSES))
        .and_then(|block| find_descendant(&block, &|n| is_tag(n, "a")))
        .map(|link| text_content(&link).trim().to_string())
        .filter(|a| !a.is_empty());

    let toc = find_descendant(&dom.document, &|n| has_classes(n, &[TOC_WRAP_CLASS]))
        .map(|wrap| parse_items(&wrap))
        .filter(|items| !items.is_empty());

    DocumentMetadata { author, toc }
}

fn parse_items(parent: &Handle) -> Vec<TocNode> {
    let mut items = Vec::new();

    for child in parent.children.borrow().iter() {
        if !has_classes(child, &[TOC_ITEM_CLASS]) {
            continue;
        }

        let title = find_descendant(child, &|n| has_classes(n, &["title"]));
        let page = find_descendant(child, &|n| has_classes(n, &["page-number"]));
        let (Some(title), Some(page)) = (title, page) else {
            continue;
        };
        let Some(page_number) = leading_int(&text_content(&page)) else {
            tracing::debug!("skipping table of contents entry without a page number");
            continue;
        };

        let subitems = find_descendant(child, &|n| has_classes(n, &["subitems"]))
            .map(|sub| parse_items(&sub))
            .unwrap_or_default();

        items.push(TocNode {
            title: text_content(&title).trim().to_string(),
            page_number,
            subitems,
        });
    }

    items
}

/// First descendant of `node` (excluding itself) in document order matching `pred`
fn find_descendant(node: &Handle, pred: &dyn Fn(&Handle) -> bool) -> Option<Handle> {
    for child in node.children.borrow().iter() {
        if pred(child) {
            return Some(child.clone());
        }
        if let Some(found) = find_descendant(child, pred) {
            return Some(found);
        }
    }
    None
}

fn is_tag(node: &Handle, tag: &str) -> bool {
    match &node.data {
        NodeData::Element { name, .. } => name.local.as_ref() == tag,
        _ => false,
    }
}

fn has_classes(node: &Handle, wanted: &[&str]) -> bool {
    let NodeData::Element { attrs, .. } = &node.data else {
        return false;
    };
    let attrs = attrs.borrow();
    let Some(class) = attrs.iter().find(|a| a.name.local.as_ref() == "class") else {
        return false;
    };
    let classes: Vec<&str> = class.value.split_whitespace().collect();
    wanted.iter().all(|w| classes.contains(w))
}

fn text_content(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// Integer at the start of `s`, ignoring leading whitespace ("12 стр." -> 12)
fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}
