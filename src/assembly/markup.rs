//! XHTML, navigation and package documents for the EPUB container

use crate::types::{PageIndex, TocNode};
use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

/// Escape `& < > " '` for use in XML text and attribute values
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn pre_tag() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</?pre[^>]*>").ok()).as_ref()
}

fn blank_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t\r]*\n").ok()).as_ref()
}

/// Strip `<pre>` wrappers the reader puts around page text, then trim
pub fn clean_text(raw: &str) -> String {
    match pre_tag() {
        Some(re) => re.replace_all(raw, "").trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Split page text into paragraphs on blank lines
///
/// Lines inside a paragraph are trimmed and joined with a single space; empty paragraphs are
/// dropped.
pub fn paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let blocks: Vec<&str> = match blank_line() {
        Some(re) => re.split(&normalized).collect(),
        None => normalized.split("\n\n").collect(),
    };

    blocks
        .into_iter()
        .map(|block| {
            block
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|p| !p.is_empty())
        .collect()
}

/// File name of the page document at 0-based `position`
pub fn page_filename(position: usize) -> String {
    format!("page{position}.xhtml")
}

/// XHTML document for one page
pub fn page_xhtml(title: &str, position: usize, raw_text: &str) -> String {
    let mut body = String::new();
    for p in paragraphs(&clean_text(raw_text)) {
        let _ = writeln!(body, "    <p>{}</p>", escape_xml(&p));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
  <head>
    <title>{title} - Page {number}</title>
    <style>
      body {{ font-family: serif; line-height: 1.2; margin: 1em; text-align: justify; }}
      p {{ margin: 0 0 0.5em 0; }}
    </style>
  </head>
  <body>
{body}  </body>
</html>
"#,
        title = escape_xml(title),
        number = position + 1,
    )
}

/// Navigation document for the table of contents
///
/// Page numbers in `toc` are absolute; they are mapped onto the downloaded range starting at
/// `range_start`. Returns `None` when no entry falls inside the range.
pub fn nav_xhtml(toc: &[TocNode], range_start: PageIndex, page_count: usize) -> Option<String> {
    let list = toc_list(toc, range_start, page_count)?;
    Some(format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
  <head>
    <title>Contents</title>
  </head>
  <body>
    <nav epub:type="toc" id="toc">
      <h2>Contents</h2>
      {list}
    </nav>
  </body>
</html>
"#
    ))
}

fn toc_list(items: &[TocNode], range_start: PageIndex, page_count: usize) -> Option<String> {
    let mut entries = String::new();

    for item in items {
        let nested = toc_list(&item.subitems, range_start, page_count).unwrap_or_default();
        let position = item.page_number - i64::from(range_start);
        let title = escape_xml(&item.title);

        if position >= 0 && (position as usize) < page_count {
            let _ = write!(
                entries,
                r#"<li><a href="{}">{title}</a>{nested}</li>"#,
                page_filename(position as usize)
            );
        } else if !nested.is_empty() {
            let _ = write!(entries, "<li><span>{title}</span>{nested}</li>");
        }
    }

    if entries.is_empty() {
        None
    } else {
        Some(format!("<ol>{entries}</ol>"))
    }
}

/// Fields of the package document
pub struct PackageInfo<'a> {
    /// Document title
    pub title: &'a str,
    /// Creator
    pub author: &'a str,
    /// Unique identifier
    pub identifier: &'a str,
    /// `dc:language`
    pub language: &'a str,
    /// `dcterms:modified`, `YYYY-MM-DDThh:mm:ssZ`
    pub modified: &'a str,
    /// Number of page documents
    pub page_count: usize,
    /// Whether `nav.xhtml` exists
    pub has_nav: bool,
}

/// EPUB 3 package document
pub fn content_opf(info: &PackageInfo<'_>) -> String {
    let mut manifest = String::new();
    if info.has_nav {
        manifest.push_str(
            r#"    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
"#,
        );
    }
    let mut spine = String::new();
    for i in 0..info.page_count {
        let _ = writeln!(
            manifest,
            r#"    <item id="page{i}" href="{}" media-type="application/xhtml+xml"/>"#,
            page_filename(i)
        );
        let _ = writeln!(spine, r#"    <itemref idref="page{i}"/>"#);
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="bookid" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{title}</dc:title>
    <dc:creator>{author}</dc:creator>
    <dc:identifier id="bookid">{identifier}</dc:identifier>
    <dc:language>{language}</dc:language>
    <meta property="dcterms:modified">{modified}</meta>
  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>
"#,
        title = escape_xml(info.title),
        author = escape_xml(info.author),
        identifier = escape_xml(info.identifier),
        language = escape_xml(info.language),
        modified = info.modified,
    )
}

/// `META-INF/container.xml` pointing at the package document
pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="EPUB/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;
