//! Page size detection and image references for vector pages

use regex::Regex;
use std::sync::OnceLock;

/// Physical page size in PDF points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
}

impl PageSize {
    /// A page of `width` x `height` points
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

fn numeric_view_box() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)viewBox\s*=\s*["']\s*([\d.+\-eE,\s]+?)\s*["']"#).ok())
        .as_ref()
}

fn svg_width() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<svg[^>]*\swidth\s*=\s*["']\s*([0-9.+\-eE]+)(?:px)?\s*["']"#).ok()
    })
    .as_ref()
}

fn svg_height() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<svg[^>]*\sheight\s*=\s*["']\s*([0-9.+\-eE]+)(?:px)?\s*["']"#).ok()
    })
    .as_ref()
}

fn any_view_box() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)viewBox\s*=\s*["']([^"']+)["']"#).ok())
        .as_ref()
}

/// Size declared by the markup, if any
///
/// Tried in order: the first purely numeric `viewBox`, the `width`/`height` attributes of the
/// `<svg>` element (an optional `px` suffix is accepted), then any `viewBox` whose third and
/// fourth parts are numbers. Non-positive sizes are ignored.
pub fn declared_size(svg: &str) -> Option<PageSize> {
    if let Some(size) = numeric_view_box()
        .and_then(|re| re.captures(svg))
        .and_then(|caps| view_box_size(&caps[1]))
    {
        return Some(size);
    }

    let width = svg_width()
        .and_then(|re| re.captures(svg))
        .and_then(|caps| caps[1].parse::<f32>().ok());
    let height = svg_height()
        .and_then(|re| re.captures(svg))
        .and_then(|caps| caps[1].parse::<f32>().ok());
    if let (Some(w), Some(h)) = (width, height) {
        if let Some(size) = positive(w, h) {
            return Some(size);
        }
    }

    any_view_box()
        .and_then(|re| re.captures(svg))
        .and_then(|caps| view_box_size(&caps[1]))
}

/// Size of the page for `svg`, or `default` with a warning when nothing usable is declared
pub fn page_size(svg: &str, default: PageSize) -> PageSize {
    declared_size(svg).unwrap_or_else(|| {
        tracing::warn!(
            width = default.width,
            height = default.height,
            "page declares no usable size, using default page size"
        );
        default
    })
}

fn image_href() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<image\b[^>]*?\s(?:xlink:)?href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).ok()
    })
    .as_ref()
}

/// Distinct `http(s)` targets of `<image>` elements, in document order
///
/// Hrefs are returned with XML entities decoded, i.e. the way a parser reports the attribute.
/// Embedded `data:` images and relative paths are not included.
pub fn remote_image_hrefs(svg: &str) -> Vec<String> {
    let Some(re) = image_href() else {
        return Vec::new();
    };

    let mut hrefs: Vec<String> = Vec::new();
    for caps in re.captures_iter(svg) {
        let Some(raw) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let href = unescape_attribute(raw.as_str().trim());
        let lower = href.to_ascii_lowercase();
        let remote = lower.starts_with("http://") || lower.starts_with("https://");
        if remote && !hrefs.contains(&href) {
            hrefs.push(href);
        }
    }
    hrefs
}

fn unescape_attribute(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn view_box_size(raw: &str) -> Option<PageSize> {
    let parts: Vec<&str> = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() < 4 {
        return None;
    }
    let w = parts[2].parse::<f32>().ok()?;
    let h = parts[3].parse::<f32>().ok()?;
    positive(w, h)
}

fn positive(w: f32, h: f32) -> Option<PageSize> {
    (w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0).then(|| PageSize::new(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: PageSize = PageSize {
        width: 595.0,
        height: 842.0,
    };

    #[test]
    fn view_box_wins() {
        let svg = r#"<svg width="10" height="20" viewBox="0 0 612 792">"#;
        assert_eq!(declared_size(svg), Some(PageSize::new(612.0, 792.0)));
    }

    #[test]
    fn view_box_with_commas_and_decimals() {
        let svg = r#"<svg viewBox='0,0,419.5,595.25'>"#;
        assert_eq!(declared_size(svg), Some(PageSize::new(419.5, 595.25)));
    }

    #[test]
    fn width_height_attributes_with_px() {
        let svg = r#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg" width="300px" height="400">"#;
        assert_eq!(declared_size(svg), Some(PageSize::new(300.0, 400.0)));
    }

    #[test]
    fn stroke_width_is_not_page_width() {
        let svg = r#"<svg stroke-width="2" height="400"><rect width="5"/></svg>"#;
        assert_eq!(declared_size(svg), None);
    }

    #[test]
    fn short_view_box_falls_back_to_attributes() {
        let svg = r#"<svg viewBox="0 0 100" width="50" height="60">"#;
        assert_eq!(declared_size(svg), Some(PageSize::new(50.0, 60.0)));
    }

    #[test]
    fn any_view_box_is_last_resort() {
        let svg = r#"<svg viewBox="0 0 200pt 300 "><g/></svg>"#;
        // "200pt" is not numeric so the first pattern fails; the lenient one also needs numbers
        assert_eq!(declared_size(svg), None);

        let svg = r#"<svg viewBox="x 0 200 300">"#;
        assert_eq!(declared_size(svg), Some(PageSize::new(200.0, 300.0)));
    }

    #[test]
    fn unparseable_uses_default() {
        assert_eq!(page_size("<svg><g/></svg>", A4), A4);
        assert_eq!(page_size("garbage", A4), A4);
    }

    #[test]
    fn zero_sizes_are_ignored() {
        assert_eq!(page_size(r#"<svg viewBox="0 0 0 0">"#, A4), A4);
    }

    #[test]
    fn remote_image_hrefs_skip_embedded_and_relative() {
        let svg = concat!(
            r#"<svg><image width="4" href="https://cdn.test/a.webp?v=1&amp;s=2"/>"#,
            r#"<image xlink:href='http://cdn.test/b.png'/>"#,
            r#"<image href="data:image/webp;base64,UklGRg=="/>"#,
            r#"<image href="local/c.webp"/>"#,
            r#"<image HREF="https://cdn.test/a.webp?v=1&amp;s=2"/>"#,
            r#"<a href="https://cdn.test/link"/></svg>"#,
        );
        assert_eq!(
            remote_image_hrefs(svg),
            vec![
                "https://cdn.test/a.webp?v=1&s=2".to_string(),
                "http://cdn.test/b.png".to_string(),
            ]
        );
    }

    #[test]
    fn no_images_no_hrefs() {
        assert!(remote_image_hrefs(r#"<svg><rect width="5"/></svg>"#).is_empty());
    }
}
