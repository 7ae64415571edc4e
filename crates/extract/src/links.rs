use {scraper::Html, url::Url};

use crate::structured::select_all;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSummary {
    pub internal: usize,
    pub external: usize,
    /// Absolute same-host http(s) links, fragment removed, first-seen order.
    pub same_host: Vec<String>,
}

fn is_navigational(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    !(lower.is_empty()
        || lower.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:"))
}

/// Classify every `<a href>` relative to `base`. Without a base URL only
/// relative links count as internal.
pub fn summarize_links(doc: &Html, base: Option<&Url>) -> LinkSummary {
    let mut summary = LinkSummary::default();
    let base_host = base.and_then(Url::host_str).map(str::to_ascii_lowercase);

    for el in select_all(doc, "a[href]") {
        let Some(href) = el.value().attr("href").filter(|h| is_navigational(h)) else {
            continue;
        };
        let resolved = match base {
            Some(b) => b.join(href.trim()).ok(),
            None => Url::parse(href.trim()).ok(),
        };
        let Some(mut url) = resolved else {
            // relative link with nothing to resolve against
            summary.internal += 1;
            continue;
        };
        let host = url.host_str().map(str::to_ascii_lowercase);
        if host.is_some() && host == base_host {
            summary.internal += 1;
            if matches!(url.scheme(), "http" | "https") {
                url.set_fragment(None);
                let s = url.to_string();
                if !summary.same_host.contains(&s) {
                    summary.same_host.push(s);
                }
            }
        } else {
            summary.external += 1;
        }
    }
    summary
}

/// Same-host links of an HTML document served from `page_url`.
pub fn same_host_links(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    summarize_links(&Html::parse_document(html), Some(&base)).same_host
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<body>
        <a href="/about">About</a>
        <a href="/about#team">Team</a>
        <a href="https://Example.com/blog">Blog</a>
        <a href="https://other.org/">Other</a>
        <a href="#top">Top</a>
        <a href="mailto:hi@example.com">Mail</a>
        <a href="javascript:void(0)">JS</a>
    </body>"##;

    #[test]
    fn classifies_against_page_url() {
        let base = Url::parse("https://example.com/index.html").unwrap();
        let s = summarize_links(&Html::parse_document(PAGE), Some(&base));
        assert_eq!(s.internal, 3);
        assert_eq!(s.external, 1);
        assert_eq!(s.same_host, [
            "https://example.com/about",
            "https://example.com/blog"
        ]);
    }

    #[test]
    fn without_base_relative_links_are_internal() {
        let s = summarize_links(&Html::parse_document(PAGE), None);
        assert_eq!(s.internal, 2);
        assert_eq!(s.external, 2);
        assert!(s.same_host.is_empty());
    }

    #[test]
    fn same_host_links_from_raw_html() {
        let links = same_host_links(PAGE, "https://example.com/");
        assert_eq!(links.len(), 2);
        assert!(same_host_links(PAGE, "not a url").is_empty());
    }
}
