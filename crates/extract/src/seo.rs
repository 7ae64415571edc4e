//! On-page SEO metadata, a 0-100 score and readable findings.
//!
//! Score contributions, each capped before summing:
//!
//! | contribution     | rule                                              | cap |
//! |------------------|---------------------------------------------------|-----|
//! | title            | present +10, 30-60 chars +5                       | 15  |
//! | description      | present +10, 120-160 chars +5                     | 15  |
//! | h1               | exactly one +10, several +5                       | 10  |
//! | headings         | any h2-h6 +10                                     | 10  |
//! | image alt        | coverage × 10, no images 5                        | 10  |
//! | structured data  | +5 per distinct type                              | 15  |
//! | social           | +2.5 per og:title/description/image, twitter:card | 10  |
//! | canonical        | +5                                                | 5   |
//! | internal links   | +1 per link                                       | 10  |

use std::collections::BTreeMap;

use {
    scraper::Html,
    serde::{Deserialize, Serialize},
    url::Url,
};

use crate::{
    links::LinkSummary,
    structured::{element_text, select_all},
};

const TITLE_RANGE: (usize, usize) = (30, 60);
const DESCRIPTION_RANGE: (usize, usize) = (120, 160);
const SOCIAL_TAGS: [&str; 4] = ["og:title", "og:description", "og:image", "twitter:card"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeoMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub headings: Vec<Heading>,
    pub canonical: Option<String>,
    pub images_total: usize,
    pub images_with_alt: usize,
    pub open_graph: BTreeMap<String, String>,
    pub twitter: BTreeMap<String, String>,
    pub internal_links: usize,
    pub external_links: usize,
    pub robots: Option<String>,
    pub lang: Option<String>,
}

impl SeoMetadata {
    pub fn from_document(doc: &Html, links: &LinkSummary, page_url: Option<&Url>) -> Self {
        let mut meta = Self {
            internal_links: links.internal,
            external_links: links.external,
            ..Default::default()
        };

        meta.title = select_all(doc, "title")
            .first()
            .map(element_text)
            .filter(|t| !t.is_empty());

        for el in select_all(doc, "meta") {
            let v = el.value();
            let key = v
                .attr("name")
                .or_else(|| v.attr("property"))
                .map(|k| k.trim().to_ascii_lowercase());
            let (Some(key), Some(content)) = (key, v.attr("content")) else {
                continue;
            };
            let content = content.trim().to_string();
            match key.as_str() {
                "description" if !content.is_empty() => meta.description = Some(content),
                "robots" => meta.robots = Some(content),
                k if k.starts_with("og:") => {
                    meta.open_graph.insert(k.to_string(), content);
                },
                k if k.starts_with("twitter:") => {
                    meta.twitter.insert(k.to_string(), content);
                },
                _ => {},
            }
        }

        meta.headings = select_all(doc, "h1, h2, h3, h4, h5, h6")
            .into_iter()
            .filter_map(|el| {
                let level = el.value().name().strip_prefix('h')?.parse().ok()?;
                Some(Heading {
                    level,
                    text: element_text(&el),
                })
            })
            .collect();

        meta.canonical = select_all(doc, "link[rel][href]")
            .into_iter()
            .find(|el| {
                el.value()
                    .attr("rel")
                    .is_some_and(|r| r.split_whitespace().any(|t| t.eq_ignore_ascii_case("canonical")))
            })
            .and_then(|el| el.value().attr("href"))
            .map(|href| match page_url.and_then(|u| u.join(href).ok()) {
                Some(abs) => abs.to_string(),
                None => href.to_string(),
            });

        let images = select_all(doc, "img");
        meta.images_total = images.len();
        meta.images_with_alt = images
            .iter()
            .filter(|img| img.value().attr("alt").is_some_and(|a| !a.trim().is_empty()))
            .count();

        meta.lang = select_all(doc, "html[lang]")
            .first()
            .and_then(|el| el.value().attr("lang"))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        meta
    }

    pub fn h1_count(&self) -> usize {
        self.headings.iter().filter(|h| h.level == 1).count()
    }

    pub fn has_subheadings(&self) -> bool {
        self.headings.iter().any(|h| h.level >= 2)
    }

    /// Fraction of images with alt text; `None` without images.
    pub fn alt_coverage(&self) -> Option<f64> {
        (self.images_total > 0).then(|| self.images_with_alt as f64 / self.images_total as f64)
    }

    fn social_tag(&self, tag: &str) -> bool {
        self.open_graph
            .get(tag)
            .or_else(|| self.twitter.get(tag))
            .is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeoBreakdown {
    pub title: f64,
    pub description: f64,
    pub h1: f64,
    pub headings: f64,
    pub image_alt: f64,
    pub structured_data: f64,
    pub social: f64,
    pub canonical: f64,
    pub internal_links: f64,
}

impl SeoBreakdown {
    pub fn total(&self) -> f64 {
        (self.title
            + self.description
            + self.h1
            + self.headings
            + self.image_alt
            + self.structured_data
            + self.social
            + self.canonical
            + self.internal_links)
            .clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeoReport {
    pub score: f64,
    pub breakdown: SeoBreakdown,
    pub issues: Vec<String>,
}

fn in_range(len: usize, (lo, hi): (usize, usize)) -> bool {
    (lo..=hi).contains(&len)
}

fn length_bonus(text: Option<&str>, range: (usize, usize)) -> f64 {
    match text {
        Some(t) if in_range(t.chars().count(), range) => 15.0,
        Some(_) => 10.0,
        None => 0.0,
    }
}

pub fn score(meta: &SeoMetadata, structured_types: usize) -> SeoReport {
    let h1 = meta.h1_count();
    let breakdown = SeoBreakdown {
        title: length_bonus(meta.title.as_deref(), TITLE_RANGE),
        description: length_bonus(meta.description.as_deref(), DESCRIPTION_RANGE),
        h1: match h1 {
            0 => 0.0,
            1 => 10.0,
            _ => 5.0,
        },
        headings: if meta.has_subheadings() { 10.0 } else { 0.0 },
        image_alt: meta.alt_coverage().map_or(5.0, |r| r * 10.0),
        structured_data: (structured_types as f64 * 5.0).min(15.0),
        social: (SOCIAL_TAGS.iter().filter(|t| meta.social_tag(t)).count() as f64 * 2.5)
            .min(10.0),
        canonical: if meta.canonical.is_some() { 5.0 } else { 0.0 },
        internal_links: (meta.internal_links as f64).min(10.0),
    };
    SeoReport {
        score: breakdown.total(),
        issues: issues(meta, structured_types),
        breakdown,
    }
}

fn length_issue(what: &str, text: Option<&str>, (lo, hi): (usize, usize), out: &mut Vec<String>) {
    match text.map(|t| t.chars().count()) {
        None => out.push(format!("missing {what}")),
        Some(n) if n < lo => out.push(format!("{what} is short ({n} chars, aim for {lo}-{hi})")),
        Some(n) if n > hi => out.push(format!("{what} is long ({n} chars, aim for {lo}-{hi})")),
        Some(_) => {},
    }
}

pub fn issues(meta: &SeoMetadata, structured_types: usize) -> Vec<String> {
    let mut out = Vec::new();
    length_issue("title", meta.title.as_deref(), TITLE_RANGE, &mut out);
    length_issue(
        "meta description",
        meta.description.as_deref(),
        DESCRIPTION_RANGE,
        &mut out,
    );
    match meta.h1_count() {
        0 => out.push("no H1 heading".into()),
        1 => {},
        n => out.push(format!("{n} H1 headings, expected one")),
    }
    if !meta.has_subheadings() {
        out.push("no H2-H6 subheadings".into());
    }
    if let Some(coverage) = meta.alt_coverage()
        && coverage < 1.0
    {
        out.push(format!(
            "{} of {} images lack alt text",
            meta.images_total - meta.images_with_alt,
            meta.images_total
        ));
    }
    if structured_types == 0 {
        out.push("no structured data".into());
    }
    if meta.open_graph.is_empty() {
        out.push("no Open Graph tags".into());
    }
    if meta.canonical.is_none() {
        out.push("missing canonical link".into());
    }
    if meta.internal_links == 0 {
        out.push("no internal links".into());
    }
    if meta.lang.is_none() {
        out.push("missing lang attribute on <html>".into());
    }
    if meta
        .robots
        .as_deref()
        .is_some_and(|r| r.to_ascii_lowercase().contains("noindex"))
    {
        out.push("page is marked noindex".into());
    }
    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::links::summarize_links};

    fn meta(html: &str) -> SeoMetadata {
        let doc = Html::parse_document(html);
        let base = Url::parse("https://shop.example/p").unwrap();
        let links = summarize_links(&doc, Some(&base));
        SeoMetadata::from_document(&doc, &links, Some(&base))
    }

    #[test]
    fn empty_page_scores_only_the_no_image_credit() {
        let report = score(&meta("<html><head></head><body></body></html>"), 0);
        assert!((report.score - 5.0).abs() < f64::EPSILON);
        assert!(report.score <= 10.0);
        assert!(report.issues.contains(&"missing title".to_string()));
        assert!(report.issues.contains(&"no H1 heading".to_string()));
    }

    #[test]
    fn collects_metadata() {
        let m = meta(
            r#"<html lang="en"><head>
              <title> Blue   Kettle </title>
              <meta name="Description" content="Boils water.">
              <meta name="robots" content="noindex, follow">
              <meta property="og:title" content="Kettle">
              <meta name="twitter:card" content="summary">
              <link rel="canonical" href="/p">
            </head><body>
              <h1>Kettle</h1><h2>Specs</h2>
              <img src="a.png" alt="front"><img src="b.png" alt=" ">
              <a href="/cart">Cart</a><a href="https://elsewhere.example/">x</a>
            </body></html>"#,
        );
        assert_eq!(m.title.as_deref(), Some("Blue Kettle"));
        assert_eq!(m.description.as_deref(), Some("Boils water."));
        assert_eq!(m.canonical.as_deref(), Some("https://shop.example/p"));
        assert_eq!(m.lang.as_deref(), Some("en"));
        assert_eq!(m.h1_count(), 1);
        assert_eq!((m.images_total, m.images_with_alt), (2, 1));
        assert_eq!((m.internal_links, m.external_links), (1, 1));
        assert_eq!(m.open_graph["og:title"], "Kettle");
        assert_eq!(m.twitter["twitter:card"], "summary");

        let issues = issues(&m, 0);
        assert!(issues.contains(&"1 of 2 images lack alt text".to_string()));
        assert!(issues.contains(&"page is marked noindex".to_string()));
        assert!(issues.iter().any(|i| i.starts_with("title is short")));
    }

    #[test]
    fn contributions_are_capped() {
        let m = SeoMetadata {
            headings: vec![
                Heading {
                    level: 1,
                    text: "a".into(),
                },
                Heading {
                    level: 1,
                    text: "b".into(),
                },
            ],
            internal_links: 40,
            ..Default::default()
        };
        let report = score(&m, 9);
        assert!((report.breakdown.h1 - 5.0).abs() < f64::EPSILON);
        assert!((report.breakdown.structured_data - 15.0).abs() < f64::EPSILON);
        assert!((report.breakdown.internal_links - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn full_marks() {
        let title = "t".repeat(45);
        let desc = "d".repeat(130);
        let links: String = (0..12).map(|i| format!("<a href=\"/{i}\">x</a>")).collect();
        let html = format!(
            r#"<html lang="en"><head><title>{title}</title>
            <meta name="description" content="{desc}">
            <meta property="og:title" content="x"><meta property="og:description" content="x">
            <meta property="og:image" content="x"><meta name="twitter:card" content="x">
            <link rel="canonical" href="https://shop.example/p"></head>
            <body><h1>x</h1><h2>y</h2><img src="i" alt="i">{links}</body></html>"#
        );
        let report = score(&meta(&html), 3);
        assert!((report.score - 100.0).abs() < f64::EPSILON);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }
}
