//! Schema.org type inventory, recommendations from page semantics, and
//! relationship edges between discovered types.

use std::collections::BTreeMap;

use {
    scraper::Html,
    serde::{Deserialize, Serialize},
};

use crate::structured::select_all;

/// `(from, property, to)` containment edges.
const RELATIONSHIPS: [(&str, &str, &str); 12] = [
    ("WebPage", "breadcrumb", "BreadcrumbList"),
    ("Organization", "address", "PostalAddress"),
    ("Product", "offers", "Offer"),
    ("Product", "aggregateRating", "AggregateRating"),
    ("Article", "author", "Person"),
    ("Article", "publisher", "Organization"),
    ("WebSite", "potentialAction", "SearchAction"),
    ("LocalBusiness", "address", "PostalAddress"),
    ("Recipe", "nutrition", "NutritionInformation"),
    ("Event", "location", "Place"),
    ("FAQPage", "mainEntity", "Question"),
    ("Question", "acceptedAnswer", "Answer"),
];

/// Page features that suggest a type, as `(type, selectors, reason)`.
const SIGNALS: [(&str, &str, &str); 7] = [
    (
        "Organization",
        "header, [role=banner], [class*=logo], [id*=logo]",
        "page has a site header or logo",
    ),
    ("Article", "article", "page has an <article> element"),
    (
        "BreadcrumbList",
        "nav, [class*=breadcrumb], [aria-label=breadcrumb], [aria-label=Breadcrumb]",
        "page has navigation or breadcrumbs",
    ),
    (
        "WebSite",
        "form input[type=search], form input[name=q], form input[name=search]",
        "page has a site search form",
    ),
    (
        "Product",
        "[class*=price], [itemprop=price], [data-price]",
        "page shows prices",
    ),
    ("FAQPage", "details, dl dt", "page has FAQ-style content"),
    ("LocalBusiness", "address", "page has an <address> element"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    pub schema_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub schema_type: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub property: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaLinks {
    pub discovered: Vec<TypeCount>,
    /// Suggestions only; nothing is added to the page.
    pub recommendations: Vec<Recommendation>,
    pub relationships: Vec<Relationship>,
}

pub fn link_schemas(doc: &Html, type_occurrences: &[String]) -> SchemaLinks {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for t in type_occurrences {
        *counts.entry(t.as_str()).or_default() += 1;
    }
    let present = |t: &str| counts.contains_key(t);

    let recommendations = SIGNALS
        .iter()
        .filter(|(ty, css, _)| !present(ty) && !select_all(doc, css).is_empty())
        .map(|(ty, _, reason)| Recommendation {
            schema_type: (*ty).to_string(),
            reason: (*reason).to_string(),
        })
        .collect();

    let relationships = RELATIONSHIPS
        .iter()
        .filter(|(from, _, to)| present(from) && present(to))
        .map(|(from, property, to)| Relationship {
            from: (*from).to_string(),
            property: (*property).to_string(),
            to: (*to).to_string(),
        })
        .collect();

    SchemaLinks {
        discovered: counts
            .iter()
            .map(|(t, n)| TypeCount {
                schema_type: (*t).to_string(),
                count: *n,
            })
            .collect(),
        recommendations,
        relationships,
    }
}
