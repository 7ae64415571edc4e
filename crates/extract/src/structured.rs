//! JSON-LD, microdata and RDFa extraction from rendered HTML.

use std::collections::BTreeMap;

use {
    scraper::{ElementRef, Html, Selector},
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::debug,
};

const SCHEMA_PREFIXES: [&str; 3] = ["https://schema.org/", "http://schema.org/", "schema:"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredData {
    pub json_ld: Vec<Value>,
    pub microdata: Vec<MicrodataItem>,
    pub rdfa: Vec<RdfaItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicrodataItem {
    #[serde(rename = "type")]
    pub item_type: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Property name to values; nested items appear as objects.
    pub properties: BTreeMap<String, Vec<Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RdfaItem {
    #[serde(rename = "type")]
    pub type_of: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab: Option<String>,
    pub properties: BTreeMap<String, Vec<String>>,
}

impl StructuredData {
    /// Every type occurrence across all three formats, schema.org prefixes
    /// stripped. Nested entities count too.
    pub fn type_occurrences(&self) -> Vec<String> {
        let mut out = Vec::new();
        for block in &self.json_ld {
            collect_json_ld_types(block, &mut out);
        }
        for item in &self.microdata {
            collect_microdata_types(item, &mut out);
        }
        for item in &self.rdfa {
            out.extend(item.type_of.iter().map(|t| normalize_type(t)));
        }
        out
    }

    /// Distinct types, sorted.
    pub fn types(&self) -> Vec<String> {
        let mut types = self.type_occurrences();
        types.sort();
        types.dedup();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.json_ld.is_empty() && self.microdata.is_empty() && self.rdfa.is_empty()
    }
}

pub fn normalize_type(raw: &str) -> String {
    let trimmed = raw.trim();
    SCHEMA_PREFIXES
        .iter()
        .find_map(|p| trimmed.strip_prefix(p))
        .unwrap_or(trimmed)
        .to_string()
}

fn collect_json_ld_types(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            match map.get("@type") {
                Some(Value::String(t)) => out.push(normalize_type(t)),
                Some(Value::Array(ts)) => {
                    out.extend(ts.iter().filter_map(Value::as_str).map(normalize_type));
                },
                _ => {},
            }
            for (key, v) in map {
                if key != "@type" && key != "@context" {
                    collect_json_ld_types(v, out);
                }
            }
        },
        Value::Array(items) => items.iter().for_each(|v| collect_json_ld_types(v, out)),
        _ => {},
    }
}

fn collect_microdata_types(item: &MicrodataItem, out: &mut Vec<String>) {
    out.extend(item.item_type.iter().map(|t| normalize_type(t)));
    for values in item.properties.values() {
        for v in values {
            if let Ok(nested) = serde_json::from_value::<MicrodataItem>(v.clone())
                && !nested.item_type.is_empty()
            {
                collect_microdata_types(&nested, out);
            }
        }
    }
}

pub(crate) fn select_all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => doc.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn extract_structured_data(doc: &Html) -> StructuredData {
    StructuredData {
        json_ld: extract_json_ld(doc),
        microdata: extract_microdata(doc),
        rdfa: extract_rdfa(doc),
    }
}

fn extract_json_ld(doc: &Html) -> Vec<Value> {
    select_all(doc, r#"script[type="application/ld+json"]"#)
        .into_iter()
        .filter_map(|el| {
            let text = el.text().collect::<String>();
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!(error = %e, "skipping malformed JSON-LD block");
                    None
                },
            }
        })
        .collect()
}

fn itemprop_value(el: &ElementRef<'_>) -> Value {
    let v = el.value();
    let attr = v.attr("content").or_else(|| match v.name() {
        "a" | "link" | "area" => v.attr("href"),
        "img" | "audio" | "video" | "source" | "iframe" | "embed" => v.attr("src"),
        "time" => v.attr("datetime"),
        "data" | "meter" => v.attr("value"),
        "object" => v.attr("data"),
        _ => None,
    });
    Value::String(match attr {
        Some(a) => a.trim().to_string(),
        None => element_text(el),
    })
}

fn microdata_item(scope: &ElementRef<'_>) -> MicrodataItem {
    let mut item = MicrodataItem {
        item_type: scope
            .value()
            .attr("itemtype")
            .map(|t| t.split_whitespace().map(String::from).collect())
            .unwrap_or_default(),
        id: scope.value().attr("itemid").map(String::from),
        properties: BTreeMap::new(),
    };
    collect_itemprops(scope, &mut item.properties);
    item
}

/// Gather `itemprop`s under `el`, not descending into nested scopes.
fn collect_itemprops(el: &ElementRef<'_>, props: &mut BTreeMap<String, Vec<Value>>) {
    for child in el.children().filter_map(ElementRef::wrap) {
        let is_scope = child.value().attr("itemscope").is_some();
        if let Some(names) = child.value().attr("itemprop") {
            let value = if is_scope {
                serde_json::to_value(microdata_item(&child)).unwrap_or(Value::Null)
            } else {
                itemprop_value(&child)
            };
            for name in names.split_whitespace() {
                props.entry(name.to_string()).or_default().push(value.clone());
            }
        }
        if !is_scope {
            collect_itemprops(&child, props);
        }
    }
}

fn extract_microdata(doc: &Html) -> Vec<MicrodataItem> {
    select_all(doc, "[itemscope]")
        .into_iter()
        .filter(|el| el.value().attr("itemprop").is_none())
        .map(|el| microdata_item(&el))
        .collect()
}

fn rdfa_value(el: &ElementRef<'_>) -> String {
    let v = el.value();
    v.attr("content")
        .or_else(|| v.attr("resource"))
        .or_else(|| v.attr("href"))
        .or_else(|| v.attr("src"))
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| element_text(el))
}

fn collect_rdfa_properties(el: &ElementRef<'_>, props: &mut BTreeMap<String, Vec<String>>) {
    for child in el.children().filter_map(ElementRef::wrap) {
        let nested = child.value().attr("typeof").is_some();
        if let Some(names) = child.value().attr("property") {
            let value = if nested {
                child
                    .value()
                    .attr("typeof")
                    .map(normalize_type)
                    .unwrap_or_default()
            } else {
                rdfa_value(&child)
            };
            for name in names.split_whitespace() {
                props
                    .entry(normalize_type(name))
                    .or_default()
                    .push(value.clone());
            }
        }
        if !nested {
            collect_rdfa_properties(&child, props);
        }
    }
}

fn inherited_vocab(el: &ElementRef<'_>) -> Option<String> {
    if let Some(v) = el.value().attr("vocab") {
        return Some(v.to_string());
    }
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find_map(|a| a.value().attr("vocab").map(String::from))
}

fn extract_rdfa(doc: &Html) -> Vec<RdfaItem> {
    select_all(doc, "[typeof]")
        .into_iter()
        .map(|el| {
            let mut properties = BTreeMap::new();
            collect_rdfa_properties(&el, &mut properties);
            RdfaItem {
                type_of: el
                    .value()
                    .attr("typeof")
                    .map(|t| t.split_whitespace().map(String::from).collect())
                    .unwrap_or_default(),
                vocab: inherited_vocab(&el),
                properties,
            }
        })
        .collect()
}
