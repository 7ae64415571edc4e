//! Named CSS-selector attributes, evaluated in the page.

use std::collections::BTreeMap;

use {
    pagemine_browser::PageHandle,
    pagemine_config::AttributeSpec,
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
};

use crate::error::ExtractError;

/// Marker comment identifying the attribute script among evaluated scripts.
pub const ATTRIBUTES_MARKER: &str = "pagemine:attributes";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeValues {
    /// Attribute name to the first match (or `null`), or an array of every
    /// match when the attribute sets `multiple`.
    pub values: BTreeMap<String, Value>,
    /// Attributes whose selector failed, with the page's error message.
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Outcome {
    Error { error: String },
    Value { value: Value },
}

/// Script that resolves every spec in one round trip. Each attribute is
/// isolated so a bad selector only fails its own entry.
pub fn attributes_script(specs: &[AttributeSpec]) -> String {
    let specs = json!(
        specs
            .iter()
            .map(|s| json!({
                "name": s.name,
                "selector": s.selector,
                "attribute": s.attribute,
                "multiple": s.multiple,
            }))
            .collect::<Vec<_>>()
    );
    format!(
        r#"/* {ATTRIBUTES_MARKER} */
((specs) => {{
  const read = (el, attr) => {{
    if (attr) return el.getAttribute(attr);
    return (el.innerText || el.textContent || '').trim();
  }};
  const out = {{}};
  for (const spec of specs) {{
    try {{
      if (spec.multiple) {{
        out[spec.name] = {{ value: Array.from(document.querySelectorAll(spec.selector)).map((el) => read(el, spec.attribute)) }};
      }} else {{
        const el = document.querySelector(spec.selector);
        out[spec.name] = {{ value: el ? read(el, spec.attribute) : null }};
      }}
    }} catch (e) {{
      out[spec.name] = {{ error: String(e && e.message ? e.message : e) }};
    }}
  }}
  return out;
}})({specs})"#
    )
}

/// Decode the script result. Specs missing from the result are reported as
/// errors.
pub fn parse_attribute_result(
    specs: &[AttributeSpec],
    result: Value,
) -> Result<AttributeValues, ExtractError> {
    let mut raw: BTreeMap<String, Outcome> = match result {
        Value::Null => BTreeMap::new(),
        other => serde_json::from_value(other)?,
    };
    let mut out = AttributeValues::default();
    for spec in specs {
        match raw.remove(&spec.name) {
            Some(Outcome::Value { value }) => {
                out.values.insert(spec.name.clone(), value);
            },
            Some(Outcome::Error { error }) => {
                out.errors.insert(spec.name.clone(), error);
            },
            None => {
                out.errors
                    .insert(spec.name.clone(), "no result returned".to_string());
            },
        }
    }
    Ok(out)
}

pub async fn extract_attributes(
    page: &PageHandle,
    specs: &[AttributeSpec],
) -> Result<AttributeValues, ExtractError> {
    if specs.is_empty() {
        return Ok(AttributeValues::default());
    }
    let result = page.evaluate(&attributes_script(specs)).await?;
    parse_attribute_result(specs, result)
}
