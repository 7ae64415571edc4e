//! Decoding of `DOMSnapshot.captureSnapshot` results.
//!
//! The CDP snapshot is columnar: node properties are parallel arrays and
//! strings are indices into a shared table. This module flattens the main
//! document into one record per laid-out element.

use {serde::Deserialize, serde_json::Value};

use crate::error::ExtractError;

/// Computed styles requested from the snapshot, in column order.
pub const COMPUTED_STYLES: [&str; 5] = ["display", "visibility", "opacity", "position", "z-index"];

const ELEMENT_NODE: i64 = 1;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSnapshot {
    documents: Vec<RawDocument>,
    strings: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDocument {
    nodes: RawNodes,
    layout: RawLayout,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawNodes {
    parent_index: Vec<i64>,
    node_type: Vec<i64>,
    node_name: Vec<i64>,
    attributes: Vec<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawLayout {
    node_index: Vec<i64>,
    styles: Vec<Vec<i64>>,
    bounds: Vec<Vec<f64>>,
    paint_orders: Vec<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputedStyle {
    pub display: String,
    pub visibility: String,
    pub opacity: f64,
    pub position: String,
    /// `None` for `auto`.
    pub z_index: Option<i64>,
}

/// One laid-out element of the main document.
#[derive(Debug, Clone)]
pub struct SnapshotElement {
    pub node_index: usize,
    /// Lower-cased tag name.
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    /// Distance from the document node.
    pub depth: usize,
    pub bounds: Rect,
    pub style: ComputedStyle,
    pub paint_order: i64,
}

struct Strings<'a>(&'a [String]);

impl Strings<'_> {
    fn get(&self, idx: i64) -> Option<&str> {
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.0.get(i))
            .map(String::as_str)
    }
}

/// Flatten a raw snapshot into laid-out elements, in layout order.
pub fn parse_snapshot(value: Value) -> Result<Vec<SnapshotElement>, ExtractError> {
    let raw: RawSnapshot =
        serde_json::from_value(value).map_err(|e| ExtractError::Snapshot(e.to_string()))?;
    let Some(doc) = raw.documents.into_iter().next() else {
        return Ok(Vec::new());
    };
    let strings = Strings(&raw.strings);
    let nodes = &doc.nodes;
    let layout = &doc.layout;

    if layout.styles.len() != layout.node_index.len()
        || layout.bounds.len() != layout.node_index.len()
    {
        return Err(ExtractError::Snapshot(format!(
            "layout columns disagree: {} nodes, {} styles, {} bounds",
            layout.node_index.len(),
            layout.styles.len(),
            layout.bounds.len()
        )));
    }

    // parents always precede their children
    let mut depth = vec![0usize; nodes.parent_index.len()];
    for (i, parent) in nodes.parent_index.iter().enumerate() {
        if let Ok(p) = usize::try_from(*parent)
            && p < i
        {
            depth[i] = depth[p] + 1;
        }
    }

    let mut elements = Vec::with_capacity(layout.node_index.len());
    for (row, node_index) in layout.node_index.iter().enumerate() {
        let Ok(idx) = usize::try_from(*node_index) else {
            continue;
        };
        if nodes.node_type.get(idx).copied() != Some(ELEMENT_NODE) {
            continue;
        }
        let tag = nodes
            .node_name
            .get(idx)
            .and_then(|n| strings.get(*n))
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut id = None;
        let mut classes = Vec::new();
        if let Some(attrs) = nodes.attributes.get(idx) {
            for pair in attrs.chunks_exact(2) {
                let (Some(name), Some(value)) = (strings.get(pair[0]), strings.get(pair[1])) else {
                    continue;
                };
                match name {
                    "id" if !value.is_empty() => id = Some(value.to_string()),
                    "class" => classes = value.split_whitespace().map(String::from).collect(),
                    _ => {},
                }
            }
        }

        let style_col = |col: usize| -> String {
            layout.styles[row]
                .get(col)
                .and_then(|s| strings.get(*s))
                .unwrap_or_default()
                .to_string()
        };
        let style = ComputedStyle {
            display: style_col(0),
            visibility: style_col(1),
            opacity: style_col(2).parse().unwrap_or(1.0),
            position: style_col(3),
            z_index: style_col(4).parse().ok(),
        };

        let b = &layout.bounds[row];
        let bounds = Rect {
            x: b.first().copied().unwrap_or_default(),
            y: b.get(1).copied().unwrap_or_default(),
            width: b.get(2).copied().unwrap_or_default(),
            height: b.get(3).copied().unwrap_or_default(),
        };

        elements.push(SnapshotElement {
            node_index: idx,
            tag,
            id,
            classes,
            depth: depth.get(idx).copied().unwrap_or_default(),
            bounds,
            style,
            paint_order: layout.paint_orders.get(row).copied().unwrap_or_default(),
        });
    }
    Ok(elements)
}


#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::{
            fixture::{El, SnapshotBuilder},
            *,
        },
        serde_json::json,
    };

    #[test]
    fn flattens_elements_with_attributes_and_styles() {
        let snapshot = SnapshotBuilder::page(&[El {
            attrs: &[("id", "hero"), ("class", "banner  wide")],
            styles: ["flex", "visible", "0.5", "fixed", "7"],
            paint_order: 12,
            ..El::new("section", 800.0, 200.0)
        }]);
        let els = parse_snapshot(snapshot).unwrap();
        assert_eq!(els.len(), 1);
        let el = &els[0];
        assert_eq!(el.tag, "section");
        assert_eq!(el.id.as_deref(), Some("hero"));
        assert_eq!(el.classes, ["banner", "wide"]);
        assert_eq!(el.depth, 3);
        assert_eq!(el.paint_order, 12);
        assert_eq!(el.style.z_index, Some(7));
        assert_eq!(el.style.position, "fixed");
        assert!((el.style.opacity - 0.5).abs() < f64::EPSILON);
        assert!((el.bounds.area() - 160_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn auto_z_index_is_none() {
        let els = parse_snapshot(SnapshotBuilder::page(&[El::new("div", 10.0, 10.0)])).unwrap();
        assert_eq!(els[0].style.z_index, None);
    }

    #[test]
    fn empty_snapshot_has_no_elements() {
        let els = parse_snapshot(json!({ "documents": [], "strings": [] })).unwrap();
        assert!(els.is_empty());
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let bad = json!({
            "documents": [{ "nodes": {}, "layout": { "nodeIndex": [0], "styles": [], "bounds": [] } }],
            "strings": [],
        });
        assert!(matches!(parse_snapshot(bad), Err(ExtractError::Snapshot(_))));
    }
}
