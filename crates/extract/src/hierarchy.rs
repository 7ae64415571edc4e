//! Semantic DOM hierarchy, walked in the page and scored here.

use serde::{Deserialize, Serialize};

use crate::layers::tag_weight;

/// Marker comment identifying the hierarchy walk among evaluated scripts.
pub const HIERARCHY_MARKER: &str = "pagemine:hierarchy";

const STRUCTURED_ATTRS: [&str; 5] = ["itemscope", "itemtype", "itemprop", "typeof", "property"];

/// In-page walk of `document.body` down to `max_depth`.
pub fn hierarchy_script(max_depth: usize) -> String {
    format!(
        r#"/* {HIERARCHY_MARKER} */
((maxDepth) => {{
  const walk = (el, depth) => {{
    const node = {{
      tag: el.tagName.toLowerCase(),
      id: el.id || null,
      classes: Array.from(el.classList || []),
      role: el.getAttribute('role'),
      attributes: Array.from(el.attributes || []).map((a) => a.name),
      textLength: (el.textContent || '').trim().length,
      children: [],
    }};
    if (depth < maxDepth) {{
      for (const child of el.children) node.children.push(walk(child, depth + 1));
    }}
    return node;
  }};
  return document.body ? walk(document.body, 0) : null;
}})({max_depth})"#
    )
}

/// Node as returned by [`hierarchy_script`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawNode {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub role: Option<String>,
    pub attributes: Vec<String>,
    pub text_length: usize,
    pub children: Vec<RawNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub text_length: usize,
    pub score: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// Number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }
}

pub fn score_node(node: &RawNode) -> f64 {
    let mut score = tag_weight(&node.tag);
    let has_aria = node.attributes.iter().any(|a| a.starts_with("aria-"));
    if node.role.as_deref().is_some_and(|r| !r.is_empty()) || has_aria {
        score += 0.2;
    }
    if node
        .attributes
        .iter()
        .any(|a| STRUCTURED_ATTRS.contains(&a.as_str()))
    {
        score += 0.2;
    }
    if node.id.as_deref().is_some_and(|id| !id.is_empty()) {
        score += 0.1;
    }
    if node.text_length > 200 {
        score += 0.2;
    } else if node.text_length > 50 {
        score += 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// Score the tree, keeping nodes at or above `min_score` and the ancestors
/// of kept nodes.
pub fn build_hierarchy(node: RawNode, min_score: f64) -> Option<HierarchyNode> {
    let score = score_node(&node);
    let children: Vec<HierarchyNode> = node
        .children
        .into_iter()
        .filter_map(|c| build_hierarchy(c, min_score))
        .collect();
    if score < min_score && children.is_empty() {
        return None;
    }
    Some(HierarchyNode {
        tag: node.tag,
        id: node.id.filter(|id| !id.is_empty()),
        classes: node.classes,
        role: node.role.filter(|r| !r.is_empty()),
        text_length: node.text_length,
        score,
        children,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn raw(value: serde_json::Value) -> RawNode {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn score_components_add_up() {
        let node = raw(json!({
            "tag": "div",
            "id": "cart",
            "role": "region",
            "attributes": ["id", "role", "itemscope"],
            "textLength": 80,
        }));
        // 0.1 div + 0.2 role + 0.2 microdata + 0.1 id + 0.1 text
        assert!((score_node(&node) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn aria_attribute_counts_as_accessibility() {
        let node = raw(json!({ "tag": "span", "attributes": ["aria-label"] }));
        assert!((score_node(&node) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped() {
        let node = raw(json!({
            "tag": "h1",
            "id": "t",
            "role": "heading",
            "textLength": 500,
        }));
        assert!((score_node(&node) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ancestors_of_kept_nodes_survive() {
        let tree = raw(json!({
            "tag": "body",
            "children": [
                { "tag": "div", "children": [
                    { "tag": "div", "children": [ { "tag": "h1", "textLength": 20 } ] },
                    { "tag": "span" },
                ]},
                { "tag": "div" },
            ],
        }));
        let kept = build_hierarchy(tree, 0.5).unwrap();
        assert_eq!(kept.tag, "body");
        assert_eq!(kept.children.len(), 1);
        let path = &kept.children[0].children[0];
        assert_eq!(path.children[0].tag, "h1");
        assert_eq!(kept.node_count(), 4);
    }

    #[test]
    fn nothing_important_yields_none() {
        let tree = raw(json!({ "tag": "body", "children": [{ "tag": "div" }] }));
        assert!(build_hierarchy(tree, 0.5).is_none());
    }

    #[test]
    fn script_embeds_depth_and_marker() {
        let script = hierarchy_script(7);
        assert!(script.contains(HIERARCHY_MARKER));
        assert!(script.trim_end().ends_with("})(7)"));
    }
}
