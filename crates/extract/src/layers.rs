//! Visual layer model: effective stacking depth and importance per element.

use serde::{Deserialize, Serialize};

use crate::snapshot::{Rect, SnapshotElement};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[default]
    Static,
    Relative,
    Absolute,
    Fixed,
    Sticky,
}

impl Position {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "relative" => Self::Relative,
            "absolute" => Self::Absolute,
            "fixed" => Self::Fixed,
            "sticky" | "-webkit-sticky" => Self::Sticky,
            _ => Self::Static,
        }
    }

    /// Stacking bonus added to the paint order.
    pub fn bonus(self) -> i64 {
        match self {
            Self::Fixed => 10_000,
            Self::Sticky => 5_000,
            Self::Absolute => 1_000,
            Self::Relative => 100,
            Self::Static => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub node_index: usize,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    pub bounds: Rect,
    pub position: Position,
    pub z_index: Option<i64>,
    pub paint_order: i64,
    /// Effective stacking depth.
    pub z: i64,
    pub opacity: f64,
    pub importance: f64,
    pub depth: usize,
}

/// Semantic weight of a tag, shared by layers and the DOM hierarchy.
pub fn tag_weight(tag: &str) -> f64 {
    match tag {
        "h1" => 1.0,
        "h2" => 0.9,
        "h3" => 0.8,
        "h4" | "h5" | "h6" => 0.7,
        "main" | "article" => 0.7,
        "header" | "nav" | "footer" | "form" => 0.6,
        "img" | "video" | "picture" => 0.6,
        "button" | "a" | "input" | "select" | "textarea" => 0.5,
        "section" | "aside" | "p" | "li" | "table" => 0.4,
        "span" | "label" => 0.2,
        "div" => 0.1,
        _ => 0.3,
    }
}

/// `paint_order + z_index * 100 + position bonus`; `auto` counts as 0.
pub fn effective_z(paint_order: i64, z_index: Option<i64>, position: Position) -> i64 {
    paint_order
        .saturating_add(z_index.unwrap_or(0).saturating_mul(100))
        .saturating_add(position.bonus())
}

fn area_bonus(area: f64) -> f64 {
    if area >= 100_000.0 {
        0.3
    } else if area >= 10_000.0 {
        0.2
    } else if area >= 1_000.0 {
        0.1
    } else {
        0.0
    }
}

fn depth_bonus(z: i64) -> f64 {
    if z >= 10_000 {
        0.2
    } else if z >= 1_000 {
        0.1
    } else if z >= 100 {
        0.05
    } else {
        0.0
    }
}

fn is_rendered(el: &SnapshotElement) -> bool {
    el.style.display != "none" && el.style.visibility != "hidden" && el.bounds.area() > 0.0
}

pub fn importance(el: &SnapshotElement, z: i64) -> f64 {
    if !is_rendered(el) {
        return 0.0;
    }
    let opacity = el.style.opacity.clamp(0.0, 1.0);
    let raw = tag_weight(&el.tag) + area_bonus(el.bounds.area()) + depth_bonus(z);
    raw.clamp(0.0, 1.0) * opacity
}

/// Score every element, drop those under `min_importance` and rank the rest
/// by importance then depth, keeping at most `max_layers`.
pub fn build_layers(
    elements: Vec<SnapshotElement>,
    min_importance: f64,
    max_layers: usize,
) -> Vec<Layer> {
    let mut layers: Vec<Layer> = elements
        .into_iter()
        .filter_map(|el| {
            let position = Position::parse(&el.style.position);
            let z = effective_z(el.paint_order, el.style.z_index, position);
            let importance = importance(&el, z);
            if importance <= 0.0 || importance < min_importance {
                return None;
            }
            Some(Layer {
                node_index: el.node_index,
                z_index: el.style.z_index,
                opacity: el.style.opacity,
                tag: el.tag,
                id: el.id,
                classes: el.classes,
                bounds: el.bounds,
                position,
                paint_order: el.paint_order,
                z,
                importance,
                depth: el.depth,
            })
        })
        .collect();

    layers.sort_by(|a, b| {
        b.importance
            .total_cmp(&a.importance)
            .then_with(|| b.z.cmp(&a.z))
    });
    layers.truncate(max_layers);
    layers
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::snapshot::{
            fixture::{El, SnapshotBuilder},
            parse_snapshot,
        },
        rstest::rstest,
    };

    fn layers(elements: &[El<'_>], min: f64) -> Vec<Layer> {
        build_layers(parse_snapshot(SnapshotBuilder::page(elements)).unwrap(), min, 100)
    }

    #[rstest]
    #[case(Position::Static, None, 7)]
    #[case(Position::Relative, Some(2), 307)]
    #[case(Position::Absolute, Some(-1), 907)]
    #[case(Position::Sticky, Some(1), 5_107)]
    #[case(Position::Fixed, Some(5), 10_507)]
    fn z_formula(#[case] position: Position, #[case] z_index: Option<i64>, #[case] z: i64) {
        assert_eq!(effective_z(7, z_index, position), z);
    }

    #[test]
    fn fixed_element_outranks_relative_sibling() {
        let out = layers(
            &[
                El {
                    attrs: &[("id", "rel")],
                    styles: ["block", "visible", "1", "relative", "5"],
                    paint_order: 3,
                    ..El::new("div", 50.0, 50.0)
                },
                El {
                    attrs: &[("id", "modal")],
                    styles: ["block", "visible", "1", "fixed", "5"],
                    paint_order: 4,
                    ..El::new("div", 50.0, 50.0)
                },
            ],
            0.0,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id.as_deref(), Some("modal"));
        assert_eq!(out[0].z, 4 + 500 + 10_000);
        assert_eq!(out[0].position, Position::Fixed);
        assert_eq!(out[1].z, 3 + 500 + 100);
        assert!(out[0].importance > out[1].importance);
    }

    #[test]
    fn equal_importance_breaks_ties_by_z() {
        let out = layers(
            &[
                El {
                    attrs: &[("id", "low")],
                    paint_order: 2,
                    ..El::new("p", 10.0, 10.0)
                },
                El {
                    attrs: &[("id", "high")],
                    paint_order: 9,
                    ..El::new("p", 10.0, 10.0)
                },
            ],
            0.0,
        );
        assert_eq!(out[0].id.as_deref(), Some("high"));
    }

    #[test]
    fn hidden_and_empty_elements_are_dropped() {
        let out = layers(
            &[
                El {
                    styles: ["none", "visible", "1", "static", "auto"],
                    ..El::new("h1", 500.0, 50.0)
                },
                El {
                    styles: ["block", "hidden", "1", "static", "auto"],
                    ..El::new("h1", 500.0, 50.0)
                },
                El::new("h2", 0.0, 40.0),
                El::new("h3", 200.0, 40.0),
            ],
            0.0,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tag, "h3");
    }

    #[test]
    fn importance_scales_with_opacity_and_clamps() {
        let out = layers(
            &[
                El {
                    styles: ["block", "visible", "0.5", "fixed", "1"],
                    ..El::new("h1", 1000.0, 200.0)
                },
            ],
            0.0,
        );
        assert!((out[0].importance - 0.5).abs() < 1e-9);
    }

    #[test]
    fn threshold_and_limit_apply() {
        let elements = [
            El::new("div", 10.0, 10.0),
            El::new("h1", 400.0, 60.0),
            El::new("nav", 400.0, 60.0),
        ];
        let out = layers(&elements, 0.3);
        assert_eq!(
            out.iter().map(|l| l.tag.as_str()).collect::<Vec<_>>(),
            ["h1", "nav"]
        );
        let out = build_layers(
            parse_snapshot(SnapshotBuilder::page(&elements)).unwrap(),
            0.0,
            1,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].tag, "h1");
    }
}
