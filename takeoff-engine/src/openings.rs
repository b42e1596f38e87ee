use serde::{Deserialize, Serialize};
use takeoff_core::{
    document::{BlockDefinition, BlockReference, Drawing, Entity},
    geometry::Bounds2D,
};

use crate::keywords::{DOOR_HEIGHT_M, DOOR_KEYWORDS, WINDOW_HEIGHT_M, WINDOW_KEYWORDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpeningKind {
    Door,
    Window,
}

impl OpeningKind {
    /// 按块名判定门窗类型，同时命中时按门处理。
    pub fn from_block_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_uppercase();
        if DOOR_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
            Some(OpeningKind::Door)
        } else if WINDOW_KEYWORDS.iter().any(|kw| upper.contains(kw)) {
            Some(OpeningKind::Window)
        } else {
            None
        }
    }

    pub fn assumed_height_m(self) -> f64 {
        match self {
            OpeningKind::Door => DOOR_HEIGHT_M,
            OpeningKind::Window => WINDOW_HEIGHT_M,
        }
    }
}

/// 块局部包围盒的较长边，仅统计直接包含的直线端点与多段线顶点。
pub fn block_local_width(block: &BlockDefinition) -> Option<f64> {
    let mut bounds = Bounds2D::empty();
    for entity in &block.entities {
        match entity {
            Entity::Line(line) => {
                bounds.include_point(line.start);
                bounds.include_point(line.end);
            }
            Entity::Polyline(polyline) => {
                for vertex in &polyline.vertices {
                    bounds.include_point(vertex.position);
                }
            }
            _ => {}
        }
    }
    if bounds.is_empty() {
        None
    } else {
        Some(bounds.width().max(bounds.height()))
    }
}

/// 估算单个门窗块引用的开口面积（平方米）；无法估算时为 0。
pub fn estimate_opening_area(drawing: &Drawing, reference: &BlockReference, scale_factor: f64) -> f64 {
    let Some(kind) = OpeningKind::from_block_name(&reference.name) else {
        return 0.0;
    };
    let Some(width) = drawing.block(&reference.name).and_then(block_local_width) else {
        return 0.0;
    };
    let instance_scale = reference.scale.x().abs().max(reference.scale.y().abs());
    let area = width * instance_scale * scale_factor * kind.assumed_height_m();
    if area.is_finite() { area.max(0.0) } else { 0.0 }
}
