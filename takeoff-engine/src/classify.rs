use serde::{Deserialize, Serialize};

use crate::keywords::CATEGORY_KEYWORDS;

/// 施工类别；声明顺序即报表中的输出顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LayerCategory {
    Walls,
    Foundations,
    Beams,
    Slabs,
    Screed,
    Tiling,
    Columns,
    Openings,
    Fixtures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryFamily {
    Linear,
    Surface,
    Countable,
}

impl LayerCategory {
    pub const ALL: [LayerCategory; 9] = [
        LayerCategory::Walls,
        LayerCategory::Foundations,
        LayerCategory::Beams,
        LayerCategory::Slabs,
        LayerCategory::Screed,
        LayerCategory::Tiling,
        LayerCategory::Columns,
        LayerCategory::Openings,
        LayerCategory::Fixtures,
    ];

    pub const LINEAR: [LayerCategory; 3] = [
        LayerCategory::Walls,
        LayerCategory::Foundations,
        LayerCategory::Beams,
    ];

    pub const SURFACE: [LayerCategory; 3] = [
        LayerCategory::Slabs,
        LayerCategory::Screed,
        LayerCategory::Tiling,
    ];

    pub fn family(self) -> CategoryFamily {
        match self {
            LayerCategory::Walls | LayerCategory::Foundations | LayerCategory::Beams => {
                CategoryFamily::Linear
            }
            LayerCategory::Slabs | LayerCategory::Screed | LayerCategory::Tiling => {
                CategoryFamily::Surface
            }
            LayerCategory::Columns | LayerCategory::Openings | LayerCategory::Fixtures => {
                CategoryFamily::Countable
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LayerCategory::Walls => "Walls",
            LayerCategory::Foundations => "Foundations",
            LayerCategory::Beams => "Beams",
            LayerCategory::Slabs => "Slabs",
            LayerCategory::Screed => "Screed",
            LayerCategory::Tiling => "Tiling",
            LayerCategory::Columns => "Columns",
            LayerCategory::Openings => "Openings",
            LayerCategory::Fixtures => "Fixtures",
        }
    }
}

/// 去除首尾空白并转为大写。
pub fn normalize_layer(name: &str) -> String {
    name.trim().to_uppercase()
}

/// 按关键字表顺序匹配，首个命中的类别胜出。
pub fn classify_layer(name: &str) -> Option<LayerCategory> {
    let normalized = normalize_layer(name);
    if normalized.is_empty() {
        return None;
    }
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| normalized.contains(kw)))
        .map(|(category, _)| *category)
}
