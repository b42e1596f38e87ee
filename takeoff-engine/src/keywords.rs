//! 图层关键字、开口高度等启发式常量表。

use crate::classify::LayerCategory;

/// 按匹配顺序排列：具体类别在前，墙体这类宽泛类别在后。
pub const CATEGORY_KEYWORDS: &[(LayerCategory, &[&str])] = &[
    (
        LayerCategory::Foundations,
        &["FONDATION", "FOUNDATION", "FOOTING", "SEMELLE", "FNDN"],
    ),
    (
        LayerCategory::Beams,
        &["POUTRE", "BEAM", "LINTEAU", "LINTEL", "CHAINAGE"],
    ),
    (
        LayerCategory::Columns,
        &["POTEAU", "COLUMN", "PILIER", "PILLAR"],
    ),
    (LayerCategory::Slabs, &["DALLE", "DALLAGE", "SLAB", "PLANCHER"]),
    (LayerCategory::Screed, &["CHAPE", "SCREED"]),
    (
        LayerCategory::Tiling,
        &["CARRELAGE", "TILING", "TILE", "FAIENCE", "FAÏENCE"],
    ),
    (
        LayerCategory::Openings,
        &[
            "MENUISERIE",
            "OPENING",
            "DOOR",
            "WINDOW",
            "PORTE",
            "FENETRE",
            "FENÊTRE",
        ],
    ),
    (
        LayerCategory::Fixtures,
        &["SANITAIRE", "SANITARY", "PLUMBING", "FIXTURE"],
    ),
    (
        LayerCategory::Walls,
        &[
            "MUR",
            "WALL",
            "CLOISON",
            "PARTITION",
            "MACONNERIE",
            "MAÇONNERIE",
            "MASONRY",
        ],
    ),
];

/// 块名包含这些关键字时视为门。
pub const DOOR_KEYWORDS: &[&str] = &["PORTE", "DOOR"];
/// 块名包含这些关键字时视为窗。
pub const WINDOW_KEYWORDS: &[&str] = &["FEN", "WINDOW", "VITR"];

pub const DOOR_HEIGHT_M: f64 = 2.10;
pub const WINDOW_HEIGHT_M: f64 = 1.20;

/// 判定近似闭合时允许的现实距离（米）。
pub const CLOSING_ALLOWANCE_M: f64 = 0.005;
pub const MIN_CLOSING_TOLERANCE: f64 = 1e-6;
pub const MAX_CLOSING_TOLERANCE: f64 = 100.0;

/// 长度与面积合计低于该值时提示比例可能有误。
pub const SUSPICIOUS_TOTAL: f64 = 0.01;

/// 声明单位与比例因子之间允许的相对偏差。
pub const UNIT_MISMATCH_TOLERANCE: f64 = 1e-6;

pub const DEFAULT_MAX_BLOCK_DEPTH: usize = 2;
