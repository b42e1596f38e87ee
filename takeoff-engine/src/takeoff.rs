//! 汇总：展开块、分类、计量并生成有序的报表行与诊断。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use takeoff_core::curve::{DEFAULT_MAX_STEP_DEG, MIN_STEP_DEG};
use takeoff_core::document::{Drawing, Entity};
use tracing::debug;

use crate::classify::{CategoryFamily, LayerCategory, classify_layer};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::errors::TakeoffError;
use crate::flatten::BlockFlattener;
use crate::keywords::{DEFAULT_MAX_BLOCK_DEPTH, SUSPICIOUS_TOTAL, UNIT_MISMATCH_TOLERANCE};
use crate::measure::{MeasureContext, measure};
use crate::openings::estimate_opening_area;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
    pub max_block_depth: usize,
    pub arc_step_deg: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_block_depth: DEFAULT_MAX_BLOCK_DEPTH,
            arc_step_deg: DEFAULT_MAX_STEP_DEG,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "m")]
    Meters,
    #[serde(rename = "m²")]
    SquareMeters,
    #[serde(rename = "U")]
    Count,
}

impl Unit {
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Meters => "m",
            Unit::SquareMeters => "m²",
            Unit::Count => "U",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowCategory {
    Linear,
    Surface,
    Units,
    Deductions,
}

impl RowCategory {
    pub fn label(self) -> &'static str {
        match self {
            RowCategory::Linear => "Linear",
            RowCategory::Surface => "Surface",
            RowCategory::Units => "Units",
            RowCategory::Deductions => "Deductions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeoffRow {
    pub designation: String,
    pub quantity: f64,
    pub unit: Unit,
    pub category: RowCategory,
}

impl TakeoffRow {
    fn new(designation: impl Into<String>, quantity: f64, unit: Unit, category: RowCategory) -> Self {
        Self {
            designation: designation.into(),
            quantity,
            unit,
            category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Takeoff {
    pub rows: Vec<TakeoffRow>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Takeoff {
    pub fn row(&self, designation: &str) -> Option<&TakeoffRow> {
        self.rows.iter().find(|row| row.designation == designation)
    }

    pub fn quantity(&self, designation: &str) -> Option<f64> {
        self.row(designation).map(|row| row.quantity)
    }
}

pub fn length_designation(category: LayerCategory) -> String {
    format!("{} — Total length", category.label())
}

pub fn surface_designation(category: LayerCategory) -> String {
    format!("{} — Total surface", category.label())
}

pub fn count_designation(category: LayerCategory, block: &str) -> String {
    format!("{} — {block}", category.label())
}

pub const GROSS_WALL_DESIGNATION: &str = "Walls — Gross surface (length × height)";
pub const OPENINGS_DESIGNATION: &str = "Openings — Estimated surface";
pub const NET_WALL_DESIGNATION: &str = "Walls — Net surface (gross − openings)";

/// 使用默认展开深度与离散步长提取工程量。
pub fn extract(
    drawing: &Drawing,
    scale_factor: f64,
    wall_height_m: f64,
) -> Result<Takeoff, TakeoffError> {
    extract_with_options(drawing, scale_factor, wall_height_m, &ExtractOptions::default())
}

pub fn extract_with_options(
    drawing: &Drawing,
    scale_factor: f64,
    wall_height_m: f64,
    options: &ExtractOptions,
) -> Result<Takeoff, TakeoffError> {
    if !scale_factor.is_finite() || scale_factor <= 0.0 {
        return Err(TakeoffError::InvalidScaleFactor(scale_factor));
    }
    if !wall_height_m.is_finite() || wall_height_m < 0.0 {
        return Err(TakeoffError::InvalidWallHeight(wall_height_m));
    }
    if !options.arc_step_deg.is_finite() || options.arc_step_deg < MIN_STEP_DEG {
        return Err(TakeoffError::InvalidArcStep {
            got: options.arc_step_deg,
            min: MIN_STEP_DEG,
        });
    }

    let mut diagnostics = Diagnostics::new();
    report_reader_notes(drawing, scale_factor, &mut diagnostics);

    let flattener = BlockFlattener::new(drawing, options.max_block_depth, options.arc_step_deg);
    let flat = flattener.flatten(&mut diagnostics);

    let ctx = MeasureContext {
        scale_factor,
        arc_step_deg: options.arc_step_deg,
    };

    let mut lengths: BTreeMap<LayerCategory, f64> = BTreeMap::new();
    let mut areas: BTreeMap<LayerCategory, f64> = BTreeMap::new();
    let mut counts: BTreeMap<(LayerCategory, String), usize> = BTreeMap::new();
    let mut unclassified: BTreeSet<&str> = BTreeSet::new();
    let mut seen: BTreeSet<LayerCategory> = BTreeSet::new();
    let mut openings_area = 0.0;
    let mut classified = 0usize;
    let mut measured = 0usize;

    for item in &flat {
        let Some(category) = classify_layer(item.layer) else {
            unclassified.insert(item.layer.trim());
            continue;
        };
        classified += 1;
        seen.insert(category);

        match category.family() {
            CategoryFamily::Countable => {
                if let Entity::BlockReference(reference) = item.entity.as_ref() {
                    *counts.entry((category, reference.name.clone())).or_insert(0) += 1;
                    if category == LayerCategory::Openings {
                        openings_area += estimate_opening_area(drawing, reference, scale_factor);
                    }
                }
            }
            family => {
                if matches!(item.entity.as_ref(), Entity::BlockReference(_)) {
                    continue;
                }
                match measure(&item.entity, &ctx) {
                    Ok(measurement) => {
                        measured += 1;
                        if family == CategoryFamily::Linear {
                            *lengths.entry(category).or_insert(0.0) += measurement.length_m;
                        } else {
                            *areas.entry(category).or_insert(0.0) += measurement.area_m2;
                        }
                    }
                    Err(err) => {
                        debug!(kind = item.entity.kind(), layer = item.layer, error = %err, "实体计量失败，已跳过");
                        diagnostics.warning(format!(
                            "Skipped {} on layer `{}`: {err}",
                            item.entity.kind(),
                            item.layer
                        ));
                    }
                }
            }
        }
    }

    if !unclassified.is_empty() {
        let names: Vec<&str> = unclassified
            .iter()
            .map(|name| if name.is_empty() { "<unnamed>" } else { name })
            .collect();
        diagnostics.info(format!(
            "Layers not matching any category (ignored): {}",
            names.join(", ")
        ));
    }

    if classified == 0 {
        diagnostics.warning(
            "No entity matched a known category; check the layer naming of the drawing",
        );
    } else {
        let missing: Vec<&str> = LayerCategory::ALL
            .iter()
            .filter(|category| !seen.contains(category))
            .map(|category| category.label())
            .collect();
        if !missing.is_empty() {
            diagnostics.info(format!(
                "No layer found for categories: {}",
                missing.join(", ")
            ));
        }
    }

    let total: f64 = lengths.values().sum::<f64>() + areas.values().sum::<f64>();
    if measured > 0 && total < SUSPICIOUS_TOTAL {
        diagnostics.warning(format!(
            "Extracted quantities are implausibly small (total {total:.6}); the scale factor {scale_factor} may be wrong"
        ));
    }

    let mut rows = Vec::new();
    for category in LayerCategory::LINEAR {
        rows.push(TakeoffRow::new(
            length_designation(category),
            lengths.get(&category).copied().unwrap_or(0.0),
            Unit::Meters,
            RowCategory::Linear,
        ));
    }
    for category in LayerCategory::SURFACE {
        rows.push(TakeoffRow::new(
            surface_designation(category),
            areas.get(&category).copied().unwrap_or(0.0),
            Unit::SquareMeters,
            RowCategory::Surface,
        ));
    }
    for ((category, block), count) in &counts {
        rows.push(TakeoffRow::new(
            count_designation(*category, block),
            *count as f64,
            Unit::Count,
            RowCategory::Units,
        ));
    }

    let wall_length = lengths.get(&LayerCategory::Walls).copied().unwrap_or(0.0);
    if wall_length > 0.0 && wall_height_m > 0.0 {
        let gross = wall_length * wall_height_m;
        let openings = openings_area.max(0.0);
        let net = (gross - openings).max(0.0);
        rows.push(TakeoffRow::new(
            GROSS_WALL_DESIGNATION,
            gross,
            Unit::SquareMeters,
            RowCategory::Deductions,
        ));
        rows.push(TakeoffRow::new(
            OPENINGS_DESIGNATION,
            openings,
            Unit::SquareMeters,
            RowCategory::Deductions,
        ));
        rows.push(TakeoffRow::new(
            NET_WALL_DESIGNATION,
            net,
            Unit::SquareMeters,
            RowCategory::Deductions,
        ));
    }

    debug!(
        entities = flat.len(),
        classified,
        measured,
        rows = rows.len(),
        diagnostics = diagnostics.len(),
        "工程量提取完成"
    );

    Ok(Takeoff {
        rows,
        diagnostics: diagnostics.into_vec(),
    })
}

/// 读取阶段留下的提示：声明单位、未支持类型与被拒绝的实体。
fn report_reader_notes(drawing: &Drawing, scale_factor: f64, diagnostics: &mut Diagnostics) {
    let units = drawing.units();
    if let Some(meters) = units.meters_per_unit() {
        if ((meters - scale_factor) / meters).abs() > UNIT_MISMATCH_TOLERANCE {
            diagnostics.info(format!(
                "Drawing declares its units as {} (1 unit = {meters} m) but the scale factor is {scale_factor}",
                units.label()
            ));
        }
    }

    if !drawing.unsupported().is_empty() {
        let summary: Vec<String> = drawing
            .unsupported()
            .iter()
            .map(|(kind, count)| format!("{kind} ×{count}"))
            .collect();
        diagnostics.info(format!(
            "Entity kinds not supported by the reader were ignored: {}",
            summary.join(", ")
        ));
    }

    for rejected in drawing.rejected() {
        diagnostics.warning(format!(
            "Malformed {} skipped while reading: {}",
            rejected.kind, rejected.reason
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use takeoff_core::document::DrawingUnits;
    use takeoff_core::geometry::Point2;

    use crate::diagnostics::DiagnosticLevel;

    #[test]
    fn invalid_parameters_are_rejected() {
        let drawing = Drawing::new();
        assert_eq!(
            extract(&drawing, 0.0, 2.8),
            Err(TakeoffError::InvalidScaleFactor(0.0))
        );
        assert!(matches!(
            extract(&drawing, f64::NAN, 2.8),
            Err(TakeoffError::InvalidScaleFactor(_))
        ));
        assert_eq!(
            extract(&drawing, 0.001, -1.0),
            Err(TakeoffError::InvalidWallHeight(-1.0))
        );
    }

    #[test]
    fn arc_step_below_floor_is_rejected() {
        let mut drawing = Drawing::new();
        drawing.add_arc(Point2::new(0.0, 0.0), 1000.0, 0.0, 1.0, "MURS");
        for step in [1e-9, 0.0, -5.0, f64::NAN] {
            let options = ExtractOptions {
                arc_step_deg: step,
                ..ExtractOptions::default()
            };
            assert!(
                matches!(
                    extract_with_options(&drawing, 0.001, 2.8, &options),
                    Err(TakeoffError::InvalidArcStep { .. })
                ),
                "step {step}"
            );
        }

        let finest = ExtractOptions {
            arc_step_deg: MIN_STEP_DEG,
            ..ExtractOptions::default()
        };
        let takeoff = extract_with_options(&drawing, 0.001, 0.0, &finest).expect("finest step");
        let walls = takeoff.quantity("Walls — Total length").expect("walls row");
        assert!((walls - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fixed_rows_are_always_present() {
        let takeoff = extract(&Drawing::new(), 0.001, 2.8).expect("empty drawing");
        let designations: Vec<_> = takeoff.rows.iter().map(|r| r.designation.as_str()).collect();
        assert_eq!(
            designations,
            [
                "Walls — Total length",
                "Foundations — Total length",
                "Beams — Total length",
                "Slabs — Total surface",
                "Screed — Total surface",
                "Tiling — Total surface",
            ]
        );
        assert!(takeoff.rows.iter().all(|r| r.quantity == 0.0));
    }

    #[test]
    fn unit_hint_is_emitted_on_mismatch_only() {
        let mut drawing = Drawing::new();
        drawing.set_units(DrawingUnits::Millimeters);
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(1000.0, 0.0), "MURS");

        let matching = extract(&drawing, 0.001, 0.0).expect("matching units");
        assert!(!matching
            .diagnostics
            .iter()
            .any(|d| d.message.contains("declares its units")));

        let mismatched = extract(&drawing, 0.01, 0.0).expect("mismatched units");
        let hint = mismatched
            .diagnostics
            .iter()
            .find(|d| d.message.contains("declares its units"))
            .expect("unit hint");
        assert_eq!(hint.level, DiagnosticLevel::Info);
    }

    #[test]
    fn reader_notes_become_diagnostics() {
        let mut drawing = Drawing::new();
        drawing.note_unsupported("TEXT");
        drawing.note_unsupported("TEXT");
        drawing.note_rejected("LINE", "LINE 缺少终点 Y（组码 21）");
        let takeoff = extract(&drawing, 0.001, 2.8).expect("notes");

        assert!(takeoff
            .diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Info && d.message.contains("TEXT ×2")));
        assert!(takeoff
            .diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warning && d.message.contains("Malformed LINE")));
    }

    #[test]
    fn categories_without_layers_are_listed() {
        let mut drawing = Drawing::new();
        drawing.add_line(Point2::new(0.0, 0.0), Point2::new(1000.0, 0.0), "MURS");
        drawing.add_polyline(
            [
                Point2::new(0.0, 0.0),
                Point2::new(1000.0, 0.0),
                Point2::new(1000.0, 1000.0),
            ],
            true,
            "DALLE",
        );
        let takeoff = extract(&drawing, 0.001, 0.0).expect("extract");
        let note = takeoff
            .diagnostics
            .iter()
            .find(|d| d.message.starts_with("No layer found for categories"))
            .expect("missing categories note");
        assert_eq!(note.level, DiagnosticLevel::Info);
        assert_eq!(
            note.message,
            "No layer found for categories: Foundations, Beams, Screed, Tiling, Columns, Openings, Fixtures"
        );

        // 图纸完全无法识别时只给出总体警告
        let empty = extract(&Drawing::new(), 0.001, 0.0).expect("empty");
        assert!(
            !empty
                .diagnostics
                .iter()
                .any(|d| d.message.starts_with("No layer found for categories"))
        );
    }

    #[test]
    fn units_serialize_as_symbols() {
        let row = TakeoffRow::new("Slabs — Total surface", 1.0, Unit::SquareMeters, RowCategory::Surface);
        let json = serde_json::to_value(&row).expect("serialize row");
        assert_eq!(json["unit"], "m²");
        assert_eq!(json["category"], "Surface");
        assert_eq!(Unit::Count.symbol(), "U");
        assert_eq!(RowCategory::Deductions.label(), "Deductions");
    }
}
