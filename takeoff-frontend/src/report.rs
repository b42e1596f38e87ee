//! 报表渲染：对齐的文本表格或 JSON。

use std::fmt::Write;

use takeoff_engine::{RowCategory, TakeoffRow, Unit};

use crate::errors::FrontendError;
use crate::loader::TakeoffReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
}

pub fn render(report: &TakeoffReport, format: ReportFormat) -> Result<String, FrontendError> {
    match format {
        ReportFormat::Table => Ok(render_table(report)),
        ReportFormat::Json => render_json(report),
    }
}

pub fn render_json(report: &TakeoffReport) -> Result<String, FrontendError> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn format_quantity(row: &TakeoffRow) -> String {
    match row.unit {
        Unit::Count => format!("{}", row.quantity.round() as u64),
        Unit::Meters | Unit::SquareMeters => format!("{:.2}", row.quantity),
    }
}

fn pad_right(text: &str, width: usize) -> String {
    let len = text.chars().count();
    let mut out = text.to_string();
    out.extend(std::iter::repeat_n(' ', width.saturating_sub(len)));
    out
}

fn pad_left(text: &str, width: usize) -> String {
    let len = text.chars().count();
    let mut out: String = std::iter::repeat_n(' ', width.saturating_sub(len)).collect();
    out.push_str(text);
    out
}

/// 按类别分组输出，诊断附在表格之后。
pub fn render_table(report: &TakeoffReport) -> String {
    let quantities: Vec<String> = report.rows.iter().map(format_quantity).collect();
    let name_width = report
        .rows
        .iter()
        .map(|row| row.designation.chars().count())
        .chain(std::iter::once("Designation".len()))
        .max()
        .unwrap_or(0);
    let quantity_width = quantities
        .iter()
        .map(|q| q.chars().count())
        .chain(std::iter::once("Quantity".len()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(out, "Takeoff: {}", report.source.display());
    let _ = writeln!(
        out,
        "Scale factor: {} m/unit, wall height: {} m, drawing units: {}",
        report.scale_factor,
        report.wall_height_m,
        report.units.label()
    );
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{}  {}  Unit",
        pad_right("Designation", name_width),
        pad_left("Quantity", quantity_width)
    );
    let _ = writeln!(out, "{}", "-".repeat(name_width + quantity_width + 8));

    let mut current: Option<RowCategory> = None;
    for (row, quantity) in report.rows.iter().zip(&quantities) {
        if current != Some(row.category) {
            let _ = writeln!(out, "[{}]", row.category.label());
            current = Some(row.category);
        }
        let _ = writeln!(
            out,
            "{}  {}  {}",
            pad_right(&row.designation, name_width),
            pad_left(quantity, quantity_width),
            row.unit.symbol()
        );
    }

    if !report.diagnostics.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Diagnostics:");
        for diagnostic in &report.diagnostics {
            let _ = writeln!(out, "  [{}] {}", diagnostic.level.label(), diagnostic.message);
        }
    }
    out
}
