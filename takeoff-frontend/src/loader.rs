use std::path::PathBuf;

use serde::Serialize;
use takeoff_core::document::DrawingUnits;
use takeoff_engine::{Diagnostic, DiagnosticLevel, ExtractOptions, TakeoffRow, extract_with_options};
use takeoff_io::{DrawingLoader, DxfFacade};
use tracing::{info, warn};

use crate::errors::FrontendError;

/// 一次提取请求：图纸路径与全部提取参数。
#[derive(Debug, Clone)]
pub struct TakeoffRequest {
    pub path: PathBuf,
    pub scale_factor: f64,
    pub wall_height_m: f64,
    pub options: ExtractOptions,
}

/// 提取结果及其来源信息，可直接序列化输出。
#[derive(Debug, Clone, Serialize)]
pub struct TakeoffReport {
    pub source: PathBuf,
    pub units: DrawingUnits,
    pub scale_factor: f64,
    pub wall_height_m: f64,
    pub entity_count: usize,
    pub rows: Vec<TakeoffRow>,
    pub diagnostics: Vec<Diagnostic>,
}

impl TakeoffReport {
    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Warning)
            .count()
    }
}

pub fn run_request(request: &TakeoffRequest) -> Result<TakeoffReport, FrontendError> {
    run_request_with(&DxfFacade::new(), request)
}

/// 使用指定加载器读取图纸并提取工程量。
pub fn run_request_with(
    loader: &dyn DrawingLoader,
    request: &TakeoffRequest,
) -> Result<TakeoffReport, FrontendError> {
    let path = &request.path;
    let drawing = match loader.load(path) {
        Ok(drawing) => {
            info!(
                path = %path.display(),
                entities = drawing.entity_count(),
                blocks = drawing.blocks().count(),
                "从 DXF 加载图纸成功"
            );
            drawing
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "加载 DXF 失败");
            return Err(err.into());
        }
    };

    let takeoff = extract_with_options(
        &drawing,
        request.scale_factor,
        request.wall_height_m,
        &request.options,
    )?;

    let report = TakeoffReport {
        source: path.clone(),
        units: drawing.units(),
        scale_factor: request.scale_factor,
        wall_height_m: request.wall_height_m,
        entity_count: drawing.entity_count(),
        rows: takeoff.rows,
        diagnostics: takeoff.diagnostics,
    };
    info!(
        rows = report.rows.len(),
        diagnostics = report.diagnostics.len(),
        warnings = report.warning_count(),
        "工程量提取完成"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use takeoff_core::document::Drawing;
    use takeoff_core::geometry::Point2;
    use takeoff_engine::TakeoffError;
    use takeoff_io::IoError;

    struct FixedLoader;

    impl DrawingLoader for FixedLoader {
        fn load(&self, _path: &Path) -> Result<Drawing, IoError> {
            let mut drawing = Drawing::new();
            drawing.add_line(Point2::new(0.0, 0.0), Point2::new(2000.0, 0.0), "MURS");
            Ok(drawing)
        }
    }

    fn request(path: impl Into<PathBuf>) -> TakeoffRequest {
        TakeoffRequest {
            path: path.into(),
            scale_factor: 0.001,
            wall_height_m: 2.5,
            options: ExtractOptions::default(),
        }
    }

    #[test]
    fn report_carries_rows_and_metadata() {
        let report = run_request_with(&FixedLoader, &request("plan.dxf")).expect("report");
        assert_eq!(report.entity_count, 1);
        assert_eq!(report.source, PathBuf::from("plan.dxf"));
        let walls = report
            .rows
            .iter()
            .find(|r| r.designation == "Walls — Total length")
            .expect("walls row");
        assert!((walls.quantity - 2.0).abs() < 1e-9);
        assert!(report.rows.iter().any(|r| r.designation.starts_with("Walls — Net")));
    }

    #[test]
    fn invalid_parameters_surface_as_takeoff_errors() {
        let mut bad = request("plan.dxf");
        bad.scale_factor = 0.0;
        let err = run_request_with(&FixedLoader, &bad).unwrap_err();
        assert!(matches!(
            err,
            FrontendError::Takeoff(TakeoffError::InvalidScaleFactor(_))
        ));
    }

    #[test]
    fn reads_dxf_from_disk() {
        let mut file = tempfile::Builder::new()
            .suffix(".dxf")
            .tempfile()
            .expect("temp dxf");
        write!(
            file,
            "0\nSECTION\n2\nENTITIES\n0\nLINE\n8\nWALLS\n10\n0\n20\n0\n11\n1000\n21\n0\n0\nENDSEC\n0\nEOF\n"
        )
        .unwrap();

        let report = run_request(&request(file.path())).expect("report");
        assert_eq!(report.entity_count, 1);
        assert_eq!(report.warning_count(), 0);
    }

    #[test]
    fn clockwise_hatch_arc_edge_keeps_its_short_sweep() {
        // 四分之一圆：竖直边、顺时针圆弧 (0,1000)→(1000,0)、水平边
        let mut file = tempfile::Builder::new()
            .suffix(".dxf")
            .tempfile()
            .expect("temp dxf");
        write!(
            file,
            "0\nSECTION\n2\nENTITIES\n0\nHATCH\n8\nCARRELAGE\n2\nSOLID\n70\n1\n71\n0\n91\n1\n\
             92\n1\n93\n3\n\
             72\n1\n10\n0\n20\n0\n11\n0\n21\n1000\n\
             72\n2\n10\n0\n20\n0\n40\n1000\n50\n270\n51\n0\n73\n0\n\
             72\n1\n10\n1000\n20\n0\n11\n0\n21\n0\n\
             97\n0\n75\n1\n76\n1\n98\n1\n10\n100\n20\n100\n0\nENDSEC\n0\nEOF\n"
        )
        .unwrap();

        let report = run_request(&request(file.path())).expect("report");
        let tiling = report
            .rows
            .iter()
            .find(|r| r.designation == "Tiling — Total surface")
            .expect("tiling row");
        let quarter_disk = std::f64::consts::FRAC_PI_4;
        assert!(
            (tiling.quantity - quarter_disk).abs() < 0.002,
            "area {}",
            tiling.quantity
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = run_request(&request(dir.path().join("absent.dxf"))).unwrap_err();
        assert!(matches!(err, FrontendError::Io(IoError::ReadError { .. })));
    }
}
