pub mod classify;
pub mod diagnostics;
pub mod flatten;
pub mod keywords;
pub mod measure;
pub mod openings;
pub mod takeoff;

pub mod errors {
    use takeoff_core::curve::CurveError;
    use thiserror::Error;

    /// 参数非法时整次提取失败，不产生任何行。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum TakeoffError {
        #[error("scale factor must be a positive finite number (got {0})")]
        InvalidScaleFactor(f64),
        #[error("wall height must be a non-negative finite number (got {0})")]
        InvalidWallHeight(f64),
        #[error("arc step must be a finite angle of at least {min}° (got {got})")]
        InvalidArcStep { got: f64, min: f64 },
    }

    /// 单个实体的可恢复错误：实体被跳过并记录警告。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum EntityError {
        #[error(transparent)]
        Curve(#[from] CurveError),
        #[error("{0} produced a non-finite quantity")]
        NonFinite(&'static str),
        #[error("block definition `{0}` not found")]
        MissingBlock(String),
        #[error("invalid transform for block `{name}`: {reason}")]
        InvalidTransform { name: String, reason: &'static str },
        #[error("{kind} inside block `{block}` is not supported")]
        UnsupportedInBlock { kind: &'static str, block: String },
    }
}

pub use classify::{CategoryFamily, LayerCategory, classify_layer};
pub use diagnostics::{Diagnostic, DiagnosticLevel};
pub use errors::{EntityError, TakeoffError};
pub use takeoff::{
    ExtractOptions, RowCategory, Takeoff, TakeoffRow, Unit, extract, extract_with_options,
};
