use takeoff_engine::TakeoffError;
use takeoff_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("读取图纸失败: {0}")]
    Io(#[from] IoError),
    #[error("提取参数无效: {0}")]
    Takeoff(#[from] TakeoffError),
    #[error("序列化报表失败: {0}")]
    Serialize(#[from] serde_json::Error),
}
