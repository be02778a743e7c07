//! # 编排层错误
//!
//! 内部错误保留完整细节用于日志；面向用户的文案由 `user_message` 统一给出，
//! 远程错误的原始信息不会出现在界面上。

use super::Activity;
use crate::gateway::GatewayError;
use crate::geometry::RasterError;

pub const INVALID_FILE_MESSAGE: &str = "Please upload a valid image file (PNG, JPG, etc.).";
pub const NO_IMAGE_MESSAGE: &str = "Please upload an image first.";
pub const SELECT_REGION_MESSAGE: &str = "Please select a region of the image to process.";
pub const BUSY_MESSAGE: &str = "Another operation is already in progress. Please wait for it to finish.";
pub const TOO_LARGE_MESSAGE: &str = "The image is too large to process. Please try a smaller file.";
pub const UNREADABLE_MESSAGE: &str = "The image could not be read. Please try another file.";
pub const REMOVAL_FAILED_MESSAGE: &str =
    "Failed to process image. The model may be unable to handle this request. Please try another image.";
pub const TEXT_FAILED_MESSAGE: &str = "Failed to extract text from the image. Please try again.";
pub const CONVERSION_FAILED_MESSAGE: &str =
    "Failed to convert the image to the selected format. The download is unavailable.";

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("不支持的文件类型：{media_type}")]
    InvalidFileType { media_type: String },

    #[error("超出资源限制：{0}")]
    ResourceLimit(String),

    #[error("尚未加载图片")]
    NoImage,

    #[error("已有操作进行中：{active:?}")]
    Busy { active: Activity },

    #[error("选区为空")]
    DegenerateCrop,

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("格式转换失败：{0}")]
    FormatConversion(String),
}

impl EditorError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFileType { .. } => "E_INVALID_FILE_TYPE",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::NoImage => "E_NO_IMAGE",
            Self::Busy { .. } => "E_BUSY",
            Self::DegenerateCrop => "E_DEGENERATE_CROP",
            Self::Raster(e) => e.code(),
            Self::Gateway(e) => e.code(),
            Self::FormatConversion(_) => "E_FORMAT_CONVERSION",
        }
    }

    /// 面向用户的通用文案。
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidFileType { .. } => INVALID_FILE_MESSAGE,
            Self::ResourceLimit(_) | Self::Raster(RasterError::ResourceLimit(_)) => TOO_LARGE_MESSAGE,
            Self::NoImage => NO_IMAGE_MESSAGE,
            Self::Busy { .. } => BUSY_MESSAGE,
            Self::DegenerateCrop | Self::Raster(RasterError::DegenerateCrop(_)) => SELECT_REGION_MESSAGE,
            Self::Raster(RasterError::Decode(_)) => UNREADABLE_MESSAGE,
            Self::Gateway(GatewayError::TextDetection(_)) => TEXT_FAILED_MESSAGE,
            Self::Raster(_) | Self::Gateway(_) => REMOVAL_FAILED_MESSAGE,
            Self::FormatConversion(_) => CONVERSION_FAILED_MESSAGE,
        }
    }
}

impl From<tokio::task::JoinError> for EditorError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Raster(RasterError::Rasterization(format!("后台任务异常退出：{}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_details_never_reach_user_message() {
        let err = EditorError::from(GatewayError::Http {
            status: 500,
            message: "internal quota token abc123".to_string(),
        });
        assert_eq!(err.user_message(), REMOVAL_FAILED_MESSAGE);
        assert_eq!(err.code(), "E_HTTP");
        assert!(!err.user_message().contains("abc123"));
    }

    #[test]
    fn degenerate_crop_asks_for_a_region() {
        assert_eq!(EditorError::DegenerateCrop.user_message(), SELECT_REGION_MESSAGE);
        assert_eq!(
            EditorError::from(RasterError::DegenerateCrop("零宽度".to_string())).user_message(),
            SELECT_REGION_MESSAGE
        );
    }

    #[test]
    fn text_detection_has_its_own_message() {
        let err = EditorError::from(GatewayError::TextDetection("timeout".to_string()));
        assert_eq!(err.user_message(), TEXT_FAILED_MESSAGE);
        assert_eq!(err.code(), "E_TEXT_DETECTION");
    }
}
