//! # 会话数据实体
//!
//! 源图片、输出格式、单次操作结果与派生下载文件。
//! 源图片一经创建便不再修改，重新导入或清空时整体替换。

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::geometry::{Dimensions, JPEG_MIME, PNG_MIME};
use crate::media;

const ARTIFACT_STEM: &str = "background-removed";

/// 待导入的文件（来自文件选择器或拖放）。
#[derive(Debug, Clone)]
pub struct IngestFile {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Bytes,
}

impl IngestFile {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// 从磁盘读取文件，媒体类型按文件签名识别。
    ///
    /// 无法识别为图片时媒体类型记为 `application/octet-stream`，交由导入流程拒绝。
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let media_type = media::sniff_image_mime(&bytes).unwrap_or("application/octet-stream");
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(file_name, media_type, bytes))
    }
}

/// 已解码的源图片。
pub struct SourceImage {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Bytes,
    /// 可直接渲染的 `data:` URL。
    pub preview_url: String,
    pub natural: Dimensions,
    pub(crate) pixels: Arc<DynamicImage>,
}

impl SourceImage {
    pub(crate) fn new(file: IngestFile, pixels: DynamicImage) -> Self {
        let natural = Dimensions::new(pixels.width(), pixels.height());
        let preview_url = media::to_data_url(&file.media_type, &file.bytes);
        Self {
            file_name: file.file_name,
            media_type: file.media_type,
            bytes: file.bytes,
            preview_url,
            natural,
            pixels: Arc::new(pixels),
        }
    }
}

impl fmt::Debug for SourceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 预览 URL 与像素数据体积较大，不输出
        f.debug_struct("SourceImage")
            .field("file_name", &self.file_name)
            .field("media_type", &self.media_type)
            .field("bytes", &self.bytes.len())
            .field("natural", &self.natural)
            .finish()
    }
}

/// 下载文件的格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// 保留透明通道。
    #[default]
    Png,
    /// 透明区域合成到背景色上。
    Jpeg,
}

impl OutputFormat {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => PNG_MIME,
            Self::Jpeg => JPEG_MIME,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub fn artifact_file_name(self) -> String {
        format!("{}.{}", ARTIFACT_STEM, self.extension())
    }
}

/// 可下载的派生文件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub bytes: Bytes,
    pub file_name: String,
    pub mime_type: &'static str,
}

impl DownloadArtifact {
    pub(crate) fn new(format: OutputFormat, bytes: Bytes) -> Self {
        Self {
            bytes,
            file_name: format.artifact_file_name(),
            mime_type: format.mime_type(),
        }
    }
}

/// 单次远程操作的结果槽。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult<T> {
    Ready(T),
    Failed { message: String },
}

impl<T> OperationResult<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_follow_format() {
        assert_eq!(OutputFormat::Png.artifact_file_name(), "background-removed.png");
        assert_eq!(OutputFormat::Jpeg.artifact_file_name(), "background-removed.jpg");
        assert_eq!(OutputFormat::from_str("JPG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::from_str("webp"), None);
    }

    #[test]
    fn source_image_reports_natural_size_and_preview() {
        let file = IngestFile::new("cat.png", "image/png", vec![1u8, 2, 3]);
        let source = SourceImage::new(file, DynamicImage::new_rgba8(12, 7));

        assert_eq!(source.natural, Dimensions::new(12, 7));
        assert_eq!(source.preview_url, "data:image/png;base64,AQID");
        assert!(!format!("{:?}", source).contains("base64"));
    }

    #[test]
    fn operation_result_exposes_ready_value() {
        let ready: OperationResult<String> = OperationResult::Ready("hi".to_string());
        let failed: OperationResult<String> = OperationResult::Failed {
            message: "nope".to_string(),
        };
        assert_eq!(ready.ready().map(String::as_str), Some("hi"));
        assert!(failed.ready().is_none());
    }
}
