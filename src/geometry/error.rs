//! # 几何/栅格错误模型
//!
//! 单一枚举覆盖“坐标换算 → 裁剪栅格化 → 不透明重编码”三个阶段的失败来源。

/// 几何与栅格阶段统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    /// 裁剪区域换算后宽或高为 0，禁止继续栅格化或调用远程服务。
    #[error("裁剪区域无效：{0}")]
    DegenerateCrop(String),

    /// 绘制面获取失败或编码输出为空。
    #[error("栅格化失败：{0}")]
    Rasterization(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("背景色格式错误：{0}")]
    InvalidColor(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl RasterError {
    /// 稳定错误码，供日志检索与前端分支使用。
    pub fn code(&self) -> &'static str {
        match self {
            Self::DegenerateCrop(_) => "E_DEGENERATE_CROP",
            Self::Rasterization(_) => "E_RASTERIZATION",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidColor(_) => "E_INVALID_COLOR",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
        }
    }
}
