//! # 裁剪坐标换算
//!
//! ## 设计思路
//!
//! 裁剪控件给出的是“相对显示图片”的矩形（百分比或显示像素），
//! 远程推理需要的是原图像素坐标。两者之间只差一个缩放系数：
//! `natural / displayed`。本模块只做纯计算，不接触任何像素数据，便于属性测试。
//!
//! ## 实现思路
//!
//! 1. 百分比单位先换算为显示像素
//! 2. 乘以各轴缩放系数
//! 3. 四舍五入并夹紧到原图边界
//! 4. 宽或高为 0 直接拒绝，绝不把零面积区域“修正”为非零

use serde::{Deserialize, Serialize};

use super::RasterError;

/// 图片尺寸（像素）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// 裁剪区域的度量单位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropUnit {
    /// 相对显示图片的百分比（0~100）。
    #[default]
    Percent,
    /// 显示坐标系下的像素。
    Pixels,
}

/// 用户或自动检测选定的裁剪矩形。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRegion {
    pub unit: CropUnit,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRegion {
    pub fn percent(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            unit: CropUnit::Percent,
            x,
            y,
            width,
            height,
        }
    }

    pub fn pixels(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            unit: CropUnit::Pixels,
            x,
            y,
            width,
            height,
        }
    }

    /// 整图裁剪：加载完成后的默认选区。
    pub fn full_image() -> Self {
        Self::percent(0.0, 0.0, 100.0, 100.0)
    }

    /// 将远程检测返回的归一化包围盒（0~1）转换为百分比选区。
    pub fn from_bounding_box(bbox: &BoundingBox) -> Self {
        Self::percent(
            bbox.x * 100.0,
            bbox.y * 100.0,
            bbox.width * 100.0,
            bbox.height * 100.0,
        )
    }

    /// 宽或高不为正（含 NaN）时视为空选区。
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// 换算为显示坐标系下的像素矩形 `(x, y, width, height)`。
    fn to_display_pixels(&self, displayed: Dimensions) -> (f64, f64, f64, f64) {
        match self.unit {
            CropUnit::Pixels => (self.x, self.y, self.width, self.height),
            CropUnit::Percent => {
                let dw = displayed.width as f64;
                let dh = displayed.height as f64;
                (
                    self.x / 100.0 * dw,
                    self.y / 100.0 * dh,
                    self.width / 100.0 * dw,
                    self.height / 100.0 * dh,
                )
            }
        }
    }
}

impl Default for CropRegion {
    fn default() -> Self {
        Self::full_image()
    }
}

/// 远程主体检测返回的归一化包围盒，各字段取值 `[0, 1]`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// 原图像素坐标系下的裁剪矩形。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 将显示坐标系下的选区换算为原图像素矩形。
///
/// 缩放系数为 `natural / displayed`（按轴分别计算）。
/// 结果宽或高为 0 时返回 [`RasterError::DegenerateCrop`]，调用方必须提示用户重新框选，
/// 而不是继续栅格化或调用远程服务。
///
/// # 示例
/// ```rust,ignore
/// use cutout_studio::geometry::{compute_crop_in_pixels, CropRegion, Dimensions};
///
/// let rect = compute_crop_in_pixels(
///     Dimensions::new(500, 400),
///     Dimensions::new(1000, 800),
///     &CropRegion::full_image(),
/// )?;
/// assert_eq!((rect.width, rect.height), (1000, 800));
/// # Ok::<(), cutout_studio::geometry::RasterError>(())
/// ```
pub fn compute_crop_in_pixels(
    displayed: Dimensions,
    natural: Dimensions,
    crop: &CropRegion,
) -> Result<PixelRect, RasterError> {
    if displayed.width == 0 || displayed.height == 0 {
        return Err(RasterError::DegenerateCrop(format!(
            "显示尺寸为 0（{}x{}）",
            displayed.width, displayed.height
        )));
    }

    let (dx, dy, dw, dh) = crop.to_display_pixels(displayed);
    if ![dx, dy, dw, dh].iter().all(|v| v.is_finite()) {
        return Err(RasterError::DegenerateCrop("裁剪坐标不是有限数值".to_string()));
    }

    let scale_x = natural.width as f64 / displayed.width as f64;
    let scale_y = natural.height as f64 / displayed.height as f64;

    let (x, width) = scale_axis(dx, dw, scale_x, natural.width);
    let (y, height) = scale_axis(dy, dh, scale_y, natural.height);

    if width == 0 || height == 0 {
        return Err(RasterError::DegenerateCrop(format!(
            "换算后尺寸为 {}x{}，请重新选择区域",
            width, height
        )));
    }

    Ok(PixelRect {
        x,
        y,
        width,
        height,
    })
}

/// 单轴换算：返回 `(起点, 长度)`，均已夹紧到 `[0, limit]`。
///
/// 越出图片的部分从长度中扣除，左侧越界同样缩短长度。
fn scale_axis(offset: f64, length: f64, scale: f64, limit: u32) -> (u32, u32) {
    let limit = limit as f64;
    let scaled_start = (offset * scale).round();
    let scaled_len = (length * scale).round();
    if scaled_len <= 0.0 {
        return (scaled_start.clamp(0.0, limit) as u32, 0);
    }

    let start = scaled_start.clamp(0.0, limit);
    let end = (scaled_start + scaled_len).clamp(0.0, limit);
    (start as u32, (end - start).max(0.0) as u32)
}
