//! # 几何/栅格引擎（geometry）
//!
//! ## 设计思路
//!
//! 纯函数层，不持有任何状态，也不感知异步运行时：
//!
//! - `crop`：显示坐标选区 → 原图像素矩形
//! - `raster`：裁剪栅格化（PNG）与不透明重编码（JPEG）
//! - `error`：阶段错误
//!
//! 编排层（`session`）负责把这些同步函数放到阻塞线程池中执行。

mod crop;
mod error;
mod raster;

pub use crop::{BoundingBox, CropRegion, CropUnit, Dimensions, PixelRect, compute_crop_in_pixels};
pub use error::RasterError;
pub use raster::{
    EncodedImage, JPEG_MIME, PNG_MIME, composite_over_background, decode_with_limits, parse_hex_color,
    rasterize_crop, recode_to_opaque,
};
