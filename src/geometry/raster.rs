//! # 栅格化与重编码
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → 裁剪 → 编码”的过程集中管理：
//! - 裁剪输出固定为 PNG，保证透明通道贯穿到远程抠图阶段；
//! - 输出格式转换（JPEG）是后续独立步骤，只在派生下载文件时发生。
//!
//! ## 实现思路
//!
//! 1. 解码前读取 header 尺寸并按像素上限快速拒绝
//! 2. `crop_imm` 截取子区域，不修改源图
//! 3. 重编码时逐像素做 alpha 合成，完全不透明的像素原样保留
//!
//! 以上均为 CPU 密集的同步函数，异步调用方应放到 `spawn_blocking` 中执行。

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;

use super::{PixelRect, RasterError};
use crate::media;

/// PNG 输出的 MIME 类型。
pub const PNG_MIME: &str = "image/png";
/// JPEG 输出的 MIME 类型。
pub const JPEG_MIME: &str = "image/jpeg";

/// 编码后的独立图片。
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: String,
}

/// 带像素上限的完整解码。
///
/// 先读 header 尺寸再解码，避免超大图片在解码阶段造成内存峰值。
pub fn decode_with_limits(bytes: &[u8], max_decoded_pixels: u64) -> Result<DynamicImage, RasterError> {
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| RasterError::Decode(format!("无法识别图片格式：{}", e)))?
        .into_dimensions()
        .map_err(|e| RasterError::Decode(format!("无法读取图片尺寸：{}", e)))?;

    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| RasterError::ResourceLimit("图片像素数溢出".to_string()))?;
    if pixels > max_decoded_pixels {
        return Err(RasterError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, max_decoded_pixels
        )));
    }

    image::load_from_memory(bytes).map_err(|e| RasterError::Decode(format!("图片解码失败：{}", e)))
}

/// 将原图中的像素矩形渲染为一张新的 PNG。
///
/// 不论最终下载格式为何，这里始终输出 PNG，以保留透明通道。
pub fn rasterize_crop(
    image: &DynamicImage,
    rect: PixelRect,
    output_file_name: &str,
) -> Result<EncodedImage, RasterError> {
    if rect.width == 0 || rect.height == 0 {
        return Err(RasterError::DegenerateCrop(format!(
            "裁剪尺寸为 {}x{}",
            rect.width, rect.height
        )));
    }

    let (width, height) = image.dimensions();
    let fits_x = rect.x.checked_add(rect.width).is_some_and(|right| right <= width);
    let fits_y = rect.y.checked_add(rect.height).is_some_and(|bottom| bottom <= height);
    if !fits_x || !fits_y {
        return Err(RasterError::Rasterization(format!(
            "裁剪区域 ({}, {}, {}x{}) 超出图片范围 {}x{}",
            rect.x, rect.y, rect.width, rect.height, width, height
        )));
    }

    let cropped = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
    let rgba = DynamicImage::ImageRgba8(cropped.to_rgba8());

    let mut cursor = Cursor::new(Vec::new());
    rgba.write_to(&mut cursor, ImageFormat::Png)
        .map_err(|e| RasterError::Rasterization(format!("PNG 编码失败：{}", e)))?;
    let bytes = cursor.into_inner();

    if bytes.is_empty() {
        return Err(RasterError::Rasterization("PNG 编码输出为空".to_string()));
    }

    Ok(EncodedImage {
        bytes,
        mime_type: PNG_MIME,
        file_name: output_file_name.to_string(),
    })
}

/// 解析 `#RRGGBB` / `#RGB` 颜色。
pub fn parse_hex_color(value: &str) -> Result<Rgb<u8>, RasterError> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return Err(RasterError::InvalidColor(value.to_string()));
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return Err(RasterError::InvalidColor(value.to_string())),
    };

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&expanded[range], 16).map_err(|_| RasterError::InvalidColor(value.to_string()))
    };

    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}

/// 将 RGBA 图像合成到纯色背景上。
///
/// alpha 为 255 的像素原样输出，其余按 `src*a + bg*(255-a)` 四舍五入合成。
pub fn composite_over_background(image: &RgbaImage, background: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        if a == u8::MAX {
            return Rgb([r, g, b]);
        }

        let alpha = a as u32;
        let blend = |src: u8, bg: u8| ((src as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8;
        Rgb([
            blend(r, background.0[0]),
            blend(g, background.0[1]),
            blend(b, background.0[2]),
        ])
    })
}

/// 把带透明通道的图片重编码为不透明 JPEG。
///
/// `alpha_image` 可以是原始字节，也可以是 `data:` URL 的字节形式。
/// `quality` 取值 1~100（默认配置为 95）。远程结果同样受 `max_decoded_pixels` 限制。
pub fn recode_to_opaque(
    alpha_image: &[u8],
    background: &str,
    quality: u8,
    max_decoded_pixels: u64,
) -> Result<Vec<u8>, RasterError> {
    let background = parse_hex_color(background)?;

    let raw = if alpha_image.starts_with(b"data:") {
        let text = std::str::from_utf8(alpha_image)
            .map_err(|e| RasterError::Decode(format!("Data URL 不是合法 UTF-8：{}", e)))?;
        media::decode_base64_payload(text, u64::MAX)
            .map_err(|e| RasterError::Decode(e.to_string()))?
    } else {
        alpha_image.to_vec()
    };

    let decoded = decode_with_limits(&raw, max_decoded_pixels)?;
    let opaque = composite_over_background(&decoded.to_rgba8(), background);

    let mut bytes = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
        encoder
            .encode_image(&opaque)
            .map_err(|e| RasterError::Rasterization(format!("JPEG 编码失败：{}", e)))?;
    }

    if bytes.is_empty() {
        return Err(RasterError::Rasterization("JPEG 编码输出为空".to_string()));
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn create_png_bytes(width: u32, height: u32, alpha: u8) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, alpha])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn rasterize_crop_outputs_png_with_requested_size() {
        let source = decode_with_limits(&create_png_bytes(120, 80, 255), 1_000_000).expect("decode source");
        let rect = PixelRect {
            x: 10,
            y: 20,
            width: 50,
            height: 40,
        };

        let encoded = rasterize_crop(&source, rect, "crop.png").expect("rasterize");
        assert_eq!(encoded.mime_type, PNG_MIME);
        assert_eq!(encoded.file_name, "crop.png");

        let decoded = image::load_from_memory(&encoded.bytes).expect("decode crop");
        assert_eq!(decoded.dimensions(), (50, 40));
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn rasterize_crop_preserves_transparency() {
        let source = decode_with_limits(&create_png_bytes(16, 16, 0), 1_000_000).expect("decode source");
        let rect = PixelRect {
            x: 0,
            y: 0,
            width: 8,
            height: 8,
        };

        let encoded = rasterize_crop(&source, rect, "crop.png").expect("rasterize");
        let decoded = image::load_from_memory(&encoded.bytes).expect("decode crop").to_rgba8();
        assert!(decoded.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn rasterize_crop_rejects_out_of_bounds_rect() {
        let source = decode_with_limits(&create_png_bytes(20, 20, 255), 1_000_000).expect("decode source");
        let rect = PixelRect {
            x: 15,
            y: 0,
            width: 10,
            height: 10,
        };

        let result = rasterize_crop(&source, rect, "crop.png");
        assert!(matches!(result, Err(RasterError::Rasterization(_))));
    }

    #[test]
    fn decode_with_limits_rejects_too_many_pixels() {
        let result = decode_with_limits(&create_png_bytes(200, 200, 255), 10_000);
        assert!(matches!(result, Err(RasterError::ResourceLimit(_))));
    }

    #[test]
    fn decode_with_limits_rejects_garbage() {
        let result = decode_with_limits(b"definitely not an image", 10_000);
        assert!(matches!(result, Err(RasterError::Decode(_))));
    }

    #[test]
    fn hex_color_parser_accepts_short_and_long_forms() {
        assert_eq!(parse_hex_color("#FFFFFF").expect("long form"), Rgb([255, 255, 255]));
        assert_eq!(parse_hex_color("#0a0").expect("short form"), Rgb([0, 170, 0]));
        assert!(matches!(parse_hex_color("#12345"), Err(RasterError::InvalidColor(_))));
        assert!(matches!(parse_hex_color("#GGGGGG"), Err(RasterError::InvalidColor(_))));
    }

    #[test]
    fn composite_keeps_opaque_pixels_identical() {
        let source = ImageBuffer::from_fn(32, 24, |x, y| Rgba([(x * 7) as u8, (y * 9) as u8, 200, 255]));
        let opaque = composite_over_background(&source, Rgb([255, 255, 255]));

        for (x, y, pixel) in opaque.enumerate_pixels() {
            let src = source.get_pixel(x, y).0;
            assert_eq!(pixel.0, [src[0], src[1], src[2]]);
        }
    }

    #[test]
    fn composite_fills_transparent_pixels_with_background() {
        let mut source = RgbaImage::new(2, 1);
        source.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        source.put_pixel(1, 0, Rgba([0, 0, 0, 128]));

        let opaque = composite_over_background(&source, Rgb([255, 255, 255]));
        assert_eq!(opaque.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(opaque.get_pixel(1, 0).0, [127, 127, 127]);
    }

    #[test]
    fn recode_to_opaque_outputs_jpeg_close_to_opaque_source() {
        let flat = ImageBuffer::from_pixel(32, 32, Rgba([40u8, 120, 200, 255]));
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(flat)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("encode flat png");

        let jpeg = recode_to_opaque(&cursor.into_inner(), "#FFFFFF", 95, 1_000_000).expect("recode");
        assert_eq!(image::guess_format(&jpeg).expect("guess format"), ImageFormat::Jpeg);

        let decoded = image::load_from_memory(&jpeg).expect("decode jpeg").to_rgb8();
        for pixel in decoded.pixels() {
            for (actual, expected) in pixel.0.iter().zip([40u8, 120, 200]) {
                assert!((*actual as i16 - expected as i16).abs() <= 4);
            }
        }
    }

    #[test]
    fn recode_to_opaque_accepts_data_url_input() {
        let png = create_png_bytes(8, 8, 0);
        let data_url = media::to_data_url(PNG_MIME, &png);

        let jpeg = recode_to_opaque(data_url.as_bytes(), "#FFFFFF", 95, 1_000_000).expect("recode data url");
        let decoded = image::load_from_memory(&jpeg).expect("decode jpeg").to_rgb8();
        assert!(decoded.pixels().all(|p| p.0.iter().all(|c| *c >= 250)));
    }

    #[test]
    fn recode_to_opaque_rejects_undecodable_input() {
        let result = recode_to_opaque(b"plain text", "#FFFFFF", 95, 1_000_000);
        assert!(matches!(result, Err(RasterError::Decode(_))));
    }

    #[test]
    fn recode_to_opaque_rejects_oversized_remote_image() {
        let result = recode_to_opaque(&create_png_bytes(200, 200, 128), "#FFFFFF", 95, 10_000);
        assert!(matches!(result, Err(RasterError::ResourceLimit(_))));
    }
}
