//! # 媒体载荷工具
//!
//! ## 设计思路
//!
//! 图片在本系统中有三种形态：原始字节、`data:` URL（预览/下载）、
//! 以及推理请求里的 Base64 内联数据。这里集中处理三者之间的转换与校验，
//! 其他模块不直接接触 `base64` 引擎。
//!
//! ## 实现思路
//!
//! - Data URL 解析前先估算解码后体积，超限直接拒绝，避免无谓的内存分配。
//! - 文件签名（magic bytes）由 `infer` 识别，不信任调用方声明的类型。

use base64::{Engine as _, engine::general_purpose};

/// 载荷解析错误。
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Data URL 缺少 base64 标记")]
    MissingBase64Marker,

    #[error("Base64 解码失败：{0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Base64 预计解码体积过大：{estimated} 字节（限制：{limit} 字节）")]
    TooLarge { estimated: u64, limit: u64 },
}

/// 将字节编码为标准 Base64。
pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// 构造可直接渲染/下载的 `data:` URL。
pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, encode_base64(bytes))
}

/// 解码 Base64 载荷（支持 Data URL 与纯 Base64 字符串）。
pub fn decode_base64_payload(data: &str, max_decoded_size: u64) -> Result<Vec<u8>, PayloadError> {
    let normalized = data.trim();

    let base64_data = if normalized.starts_with("data:") {
        let marker = normalized
            .find(";base64,")
            .ok_or(PayloadError::MissingBase64Marker)?;
        &normalized[marker + 8..]
    } else {
        normalized
    };

    let estimated = estimate_decoded_upper_bound(base64_data);
    if estimated > max_decoded_size {
        return Err(PayloadError::TooLarge {
            estimated,
            limit: max_decoded_size,
        });
    }

    Ok(general_purpose::STANDARD.decode(base64_data)?)
}

fn estimate_decoded_upper_bound(base64_data: &str) -> u64 {
    let len = base64_data.trim().len() as u64;
    len.saturating_add(3) / 4 * 3
}

/// 媒体类型是否声明为图片（忽略参数与大小写）。
pub fn is_image_media_type(media_type: &str) -> bool {
    media_type
        .split(';')
        .next()
        .map(|base| base.trim().to_ascii_lowercase().starts_with("image/"))
        .unwrap_or(false)
}

/// 按文件签名识别图片 MIME；非图片或无法识别时返回 `None`。
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    let kind = infer::get(bytes)?;
    if kind.matcher_type() != infer::MatcherType::Image {
        return None;
    }
    Some(kind.mime_type())
}
