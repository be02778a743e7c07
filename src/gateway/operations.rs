//! # 远程操作契约
//!
//! ## 设计思路
//!
//! 三个互相独立的远程操作共享同一种请求形态：一个图片片段 + 一段指令文本，
//! 检测操作额外附带结构化输出 schema。网关只负责“拼请求、验响应”，
//! 不缓存、不去重，相同输入重复调用总会再次访问远程服务。
//!
//! ## 实现思路
//!
//! - 主体检测：先按 JSON 解析（`Parse`），再逐字段校验（`Schema`），不做修补或默认值。
//! - 抠图：取第一个候选结果中的内联图片，Base64 解码后返回原始字节。
//! - 文字识别：拼接文本片段并去除首尾空白，空字符串视为成功。

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::GatewayError;
use super::client::InferenceBackend;
use super::wire::{Content, GenerateContentRequest, GenerationConfig, InlineData, Part};
use crate::config::StudioConfig;
use crate::geometry::BoundingBox;
use crate::media;

const DETECT_SUBJECT_PROMPT: &str = "Identify the main subject of this image. Return its bounding box as \
normalized coordinates between 0 and 1: x and y of the top-left corner, then width and height.";

const DETECT_TEXT_PROMPT: &str = "Extract all text visible in this image. Return only the extracted text, \
preserving line breaks. If the image contains no text, return an empty response.";

const REMOVE_BACKGROUND_STANDARD_PROMPT: &str =
    "Remove the background. Return only the subject with a transparent background.";

const REMOVE_BACKGROUND_HIGH_PROMPT: &str = "Remove the background with maximum precision. Preserve fine \
details such as hair, fur and semi-transparent edges. Return only the subject, at full resolution, with a \
transparent background.";

/// 检测结果必须包含的数值字段。
const BOUNDING_BOX_FIELDS: [&str; 4] = ["x", "y", "width", "height"];

/// 抠图质量档位，仅影响发送给远程模型的指令文本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    #[default]
    Standard,
    High,
}

impl QualityLevel {
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::High => "high",
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            Self::Standard => REMOVE_BACKGROUND_STANDARD_PROMPT,
            Self::High => REMOVE_BACKGROUND_HIGH_PROMPT,
        }
    }
}

/// 远程推理网关。
pub struct InferenceGateway<B> {
    backend: B,
    image_model: String,
    vision_model: String,
}

impl<B: InferenceBackend> InferenceGateway<B> {
    pub fn new(backend: B, image_model: impl Into<String>, vision_model: impl Into<String>) -> Self {
        Self {
            backend,
            image_model: image_model.into(),
            vision_model: vision_model.into(),
        }
    }

    pub fn from_config(backend: B, config: &StudioConfig) -> Self {
        Self::new(backend, config.image_model.clone(), config.vision_model.clone())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 检测图片主体，返回归一化包围盒。
    pub async fn detect_subject(&self, image: &InlineData) -> Result<BoundingBox, GatewayError> {
        let request = build_request(
            image,
            DETECT_SUBJECT_PROMPT,
            Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(bounding_box_schema()),
                ..GenerationConfig::default()
            }),
        );

        let response = self
            .backend
            .generate_content(&self.vision_model, request)
            .await
            .map_err(|e| GatewayError::Detection(e.to_string()))?;

        let payload = response
            .first_candidate()
            .and_then(|candidate| candidate.text())
            .ok_or_else(|| GatewayError::Detection("未返回结构化结果".to_string()))?;

        parse_bounding_box(&payload)
    }

    /// 去除背景，返回远程生成的原始图片字节（非 Data URL）。
    pub async fn remove_background(
        &self,
        image: &InlineData,
        quality: QualityLevel,
    ) -> Result<Bytes, GatewayError> {
        let request = build_request(
            image,
            quality.instruction(),
            Some(GenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                ..GenerationConfig::default()
            }),
        );

        let response = self.backend.generate_content(&self.image_model, request).await?;

        let candidate = response.first_candidate().ok_or(GatewayError::NoCandidate)?;
        let inline = candidate.inline_data().ok_or(GatewayError::NoImageData)?;

        let bytes = media::decode_base64_payload(&inline.data, u64::MAX)
            .map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;
        if bytes.is_empty() {
            return Err(GatewayError::NoImageData);
        }

        Ok(Bytes::from(bytes))
    }

    /// 识别图片中的文字；没有文字时返回空字符串。
    pub async fn detect_text(&self, image: &InlineData) -> Result<String, GatewayError> {
        let request = build_request(image, DETECT_TEXT_PROMPT, None);

        let response = self
            .backend
            .generate_content(&self.vision_model, request)
            .await
            .map_err(|e| GatewayError::TextDetection(e.to_string()))?;

        let candidate = response
            .first_candidate()
            .ok_or_else(|| GatewayError::TextDetection("未返回候选结果".to_string()))?;

        Ok(candidate.text().unwrap_or_default().trim().to_string())
    }
}

fn build_request(
    image: &InlineData,
    instruction: &str,
    generation_config: Option<GenerationConfig>,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            role: None,
            parts: vec![Part::inline(image.clone()), Part::text(instruction)],
        }],
        generation_config,
    }
}

fn bounding_box_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "x": { "type": "NUMBER", "description": "Left edge, normalized 0-1" },
            "y": { "type": "NUMBER", "description": "Top edge, normalized 0-1" },
            "width": { "type": "NUMBER", "description": "Width, normalized 0-1" },
            "height": { "type": "NUMBER", "description": "Height, normalized 0-1" }
        },
        "required": BOUNDING_BOX_FIELDS,
    })
}

/// 解析检测结果：先解析 JSON，再校验四个数值字段。
pub fn parse_bounding_box(payload: &str) -> Result<BoundingBox, GatewayError> {
    let value: Value =
        serde_json::from_str(payload.trim()).map_err(|e| GatewayError::Parse(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| GatewayError::Schema("检测结果不是 JSON 对象".to_string()))?;

    let field = |name: &str| -> Result<f64, GatewayError> {
        object
            .get(name)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .ok_or_else(|| GatewayError::Schema(format!("缺少数值字段 `{}`", name)))
    };

    Ok(BoundingBox {
        x: field("x")?,
        y: field("y")?,
        width: field("width")?,
        height: field("height")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::wire::{Candidate, GenerateContentResponse};
    use std::sync::Mutex;

    /// 固定返回同一响应，并记录每次请求。
    struct FixedBackend {
        response: Result<GenerateContentResponse, u16>,
        calls: Mutex<Vec<(String, GenerateContentRequest)>>,
    }

    impl FixedBackend {
        fn new(response: Result<GenerateContentResponse, u16>) -> Self {
            Self {
                response,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, GenerateContentRequest)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl InferenceBackend for FixedBackend {
        async fn generate_content(
            &self,
            model: &str,
            request: GenerateContentRequest,
        ) -> Result<GenerateContentResponse, GatewayError> {
            self.calls.lock().expect("calls lock").push((model.to_string(), request));
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(status) => Err(GatewayError::Http {
                    status: *status,
                    message: "boom".to_string(),
                }),
            }
        }
    }

    fn response_with_parts(parts: Vec<Part>) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content { role: None, parts }),
                finish_reason: None,
            }],
        }
    }

    fn gateway(backend: FixedBackend) -> InferenceGateway<FixedBackend> {
        InferenceGateway::new(backend, "image-model", "vision-model")
    }

    fn image_part() -> InlineData {
        InlineData::from_bytes("image/png", &[137, 80, 78, 71])
    }

    #[tokio::test]
    async fn detect_subject_parses_bounding_box() {
        let gateway = gateway(FixedBackend::new(Ok(response_with_parts(vec![Part::text(
            r#"{"x":0.1,"y":0.2,"width":0.5,"height":0.6}"#,
        )]))));

        let bbox = gateway.detect_subject(&image_part()).await.expect("detect subject");
        assert_eq!(
            bbox,
            BoundingBox {
                x: 0.1,
                y: 0.2,
                width: 0.5,
                height: 0.6
            }
        );

        let calls = gateway.backend().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "vision-model");
        let config = calls[0].1.generation_config.as_ref().expect("generation config");
        assert_eq!(config.response_mime_type.as_deref(), Some("application/json"));
        let schema = config.response_schema.as_ref().expect("schema");
        assert_eq!(schema["required"], json!(["x", "y", "width", "height"]));
    }

    #[tokio::test]
    async fn detect_subject_missing_field_is_schema_error() {
        let gateway = gateway(FixedBackend::new(Ok(response_with_parts(vec![Part::text(
            r#"{"x":0.1,"y":0.1,"width":0.5}"#,
        )]))));

        let result = gateway.detect_subject(&image_part()).await;
        assert!(matches!(result, Err(GatewayError::Schema(_))));
    }

    #[tokio::test]
    async fn detect_subject_malformed_payload_is_parse_error() {
        let gateway = gateway(FixedBackend::new(Ok(response_with_parts(vec![Part::text("x=0.1, y=0.2")]))));

        let result = gateway.detect_subject(&image_part()).await;
        assert!(matches!(result, Err(GatewayError::Parse(_))));
    }

    #[tokio::test]
    async fn detect_subject_remote_failure_is_detection_error() {
        let gateway = gateway(FixedBackend::new(Err(500)));

        let result = gateway.detect_subject(&image_part()).await;
        assert!(matches!(result, Err(GatewayError::Detection(_))));
    }

    #[test]
    fn parse_bounding_box_rejects_non_numeric_field() {
        let result = parse_bounding_box(r#"{"x":"0.1","y":0.1,"width":0.5,"height":0.5}"#);
        assert!(matches!(result, Err(GatewayError::Schema(_))));

        let result = parse_bounding_box("[0.1, 0.1, 0.5, 0.5]");
        assert!(matches!(result, Err(GatewayError::Schema(_))));
    }

    #[tokio::test]
    async fn remove_background_returns_decoded_bytes_and_selects_prompt() {
        let gateway = gateway(FixedBackend::new(Ok(response_with_parts(vec![
            Part::text("Here you go"),
            Part::inline(InlineData::from_bytes("image/png", b"png-bytes")),
        ]))));

        let standard = gateway
            .remove_background(&image_part(), QualityLevel::Standard)
            .await
            .expect("remove background");
        let high = gateway
            .remove_background(&image_part(), QualityLevel::High)
            .await
            .expect("remove background");

        assert_eq!(standard.as_ref(), b"png-bytes");
        assert_eq!(high.as_ref(), b"png-bytes");

        let calls = gateway.backend().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "image-model");
        let instruction = |i: usize| calls[i].1.contents[0].parts[1].text.clone().expect("instruction");
        assert_eq!(instruction(0), REMOVE_BACKGROUND_STANDARD_PROMPT);
        assert_eq!(instruction(1), REMOVE_BACKGROUND_HIGH_PROMPT);
        assert_eq!(
            calls[0].1.generation_config.as_ref().and_then(|c| c.response_modalities.clone()),
            Some(vec!["IMAGE".to_string()])
        );
    }

    #[tokio::test]
    async fn remove_background_without_candidates_fails() {
        let gateway = gateway(FixedBackend::new(Ok(GenerateContentResponse::default())));

        let result = gateway.remove_background(&image_part(), QualityLevel::Standard).await;
        assert!(matches!(result, Err(GatewayError::NoCandidate)));
    }

    #[tokio::test]
    async fn remove_background_text_only_candidate_fails() {
        let gateway = gateway(FixedBackend::new(Ok(response_with_parts(vec![Part::text("I can't do that")]))));

        let result = gateway.remove_background(&image_part(), QualityLevel::Standard).await;
        assert!(matches!(result, Err(GatewayError::NoImageData)));
    }

    #[tokio::test]
    async fn detect_text_trims_and_allows_empty() {
        let gateway = gateway(FixedBackend::new(Ok(response_with_parts(vec![Part::text("  Hello\nWorld \n")]))));
        assert_eq!(gateway.detect_text(&image_part()).await.expect("detect text"), "Hello\nWorld");

        let empty = self::gateway(FixedBackend::new(Ok(response_with_parts(vec![Part::text("   ")]))));
        assert_eq!(empty.detect_text(&image_part()).await.expect("detect text"), "");
    }

    #[tokio::test]
    async fn detect_text_remote_failure_is_text_detection_error() {
        let gateway = gateway(FixedBackend::new(Err(429)));

        let result = gateway.detect_text(&image_part()).await;
        assert!(matches!(result, Err(GatewayError::TextDetection(_))));
    }

    #[test]
    fn quality_level_parses_known_values() {
        assert_eq!(QualityLevel::from_str("HIGH"), Some(QualityLevel::High));
        assert_eq!(QualityLevel::from_str(" standard "), Some(QualityLevel::Standard));
        assert_eq!(QualityLevel::from_str("ultra"), None);
        assert_eq!(QualityLevel::High.as_str(), "high");
    }
}
