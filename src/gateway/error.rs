//! # 推理网关错误模型
//!
//! 传输层错误（`Request` / `Http`）与三个远程操作各自的语义错误共用一个枚举；
//! 操作层负责把传输层错误归入对应操作的错误分支（如 `Detection`、`TextDetection`）。

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("推理服务配置错误：{0}")]
    Configuration(String),

    #[error("推理请求失败：{0}")]
    Request(String),

    #[error("推理服务返回 HTTP {status}：{message}")]
    Http { status: u16, message: String },

    #[error("主体检测失败：{0}")]
    Detection(String),

    #[error("检测结果不是合法 JSON：{0}")]
    Parse(String),

    #[error("检测结果不符合约定结构：{0}")]
    Schema(String),

    #[error("推理服务未返回候选结果")]
    NoCandidate,

    #[error("候选结果中没有图片数据")]
    NoImageData,

    #[error("图片数据无法解码：{0}")]
    InvalidPayload(String),

    #[error("文字识别失败：{0}")]
    TextDetection(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "E_GATEWAY_CONFIG",
            Self::Request(_) => "E_REQUEST",
            Self::Http { .. } => "E_HTTP",
            Self::Detection(_) => "E_DETECTION",
            Self::Parse(_) => "E_PARSE",
            Self::Schema(_) => "E_SCHEMA",
            Self::NoCandidate => "E_NO_CANDIDATE",
            Self::NoImageData => "E_NO_IMAGE_DATA",
            Self::InvalidPayload(_) => "E_INVALID_PAYLOAD",
            Self::TextDetection(_) => "E_TEXT_DETECTION",
        }
    }
}
