//! # 远程推理网关（gateway）
//!
//! ## 设计思路
//!
//! 三个远程操作（主体检测、抠图、文字识别）共用统一的请求/响应形态：
//!
//! ```text
//! InferenceGateway ──→ InferenceBackend::generate_content(model, request)
//!      │                     ├─ GeminiClient   (reqwest, 生产)
//!      │                     └─ 脚本化实现     (测试)
//!      └─ 请求构造 + 响应校验（wire 数据结构）
//! ```
//!
//! - `client`：传输层接缝与 HTTP 实现
//! - `operations`：三个操作的请求构造与结果校验
//! - `wire`：`generateContent` 线上 JSON 结构
//! - `error`：网关错误

mod client;
mod error;
mod operations;
mod wire;

pub use client::{GeminiClient, InferenceBackend};
pub use error::GatewayError;
pub use operations::{InferenceGateway, QualityLevel, parse_bounding_box};
pub use wire::{
    Candidate, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, InlineData, Part,
};
