//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 各层保留自己的错误枚举（`RasterError` / `GatewayError` / `EditorError`），
//! `AppError` 位于最外层，汇总配置、文件系统与会话错误，供命令行入口统一处理。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为各层错误提供 `From` 转换，`?` 直接向上传播。
//! - 实现 `Serialize` 将错误序列化为字符串，便于嵌入方直接透传给界面。

use serde::Serialize;

use crate::gateway::GatewayError;
use crate::session::EditorError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 配置文件内容不合法
    #[error("配置错误: {0}")]
    Config(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 编辑会话操作失败
    #[error("{0}")]
    Editor(#[from] EditorError),

    /// 推理服务初始化失败
    #[error("{0}")]
    Gateway(#[from] GatewayError),
}

impl AppError {
    /// 面向用户的提示；会话错误使用通用文案，不暴露远程细节。
    pub fn user_message(&self) -> String {
        match self {
            Self::Editor(e) => e.user_message().to_string(),
            other => other.to_string(),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editor_errors_serialize_as_user_message() {
        let err = AppError::from(EditorError::from(GatewayError::NoImageData));
        let json = serde_json::to_string(&err).expect("serialize error");
        assert!(json.contains("Failed to process image"));
        assert!(!json.contains("候选结果"));
    }

    #[test]
    fn config_errors_keep_detail() {
        let err = AppError::Config("jpeg_quality 必须在 1-100 之间".to_string());
        assert_eq!(err.user_message(), "配置错误: jpeg_quality 必须在 1-100 之间");
    }
}
