//! # 编排核心（session）
//!
//! - `editor`：`EditorSession`，调度异步任务并发布快照
//! - `state`：单一状态记录与全部状态转换
//! - `source`：源图片、输出格式、结果槽与下载文件
//! - `error`：编排层错误与面向用户的文案

mod editor;
mod error;
mod source;
mod state;

pub use editor::EditorSession;
pub use error::EditorError;
pub use source::{DownloadArtifact, IngestFile, OperationResult, OutputFormat, SourceImage};
pub use state::{Activity, NO_TEXT_PLACEHOLDER, SessionSnapshot};
