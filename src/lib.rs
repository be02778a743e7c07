//! # AI 抠图工作室 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │           界面 / 命令行 (订阅 SessionSnapshot)            │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ EditorSession 方法调用 + watch 通道
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            核心 (Rust)                           │
//! │                                                          │
//! │  ┌─ session ──── EditorSession (状态机 + 忙碌互斥)        │
//! │  │   ├─ state          单一状态记录 / epoch / 代计数      │
//! │  │   └─ source         源图片 / 输出格式 / 下载文件       │
//! │  │                                                       │
//! │  ├─ progress ─── 时间驱动的进度估算                       │
//! │  ├─ gateway ──── 主体检测 · 抠图 · 文字识别               │
//! │  │   └─ client         InferenceBackend / GeminiClient   │
//! │  ├─ geometry ─── 选区换算 · 裁剪栅格化 · JPEG 重编码      │
//! │  ├─ media        Base64 / Data URL / 文件签名            │
//! │  ├─ config       StudioConfig                            │
//! │  └─ error        AppError (统一错误类型)                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，命令行入口的返回类型 |
//! | [`config`] | 远程服务、输入上限、进度节奏与重编码参数 |
//! | [`geometry`] | 显示坐标 → 原图像素、裁剪 PNG、不透明 JPEG |
//! | [`media`] | 图片字节、Data URL 与 Base64 内联数据之间的转换 |
//! | [`gateway`] | 三个远程操作的请求构造与响应校验 |
//! | [`progress`] | 抠图期间的进度模拟 |
//! | [`session`] | 一次编辑会话的状态、互斥与异步结果丢弃规则 |

pub mod config;
pub mod error;
pub mod gateway;
pub mod geometry;
pub mod media;
pub mod progress;
pub mod session;
