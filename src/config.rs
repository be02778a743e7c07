//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有可调参数集中到 `StudioConfig`：远程服务地址与模型、超时、输入上限、
//! 进度模拟节奏、结果展示延迟以及 JPEG 重编码参数。`Default` 即生产配置。
//!
//! ## 实现思路
//!
//! - `#[serde(default)]`：配置文件只需写出要覆盖的字段。
//! - `load_from_path` 在文件缺失或格式错误时回退默认值（记录日志，不报错）。
//! - API Key 优先取配置文件，其次依次读取 `GEMINI_API_KEY`、`API_KEY` 环境变量。

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geometry::parse_hex_color;

const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// REST 根地址，不含 `/models/...` 部分。
    pub api_base_url: String,
    /// 留空时从环境变量读取。
    pub api_key: Option<String>,
    /// 抠图使用的图像模型。
    pub image_model: String,
    /// 主体检测与文字识别使用的视觉模型。
    pub vision_model: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// 导入文件允许的最大字节数。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    pub progress_tick_ms: u64,
    /// 进度条在结果返回前停留的数值。
    pub progress_hold_at: u8,
    /// 抠图结果返回后、展示前的等待时间（毫秒）。
    pub result_settle_delay_ms: u64,
    pub jpeg_quality: u8,
    pub jpeg_background: String,
    /// 导入后是否自动检测主体并调整选区。
    pub auto_detect: bool,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            image_model: "gemini-2.5-flash-image".to_string(),
            vision_model: "gemini-2.5-flash".to_string(),
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
            max_file_size: 20 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            progress_tick_ms: 50,
            progress_hold_at: 95,
            result_settle_delay_ms: 500,
            jpeg_quality: 95,
            jpeg_background: "#FFFFFF".to_string(),
            auto_detect: true,
        }
    }
}

impl StudioConfig {
    /// 读取配置文件；文件缺失或无法解析时回退默认值。
    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            log::info!("配置文件不存在，使用默认配置: {:?}", path);
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("⚠️ 配置文件格式错误，使用默认配置: {:?} ({})", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("⚠️ 读取配置文件失败，使用默认配置: {:?} ({})", path, e);
                Self::default()
            }
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("序列化配置失败: {}", e)))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// 检查取值范围。
    pub fn validate(&self) -> Result<(), AppError> {
        if self.api_base_url.trim().is_empty() {
            return Err(AppError::Config("api_base_url 不能为空".to_string()));
        }
        if self.image_model.trim().is_empty() || self.vision_model.trim().is_empty() {
            return Err(AppError::Config("模型名称不能为空".to_string()));
        }
        if self.request_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(AppError::Config("超时时间必须大于 0".to_string()));
        }
        if self.max_file_size == 0 || self.max_decoded_pixels == 0 {
            return Err(AppError::Config("输入上限必须大于 0".to_string()));
        }
        if self.progress_tick_ms == 0 {
            return Err(AppError::Config("progress_tick_ms 必须大于 0".to_string()));
        }
        if self.progress_hold_at >= 100 {
            return Err(AppError::Config(format!(
                "progress_hold_at 必须小于 100，当前为 {}",
                self.progress_hold_at
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AppError::Config(format!(
                "jpeg_quality 必须在 1-100 之间，当前为 {}",
                self.jpeg_quality
            )));
        }
        parse_hex_color(&self.jpeg_background)
            .map_err(|e| AppError::Config(format!("jpeg_background 无效: {}", e)))?;
        Ok(())
    }

    /// 最终生效的 API Key。
    pub fn resolved_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// 按“配置文件 → 环境变量”的顺序查找 API Key，空白值视为未配置。
    pub fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        let non_blank = |value: String| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };

        self.api_key
            .clone()
            .and_then(non_blank)
            .or_else(|| API_KEY_ENV_VARS.into_iter().find_map(|name| lookup(name).and_then(non_blank)))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn unique_temp_dir() -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("cutout-studio-config-test-{nanos}"));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn default_config_is_valid() {
        let config = StudioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.progress_hold_at, 95);
        assert_eq!(config.jpeg_background, "#FFFFFF");
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let dir = unique_temp_dir();
        let config_path = dir.join("nested").join("config.json");

        let config = StudioConfig {
            image_model: "custom-image-model".to_string(),
            jpeg_quality: 80,
            ..StudioConfig::default()
        };
        config.save_to_path(&config_path).expect("save config");

        let loaded = StudioConfig::load_from_path(&config_path);
        assert_eq!(loaded, config);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let dir = unique_temp_dir();
        let config_path = dir.join("config.json");
        std::fs::write(&config_path, r#"{"progress_tick_ms": 10}"#).expect("write config");

        let loaded = StudioConfig::load_from_path(&config_path);
        assert_eq!(loaded.progress_tick_ms, 10);
        assert_eq!(loaded.vision_model, StudioConfig::default().vision_model);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn load_bad_or_missing_config_falls_back_to_default() {
        let dir = unique_temp_dir();
        let config_path = dir.join("config.json");
        std::fs::write(&config_path, "not-json").expect("write invalid config");

        assert_eq!(StudioConfig::load_from_path(&config_path), StudioConfig::default());
        assert_eq!(
            StudioConfig::load_from_path(&dir.join("missing.json")),
            StudioConfig::default()
        );
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let bad_hold = StudioConfig {
            progress_hold_at: 100,
            ..StudioConfig::default()
        };
        assert!(matches!(bad_hold.validate(), Err(AppError::Config(_))));

        let bad_quality = StudioConfig {
            jpeg_quality: 0,
            ..StudioConfig::default()
        };
        assert!(matches!(bad_quality.validate(), Err(AppError::Config(_))));

        let bad_color = StudioConfig {
            jpeg_background: "white".to_string(),
            ..StudioConfig::default()
        };
        assert!(matches!(bad_color.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn api_key_prefers_config_then_env_order() {
        let env = |name: &str| match name {
            "GEMINI_API_KEY" => Some("gemini-env".to_string()),
            "API_KEY" => Some("generic-env".to_string()),
            _ => None,
        };

        let from_config = StudioConfig {
            api_key: Some(" configured ".to_string()),
            ..StudioConfig::default()
        };
        assert_eq!(from_config.resolve_api_key_with(env).as_deref(), Some("configured"));

        let from_env = StudioConfig::default();
        assert_eq!(from_env.resolve_api_key_with(env).as_deref(), Some("gemini-env"));

        let fallback = |name: &str| (name == "API_KEY").then(|| "generic-env".to_string());
        assert_eq!(from_env.resolve_api_key_with(fallback).as_deref(), Some("generic-env"));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = StudioConfig {
            api_key: Some("   ".to_string()),
            ..StudioConfig::default()
        };
        assert_eq!(config.resolve_api_key_with(|_| Some(String::new())), None);
    }
}
