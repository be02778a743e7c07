//! # 会话状态机
//!
//! ## 设计思路
//!
//! 所有状态槽（源图、选区、结果、格式、忙碌标志）集中在一个 `SessionState` 中，
//! 每个触发事件对应一个转换方法。互斥、过期判定与重置规则都只在这里实现，
//! 编排层只负责调度异步任务并把结果交回对应的转换方法。
//!
//! ```text
//! Empty ──load──→ Loaded ──begin(Removing)──→ Removing ──finish──→ Loaded
//!   ↑               │   └──begin(Extracting)─→ Extracting ─finish─┘
//!   └──clear────────┘
//! ```
//!
//! ## 实现思路
//!
//! - `epoch`：导入/清空时递增，异步操作带着开始时的 epoch 返回，不一致即丢弃。
//! - 主体检测与 JPEG 重编码各自持有一个代计数器，旧代结果到达时直接丢弃。
//! - 忙碌标志是 `Activity` 枚举而非两个布尔值，两类操作天然互斥。

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use super::EditorError;
use super::error::{INVALID_FILE_MESSAGE, SELECT_REGION_MESSAGE};
use super::source::{DownloadArtifact, OperationResult, OutputFormat, SourceImage};
use crate::gateway::QualityLevel;
use crate::geometry::{BoundingBox, CropRegion, Dimensions, PixelRect, compute_crop_in_pixels};

/// 文字识别结果为空时展示的占位文案。
pub const NO_TEXT_PLACEHOLDER: &str = "No text found in the selected area.";

/// 当前进行中的远程图片操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    #[default]
    Idle,
    Removing,
    Extracting,
}

impl Activity {
    pub fn is_busy(self) -> bool {
        self != Self::Idle
    }
}

/// 单调递增的代计数器。
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct GenerationCounter(u64);

impl GenerationCounter {
    pub(crate) fn advance(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(1);
        self.0
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.0 == generation
    }
}

/// 开始一次远程操作所需的全部输入，在持锁期间一次性取出。
pub(crate) struct OperationTicket {
    pub(crate) epoch: u64,
    pub(crate) source: Arc<SourceImage>,
    pub(crate) rect: PixelRect,
    pub(crate) quality: QualityLevel,
}

/// 主体检测任务的输入。
pub(crate) struct DetectionTicket {
    pub(crate) generation: u64,
    pub(crate) source: Arc<SourceImage>,
}

/// JPEG 重编码任务的输入。
pub(crate) struct RecodeTicket {
    pub(crate) generation: u64,
    pub(crate) epoch: u64,
    pub(crate) bytes: Bytes,
}

/// 异步结果交回状态机后的处理结论。
#[derive(Debug)]
pub(crate) enum Transition<T> {
    Applied(T),
    /// 会话已被清空或替换，结果被丢弃。
    Stale,
}

/// 会话对外的只读视图。
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub source: Option<Arc<SourceImage>>,
    pub crop: CropRegion,
    pub display: Option<Dimensions>,
    pub quality: QualityLevel,
    pub output_format: OutputFormat,
    pub activity: Activity,
    /// 自动主体检测进行中。
    pub detecting: bool,
    /// JPEG 重编码进行中，此时下载不可用。
    pub converting: bool,
    pub removal: Option<OperationResult<Bytes>>,
    pub text: Option<OperationResult<String>>,
    pub artifact: Option<DownloadArtifact>,
    /// 最近一次面向用户的错误提示。
    pub error: Option<String>,
    /// 每次清空递增，用于重置文件选择控件。
    pub input_reset_nonce: u64,
    pub epoch: u64,
}

impl SessionSnapshot {
    pub fn has_image(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.activity.is_busy()
    }
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    source: Option<Arc<SourceImage>>,
    crop: CropRegion,
    display: Option<Dimensions>,
    quality: QualityLevel,
    output_format: OutputFormat,
    activity: Activity,
    detecting: bool,
    converting: bool,
    removal: Option<OperationResult<Bytes>>,
    text: Option<OperationResult<String>>,
    artifact: Option<DownloadArtifact>,
    error: Option<String>,
    input_reset_nonce: u64,
    epoch: u64,
    detection: GenerationCounter,
    recode: GenerationCounter,
}

impl SessionState {
    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source: self.source.clone(),
            crop: self.crop,
            display: self.display,
            quality: self.quality,
            output_format: self.output_format,
            activity: self.activity,
            detecting: self.detecting,
            converting: self.converting,
            removal: self.removal.clone(),
            text: self.text.clone(),
            artifact: self.artifact.clone(),
            error: self.error.clone(),
            input_reset_nonce: self.input_reset_nonce,
            epoch: self.epoch,
        }
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn activity(&self) -> Activity {
        self.activity
    }

    pub(crate) fn artifact(&self) -> Option<DownloadArtifact> {
        self.artifact.clone()
    }

    /// 丢弃当前图片及其派生状态，进入新的 epoch。质量档位跨图片保留。
    fn reset_image(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.detection.advance();
        self.recode.advance();
        self.source = None;
        self.crop = CropRegion::full_image();
        self.display = None;
        self.output_format = OutputFormat::default();
        self.activity = Activity::Idle;
        self.detecting = false;
        self.converting = false;
        self.removal = None;
        self.text = None;
        self.artifact = None;
        self.error = None;
    }

    /// 导入成功：整图选区，派生状态全部重置。需要自动检测时返回检测任务。
    pub(crate) fn load(&mut self, source: SourceImage, auto_detect: bool) -> Option<DetectionTicket> {
        self.reset_image();
        let source = Arc::new(source);
        self.display = Some(source.natural);
        self.source = Some(Arc::clone(&source));

        if !auto_detect {
            return None;
        }
        self.detecting = true;
        Some(DetectionTicket {
            generation: self.detection.advance(),
            source,
        })
    }

    /// 文件类型不合法：清空已加载的图片。
    pub(crate) fn reject_file(&mut self) {
        self.reset_image();
        self.error = Some(INVALID_FILE_MESSAGE.to_string());
    }

    /// 其他导入失败：保留原有图片，只提示错误。
    pub(crate) fn report_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    /// 检测结果到达；旧代结果返回 `false` 且不产生任何影响。
    pub(crate) fn finish_detection(&mut self, generation: u64, bbox: Option<BoundingBox>) -> bool {
        if !self.detection.is_current(generation) {
            return false;
        }
        self.detecting = false;
        if let Some(bbox) = bbox {
            let detected = CropRegion::from_bounding_box(&bbox);
            if detected.is_empty() {
                log::warn!("⚠️ 检测结果为空区域，保留整图选区: {:?}", bbox);
            } else {
                self.crop = detected;
            }
        }
        true
    }

    /// 用户编辑选区：进行中的自动检测作废。
    pub(crate) fn apply_crop(&mut self, crop: CropRegion) -> Result<(), EditorError> {
        if self.source.is_none() {
            return Err(EditorError::NoImage);
        }
        self.crop = crop;
        self.detection.advance();
        self.detecting = false;
        Ok(())
    }

    pub(crate) fn apply_display_size(&mut self, display: Dimensions) -> Result<(), EditorError> {
        if self.source.is_none() {
            return Err(EditorError::NoImage);
        }
        self.display = Some(display);
        Ok(())
    }

    pub(crate) fn apply_quality(&mut self, quality: QualityLevel) {
        self.quality = quality;
    }

    /// 尝试开始一次远程操作：检查忙碌、图片与选区，成功后置忙并清空该操作的旧结果。
    pub(crate) fn begin(&mut self, activity: Activity) -> Result<OperationTicket, EditorError> {
        if self.activity.is_busy() {
            return Err(EditorError::Busy { active: self.activity });
        }
        let source = self.source.clone().ok_or(EditorError::NoImage)?;
        let display = self.display.unwrap_or(source.natural);

        let rect = match compute_crop_in_pixels(display, source.natural, &self.crop) {
            Ok(rect) => rect,
            Err(e) => {
                log::warn!("⚠️ 选区无效，不发起远程调用: {}", e);
                self.error = Some(SELECT_REGION_MESSAGE.to_string());
                return Err(EditorError::DegenerateCrop);
            }
        };

        self.activity = activity;
        self.error = None;
        match activity {
            Activity::Removing => {
                self.removal = None;
                self.artifact = None;
                self.converting = false;
                self.recode.advance();
            }
            Activity::Extracting => self.text = None,
            Activity::Idle => {}
        }

        Ok(OperationTicket {
            epoch: self.epoch,
            source,
            rect,
            quality: self.quality,
        })
    }

    /// 释放忙碌标志；epoch 已变化说明会话被清空过，不再触碰。
    pub(crate) fn end_activity(&mut self, epoch: u64) {
        if self.epoch == epoch {
            self.activity = Activity::Idle;
        }
    }

    /// 抠图完成。成功时若需要 JPEG 派生，返回重编码任务。
    pub(crate) fn finish_removal(
        &mut self,
        epoch: u64,
        outcome: Result<Bytes, &str>,
    ) -> Transition<Option<RecodeTicket>> {
        if self.epoch != epoch {
            return Transition::Stale;
        }
        self.activity = Activity::Idle;
        match outcome {
            Ok(bytes) => {
                self.removal = Some(OperationResult::Ready(bytes));
                Transition::Applied(self.derive_artifact())
            }
            Err(message) => {
                self.removal = Some(OperationResult::Failed {
                    message: message.to_string(),
                });
                self.error = Some(message.to_string());
                Transition::Applied(None)
            }
        }
    }

    /// 文字识别完成；结果为空时替换为占位文案。
    pub(crate) fn finish_extraction(&mut self, epoch: u64, outcome: Result<String, &str>) -> bool {
        if self.epoch != epoch {
            return false;
        }
        self.activity = Activity::Idle;
        self.text = Some(match outcome {
            Ok(text) if text.is_empty() => OperationResult::Ready(NO_TEXT_PLACEHOLDER.to_string()),
            Ok(text) => OperationResult::Ready(text),
            Err(message) => {
                self.error = Some(message.to_string());
                OperationResult::Failed {
                    message: message.to_string(),
                }
            }
        });
        true
    }

    /// 切换输出格式，与忙碌标志无关。
    pub(crate) fn select_format(&mut self, format: OutputFormat) -> Option<RecodeTicket> {
        self.output_format = format;
        self.derive_artifact()
    }

    /// 根据抠图结果与输出格式重新派生下载文件。
    ///
    /// PNG 直接复用抠图字节；JPEG 需要重编码，期间下载不可用。
    fn derive_artifact(&mut self) -> Option<RecodeTicket> {
        let generation = self.recode.advance();
        self.converting = false;
        self.artifact = None;

        let bytes = match &self.removal {
            Some(OperationResult::Ready(bytes)) => bytes.clone(),
            _ => return None,
        };

        match self.output_format {
            OutputFormat::Png => {
                self.artifact = Some(DownloadArtifact::new(OutputFormat::Png, bytes));
                None
            }
            OutputFormat::Jpeg => {
                self.converting = true;
                Some(RecodeTicket {
                    generation,
                    epoch: self.epoch,
                    bytes,
                })
            }
        }
    }

    /// 重编码完成；乱序到达的旧代结果被丢弃。
    pub(crate) fn finish_recode(
        &mut self,
        generation: u64,
        epoch: u64,
        outcome: Result<Vec<u8>, &str>,
    ) -> bool {
        if self.epoch != epoch || !self.recode.is_current(generation) {
            return false;
        }
        self.converting = false;
        match outcome {
            Ok(jpeg) => self.artifact = Some(DownloadArtifact::new(OutputFormat::Jpeg, Bytes::from(jpeg))),
            Err(message) => {
                self.artifact = None;
                self.error = Some(message.to_string());
            }
        }
        true
    }

    /// 清空会话并重置文件选择控件。
    pub(crate) fn clear(&mut self) {
        self.reset_image();
        self.quality = QualityLevel::default();
        self.input_reset_nonce = self.input_reset_nonce.wrapping_add(1);
    }
}
