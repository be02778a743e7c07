//! # 编辑会话（编排核心）
//!
//! ## 设计思路
//!
//! `EditorSession` 拥有一次编辑会话的全部状态，对外提供导入、选区、抠图、
//! 文字识别、格式切换与清空等操作，并通过 `watch` 通道发布状态快照。
//!
//! ```text
//! ingest ──→ 解码(spawn_blocking) ──→ state.load ──→ 自动检测(spawn, 尽力而为)
//! remove_background ──→ state.begin(+进度) ──→ 栅格化 ──→ 网关 ──→ 进度 100 ──→ 展示延迟 ──→ state.finish_removal
//!                                                                                        └─→ JPEG 重编码(spawn)
//! detect_text ──→ state.begin ──→ 栅格化 ──→ 网关 ──→ state.finish_extraction
//! ```
//!
//! ## 实现思路
//!
//! - 状态锁（`std::sync::Mutex`）只在同步代码块中持有，绝不跨 `.await`。
//! - 每次状态转换后立即在锁内发布快照，观察者看到的顺序与转换顺序一致。
//! - 远程调用不会被中止；会话被清空或替换后，迟到的结果按 epoch/代计数丢弃。
//! - `ActivityGuard` 在任何退出路径上释放忙碌标志（含 future 被丢弃的情况）。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::watch;

use super::error::{CONVERSION_FAILED_MESSAGE, EditorError};
use super::source::{DownloadArtifact, IngestFile, OutputFormat, SourceImage};
use super::state::{Activity, DetectionTicket, OperationTicket, RecodeTicket, SessionSnapshot, SessionState, Transition};
use crate::config::StudioConfig;
use crate::gateway::{InferenceBackend, InferenceGateway, InlineData, QualityLevel};
use crate::geometry::{self, CropRegion, Dimensions, EncodedImage};
use crate::media;
use crate::progress::ProgressSimulator;

const CROP_FILE_NAME: &str = "crop.png";

/// 会话内部共享部分，后台任务持有其 `Arc`。
struct SessionInner<B> {
    gateway: InferenceGateway<B>,
    config: StudioConfig,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<SessionSnapshot>,
    progress: ProgressSimulator,
}

impl<B: InferenceBackend> SessionInner<B> {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            log::warn!("⚠️ 会话状态锁已中毒，继续使用内部数据");
            poisoned.into_inner()
        })
    }

    /// 在锁内执行一次状态转换并发布快照。
    fn transition<T>(&self, apply: impl FnOnce(&mut SessionState) -> T) -> T {
        let mut state = self.lock_state();
        let result = apply(&mut state);
        self.snapshots.send_replace(state.snapshot());
        result
    }

    async fn run_detection(self: Arc<Self>, ticket: DetectionTicket) {
        let started = Instant::now();
        let image = InlineData::from_bytes(ticket.source.media_type.clone(), &ticket.source.bytes);

        let bbox = match self.gateway.detect_subject(&image).await {
            Ok(bbox) => {
                log::info!("🎯 主体检测完成 - {:?} 耗时: {:?}", bbox, started.elapsed());
                Some(bbox)
            }
            Err(e) => {
                log::warn!("⚠️ 主体检测失败，保留整图选区 [{}]: {}", e.code(), e);
                None
            }
        };

        let applied = self.transition(|state| state.finish_detection(ticket.generation, bbox));
        if !applied {
            log::debug!("⏭️ 选区已被修改或图片已替换，丢弃检测结果");
        }
    }

    fn spawn_recode(self: &Arc<Self>, ticket: RecodeTicket) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let background = inner.config.jpeg_background.clone();
            let quality = inner.config.jpeg_quality;
            let max_pixels = inner.config.max_decoded_pixels;
            let bytes = ticket.bytes.clone();

            let outcome = tokio::task::spawn_blocking(move || {
                geometry::recode_to_opaque(&bytes, &background, quality, max_pixels)
            })
            .await
            .map_err(EditorError::from)
            .and_then(|result| result.map_err(|e| EditorError::FormatConversion(e.to_string())));

            let applied = match outcome {
                Ok(jpeg) => {
                    log::info!("🖼️ JPEG 重编码完成 - {}KB", jpeg.len() / 1024);
                    inner.transition(|state| state.finish_recode(ticket.generation, ticket.epoch, Ok(jpeg)))
                }
                Err(e) => {
                    log::error!("❌ 格式转换失败 [{}]: {}", e.code(), e);
                    inner.transition(|state| {
                        state.finish_recode(ticket.generation, ticket.epoch, Err(CONVERSION_FAILED_MESSAGE))
                    })
                }
            };
            if !applied {
                log::debug!("⏭️ 丢弃过期的重编码结果");
            }
        });
    }

    async fn rasterize(&self, ticket: &OperationTicket) -> Result<InlineData, EditorError> {
        let pixels = Arc::clone(&ticket.source.pixels);
        let rect = ticket.rect;
        let encoded: EncodedImage =
            tokio::task::spawn_blocking(move || geometry::rasterize_crop(&pixels, rect, CROP_FILE_NAME)).await??;
        Ok(InlineData::from_bytes(encoded.mime_type, &encoded.bytes))
    }
}

/// 忙碌标志守卫：离开作用域时释放对应 epoch 的忙碌状态，抠图中途退出时一并归零进度。
struct ActivityGuard<'a, B: InferenceBackend> {
    inner: &'a SessionInner<B>,
    epoch: u64,
}

impl<B: InferenceBackend> Drop for ActivityGuard<'_, B> {
    fn drop(&mut self) {
        let epoch = self.epoch;
        let mut state = self.inner.lock_state();
        if state.activity().is_busy() && state.epoch() == epoch {
            if state.activity() == Activity::Removing {
                self.inner.progress.reset();
            }
            state.end_activity(epoch);
            self.inner.snapshots.send_replace(state.snapshot());
        }
    }
}

/// 一次编辑会话。
pub struct EditorSession<B: InferenceBackend> {
    inner: Arc<SessionInner<B>>,
}

impl<B: InferenceBackend> EditorSession<B> {
    pub fn new(backend: B, config: StudioConfig) -> Self {
        let gateway = InferenceGateway::from_config(backend, &config);
        Self::with_gateway(gateway, config)
    }

    pub fn with_gateway(gateway: InferenceGateway<B>, config: StudioConfig) -> Self {
        let state = SessionState::default();
        let (snapshots, _) = watch::channel(state.snapshot());
        let progress = ProgressSimulator::new(
            Duration::from_millis(config.progress_tick_ms),
            config.progress_hold_at,
        );

        Self {
            inner: Arc::new(SessionInner {
                gateway,
                config,
                state: Mutex::new(state),
                snapshots,
                progress,
            }),
        }
    }

    pub fn gateway(&self) -> &InferenceGateway<B> {
        &self.inner.gateway
    }

    /// 导入图片文件。
    ///
    /// 媒体类型不是 `image/*` 时清空当前图片并返回 [`EditorError::InvalidFileType`]；
    /// 体积超限或无法解码时保留当前图片，仅提示错误。
    /// 成功后重置全部派生状态，并在后台发起主体检测。
    pub async fn ingest(&self, file: IngestFile) -> Result<(), EditorError> {
        let inner = &self.inner;

        if !media::is_image_media_type(&file.media_type) {
            log::warn!("⚠️ 拒绝非图片文件: {} ({})", file.file_name, file.media_type);
            inner.transition(|state| {
                inner.progress.reset();
                state.reject_file()
            });
            return Err(EditorError::InvalidFileType {
                media_type: file.media_type,
            });
        }

        let size = file.bytes.len() as u64;
        if size > inner.config.max_file_size {
            let err = EditorError::ResourceLimit(format!(
                "文件过大：{} 字节（限制：{} 字节）",
                size, inner.config.max_file_size
            ));
            log::warn!("⚠️ {}", err);
            inner.transition(|state| state.report_error(err.user_message()));
            return Err(err);
        }

        let started = Instant::now();
        let bytes = file.bytes.clone();
        let max_pixels = inner.config.max_decoded_pixels;
        let decoded = tokio::task::spawn_blocking(move || geometry::decode_with_limits(&bytes, max_pixels))
            .await
            .map_err(EditorError::from)
            .and_then(|result| result.map_err(EditorError::from));

        let pixels = match decoded {
            Ok(pixels) => pixels,
            Err(e) => {
                log::error!("❌ 图片解码失败 [{}]: {} ({})", e.code(), e, file.file_name);
                inner.transition(|state| state.report_error(e.user_message()));
                return Err(e);
            }
        };

        log::info!(
            "📥 图片已导入 - {} {}x{} 耗时: {:?}",
            file.file_name,
            pixels.width(),
            pixels.height(),
            started.elapsed()
        );

        let source = SourceImage::new(file, pixels);
        let auto_detect = inner.config.auto_detect;
        let detection = inner.transition(|state| {
            inner.progress.reset();
            state.load(source, auto_detect)
        });

        if let Some(ticket) = detection {
            tokio::spawn(Arc::clone(inner).run_detection(ticket));
        }
        Ok(())
    }

    /// 用户编辑选区；进行中的自动检测结果将被丢弃。
    pub fn set_crop(&self, crop: CropRegion) -> Result<(), EditorError> {
        self.inner.transition(|state| state.apply_crop(crop))
    }

    /// 上报裁剪控件中图片的实际显示尺寸。
    pub fn set_display_size(&self, width: u32, height: u32) -> Result<(), EditorError> {
        self.inner
            .transition(|state| state.apply_display_size(Dimensions::new(width, height)))
    }

    pub fn set_quality(&self, quality: QualityLevel) {
        self.inner.transition(|state| state.apply_quality(quality));
    }

    /// 对当前选区去除背景。
    ///
    /// 已有操作进行中时返回 [`EditorError::Busy`]，选区为空时返回
    /// [`EditorError::DegenerateCrop`]，两者都不会发起远程调用。
    pub async fn remove_background(&self) -> Result<(), EditorError> {
        let inner = &self.inner;
        // 置忙与启动进度在同一次加锁内完成，clear 无法插入其间
        let ticket = inner.transition(|state| {
            let ticket = state.begin(Activity::Removing)?;
            inner.progress.start();
            Ok::<_, EditorError>(ticket)
        })?;
        let _guard = ActivityGuard {
            inner: inner.as_ref(),
            epoch: ticket.epoch,
        };

        let started = Instant::now();
        let outcome: Result<Bytes, EditorError> = async {
            let image = inner.rasterize(&ticket).await?;
            Ok(inner.gateway.remove_background(&image, ticket.quality).await?)
        }
        .await;

        match outcome {
            Ok(bytes) => {
                log::info!(
                    "✂️ 抠图完成 - 区域: {:?} 质量: {} 结果: {}KB 耗时: {:?}",
                    ticket.rect,
                    ticket.quality.as_str(),
                    bytes.len() / 1024,
                    started.elapsed()
                );
                {
                    let state = inner.lock_state();
                    if state.epoch() == ticket.epoch {
                        inner.progress.complete();
                    }
                }
                tokio::time::sleep(Duration::from_millis(inner.config.result_settle_delay_ms)).await;

                let transition = inner.transition(|state| state.finish_removal(ticket.epoch, Ok(bytes)));
                match transition {
                    Transition::Applied(Some(recode)) => inner.spawn_recode(recode),
                    Transition::Applied(None) => {}
                    Transition::Stale => log::debug!("⏭️ 会话已变化，丢弃抠图结果"),
                }
                Ok(())
            }
            Err(e) => {
                log::error!("❌ 抠图失败 [{}]: {}", e.code(), e);
                let progress = &inner.progress;
                inner.transition(|state| {
                    if let Transition::Applied(_) = state.finish_removal(ticket.epoch, Err(e.user_message())) {
                        progress.reset();
                    }
                });
                Err(e)
            }
        }
    }

    /// 识别当前选区中的文字。
    pub async fn detect_text(&self) -> Result<(), EditorError> {
        let inner = &self.inner;
        let ticket = inner.transition(|state| state.begin(Activity::Extracting))?;
        let _guard = ActivityGuard {
            inner: inner.as_ref(),
            epoch: ticket.epoch,
        };

        let started = Instant::now();
        let outcome: Result<String, EditorError> = async {
            let image = inner.rasterize(&ticket).await?;
            Ok(inner.gateway.detect_text(&image).await?)
        }
        .await;

        match outcome {
            Ok(text) => {
                log::info!("🔤 文字识别完成 - {} 字符 耗时: {:?}", text.chars().count(), started.elapsed());
                if !inner.transition(|state| state.finish_extraction(ticket.epoch, Ok(text))) {
                    log::debug!("⏭️ 会话已变化，丢弃识别结果");
                }
                Ok(())
            }
            Err(e) => {
                log::error!("❌ 文字识别失败 [{}]: {}", e.code(), e);
                inner.transition(|state| state.finish_extraction(ticket.epoch, Err(e.user_message())));
                Err(e)
            }
        }
    }

    /// 切换下载格式；只重新派生下载文件，不会重新抠图。
    pub fn set_output_format(&self, format: OutputFormat) {
        if let Some(recode) = self.inner.transition(|state| state.select_format(format)) {
            self.inner.spawn_recode(recode);
        }
    }

    /// 清空会话：停止进度、丢弃一切结果，进行中的操作结果到达后被忽略。
    pub fn clear(&self) {
        let progress = &self.inner.progress;
        self.inner.transition(|state| {
            progress.reset();
            state.clear()
        });
        log::info!("🧹 会话已清空");
    }

    pub fn download_artifact(&self) -> Option<DownloadArtifact> {
        self.inner.lock_state().artifact()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn progress(&self) -> u8 {
        self.inner.progress.value()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.inner.progress.subscribe()
    }

    /// 等待当前的自动检测结束（成功、失败或被作废）。
    pub async fn detection_settled(&self) {
        let mut rx = self.subscribe();
        // 发送端与会话同生命周期，这里不会失败
        let _ = rx.wait_for(|snapshot| !snapshot.detecting).await;
    }
}

impl<B: InferenceBackend> Drop for EditorSession<B> {
    fn drop(&mut self) {
        self.inner.progress.stop();
    }
}
