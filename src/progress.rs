//! # 进度模拟器
//!
//! ## 设计思路
//!
//! 远程调用不提供真实进度，这里用时间驱动的估算值安抚用户：
//! 每个节拍 +1，到达停留值（默认 95）后不再增长，直到结果返回时一次性跳到 100。
//! 数值只用于展示，编排逻辑不依赖它。
//!
//! ## 实现思路
//!
//! - 当前值放在 `watch` 通道中，观察者订阅即可拿到最新值。
//! - 节拍器是一个 tokio 任务，句柄保存在 `Mutex<Option<JoinHandle>>` 中；
//!   `start` / `complete` / `reset` / `Drop` 都会先停止旧任务，保证同一时刻至多一个节拍器。

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct ProgressSimulator {
    value: watch::Sender<u8>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    tick: Duration,
    hold_at: u8,
}

impl ProgressSimulator {
    pub fn new(tick: Duration, hold_at: u8) -> Self {
        let (value, _) = watch::channel(0);
        Self {
            value,
            ticker: Mutex::new(None),
            tick,
            hold_at: hold_at.min(100),
        }
    }

    /// 从 0 开始计时；已有节拍器会先被停止。
    ///
    /// 需要在 tokio 运行时内调用。
    pub fn start(&self) {
        self.stop();
        self.value.send_replace(0);

        let sender = self.value.clone();
        let tick = self.tick;
        let hold_at = self.hold_at;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // 第一次 tick 立即返回
            interval.tick().await;
            loop {
                interval.tick().await;
                let mut reached_hold = false;
                sender.send_if_modified(|value| {
                    if *value >= hold_at {
                        reached_hold = true;
                        return false;
                    }
                    *value += 1;
                    reached_hold = *value >= hold_at;
                    true
                });
                if reached_hold {
                    break;
                }
            }
        });

        *self.lock_ticker() = Some(handle);
    }

    /// 停止计时并置为 100。
    pub fn complete(&self) {
        self.stop();
        self.value.send_replace(100);
    }

    /// 停止计时并归零。
    pub fn reset(&self) {
        self.stop();
        self.value.send_replace(0);
    }

    /// 停止计时，保留当前值。
    pub fn stop(&self) {
        if let Some(handle) = self.lock_ticker().take() {
            handle.abort();
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.lock_ticker().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn value(&self) -> u8 {
        *self.value.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.value.subscribe()
    }

    fn lock_ticker(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.ticker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ProgressSimulator {
    fn drop(&mut self) {
        self.stop();
    }
}
