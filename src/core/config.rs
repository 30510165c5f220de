use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 视频节奏策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PacingMode {
    /// 每帧固定间隔（默认 16ms）
    Fixed,
    /// 按解码出的显示时间戳
    Timestamp,
}

/// 播放器配置
///
/// 可以从 JSON 文件读取，缺省字段使用默认值；命令行参数再覆盖其中的字段。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub pacing: PacingMode,
    pub frame_interval_ms: u64,
    /// 关闭音频设备前等待缓冲回收的最长时间
    pub drain_timeout_ms: u64,
    pub drain_poll_ms: u64,
    pub audio_enabled: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// 播放结束后自动关闭窗口
    pub close_on_finish: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            pacing: PacingMode::Fixed,
            frame_interval_ms: 16, // ~60fps
            drain_timeout_ms: 5000,
            drain_poll_ms: 5,
            audio_enabled: true,
            window_width: 1280,
            window_height: 720,
            close_on_finish: true,
        }
    }
}

impl PlayerConfig {
    /// 从 JSON 文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.drain_poll_ms.max(1))
    }
}
