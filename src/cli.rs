//! 命令行参数
//!
//! 只负责解析和合并配置，不包含播放逻辑。

use crate::core::{PacingMode, PlayerConfig, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "myy_player", version, about = "单文件媒体播放器")]
pub struct Args {
    /// 要播放的媒体文件；省略时弹出文件选择框
    pub path: Option<PathBuf>,

    /// JSON 配置文件
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 禁用音频，只播放视频
    #[arg(long)]
    pub no_audio: bool,

    /// 帧节奏策略
    #[arg(long, value_enum)]
    pub pacing: Option<PacingMode>,

    /// 固定节奏下每帧间隔（毫秒）
    #[arg(long)]
    pub frame_interval_ms: Option<u64>,

    /// 关闭音频前等待缓冲回收的最长时间（毫秒）
    #[arg(long)]
    pub drain_timeout_ms: Option<u64>,

    /// 播放结束后保持窗口打开
    #[arg(long)]
    pub keep_open: bool,
}

impl Args {
    /// 配置文件（或默认值）+ 命令行覆盖
    pub fn resolve_config(&self) -> Result<PlayerConfig> {
        let base = match &self.config {
            Some(path) => PlayerConfig::load(path)?,
            None => PlayerConfig::default(),
        };
        Ok(self.apply(base))
    }

    fn apply(&self, mut config: PlayerConfig) -> PlayerConfig {
        if self.no_audio {
            config.audio_enabled = false;
        }
        if self.keep_open {
            config.close_on_finish = false;
        }
        if let Some(pacing) = self.pacing {
            config.pacing = pacing;
        }
        if let Some(ms) = self.frame_interval_ms {
            config.frame_interval_ms = ms;
        }
        if let Some(ms) = self.drain_timeout_ms {
            config.drain_timeout_ms = ms;
        }
        config
    }
}
