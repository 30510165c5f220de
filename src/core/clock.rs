use std::time::{Duration, Instant};

/// 播放时钟 - 以第一帧的显示时间戳为基准
///
/// 只在生产线程中使用，不需要加锁。
pub struct PlaybackClock {
    base_pts: Option<Duration>, // 基准 PTS
    base_instant: Instant,      // 基准时刻
    playback_rate: f64,         // 播放速率（1.0 = 正常）
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            base_pts: None,
            base_instant: Instant::now(),
            playback_rate: 1.0,
        }
    }

    /// 当前播放位置；尚未锚定时返回 None
    pub fn now(&self) -> Option<Duration> {
        let base = self.base_pts?;
        let elapsed = self.base_instant.elapsed().as_secs_f64() * self.playback_rate;
        Some(base + Duration::from_secs_f64(elapsed))
    }

    /// 设置播放位置
    pub fn set_time(&mut self, pts: Duration) {
        self.base_pts = Some(pts);
        self.base_instant = Instant::now();
    }

    /// 到达 `pts` 还需要等待多久；第一次调用会把时钟锚定到 `pts`
    pub fn delay_until(&mut self, pts: Duration) -> Duration {
        match self.now() {
            Some(now) => pts.saturating_sub(now),
            None => {
                self.set_time(pts);
                Duration::ZERO
            }
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}
