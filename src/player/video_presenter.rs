use crate::core::{PacingMode, PixelFormat, PlaybackClock, PlayerConfig, PlayerError, Result};
use crate::player::backend::{DecodedVideo, PixelConverter};
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

/// 环形缓冲长度（双缓冲）
pub const RING_LEN: usize = 2;

/// 时间戳节奏下单帧最长等待，防止异常 PTS 卡住生产线程
const MAX_TIMESTAMP_WAIT: Duration = Duration::from_secs(1);

/// 一个像素缓冲槽位（RGB24，自上而下，无行填充）
#[derive(Debug)]
pub struct FrameBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl FrameBuffer {
    pub(crate) fn allocate(width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let size = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| PlayerError::AllocationFailed(format!("{}x{} 尺寸溢出", width, height)))?;

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|e| PlayerError::AllocationFailed(format!("视频缓冲 {} 字节: {}", size, e)))?;
        data.resize(size, 0);

        Ok(Self {
            data,
            width,
            height,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// 每行字节数
    pub fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// 视频双缓冲
///
/// 写入的槽位永远不是刚交给窗口的那一个：槽位数 ≥ 2 且只有生产线程写入。
pub struct FrameRing {
    slots: Vec<FrameBuffer>,
    cursor: usize,
}

impl FrameRing {
    /// 根据解码器报告的尺寸一次性分配全部槽位
    pub fn allocate(width: u32, height: u32) -> Result<Self> {
        let slots = (0..RING_LEN)
            .map(|_| FrameBuffer::allocate(width, height, PixelFormat::RGB24))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "🖼️ 分配视频缓冲: {} x {} 字节 ({}x{} RGB24)",
            RING_LEN,
            slots[0].data.len(),
            width,
            height
        );

        Ok(Self { slots, cursor: 0 })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// 下一帧要写入的槽位索引
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn slot_size(&self) -> usize {
        self.slots[0].data.len()
    }

    pub fn slot(&self, index: usize) -> Option<&FrameBuffer> {
        self.slots.get(index)
    }

    fn current_mut(&mut self) -> &mut FrameBuffer {
        &mut self.slots[self.cursor]
    }

    fn current(&self) -> &FrameBuffer {
        &self.slots[self.cursor]
    }

    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    /// 释放全部槽位，返回释放的缓冲数量
    pub fn release(self) -> usize {
        let count = self.slots.len();
        drop(self.slots);
        count
    }
}

/// 窗口表面：同步接收一帧像素，返回时平台已经接受了数据
pub trait SurfaceBlitter {
    fn blit(&mut self, frame: &FrameBuffer) -> Result<()>;
}

/// 帧节奏控制
pub enum Pacer {
    /// 固定间隔（占位策略，与时间戳无关）
    Fixed(Duration),
    /// 按显示时间戳
    Timestamp(PlaybackClock),
}

impl Pacer {
    pub fn from_config(config: &PlayerConfig) -> Self {
        match config.pacing {
            PacingMode::Fixed => Pacer::Fixed(config.frame_interval()),
            PacingMode::Timestamp => Pacer::Timestamp(PlaybackClock::new()),
        }
    }

    /// 本帧交给窗口之后需要等待多久
    pub fn delay_for(&mut self, pts: Option<Duration>) -> Duration {
        match self {
            Pacer::Fixed(interval) => *interval,
            Pacer::Timestamp(clock) => match pts {
                Some(pts) => clock.delay_until(pts).min(MAX_TIMESTAMP_WAIT),
                None => Duration::ZERO,
            },
        }
    }

    fn wait(&mut self, pts: Option<Duration>) {
        let delay = self.delay_for(pts);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// 视频呈现器：转换 → 交给窗口 → 轮转槽位 → 节奏等待
pub struct VideoPresenter<C> {
    converter: C,
    pacer: Pacer,
    presented: u64,
}

impl<C: PixelConverter> VideoPresenter<C>
where
    C::Frame: DecodedVideo,
{
    pub fn new(converter: C, pacer: Pacer) -> Self {
        Self {
            converter,
            pacer,
            presented: 0,
        }
    }

    /// 呈现一帧，返回轮转后的槽位索引
    ///
    /// 像素转换在初始化成功后视为不会失败；失败时跳过该帧但仍然轮转，
    /// 保证索引序列只取决于呈现次数。
    pub fn present<S: SurfaceBlitter>(
        &mut self,
        ring: &mut FrameRing,
        frame: &C::Frame,
        surface: &mut S,
    ) -> usize {
        let slot = ring.current_mut();
        if frame.width() != slot.width() || frame.height() != slot.height() {
            warn!(
                "帧尺寸 {}x{} 与缓冲 {}x{} 不一致（不支持中途改变分辨率）",
                frame.width(),
                frame.height(),
                slot.width(),
                slot.height()
            );
        }

        match self.converter.convert(frame, slot) {
            Ok(()) => {
                if let Err(e) = surface.blit(ring.current()) {
                    warn!("窗口呈现失败（已跳过）: {}", e);
                }
            }
            Err(e) => warn!("像素转换失败（已跳过）: {}", e),
        }

        ring.advance();
        self.presented += 1;
        debug!("📺 呈现第 {} 帧，下一个槽位 {}", self.presented, ring.cursor());

        self.pacer.wait(frame.presentation_time());
        ring.cursor()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::testing::{MockScaler, MockVideoFrame, RecordingSurface};

    fn presenter() -> VideoPresenter<MockScaler> {
        VideoPresenter::new(MockScaler::default(), Pacer::Fixed(Duration::ZERO))
    }

    #[test]
    fn test_ring_allocation_720p() {
        let ring = FrameRing::allocate(1280, 720).unwrap();
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.slot_size(), 1280 * 720 * 3);
        for i in 0..ring.len() {
            let slot = ring.slot(i).unwrap();
            assert_eq!(slot.data().len(), 1280 * 720 * 3);
            assert_eq!(slot.stride(), 1280 * 3);
            assert_eq!(slot.format(), PixelFormat::RGB24);
        }
        assert_eq!(ring.cursor(), 0);
    }

    #[test]
    fn test_ring_allocation_overflow() {
        let err = FrameRing::allocate(u32::MAX, u32::MAX).err().unwrap();
        assert!(matches!(err, PlayerError::AllocationFailed(_)));
    }

    #[test]
    fn test_cursor_sequence_after_ten_frames() {
        let mut ring = FrameRing::allocate(1280, 720).unwrap();
        let mut surface = RecordingSurface::default();
        let mut presenter = presenter();

        let cursors: Vec<usize> = (0..10)
            .map(|i| presenter.present(&mut ring, &MockVideoFrame::new(1280, 720, i), &mut surface))
            .collect();

        assert_eq!(cursors, vec![1, 0, 1, 0, 1, 0, 1, 0, 1, 0]);
        assert_eq!(presenter.presented(), 10);
    }

    #[test]
    fn test_blits_alternate_between_two_buffers() {
        let mut ring = FrameRing::allocate(64, 32).unwrap();
        let mut surface = RecordingSurface::default();
        let mut presenter = presenter();

        for i in 0..4 {
            presenter.present(&mut ring, &MockVideoFrame::new(64, 32, i), &mut surface);
        }

        let blits = surface.blits();
        assert_eq!(blits.len(), 4);
        assert_ne!(blits[0].address, blits[1].address);
        assert_eq!(blits[0].address, blits[2].address);
        assert_eq!(blits[1].address, blits[3].address);
        // 每帧写入的内容就是交给窗口的内容
        let fills: Vec<u8> = blits.iter().map(|b| b.first_byte).collect();
        assert_eq!(fills, vec![0, 1, 2, 3]);
        assert!(blits.iter().all(|b| b.width == 64 && b.height == 32));
    }

    #[test]
    fn test_cursor_is_n_mod_2() {
        let mut ring = FrameRing::allocate(8, 8).unwrap();
        let mut surface = RecordingSurface::default();
        let mut presenter = presenter();
        for n in 1..=7u64 {
            let cursor = presenter.present(&mut ring, &MockVideoFrame::new(8, 8, n), &mut surface);
            assert_eq!(cursor as u64, n % 2);
        }
    }

    #[test]
    fn test_failed_blit_still_rotates() {
        let mut ring = FrameRing::allocate(8, 8).unwrap();
        let mut surface = RecordingSurface::failing();
        let mut presenter = presenter();
        assert_eq!(presenter.present(&mut ring, &MockVideoFrame::new(8, 8, 0), &mut surface), 1);
        assert_eq!(presenter.present(&mut ring, &MockVideoFrame::new(8, 8, 1), &mut surface), 0);
    }

    #[test]
    fn test_release_counts_slots() {
        let ring = FrameRing::allocate(16, 16).unwrap();
        assert_eq!(ring.release(), RING_LEN);
    }

    #[test]
    fn test_fixed_pacer_ignores_pts() {
        let mut pacer = Pacer::Fixed(Duration::from_millis(16));
        assert_eq!(pacer.delay_for(None), Duration::from_millis(16));
        assert_eq!(pacer.delay_for(Some(Duration::from_secs(100))), Duration::from_millis(16));
    }

    #[test]
    fn test_timestamp_pacer() {
        let mut pacer = Pacer::Timestamp(PlaybackClock::new());
        // 第一帧锚定时钟，不等待
        assert_eq!(pacer.delay_for(Some(Duration::from_millis(40))), Duration::ZERO);
        let delay = pacer.delay_for(Some(Duration::from_millis(80)));
        assert!(delay <= Duration::from_millis(40));
        assert!(delay > Duration::from_millis(20));
        // 无时间戳的帧不等待；超大跳变被限制
        assert_eq!(pacer.delay_for(None), Duration::ZERO);
        assert_eq!(pacer.delay_for(Some(Duration::from_secs(3600))), MAX_TIMESTAMP_WAIT);
    }
}
