use crate::core::Result;
use crate::player::{FrameBuffer, SurfaceBlitter};
use egui::ColorImage;
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;

/// 生产线程写入、UI 线程取走的最新一帧
pub type SharedFrame = Arc<Mutex<Option<ColorImage>>>;

/// 窗口表面 - 把 RGB24 缓冲拷贝成 egui 图像并请求重绘
///
/// blit 返回时数据已经复制完毕，环形缓冲的槽位可以立刻被覆盖。
pub struct FrameSurface {
    ctx: egui::Context,
    latest: SharedFrame,
    frames: u64,
}

impl FrameSurface {
    pub fn new(ctx: egui::Context, latest: SharedFrame) -> Self {
        Self {
            ctx,
            latest,
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl SurfaceBlitter for FrameSurface {
    fn blit(&mut self, frame: &FrameBuffer) -> Result<()> {
        let size = [frame.width() as usize, frame.height() as usize];
        let image = ColorImage::from_rgb(size, frame.data());

        *self.latest.lock() = Some(image);
        self.ctx.request_repaint();

        self.frames += 1;
        if self.frames == 1 {
            info!("🖼️ 第一帧已送达窗口: {}x{}", size[0], size[1]);
        } else {
            debug!("送达第 {} 帧", self.frames);
        }
        Ok(())
    }
}
