use crate::core::{AudioFormat, PlayerError, Result};
use crate::player::backend::{PixelConverter, Resample};
use crate::player::decoder::VideoPicture;
use crate::player::video_presenter::FrameBuffer;
use ffmpeg_next::{ffi, software, util};
use log::debug;

/// 源像素格式 → RGB24（尺寸不变）
pub struct RgbScaler {
    context: software::scaling::Context,
    scratch: util::frame::Video,
}

impl RgbScaler {
    pub fn new(format: util::format::Pixel, width: u32, height: u32) -> Result<Self> {
        let context = software::scaling::Context::get(
            format,
            width,
            height,
            util::format::Pixel::RGB24,
            width,
            height,
            software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| PlayerError::ScalerInitFailed(format!("{:?} {}x{}: {}", format, width, height, e)))?;

        debug!("🔧 像素转换: {:?} {}x{} → RGB24", format, width, height);

        Ok(Self {
            context,
            scratch: util::frame::Video::empty(),
        })
    }
}

impl PixelConverter for RgbScaler {
    type Frame = VideoPicture;

    fn convert(&mut self, src: &VideoPicture, dst: &mut FrameBuffer) -> Result<()> {
        self.context.run(&src.frame, &mut self.scratch)?;

        // sws 输出的行可能带填充，逐行拷贝到紧凑缓冲
        let row_size = dst.stride();
        let rows = dst.height() as usize;
        let src_stride = self.scratch.stride(0);
        let src_data = self.scratch.data(0);

        for (y, row) in dst.data_mut().chunks_exact_mut(row_size).take(rows).enumerate() {
            let offset = y * src_stride;
            let Some(line) = src_data.get(offset..offset + row_size) else {
                break;
            };
            row.copy_from_slice(line);
        }
        Ok(())
    }
}

/// 重采样器：源格式 → 交错 s16 立体声，采样率不变
pub struct PcmResampler {
    context: software::resampling::Context,
    input_rate: u32,
    output: AudioFormat,
}

impl PcmResampler {
    pub fn new(
        format: util::format::Sample,
        layout: util::channel_layout::ChannelLayout,
        channels: u16,
        input_rate: u32,
        output: &AudioFormat,
    ) -> Result<Self> {
        // 声道数为 0 时按立体声处理；布局未知时按声道数取默认布局
        let layout = if channels == 0 {
            util::channel_layout::ChannelLayout::STEREO
        } else if layout.is_empty() {
            util::channel_layout::ChannelLayout::default(channels as i32)
        } else {
            layout
        };

        let context = software::resampling::Context::get(
            format,
            layout,
            input_rate,
            util::format::Sample::I16(util::format::sample::Type::Packed),
            util::channel_layout::ChannelLayout::STEREO,
            output.sample_rate,
        )
        .map_err(|e| PlayerError::AudioInitFailed(format!("重采样器初始化失败: {}", e)))?;

        debug!(
            "🔧 初始化音频重采样器: {}Hz/{}ch {:?} → {}Hz/{}ch s16",
            input_rate, channels, format, output.sample_rate, output.channels
        );

        Ok(Self {
            context,
            input_rate,
            output: *output,
        })
    }
}

impl Resample for PcmResampler {
    type Frame = util::frame::Audio;

    fn delay(&self) -> u64 {
        // 以输入采样率计的缓存采样数（Context::delay 按整秒取整，不足一秒会得到 0）
        let delay = unsafe { ffi::swr_get_delay(self.context.as_ptr() as *mut _, self.input_rate as i64) };
        delay.max(0) as u64
    }

    fn input_rate(&self) -> u32 {
        self.input_rate
    }

    fn output_rate(&self) -> u32 {
        self.output.sample_rate
    }

    fn convert(&mut self, dst: &mut [i16], src: &util::frame::Audio) -> Result<usize> {
        let capacity = dst.len() / self.output.channels.max(1) as usize;
        let mut planes = [dst.as_mut_ptr() as *mut u8];

        // 输出是单平面交错 s16，容量按每声道采样数传入
        let produced = unsafe {
            ffi::swr_convert(
                self.context.as_mut_ptr(),
                planes.as_mut_ptr() as _,
                capacity as i32,
                (*src.as_ptr()).extended_data as _,
                src.samples() as i32,
            )
        };

        if produced < 0 {
            return Err(PlayerError::FFmpegError(ffmpeg_next::Error::from(produced)));
        }
        Ok(produced as usize)
    }
}
