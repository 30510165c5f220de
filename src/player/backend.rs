use crate::core::{AudioFormat, Result, StreamDescriptor};
use crate::player::video_presenter::FrameBuffer;
use std::path::Path;
use std::time::Duration;

/// 压缩数据包，带所属流索引
pub trait EncodedPacket {
    fn stream_index(&self) -> usize;
}

/// 解封装数据源抽象接口
///
/// 本地文件由 FFmpeg 实现，测试中使用脚本化的数据源
pub trait Demuxer {
    type Packet: EncodedPacket;

    /// 打开时探测到的所有流（按容器顺序）
    fn streams(&self) -> &[StreamDescriptor];

    /// 读取下一个数据包
    ///
    /// 返回：
    /// - Ok(Some(packet)): 成功读取一个包
    /// - Ok(None): 到达文件末尾
    /// - Err(e): 读取错误
    fn read_packet(&mut self) -> Result<Option<Self::Packet>>;

    /// 获取描述信息（用于日志）
    fn description(&self) -> String;
}

/// 解码适配器：喂入一个压缩包，得到 0~n 个解码帧
pub trait FrameDecoder {
    type Packet;
    type Frame;

    /// 解码数据包；编解码器拒绝该包时返回 `DecodeError`
    fn decode(&mut self, packet: &Self::Packet) -> Result<Vec<Self::Frame>>;

    /// 刷新解码器（获取缓冲的帧），只在文件末尾调用
    fn flush(&mut self) -> Result<Vec<Self::Frame>>;
}

pub trait VideoDecoding {
    /// 解码器报告的画面尺寸，会话期间不变
    fn dimensions(&self) -> (u32, u32);
}

pub trait AudioDecoding {
    fn sample_rate(&self) -> u32;
    /// 源声道数，可能为 0（未知布局）
    fn channels(&self) -> u16;
}

/// 解码后的视频帧
pub trait DecodedVideo {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn presentation_time(&self) -> Option<Duration>;
}

/// 解码后的音频帧
pub trait DecodedAudio {
    /// 每声道采样数
    fn samples(&self) -> usize;
}

/// 像素格式转换：写入环形缓冲的一个槽位
pub trait PixelConverter {
    type Frame;

    fn convert(&mut self, src: &Self::Frame, dst: &mut FrameBuffer) -> Result<()>;
}

/// 重采样器：输出固定为目标格式的交错 i16
pub trait Resample {
    type Frame;

    /// 内部缓存的延迟采样数（按输入采样率计）
    fn delay(&self) -> u64;

    fn input_rate(&self) -> u32;

    fn output_rate(&self) -> u32;

    /// 转换 `src` 写入 `dst`，返回实际产出的每声道采样数
    ///
    /// `dst` 的容量是 `dst.len() / 目标声道数` 个采样
    fn convert(&mut self, dst: &mut [i16], src: &Self::Frame) -> Result<usize>;
}

/// 媒体后端：把解封装、解码、像素转换、重采样组合在一起
pub trait MediaBackend {
    type Packet: EncodedPacket;
    type Source: Demuxer<Packet = Self::Packet>;
    type VideoFrame: DecodedVideo;
    type AudioFrame: DecodedAudio;
    type VideoDecoder: FrameDecoder<Packet = Self::Packet, Frame = Self::VideoFrame> + VideoDecoding;
    type AudioDecoder: FrameDecoder<Packet = Self::Packet, Frame = Self::AudioFrame> + AudioDecoding;
    type Scaler: PixelConverter<Frame = Self::VideoFrame>;
    type Resampler: Resample<Frame = Self::AudioFrame>;

    fn open_source(&mut self, path: &Path) -> Result<Self::Source>;

    fn open_video_decoder(
        &mut self,
        source: &Self::Source,
        stream: &StreamDescriptor,
    ) -> Result<Self::VideoDecoder>;

    fn open_audio_decoder(
        &mut self,
        source: &Self::Source,
        stream: &StreamDescriptor,
    ) -> Result<Self::AudioDecoder>;

    /// 创建 源格式 → RGB24 的转换上下文，尺寸不变
    fn create_scaler(&mut self, decoder: &Self::VideoDecoder) -> Result<Self::Scaler>;

    fn create_resampler(
        &mut self,
        decoder: &Self::AudioDecoder,
        target: &AudioFormat,
    ) -> Result<Self::Resampler>;
}
