use crate::core::{AudioFormat, PlayerError, Result, StreamDescriptor};
use crate::player::backend::{AudioDecoding, MediaBackend, VideoDecoding};
use crate::player::converter::{PcmResampler, RgbScaler};
use crate::player::decoder::{AudioDecoder, VideoDecoder, VideoPicture};
use crate::player::demuxer::FfmpegDemuxer;
use ffmpeg_next as ffmpeg;
use std::path::Path;

/// FFmpeg 后端（本地文件、软件解码、swscale、swresample）
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    /// 初始化 FFmpeg（进程内调用一次即可）
    pub fn init() -> Result<Self> {
        ffmpeg::init()?;
        Ok(Self)
    }
}

fn stream_of<'a>(
    source: &'a FfmpegDemuxer,
    descriptor: &StreamDescriptor,
) -> Result<ffmpeg::format::stream::Stream<'a>> {
    source
        .stream(descriptor.index)
        .ok_or_else(|| PlayerError::StreamInfo(format!("流 #{} 不存在", descriptor.index)))
}

impl MediaBackend for FfmpegBackend {
    type Packet = ffmpeg::Packet;
    type Source = FfmpegDemuxer;
    type VideoFrame = VideoPicture;
    type AudioFrame = ffmpeg::frame::Audio;
    type VideoDecoder = VideoDecoder;
    type AudioDecoder = AudioDecoder;
    type Scaler = RgbScaler;
    type Resampler = PcmResampler;

    fn open_source(&mut self, path: &Path) -> Result<FfmpegDemuxer> {
        FfmpegDemuxer::open(path)
    }

    fn open_video_decoder(&mut self, source: &FfmpegDemuxer, stream: &StreamDescriptor) -> Result<VideoDecoder> {
        VideoDecoder::from_stream(&stream_of(source, stream)?, stream)
    }

    fn open_audio_decoder(&mut self, source: &FfmpegDemuxer, stream: &StreamDescriptor) -> Result<AudioDecoder> {
        AudioDecoder::from_stream(&stream_of(source, stream)?, stream)
    }

    fn create_scaler(&mut self, decoder: &VideoDecoder) -> Result<RgbScaler> {
        let (width, height) = decoder.dimensions();
        RgbScaler::new(decoder.pixel_format(), width, height)
    }

    fn create_resampler(&mut self, decoder: &AudioDecoder, target: &AudioFormat) -> Result<PcmResampler> {
        PcmResampler::new(
            decoder.sample_format(),
            decoder.channel_layout(),
            decoder.channels(),
            decoder.sample_rate(),
            target,
        )
    }
}
