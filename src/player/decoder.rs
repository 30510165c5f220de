use crate::core::{PlayerError, Result, StreamDescriptor};
use crate::player::backend::{AudioDecoding, DecodedAudio, DecodedVideo, FrameDecoder, VideoDecoding};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, util};
use log::{debug, info, warn};
use std::time::Duration;

/// 解码后的视频帧，附带换算好的显示时间
pub struct VideoPicture {
    pub frame: util::frame::Video,
    pub pts: Option<Duration>,
}

impl DecodedVideo for VideoPicture {
    fn width(&self) -> u32 {
        self.frame.width()
    }

    fn height(&self) -> u32 {
        self.frame.height()
    }

    fn presentation_time(&self) -> Option<Duration> {
        self.pts
    }
}

impl DecodedAudio for util::frame::Audio {
    fn samples(&self) -> usize {
        util::frame::Audio::samples(self)
    }
}

/// 查找解码器并用流参数打开
fn open_context(stream: &format::stream::Stream, descriptor: &StreamDescriptor) -> Result<codec::decoder::Opened> {
    let params = stream.parameters();
    let codec = codec::decoder::find(params.id())
        .ok_or_else(|| PlayerError::UnsupportedCodec(descriptor.codec.clone()))?;

    let context = codec::context::Context::from_parameters(params)
        .map_err(|e| PlayerError::DecoderOpenFailed(format!("{}: {}", descriptor.codec, e)))?;
    context
        .decoder()
        .open_as(codec)
        .map_err(|e| PlayerError::DecoderOpenFailed(format!("{}: {}", descriptor.codec, e)))
}

fn is_again(e: &ffmpeg::Error) -> bool {
    matches!(e, ffmpeg::Error::Other { errno: 11 }) // EAGAIN
}

/// 反复取帧直到 EAGAIN/EOF
///
/// 中途出现硬错误时保留已取到的帧，只有一帧都没有时才返回错误。
fn drain_frames<T>(
    frames: &mut Vec<T>,
    mut receive: impl FnMut() -> std::result::Result<T, ffmpeg::Error>,
) -> Result<()> {
    loop {
        match receive() {
            Ok(frame) => frames.push(frame),
            Err(ffmpeg::Error::Eof) => return Ok(()),
            Err(e) if is_again(&e) => return Ok(()),
            Err(e) if frames.is_empty() => return Err(PlayerError::DecodeError(e.to_string())),
            Err(e) => {
                warn!("取帧失败，保留已解码的 {} 帧: {}", frames.len(), e);
                return Ok(());
            }
        }
    }
}

/// EAGAIN 之后重发包；重发失败但已有帧时交出这些帧
fn resend<T>(frames: &[T], sent: std::result::Result<(), ffmpeg::Error>) -> Result<()> {
    match sent {
        Ok(()) => Ok(()),
        Err(e) if frames.is_empty() => Err(PlayerError::DecodeError(e.to_string())),
        Err(e) => {
            warn!("重发压缩包失败，保留已解码的 {} 帧: {}", frames.len(), e);
            Ok(())
        }
    }
}

fn picture(frame: util::frame::Video, time_base: f64) -> VideoPicture {
    let pts = frame
        .timestamp()
        .map(|ts| ts as f64 * time_base)
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64);
    VideoPicture { frame, pts }
}

/// 视频解码器（软件解码）
pub struct VideoDecoder {
    decoder: codec::decoder::Video,
    time_base: f64,
}

impl VideoDecoder {
    /// 从视频流创建解码器
    pub fn from_stream(stream: &format::stream::Stream, descriptor: &StreamDescriptor) -> Result<Self> {
        let decoder = open_context(stream, descriptor)?
            .video()
            .map_err(|e| PlayerError::DecoderOpenFailed(format!("{}: {}", descriptor.codec, e)))?;

        let time_base = stream.time_base();
        let time_base = if time_base.denominator() == 0 {
            0.0
        } else {
            time_base.numerator() as f64 / time_base.denominator() as f64
        };

        info!(
            "创建视频解码器: {} {}x{}, 格式: {:?}",
            descriptor.codec,
            decoder.width(),
            decoder.height(),
            decoder.format()
        );

        Ok(Self { decoder, time_base })
    }

    pub fn pixel_format(&self) -> util::format::Pixel {
        self.decoder.format()
    }

    fn receive_all(&mut self, frames: &mut Vec<VideoPicture>) -> Result<()> {
        let time_base = self.time_base;
        let decoder = &mut self.decoder;
        drain_frames(frames, || {
            let mut decoded = util::frame::Video::empty();
            decoder.receive_frame(&mut decoded).map(|()| picture(decoded, time_base))
        })
    }
}

impl FrameDecoder for VideoDecoder {
    type Packet = ffmpeg::Packet;
    type Frame = VideoPicture;

    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<VideoPicture>> {
        let mut frames = Vec::new();

        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("视频解码器收到 EOF（send_packet），忽略本次包");
                return Ok(frames);
            }
            Err(e) if is_again(&e) => {
                // 输出队列已满：先取帧再重发
                self.receive_all(&mut frames)?;
                resend(&frames, self.decoder.send_packet(packet))?;
            }
            Err(e) => return Err(PlayerError::DecodeError(e.to_string())),
        }

        self.receive_all(&mut frames)?;
        Ok(frames)
    }

    fn flush(&mut self) -> Result<Vec<VideoPicture>> {
        let mut frames = Vec::new();
        if let Err(e) = self.decoder.send_eof() {
            warn!("视频解码器 send_eof 失败: {}", e);
            return Ok(frames);
        }
        self.receive_all(&mut frames)?;
        debug!("视频解码器刷新出 {} 帧", frames.len());
        Ok(frames)
    }
}

impl VideoDecoding for VideoDecoder {
    fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }
}

/// 音频解码器
pub struct AudioDecoder {
    decoder: codec::decoder::Audio,
}

impl AudioDecoder {
    /// 从音频流创建解码器
    pub fn from_stream(stream: &format::stream::Stream, descriptor: &StreamDescriptor) -> Result<Self> {
        let decoder = open_context(stream, descriptor)?
            .audio()
            .map_err(|e| PlayerError::DecoderOpenFailed(format!("{}: {}", descriptor.codec, e)))?;

        info!(
            "创建音频解码器: {} {} Hz, {} 声道, 格式: {:?}",
            descriptor.codec,
            decoder.rate(),
            decoder.channels(),
            decoder.format()
        );

        Ok(Self { decoder })
    }

    pub fn sample_format(&self) -> util::format::Sample {
        self.decoder.format()
    }

    pub fn channel_layout(&self) -> util::channel_layout::ChannelLayout {
        self.decoder.channel_layout()
    }

    fn receive_all(&mut self, frames: &mut Vec<util::frame::Audio>) -> Result<()> {
        let decoder = &mut self.decoder;
        drain_frames(frames, || {
            let mut decoded = util::frame::Audio::empty();
            decoder.receive_frame(&mut decoded).map(|()| decoded)
        })
    }
}

impl FrameDecoder for AudioDecoder {
    type Packet = ffmpeg::Packet;
    type Frame = util::frame::Audio;

    fn decode(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<util::frame::Audio>> {
        let mut frames = Vec::new();

        match self.decoder.send_packet(packet) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                debug!("音频解码器收到 EOF（send_packet），忽略本次包");
                return Ok(frames);
            }
            Err(e) if is_again(&e) => {
                self.receive_all(&mut frames)?;
                resend(&frames, self.decoder.send_packet(packet))?;
            }
            Err(e) => return Err(PlayerError::DecodeError(e.to_string())),
        }

        self.receive_all(&mut frames)?;
        Ok(frames)
    }

    fn flush(&mut self) -> Result<Vec<util::frame::Audio>> {
        let mut frames = Vec::new();
        if let Err(e) = self.decoder.send_eof() {
            warn!("音频解码器 send_eof 失败: {}", e);
            return Ok(frames);
        }
        self.receive_all(&mut frames)?;
        Ok(frames)
    }
}

impl AudioDecoding for AudioDecoder {
    fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    fn channels(&self) -> u16 {
        self.decoder.channels()
    }
}
