use crate::core::{log_ctx, MediaKind, PlayerError, Result, StreamDescriptor};
use crate::player::backend::{Demuxer, EncodedPacket};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info, warn};
use std::ffi::CString;
use std::path::Path;
use std::ptr;

/// 连续读取失败超过该次数视为数据源损坏
const MAX_CONSECUTIVE_READ_ERRORS: usize = 32;

/// 打开容器并读取流信息，两步失败分别映射
///
/// `format::input` 把两步合在一起，探测失败也会报成打开失败。
fn open_input(path: &Path, source_path: &str) -> Result<format::context::Input> {
    let source_open = |reason: String| PlayerError::SourceOpen {
        path: source_path.to_string(),
        reason,
    };
    let c_path = CString::new(path.as_os_str().to_string_lossy().as_bytes())
        .map_err(|e| source_open(e.to_string()))?;

    unsafe {
        let mut ps = ptr::null_mut();
        let ret = ffmpeg::ffi::avformat_open_input(&mut ps, c_path.as_ptr(), ptr::null_mut(), ptr::null_mut());
        if ret < 0 {
            return Err(source_open(ffmpeg::Error::from(ret).to_string()));
        }

        let ret = ffmpeg::ffi::avformat_find_stream_info(ps, ptr::null_mut());
        if ret < 0 {
            ffmpeg::ffi::avformat_close_input(&mut ps);
            return Err(PlayerError::StreamInfo(format!(
                "{}: {}",
                source_path,
                ffmpeg::Error::from(ret)
            )));
        }

        Ok(format::context::Input::wrap(ps))
    }
}

impl EncodedPacket for ffmpeg::Packet {
    fn stream_index(&self) -> usize {
        self.stream()
    }
}

/// 解封装器 - 负责读取本地媒体文件并按流索引输出压缩包
pub struct FfmpegDemuxer {
    input_ctx: format::context::Input,
    streams: Vec<StreamDescriptor>,
    source_path: String,
}

impl FfmpegDemuxer {
    /// 打开媒体文件并探测流信息
    pub fn open(path: &Path) -> Result<Self> {
        let source_path = path.display().to_string();
        info!("{} 正在打开文件: {}", log_ctx(), source_path);

        let input_ctx = open_input(path, &source_path)?;

        let streams: Vec<StreamDescriptor> = input_ctx
            .streams()
            .map(|stream| {
                let params = stream.parameters();
                let kind = match params.medium() {
                    media::Type::Video => MediaKind::Video,
                    media::Type::Audio => MediaKind::Audio,
                    _ => MediaKind::Other,
                };
                StreamDescriptor::new(stream.index(), kind, params.id().name())
            })
            .collect();

        if streams.is_empty() {
            return Err(PlayerError::StreamInfo(format!("{} 中没有任何流", source_path)));
        }

        for stream in &streams {
            debug!("流 #{}: {:?} ({})", stream.index, stream.kind, stream.codec);
        }
        info!(
            "✅ 打开成功: {} ({} 个流, 时长 {} ms)",
            source_path,
            streams.len(),
            input_ctx.duration().max(0) / 1000
        );

        Ok(Self {
            input_ctx,
            streams,
            source_path,
        })
    }

    /// 获取指定索引的流（用于创建解码器）
    pub fn stream(&self, index: usize) -> Option<format::stream::Stream> {
        self.input_ctx.stream(index)
    }
}

impl Demuxer for FfmpegDemuxer {
    type Packet = ffmpeg::Packet;

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<ffmpeg::Packet>> {
        let mut errors = 0;
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input_ctx) {
                Ok(()) => return Ok(Some(packet)),
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => {
                    errors += 1;
                    if errors >= MAX_CONSECUTIVE_READ_ERRORS {
                        return Err(e.into());
                    }
                    warn!("读取数据包失败（已跳过）: {}", e);
                }
            }
        }
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}
