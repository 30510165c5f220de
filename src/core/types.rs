use serde::{Deserialize, Serialize};

/// 流的媒体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    /// 字幕、数据流等，永远不会被选中
    Other,
}

/// 流描述 - 打开时探测一次，会话期间不变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub index: usize,
    pub kind: MediaKind,
    pub codec: String,
}

impl StreamDescriptor {
    pub fn new(index: usize, kind: MediaKind, codec: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            codec: codec.into(),
        }
    }
}

/// 选出第一个视频流和第一个音频流（同类后续流忽略）
pub fn select_streams(
    streams: &[StreamDescriptor],
) -> (Option<StreamDescriptor>, Option<StreamDescriptor>) {
    let first = |kind| streams.iter().find(|s| s.kind == kind).cloned();
    (first(MediaKind::Video), first(MediaKind::Audio))
}

/// 像素格式（目标格式固定为 RGB24，自上而下）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGB24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::RGB24 => 3,
        }
    }
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 16 位有符号整数，交错排列
    I16,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::I16 => 2,
        }
    }
}

/// 音频硬件输出的目标格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
}

impl AudioFormat {
    pub const OUTPUT_CHANNELS: u16 = 2;

    /// 采样率沿用源采样率，只归一化声道数和采样格式
    pub fn stereo_s16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: Self::OUTPUT_CHANNELS,
            format: SampleFormat::I16,
        }
    }

    /// 一个采样帧（所有声道）的字节数
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }
}

/// 音频引擎状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEngineState {
    Uninitialized,
    Ready,
    Draining,
    Closed,
}

/// 媒体信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub audio_enabled: bool,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            source: String::new(),
            width: 0,
            height: 0,
            video_codec: String::new(),
            audio_codec: "none".to_string(),
            sample_rate: 0,
            channels: 0,
            audio_enabled: false,
        }
    }
}

/// 会话结束时的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSummary {
    pub packets_read: u64,
    pub packets_discarded: u64,
    pub video_frames_presented: u64,
    pub audio_buffers_submitted: u64,
    pub audio_frames_dropped: u64,
    pub decode_errors: u64,
    /// 是否因为外部停止请求而结束
    pub stopped: bool,
}
