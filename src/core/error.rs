use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("无法打开媒体源 {path}: {reason}")]
    SourceOpen { path: String, reason: String },

    #[error("无法读取流信息: {0}")]
    StreamInfo(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("不支持的编解码器: {0}")]
    UnsupportedCodec(String),

    #[error("解码器打开失败: {0}")]
    DecoderOpenFailed(String),

    #[error("像素格式转换器初始化失败: {0}")]
    ScalerInitFailed(String),

    #[error("音频初始化失败: {0}")]
    AudioInitFailed(String),

    #[error("音频缓冲提交失败: {0}")]
    AudioSubmitFailed(String),

    #[error("内存分配失败: {0}")]
    AllocationFailed(String),

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),
}

impl PlayerError {
    /// 是否会终止整个播放会话
    ///
    /// 只影响音频路径的错误（初始化、提交）和单包解码错误可以在本地恢复，
    /// 其余错误都意味着视频无法播放。
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PlayerError::AudioInitFailed(_)
                | PlayerError::AudioSubmitFailed(_)
                | PlayerError::DecodeError(_)
        )
    }
}

impl From<serde_json::Error> for PlayerError {
    fn from(e: serde_json::Error) -> Self {
        PlayerError::ConfigError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
