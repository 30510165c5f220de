// 播放器核心模块

pub mod backend;
pub mod demuxer;
pub mod decoder;
pub mod converter;
pub mod ffmpeg_backend;
pub mod video_presenter;
pub mod audio_output;
pub mod audio_engine;
pub mod manager;

#[cfg(test)]
pub mod testing;

pub use audio_output::CpalSinkFactory;
pub use ffmpeg_backend::FfmpegBackend;
pub use manager::{PlaybackSession, StopHandle};
pub use video_presenter::{FrameBuffer, SurfaceBlitter};
