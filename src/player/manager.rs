use crate::core::{
    log_ctx, select_streams, AudioEngineState, MediaInfo, PlaybackSummary, PlayerConfig,
    PlayerError, Result, StreamDescriptor,
};
use crate::player::audio_engine::{AudioEngine, DrainReport, EnqueueOutcome};
use crate::player::audio_output::{AudioSink, AudioSinkFactory};
use crate::player::backend::{
    AudioDecoding, Demuxer, EncodedPacket, FrameDecoder, MediaBackend, VideoDecoding,
};
use crate::player::video_presenter::{FrameRing, Pacer, SurfaceBlitter, VideoPresenter};
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 外部停止请求（窗口关闭等），每读一个包检查一次
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// 一次 teardown 实际释放了什么
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub frame_buffers: usize,
    pub scaler: bool,
    pub decoders: usize,
    pub audio: Option<DrainReport>,
    pub source: bool,
}

impl TeardownReport {
    pub fn is_empty(&self) -> bool {
        *self == TeardownReport::default()
    }
}

/// 播放会话 - 拥有解封装源、解码器、视频双缓冲和音频引擎
///
/// 所有资源都是会话字段，启动时逐个获取，teardown 按固定顺序逐个释放；
/// 任何退出路径（正常结束、致命错误、停止请求、drop）都只释放一次。
pub struct PlaybackSession<B: MediaBackend, F: AudioSinkFactory> {
    backend: B,
    sinks: F,
    config: PlayerConfig,
    stop: StopHandle,

    source: Option<B::Source>,
    video_stream: Option<StreamDescriptor>,
    audio_stream: Option<StreamDescriptor>,
    video_decoder: Option<B::VideoDecoder>,
    audio_decoder: Option<B::AudioDecoder>,
    ring: Option<FrameRing>,
    presenter: Option<VideoPresenter<B::Scaler>>,
    audio: AudioEngine<B::Resampler, F::Sink>,

    summary: PlaybackSummary,
}

impl<B: MediaBackend, F: AudioSinkFactory> PlaybackSession<B, F> {
    pub fn new(backend: B, sinks: F, config: PlayerConfig) -> Self {
        info!("{} 🎮 创建播放会话...", log_ctx());
        let audio = AudioEngine::new(config.drain_timeout(), config.drain_poll());
        Self {
            backend,
            sinks,
            config,
            stop: StopHandle::new(),
            source: None,
            video_stream: None,
            audio_stream: None,
            video_decoder: None,
            audio_decoder: None,
            ring: None,
            presenter: None,
            audio,
            summary: PlaybackSummary::default(),
        }
    }

    /// 使用外部创建的停止句柄（窗口先于会话存在时）
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn audio_state(&self) -> AudioEngineState {
        self.audio.state()
    }

    pub fn audio_engine(&self) -> &AudioEngine<B::Resampler, F::Sink> {
        &self.audio
    }

    pub fn ring(&self) -> Option<&FrameRing> {
        self.ring.as_ref()
    }

    pub fn summary(&self) -> &PlaybackSummary {
        &self.summary
    }

    /// 打开媒体文件并完成所有初始化
    ///
    /// 视频路径就绪前的任何失败都会先走 teardown 再返回错误；音频失败只记录日志。
    pub fn open(&mut self, path: &Path) -> Result<MediaInfo> {
        info!("{} 📂 打开媒体文件: {}", log_ctx(), path.display());
        match self.start(path) {
            Ok(info) => Ok(info),
            Err(e) => {
                error!("{} ❌ 启动失败: {}", log_ctx(), e);
                self.teardown();
                Err(e)
            }
        }
    }

    fn start(&mut self, path: &Path) -> Result<MediaInfo> {
        let source = self.backend.open_source(path)?;
        let streams = source.streams().to_vec();
        let description = source.description();
        self.source = Some(source);

        if streams.is_empty() {
            return Err(PlayerError::StreamInfo(format!("{} 中没有任何流", description)));
        }
        let (video_stream, audio_stream) = select_streams(&streams);
        let video_stream = video_stream.ok_or(PlayerError::NoVideoStream)?;
        debug!("视频流: {:?}", video_stream);
        debug!("音频流: {:?}", audio_stream);

        let mut info = MediaInfo {
            source: description,
            video_codec: video_stream.codec.clone(),
            ..Default::default()
        };

        // 视频路径：解码器 → 双缓冲 → 像素转换
        let video_decoder = {
            let source = self.source.as_ref().ok_or(PlayerError::NoVideoStream)?;
            self.backend.open_video_decoder(source, &video_stream)?
        };
        let (width, height) = video_decoder.dimensions();
        if width == 0 || height == 0 {
            return Err(PlayerError::DecoderOpenFailed(format!("视频尺寸无效: {}x{}", width, height)));
        }
        info.width = width;
        info.height = height;

        let ring = FrameRing::allocate(width, height)?;
        let scaler = self.backend.create_scaler(&video_decoder)?;
        self.video_decoder = Some(video_decoder);
        self.ring = Some(ring);
        self.presenter = Some(VideoPresenter::new(scaler, Pacer::from_config(&self.config)));
        self.video_stream = Some(video_stream);

        // 音频路径：尽力而为，失败只关闭音频
        if let Some(stream) = audio_stream {
            info.audio_codec = stream.codec.clone();
            if !self.config.audio_enabled {
                info!("{} 🔇 音频已在配置中禁用", log_ctx());
            } else if let Err(e) = self.start_audio(&stream) {
                warn!("{} ⚠ 音频不可用，继续只播放视频: {}", log_ctx(), e);
                self.audio_decoder = None;
            } else if let Some(format) = self.audio.format() {
                info.sample_rate = format.sample_rate;
                info.channels = format.channels;
                info.audio_enabled = true;
                self.audio_stream = Some(stream);
            }
        }

        info!("{} ✅ 会话就绪: {:?}", log_ctx(), info);
        Ok(info)
    }

    fn start_audio(&mut self, stream: &StreamDescriptor) -> Result<()> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| PlayerError::AudioInitFailed("数据源已关闭".to_string()))?;
        let decoder = self.backend.open_audio_decoder(source, stream)?;

        let backend = &mut self.backend;
        self.audio.initialize(
            decoder.sample_rate(),
            decoder.channels(),
            |format| backend.create_resampler(&decoder, format),
            &mut self.sinks,
        )?;
        self.audio_decoder = Some(decoder);
        Ok(())
    }

    /// 主循环：读包 → 按流索引分发，直到文件末尾或停止请求，然后 teardown
    pub fn run<S: SurfaceBlitter>(&mut self, surface: &mut S) -> Result<PlaybackSummary> {
        if self.presenter.is_none() {
            return Err(PlayerError::NoVideoStream);
        }
        info!("{} ▶️ 开始播放", log_ctx());

        let video_index = self.video_stream.as_ref().map(|s| s.index);
        let audio_index = self.audio_stream.as_ref().map(|s| s.index);

        loop {
            if self.stop.is_stop_requested() {
                info!("{} ⏹ 收到停止请求", log_ctx());
                self.summary.stopped = true;
                break;
            }

            let next = match self.source.as_mut() {
                Some(source) => source.read_packet(),
                None => break,
            };
            let packet = match next {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    info!("{} 📄 到达文件末尾", log_ctx());
                    self.flush_decoders(surface);
                    break;
                }
                Err(e) => {
                    error!("{} ❌ 读取包失败: {}", log_ctx(), e);
                    break;
                }
            };
            self.summary.packets_read += 1;

            let index = packet.stream_index();
            if Some(index) == video_index {
                self.handle_video(&packet, surface);
            } else if Some(index) == audio_index && self.audio.is_ready() {
                self.handle_audio(&packet);
            } else {
                self.summary.packets_discarded += 1;
            }
        }

        self.teardown();
        let summary = self.summary.clone();
        info!("{} 🛑 播放结束: {:?}", log_ctx(), summary);
        Ok(summary)
    }

    fn handle_video<S: SurfaceBlitter>(&mut self, packet: &B::Packet, surface: &mut S) {
        let Some(decoder) = self.video_decoder.as_mut() else {
            return;
        };
        match decoder.decode(packet) {
            Ok(frames) => self.present_all(frames, surface),
            Err(e) => {
                self.summary.decode_errors += 1;
                debug!("视频包解码失败（已跳过）: {}", e);
            }
        }
    }

    fn present_all<S: SurfaceBlitter>(&mut self, frames: Vec<B::VideoFrame>, surface: &mut S) {
        let (Some(presenter), Some(ring)) = (self.presenter.as_mut(), self.ring.as_mut()) else {
            return;
        };
        for frame in &frames {
            presenter.present(ring, frame, surface);
        }
        // 呈现计数以呈现器为准
        self.summary.video_frames_presented = presenter.presented();
    }

    fn handle_audio(&mut self, packet: &B::Packet) {
        let Some(decoder) = self.audio_decoder.as_mut() else {
            return;
        };
        match decoder.decode(packet) {
            Ok(frames) => self.enqueue_all(frames),
            Err(e) => {
                self.summary.decode_errors += 1;
                debug!("音频包解码失败（已跳过）: {}", e);
            }
        }
    }

    fn enqueue_all(&mut self, frames: Vec<B::AudioFrame>) {
        for frame in &frames {
            match self.audio.enqueue(frame) {
                Ok(EnqueueOutcome::Submitted { .. }) => self.summary.audio_buffers_submitted += 1,
                Ok(_) => {}
                Err(e) => {
                    self.summary.audio_frames_dropped += 1;
                    warn!("{} 音频帧已丢弃: {}", log_ctx(), e);
                }
            }
        }
    }

    /// 文件末尾：取出解码器里缓存的帧
    fn flush_decoders<S: SurfaceBlitter>(&mut self, surface: &mut S) {
        if let Some(decoder) = self.video_decoder.as_mut() {
            match decoder.flush() {
                Ok(frames) => self.present_all(frames, surface),
                Err(e) => debug!("视频解码器刷新失败: {}", e),
            }
        }
        if self.audio.is_ready() {
            if let Some(decoder) = self.audio_decoder.as_mut() {
                match decoder.flush() {
                    Ok(frames) => self.enqueue_all(frames),
                    Err(e) => debug!("音频解码器刷新失败: {}", e),
                }
            }
        }
    }

    /// 按顺序释放：帧缓冲 → 像素转换 → 解码器 → 音频引擎（排空关闭）→ 数据源
    ///
    /// 每一步与前一步是否成功无关；重复调用不会重复释放。
    pub fn teardown(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        if let Some(ring) = self.ring.take() {
            report.frame_buffers = ring.release();
        }
        if self.presenter.take().is_some() {
            report.scaler = true;
        }
        if self.video_decoder.take().is_some() {
            report.decoders += 1;
        }
        if self.audio_decoder.take().is_some() {
            report.decoders += 1;
        }
        report.audio = self.audio.drain_and_close();
        if self.source.take().is_some() {
            report.source = true;
        }
        self.video_stream = None;
        self.audio_stream = None;

        if !report.is_empty() {
            info!("{} 🧹 资源已释放: {:?}", log_ctx(), report);
        }
        report
    }
}

impl<B: MediaBackend, F: AudioSinkFactory> Drop for PlaybackSession<B, F> {
    fn drop(&mut self) {
        self.teardown();
    }
}
