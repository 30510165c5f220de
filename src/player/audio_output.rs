use crate::core::{AudioFormat, PlayerError, Result};
use crate::player::audio_engine::PcmBuffer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 完成信号通道：硬件播放完一个缓冲后把它原样交还
pub type CompletionSender = Sender<PcmBuffer>;

/// 提交被拒绝时把缓冲所有权交还调用方
#[derive(Debug)]
pub struct SubmitRejected {
    pub buffer: PcmBuffer,
    pub reason: String,
}

/// 硬件音频输出
///
/// `submit` 转移缓冲所有权；播放完成后由输出端（可能在其他线程）
/// 通过完成通道把同一个缓冲送回。
pub trait AudioSink {
    fn submit(&mut self, buffer: PcmBuffer) -> std::result::Result<(), SubmitRejected>;

    /// 关闭设备；此后不会再发出完成信号，仍在队列中的缓冲随之释放
    fn close(&mut self);
}

pub trait AudioSinkFactory {
    type Sink: AudioSink;

    /// 以目标格式打开设备；没有可用设备时失败
    fn open(&mut self, format: &AudioFormat, completions: CompletionSender) -> Result<Self::Sink>;
}

/// 默认输出设备（cpal）
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalSinkFactory;

impl AudioSinkFactory for CpalSinkFactory {
    type Sink = AudioOutput;

    fn open(&mut self, format: &AudioFormat, completions: CompletionSender) -> Result<AudioOutput> {
        AudioOutput::open(format, completions)
    }
}

/// 音频输出 - 使用 cpal 播放已提交的 PCM 缓冲
pub struct AudioOutput {
    stream: Option<Stream>,
    queue_tx: Option<Sender<PcmBuffer>>,
    failed: Arc<AtomicBool>,
    device_name: String,
}

impl AudioOutput {
    /// 打开默认设备，优先 i16 流，不支持时回退到 f32（采样率、声道不变）
    pub fn open(format: &AudioFormat, completions: CompletionSender) -> Result<Self> {
        info!("初始化音频输出: {} Hz, {} 声道", format.sample_rate, format.channels);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioInitFailed("无法找到音频输出设备".to_string()))?;
        let device_name = device.name().unwrap_or_default();
        debug!("使用音频设备: {}", device_name);

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let sample_format = Self::negotiate(&device, &config)?;

        let (queue_tx, queue_rx) = unbounded::<PcmBuffer>();
        let failed = Arc::new(AtomicBool::new(false));
        let cursor = PlaybackCursor::new(queue_rx, completions);

        let stream = match sample_format {
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, cursor, failed.clone())?,
            _ => build_stream::<f32>(&device, &config, cursor, failed.clone())?,
        };

        stream
            .play()
            .map_err(|e| PlayerError::AudioInitFailed(format!("启动音频流失败: {}", e)))?;
        info!("✅ 音频输出已启动: {} ({:?})", device_name, sample_format);

        Ok(Self {
            stream: Some(stream),
            queue_tx: Some(queue_tx),
            failed,
            device_name,
        })
    }

    /// 选择设备支持的采样格式
    fn negotiate(device: &Device, config: &StreamConfig) -> Result<cpal::SampleFormat> {
        let supported: Vec<SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioInitFailed(format!("无法获取支持的音频配置: {}", e)))?
            .filter(|range| Self::is_config_compatible(config, range))
            .collect();

        for wanted in [cpal::SampleFormat::I16, cpal::SampleFormat::F32] {
            if supported.iter().any(|range| range.sample_format() == wanted) {
                return Ok(wanted);
            }
        }

        Err(PlayerError::AudioInitFailed(format!(
            "音频设备不支持 {} Hz, {} 声道",
            config.sample_rate.0, config.channels
        )))
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        let channels_match = config.channels == supported.channels();

        rate_in_range && channels_match
    }
}

impl AudioSink for AudioOutput {
    fn submit(&mut self, buffer: PcmBuffer) -> std::result::Result<(), SubmitRejected> {
        if self.failed.load(Ordering::Acquire) {
            return Err(SubmitRejected {
                buffer,
                reason: "音频流已出错".to_string(),
            });
        }
        match &self.queue_tx {
            Some(tx) => tx.send(buffer).map_err(|e| SubmitRejected {
                buffer: e.into_inner(),
                reason: "音频流已关闭".to_string(),
            }),
            None => Err(SubmitRejected {
                buffer,
                reason: "音频输出未打开".to_string(),
            }),
        }
    }

    fn close(&mut self) {
        // 先停掉回调，再丢弃发送端；队列里剩余的缓冲随回调一起释放
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                debug!("暂停音频流失败: {}", e);
            }
            drop(stream);
            info!("音频输出已停止: {}", self.device_name);
        }
        self.queue_tx.take();
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut cursor: PlaybackCursor,
    failed: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    *sample = <T as cpal::Sample>::from_sample(cursor.next_sample());
                }
            },
            move |err| {
                error!("音频流错误: {}", err);
                failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| PlayerError::AudioInitFailed(format!("创建音频流失败: {}", e)))
}

/// 回调线程中的播放位置：逐个消费已提交的缓冲，播完即发出完成信号
pub(crate) struct PlaybackCursor {
    queue: Receiver<PcmBuffer>,
    completions: CompletionSender,
    current: Option<PcmBuffer>,
    offset: usize,
}

impl PlaybackCursor {
    pub(crate) fn new(queue: Receiver<PcmBuffer>, completions: CompletionSender) -> Self {
        Self {
            queue,
            completions,
            current: None,
            offset: 0,
        }
    }

    /// 下一个交错采样；队列为空时输出静音
    pub(crate) fn next_sample(&mut self) -> i16 {
        loop {
            if let Some(buffer) = &self.current {
                if let Some(&sample) = buffer.samples().get(self.offset) {
                    self.offset += 1;
                    return sample;
                }
            }

            if let Some(done) = self.current.take() {
                if self.completions.send(done).is_err() {
                    warn!("完成通道已关闭，缓冲直接释放");
                }
            }

            match self.queue.try_recv() {
                Ok(next) => {
                    self.current = Some(next);
                    self.offset = 0;
                }
                Err(_) => return 0,
            }
        }
    }
}
