use crate::core::{log_ctx, AudioEngineState, AudioFormat, PlayerError, Result};
use crate::player::audio_output::{AudioSink, AudioSinkFactory};
use crate::player::backend::{DecodedAudio, Resample};
use crossbeam_channel::unbounded;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 已提交缓冲的描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// 在途音频缓冲：交错 s16 PCM，长度恰好等于实际产出的采样
#[derive(Debug)]
pub struct PcmBuffer {
    id: BufferId,
    samples: Box<[i16]>,
}

impl PcmBuffer {
    pub fn new(id: BufferId, samples: Box<[i16]>) -> Self {
        Self { id, samples }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.samples)
    }

    pub fn byte_len(&self) -> usize {
        self.as_bytes().len()
    }
}

/// 在途缓冲账本（生产线程与回收线程共享）
///
/// 缓冲的登记/注销都在同一把锁下进行；计数器是原子量，
/// 关闭前的排空检查只读计数器，不会阻塞回收线程。
#[derive(Debug, Default)]
pub struct BufferLedger {
    in_flight: Mutex<HashMap<BufferId, usize>>,
    pending: AtomicUsize,
    submitted: AtomicU64,
    reclaimed: AtomicU64,
    submit_failures: AtomicU64,
    abandoned: AtomicU64,
}

impl BufferLedger {
    /// 当前被硬件持有的缓冲数
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    pub fn submit_failures(&self) -> u64 {
        self.submit_failures.load(Ordering::Relaxed)
    }

    pub fn abandoned(&self) -> u64 {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// 在锁内登记并提交；提交被拒绝时立即释放缓冲，计数不变
    fn submit<S: AudioSink>(&self, sink: &mut S, buffer: PcmBuffer) -> Result<usize> {
        let id = buffer.id();
        let bytes = buffer.byte_len();

        let mut in_flight = self.in_flight.lock();
        in_flight.insert(id, bytes);
        match sink.submit(buffer) {
            Ok(()) => {
                self.pending.fetch_add(1, Ordering::AcqRel);
                self.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(bytes)
            }
            Err(rejected) => {
                in_flight.remove(&id);
                drop(rejected.buffer);
                self.submit_failures.fetch_add(1, Ordering::Relaxed);
                Err(PlayerError::AudioSubmitFailed(rejected.reason))
            }
        }
    }

    /// 完成信号：注销描述符并释放内存
    ///
    /// 只有登记过的缓冲才会让计数减一；未知描述符只记录日志。
    pub fn reclaim(&self, buffer: PcmBuffer) -> bool {
        let id = buffer.id();
        let mut in_flight = self.in_flight.lock();
        match in_flight.remove(&id) {
            Some(bytes) => {
                drop(buffer);
                self.pending.fetch_sub(1, Ordering::AcqRel);
                self.reclaimed.fetch_add(1, Ordering::Relaxed);
                debug!("{} ♻️ 回收音频缓冲 {:?} ({} 字节)", log_ctx(), id, bytes);
                true
            }
            None => {
                warn!("{} 收到未登记缓冲 {:?} 的完成信号", log_ctx(), id);
                false
            }
        }
    }

    /// 设备关闭后仍登记在册的缓冲已随设备释放，清账
    fn abandon_all(&self) -> usize {
        let mut in_flight = self.in_flight.lock();
        let count = in_flight.len();
        in_flight.clear();
        self.pending.fetch_sub(count, Ordering::AcqRel);
        self.abandoned.fetch_add(count as u64, Ordering::Relaxed);
        count
    }
}

/// enqueue 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Submitted { bytes: usize },
    /// 重采样器没有产出（数据留在内部延迟里）
    Empty,
    /// 引擎不在 Ready 状态，什么都没做
    NotReady,
}

/// 排空关闭的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// 超时前计数是否归零
    pub drained: bool,
    /// 关闭时仍被设备持有的缓冲数
    pub abandoned: usize,
    pub waited: Duration,
}

/// 音频引擎：重采样 → 提交硬件 → 完成信号回收
pub struct AudioEngine<R, S: AudioSink> {
    state: AudioEngineState,
    format: Option<AudioFormat>,
    resampler: Option<R>,
    sink: Option<S>,
    ledger: Arc<BufferLedger>,
    reclaimer: Option<JoinHandle<()>>,
    next_id: u64,
    drain_timeout: Duration,
    drain_poll: Duration,
}

impl<R, S> AudioEngine<R, S>
where
    R: Resample,
    R::Frame: DecodedAudio,
    S: AudioSink,
{
    pub fn new(drain_timeout: Duration, drain_poll: Duration) -> Self {
        Self {
            state: AudioEngineState::Uninitialized,
            format: None,
            resampler: None,
            sink: None,
            ledger: Arc::new(BufferLedger::default()),
            reclaimer: None,
            next_id: 0,
            drain_timeout,
            drain_poll,
        }
    }

    pub fn state(&self) -> AudioEngineState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == AudioEngineState::Ready
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn ledger(&self) -> &Arc<BufferLedger> {
        &self.ledger
    }

    /// Uninitialized → Ready
    ///
    /// 任何一步失败都保持 Uninitialized 并返回 `AudioInitFailed`，调用方继续只播视频。
    pub fn initialize<F, P>(
        &mut self,
        source_rate: u32,
        source_channels: u16,
        make_resampler: F,
        sinks: &mut P,
    ) -> Result<()>
    where
        F: FnOnce(&AudioFormat) -> Result<R>,
        P: AudioSinkFactory<Sink = S>,
    {
        if self.state != AudioEngineState::Uninitialized {
            return Err(PlayerError::AudioInitFailed(format!("引擎状态 {:?} 不能初始化", self.state)));
        }
        if source_rate == 0 {
            return Err(PlayerError::AudioInitFailed("源采样率为 0".to_string()));
        }

        let format = AudioFormat::stereo_s16(source_rate);
        info!(
            "{} 🔧 初始化音频引擎: {}Hz/{}ch → {}Hz/{}ch s16",
            log_ctx(),
            source_rate,
            source_channels,
            format.sample_rate,
            format.channels
        );

        let resampler = make_resampler(&format).map_err(into_audio_init)?;

        let (completion_tx, completion_rx) = unbounded::<PcmBuffer>();
        let mut sink = sinks.open(&format, completion_tx).map_err(into_audio_init)?;

        let ledger = self.ledger.clone();
        let reclaimer = thread::Builder::new()
            .name("audio-reclaim".to_string())
            .spawn(move || {
                debug!("{} 回收线程启动", log_ctx());
                for buffer in completion_rx.iter() {
                    ledger.reclaim(buffer);
                }
                debug!("{} 回收线程退出", log_ctx());
            });
        let reclaimer = match reclaimer {
            Ok(handle) => handle,
            Err(e) => {
                sink.close();
                return Err(PlayerError::AudioInitFailed(format!("无法启动回收线程: {}", e)));
            }
        };

        self.format = Some(format);
        self.resampler = Some(resampler);
        self.sink = Some(sink);
        self.reclaimer = Some(reclaimer);
        self.state = AudioEngineState::Ready;
        Ok(())
    }

    /// 重采样一帧并提交硬件（只在 Ready 状态有效）
    pub fn enqueue(&mut self, frame: &R::Frame) -> Result<EnqueueOutcome> {
        if self.state != AudioEngineState::Ready {
            return Ok(EnqueueOutcome::NotReady);
        }
        let (Some(resampler), Some(sink), Some(format)) =
            (self.resampler.as_mut(), self.sink.as_mut(), self.format.as_ref())
        else {
            return Ok(EnqueueOutcome::NotReady);
        };
        let channels = format.channels as usize;
        let frame_bytes = format.bytes_per_frame();

        // 最坏情况输出采样数：(延迟 + 输入) * 输出采样率 / 输入采样率，向上取整
        let in_rate = resampler.input_rate().max(1) as u64;
        let out_rate = resampler.output_rate() as u64;
        let max_samples = ((resampler.delay() + frame.samples() as u64) * out_rate).div_ceil(in_rate) as usize;

        let mut scratch: Vec<i16> = Vec::new();
        scratch
            .try_reserve_exact(max_samples * channels)
            .map_err(|e| {
                PlayerError::AllocationFailed(format!(
                    "音频缓冲 {} 采样 ({} 字节): {}",
                    max_samples,
                    max_samples * frame_bytes,
                    e
                ))
            })?;
        scratch.resize(max_samples * channels, 0);

        let produced = resampler.convert(&mut scratch, frame)?.min(max_samples);
        if produced == 0 {
            return Ok(EnqueueOutcome::Empty);
        }

        scratch.truncate(produced * channels);
        let id = BufferId(self.next_id);
        self.next_id += 1;
        let buffer = PcmBuffer::new(id, scratch.into_boxed_slice());

        let bytes = self.ledger.submit(sink, buffer)?;
        debug_assert_eq!(bytes, produced * frame_bytes);
        debug!("🔊 提交音频缓冲 {:?}: {} 采样, {} 字节", id, produced, bytes);
        Ok(EnqueueOutcome::Submitted { bytes })
    }

    /// 硬件完成信号（可在任意线程调用）
    pub fn on_hardware_complete(&self, buffer: PcmBuffer) -> bool {
        self.ledger.reclaim(buffer)
    }

    /// Ready → Draining → Closed
    ///
    /// 非阻塞轮询计数器直到归零或超时，然后无条件关闭设备。其他状态下什么都不做。
    pub fn drain_and_close(&mut self) -> Option<DrainReport> {
        if self.state != AudioEngineState::Ready {
            return None;
        }
        self.state = AudioEngineState::Draining;
        info!("{} ⏳ 等待 {} 个音频缓冲播放完成", log_ctx(), self.ledger.pending());

        let start = Instant::now();
        let deadline = start + self.drain_timeout;
        while self.ledger.pending() > 0 && Instant::now() < deadline {
            thread::sleep(self.drain_poll);
        }
        let drained = self.ledger.pending() == 0;
        if !drained {
            warn!(
                "{} ⚠ 排空超时（{:?}），仍有 {} 个缓冲在设备中，强制关闭",
                log_ctx(),
                self.drain_timeout,
                self.ledger.pending()
            );
        }

        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
        // 设备关闭后完成通道的发送端全部释放，回收线程自然退出
        if let Some(handle) = self.reclaimer.take() {
            if handle.join().is_err() {
                error!("{} 回收线程异常退出", log_ctx());
            }
        }
        let abandoned = self.ledger.abandon_all();
        self.resampler.take();
        self.state = AudioEngineState::Closed;

        info!(
            "{} ✅ 音频引擎已关闭（提交 {}，回收 {}，提交失败 {}，放弃 {}）",
            log_ctx(),
            self.ledger.submitted(),
            self.ledger.reclaimed(),
            self.ledger.submit_failures(),
            abandoned
        );

        Some(DrainReport {
            drained,
            abandoned,
            waited: start.elapsed(),
        })
    }
}

impl<R, S: AudioSink> Drop for AudioEngine<R, S> {
    fn drop(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            warn!("{} ⚠ AudioEngine 被 drop，但未调用 drain_and_close()，直接关闭设备", log_ctx());
            sink.close();
        }
        if let Some(handle) = self.reclaimer.take() {
            if handle.join().is_err() {
                error!("{} 回收线程异常退出", log_ctx());
            }
        }
    }
}

fn into_audio_init(e: PlayerError) -> PlayerError {
    match e {
        PlayerError::AudioInitFailed(_) => e,
        other => PlayerError::AudioInitFailed(other.to_string()),
    }
}
