//! 测试用的脚本化后端：数据源、解码器、转换器、音频设备和窗口表面
//!
//! 每个会被 teardown 释放的对象都在 drop 时计数，用于检查"只释放一次"。

use crate::core::{AudioFormat, PlayerError, Result, StreamDescriptor};
use crate::player::audio_engine::PcmBuffer;
use crate::player::audio_output::{AudioSink, AudioSinkFactory, CompletionSender, SubmitRejected};
use crate::player::backend::{
    AudioDecoding, DecodedAudio, DecodedVideo, Demuxer, EncodedPacket, FrameDecoder, MediaBackend,
    PixelConverter, Resample, VideoDecoding,
};
use crate::player::manager::StopHandle;
use crate::player::video_presenter::{FrameBuffer, SurfaceBlitter};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

// ============= 释放计数 =============

#[derive(Debug, Default)]
pub struct DropCounters {
    source: AtomicUsize,
    video_decoder: AtomicUsize,
    audio_decoder: AtomicUsize,
    scaler: AtomicUsize,
    resampler: AtomicUsize,
}

impl DropCounters {
    pub fn source(&self) -> usize {
        self.source.load(Ordering::SeqCst)
    }
    pub fn video_decoders(&self) -> usize {
        self.video_decoder.load(Ordering::SeqCst)
    }
    pub fn audio_decoders(&self) -> usize {
        self.audio_decoder.load(Ordering::SeqCst)
    }
    pub fn scalers(&self) -> usize {
        self.scaler.load(Ordering::SeqCst)
    }
    pub fn resamplers(&self) -> usize {
        self.resampler.load(Ordering::SeqCst)
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

// ============= 数据包 / 数据源 =============

#[derive(Debug, Clone)]
pub struct MockPacket {
    pub stream_index: usize,
    /// 解码后产出的帧数
    pub frames: usize,
    pub corrupt: bool,
}

impl MockPacket {
    pub fn video(stream_index: usize, frames: usize) -> Self {
        Self {
            stream_index,
            frames,
            corrupt: false,
        }
    }

    pub fn audio(stream_index: usize, frames: usize) -> Self {
        Self::video(stream_index, frames)
    }

    pub fn corrupt(stream_index: usize) -> Self {
        Self {
            stream_index,
            frames: 0,
            corrupt: true,
        }
    }
}

impl EncodedPacket for MockPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }
}

pub struct MockSource {
    streams: Vec<StreamDescriptor>,
    packets: VecDeque<MockPacket>,
    counters: Arc<DropCounters>,
}

impl Demuxer for MockSource {
    type Packet = MockPacket;

    fn streams(&self) -> &[StreamDescriptor] {
        &self.streams
    }

    fn read_packet(&mut self) -> Result<Option<MockPacket>> {
        Ok(self.packets.pop_front())
    }

    fn description(&self) -> String {
        format!("Mock Demuxer ({} packets left)", self.packets.len())
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        bump(&self.counters.source);
    }
}

// ============= 帧 =============

#[derive(Debug, Clone)]
pub struct MockVideoFrame {
    pub width: u32,
    pub height: u32,
    pub seq: u64,
    pub pts: Option<Duration>,
}

impl MockVideoFrame {
    pub fn new(width: u32, height: u32, seq: u64) -> Self {
        Self {
            width,
            height,
            seq,
            pts: Some(Duration::from_millis(seq * 40)),
        }
    }
}

impl DecodedVideo for MockVideoFrame {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn presentation_time(&self) -> Option<Duration> {
        self.pts
    }
}

/// 交错 i16 音频帧
#[derive(Debug, Clone)]
pub struct MockAudioFrame {
    pub rate: u32,
    pub channels: u16,
    pub data: Vec<i16>,
}

impl MockAudioFrame {
    pub fn new(rate: u32, channels: u16, data: Vec<i16>) -> Self {
        Self { rate, channels, data }
    }

    fn layout_channels(&self) -> usize {
        self.channels.max(1) as usize
    }
}

impl DecodedAudio for MockAudioFrame {
    fn samples(&self) -> usize {
        self.data.len() / self.layout_channels()
    }
}

// ============= 解码器 =============

pub struct MockVideoDecoder {
    width: u32,
    height: u32,
    seq: u64,
    flush_frames: usize,
    counters: Arc<DropCounters>,
}

impl MockVideoDecoder {
    fn frames(&mut self, count: usize) -> Vec<MockVideoFrame> {
        (0..count)
            .map(|_| {
                let frame = MockVideoFrame::new(self.width, self.height, self.seq);
                self.seq += 1;
                frame
            })
            .collect()
    }
}

impl FrameDecoder for MockVideoDecoder {
    type Packet = MockPacket;
    type Frame = MockVideoFrame;

    fn decode(&mut self, packet: &MockPacket) -> Result<Vec<MockVideoFrame>> {
        if packet.corrupt {
            return Err(PlayerError::DecodeError("invalid data".to_string()));
        }
        Ok(self.frames(packet.frames))
    }

    fn flush(&mut self) -> Result<Vec<MockVideoFrame>> {
        let count = std::mem::take(&mut self.flush_frames);
        Ok(self.frames(count))
    }
}

impl VideoDecoding for MockVideoDecoder {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for MockVideoDecoder {
    fn drop(&mut self) {
        bump(&self.counters.video_decoder);
    }
}

pub struct MockAudioDecoder {
    rate: u32,
    channels: u16,
    counters: Arc<DropCounters>,
}

impl FrameDecoder for MockAudioDecoder {
    type Packet = MockPacket;
    type Frame = MockAudioFrame;

    fn decode(&mut self, packet: &MockPacket) -> Result<Vec<MockAudioFrame>> {
        if packet.corrupt {
            return Err(PlayerError::DecodeError("invalid data".to_string()));
        }
        let samples = 32 * self.channels.max(1) as usize;
        Ok((0..packet.frames)
            .map(|i| MockAudioFrame::new(self.rate, self.channels, vec![i as i16 + 1; samples]))
            .collect())
    }

    fn flush(&mut self) -> Result<Vec<MockAudioFrame>> {
        Ok(Vec::new())
    }
}

impl AudioDecoding for MockAudioDecoder {
    fn sample_rate(&self) -> u32 {
        self.rate
    }
    fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for MockAudioDecoder {
    fn drop(&mut self) {
        bump(&self.counters.audio_decoder);
    }
}

// ============= 转换器 =============

/// 用帧序号填满整个槽位
#[derive(Default)]
pub struct MockScaler {
    counters: Option<Arc<DropCounters>>,
}

impl PixelConverter for MockScaler {
    type Frame = MockVideoFrame;

    fn convert(&mut self, src: &MockVideoFrame, dst: &mut FrameBuffer) -> Result<()> {
        dst.data_mut().fill(src.seq as u8);
        Ok(())
    }
}

impl Drop for MockScaler {
    fn drop(&mut self) {
        if let Some(counters) = &self.counters {
            bump(&counters.scaler);
        }
    }
}

/// 只做声道映射（单声道复制到两个声道）的重采样器
pub struct MockResampler {
    input_rate: u32,
    output: AudioFormat,
    delay: u64,
    last_capacity: usize,
    counters: Option<Arc<DropCounters>>,
}

impl MockResampler {
    pub fn new(input_rate: u32, _input_channels: u16, output: &AudioFormat) -> Self {
        Self {
            input_rate,
            output: *output,
            delay: 0,
            last_capacity: 0,
            counters: None,
        }
    }

    pub fn with_delay(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }

    pub fn last_capacity(&self) -> usize {
        self.last_capacity
    }
}

impl Resample for MockResampler {
    type Frame = MockAudioFrame;

    fn delay(&self) -> u64 {
        self.delay
    }

    fn input_rate(&self) -> u32 {
        self.input_rate
    }

    fn output_rate(&self) -> u32 {
        self.output.sample_rate
    }

    fn convert(&mut self, dst: &mut [i16], src: &MockAudioFrame) -> Result<usize> {
        let out_channels = self.output.channels as usize;
        let in_channels = src.layout_channels();
        let capacity = dst.len() / out_channels;
        self.last_capacity = capacity;

        let frames = src.samples().min(capacity);
        for i in 0..frames {
            for c in 0..out_channels {
                dst[i * out_channels + c] = src.data[i * in_channels + c.min(in_channels - 1)];
            }
        }
        Ok(frames)
    }
}

impl Drop for MockResampler {
    fn drop(&mut self) {
        if let Some(counters) = &self.counters {
            bump(&counters.resampler);
        }
    }
}

// ============= 后端 =============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    SourceOpen,
    VideoDecoder,
    AudioDecoder,
    Scaler,
    Resampler,
    /// 由 `MockSinkFactory::failing_open` 实现，后端本身忽略
    SinkOpen,
}

pub struct MockBackend {
    streams: Vec<StreamDescriptor>,
    packets: Vec<MockPacket>,
    width: u32,
    height: u32,
    video_flush: usize,
    sample_rate: u32,
    channels: u16,
    fail: Option<FailPoint>,
    counters: Arc<DropCounters>,
}

impl MockBackend {
    pub fn new(streams: Vec<StreamDescriptor>, packets: Vec<MockPacket>) -> Self {
        Self {
            streams,
            packets,
            width: 640,
            height: 360,
            video_flush: 0,
            sample_rate: 0,
            channels: 0,
            fail: None,
            counters: Arc::new(DropCounters::default()),
        }
    }

    pub fn with_video_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_video_flush(mut self, frames: usize) -> Self {
        self.video_flush = frames;
        self
    }

    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    pub fn failing_at(mut self, fail: FailPoint) -> Self {
        self.fail = Some(fail);
        self
    }

    pub fn counters(&self) -> Arc<DropCounters> {
        self.counters.clone()
    }

    fn fails_at(&self, point: FailPoint) -> bool {
        self.fail == Some(point)
    }
}

impl MediaBackend for MockBackend {
    type Packet = MockPacket;
    type Source = MockSource;
    type VideoFrame = MockVideoFrame;
    type AudioFrame = MockAudioFrame;
    type VideoDecoder = MockVideoDecoder;
    type AudioDecoder = MockAudioDecoder;
    type Scaler = MockScaler;
    type Resampler = MockResampler;

    fn open_source(&mut self, path: &Path) -> Result<MockSource> {
        if self.fails_at(FailPoint::SourceOpen) {
            return Err(PlayerError::SourceOpen {
                path: path.display().to_string(),
                reason: "No such file or directory".to_string(),
            });
        }
        Ok(MockSource {
            streams: self.streams.clone(),
            packets: self.packets.iter().cloned().collect(),
            counters: self.counters.clone(),
        })
    }

    fn open_video_decoder(&mut self, _source: &MockSource, stream: &StreamDescriptor) -> Result<MockVideoDecoder> {
        if self.fails_at(FailPoint::VideoDecoder) {
            return Err(PlayerError::UnsupportedCodec(stream.codec.clone()));
        }
        Ok(MockVideoDecoder {
            width: self.width,
            height: self.height,
            seq: 0,
            flush_frames: self.video_flush,
            counters: self.counters.clone(),
        })
    }

    fn open_audio_decoder(&mut self, _source: &MockSource, stream: &StreamDescriptor) -> Result<MockAudioDecoder> {
        if self.fails_at(FailPoint::AudioDecoder) {
            return Err(PlayerError::DecoderOpenFailed(stream.codec.clone()));
        }
        Ok(MockAudioDecoder {
            rate: self.sample_rate,
            channels: self.channels,
            counters: self.counters.clone(),
        })
    }

    fn create_scaler(&mut self, _decoder: &MockVideoDecoder) -> Result<MockScaler> {
        if self.fails_at(FailPoint::Scaler) {
            return Err(PlayerError::ScalerInitFailed("unsupported pixel format".to_string()));
        }
        Ok(MockScaler {
            counters: Some(self.counters.clone()),
        })
    }

    fn create_resampler(&mut self, decoder: &MockAudioDecoder, target: &AudioFormat) -> Result<MockResampler> {
        if self.fails_at(FailPoint::Resampler) {
            return Err(PlayerError::AudioInitFailed("swr_init failed".to_string()));
        }
        let mut resampler = MockResampler::new(decoder.rate, decoder.channels, target);
        resampler.counters = Some(self.counters.clone());
        Ok(resampler)
    }
}

// ============= 音频设备 =============

#[derive(Debug, Clone, Copy)]
pub enum SinkBehavior {
    /// 一直持有缓冲直到关闭
    Hold,
    /// 在"硬件"线程上等待一段时间后发出完成信号
    CompleteAfter(Duration),
}

#[derive(Debug, Default)]
pub struct SinkRecord {
    opened: Mutex<Vec<AudioFormat>>,
    submitted: Mutex<Vec<Vec<i16>>>,
    closes: AtomicUsize,
}

impl SinkRecord {
    pub fn opened_formats(&self) -> Vec<AudioFormat> {
        self.opened.lock().clone()
    }

    pub fn submitted_samples(&self) -> Vec<Vec<i16>> {
        self.submitted.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct MockSinkFactory {
    behavior: SinkBehavior,
    fail_open: bool,
    reject: Vec<usize>,
    record: Arc<SinkRecord>,
}

impl MockSinkFactory {
    pub fn new(behavior: SinkBehavior) -> Self {
        Self {
            behavior,
            fail_open: false,
            reject: Vec::new(),
            record: Arc::new(SinkRecord::default()),
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new(SinkBehavior::Hold)
        }
    }

    /// 按提交序号（从 0 开始）拒绝
    pub fn reject_submissions(mut self, ordinals: &[usize]) -> Self {
        self.reject = ordinals.to_vec();
        self
    }

    pub fn record(&self) -> Arc<SinkRecord> {
        self.record.clone()
    }

    pub fn opened_formats(&self) -> Vec<AudioFormat> {
        self.record.opened_formats()
    }
}

impl AudioSinkFactory for MockSinkFactory {
    type Sink = MockSink;

    fn open(&mut self, format: &AudioFormat, completions: CompletionSender) -> Result<MockSink> {
        if self.fail_open {
            return Err(PlayerError::AudioInitFailed("没有可用的音频设备".to_string()));
        }
        self.record.opened.lock().push(*format);

        let (hw_tx, hw_rx) = unbounded::<PcmBuffer>();
        let behavior = self.behavior;
        let hardware = thread::spawn(move || {
            let mut held = Vec::new();
            for buffer in hw_rx.iter() {
                match behavior {
                    SinkBehavior::Hold => held.push(buffer),
                    SinkBehavior::CompleteAfter(delay) => {
                        if !delay.is_zero() {
                            thread::sleep(delay);
                        }
                        let _ = completions.send(buffer);
                    }
                }
            }
            drop(held);
        });

        Ok(MockSink {
            hw_tx: Some(hw_tx),
            hardware: Some(hardware),
            submissions: 0,
            reject: self.reject.clone(),
            record: self.record.clone(),
        })
    }
}

pub struct MockSink {
    hw_tx: Option<Sender<PcmBuffer>>,
    hardware: Option<JoinHandle<()>>,
    submissions: usize,
    reject: Vec<usize>,
    record: Arc<SinkRecord>,
}

impl AudioSink for MockSink {
    fn submit(&mut self, buffer: PcmBuffer) -> std::result::Result<(), SubmitRejected> {
        let ordinal = self.submissions;
        self.submissions += 1;
        if self.reject.contains(&ordinal) {
            return Err(SubmitRejected {
                buffer,
                reason: "模拟设备拒绝".to_string(),
            });
        }
        let Some(tx) = &self.hw_tx else {
            return Err(SubmitRejected {
                buffer,
                reason: "设备已关闭".to_string(),
            });
        };
        self.record.submitted.lock().push(buffer.samples().to_vec());
        tx.send(buffer).map_err(|e| SubmitRejected {
            buffer: e.into_inner(),
            reason: "硬件线程已退出".to_string(),
        })
    }

    fn close(&mut self) {
        if self.hw_tx.take().is_some() {
            self.record.closes.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(handle) = self.hardware.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockSink {
    fn drop(&mut self) {
        self.close();
    }
}

// ============= 窗口表面 =============

#[derive(Debug, Clone, Copy)]
pub struct BlitRecord {
    pub address: usize,
    pub first_byte: u8,
    pub width: u32,
    pub height: u32,
}

#[derive(Default)]
pub struct RecordingSurface {
    blits: Vec<BlitRecord>,
    fail: bool,
    stop_after: Option<(usize, StopHandle)>,
}

impl RecordingSurface {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn stopping_after(frames: usize, stop: StopHandle) -> Self {
        Self {
            stop_after: Some((frames, stop)),
            ..Default::default()
        }
    }

    pub fn blits(&self) -> &[BlitRecord] {
        &self.blits
    }
}

impl SurfaceBlitter for RecordingSurface {
    fn blit(&mut self, frame: &FrameBuffer) -> Result<()> {
        if self.fail {
            return Err(PlayerError::IoError(std::io::Error::other("window gone")));
        }
        self.blits.push(BlitRecord {
            address: frame.data().as_ptr() as usize,
            first_byte: frame.data().first().copied().unwrap_or_default(),
            width: frame.width(),
            height: frame.height(),
        });
        if let Some((frames, stop)) = &self.stop_after {
            if self.blits.len() >= *frames {
                stop.request_stop();
            }
        }
        Ok(())
    }
}
