use anyhow::Result;
use clap::Parser;
use log::{error, info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

mod app;
mod cli;
mod core;
mod player;
mod renderer;

use app::{PlayerWindow, SessionStatus, SharedStatus};
use cli::Args;
use crate::core::PlayerConfig;
use player::{CpalSinkFactory, FfmpegBackend, PlaybackSession, StopHandle};
use renderer::{FrameSurface, SharedFrame};

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        // 过滤掉 wgpu_hal 和 wgpu_core 的警告日志，减少日志噪音
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Error)
        .init();

    let args = Args::parse();
    let config = args.resolve_config()?;

    info!("🎬 MYY Player 启动");

    let path = match args.path.clone().or_else(pick_file) {
        Some(path) => path,
        None => {
            warn!("未选择文件，退出");
            return Ok(());
        }
    };

    // 初始化 FFmpeg
    let backend = FfmpegBackend::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;
    info!("✅ FFmpeg 初始化成功");

    run_window(backend, path, config)
}

/// 弹出文件选择框
fn pick_file() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .set_title("选择媒体文件")
        .add_filter("视频文件", &["mp4", "mkv", "avi", "mov", "webm", "flv", "ts", "m4v"])
        .add_filter("所有文件", &["*"])
        .pick_file()
}

fn run_window(backend: FfmpegBackend, path: PathBuf, config: PlayerConfig) -> Result<()> {
    let latest: SharedFrame = Arc::new(Mutex::new(None));
    let status: SharedStatus = Arc::new(Mutex::new(SessionStatus::Opening));
    let stop = StopHandle::new();

    let title = format!(
        "喜洋洋播放器 - {}",
        path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.window_width as f32, config.window_height as f32])
            .with_min_inner_size([320.0, 240.0])
            .with_title(&title),
        ..Default::default()
    };

    let close_on_finish = config.close_on_finish;
    let worker: Arc<Mutex<Option<thread::JoinHandle<()>>>> = Arc::new(Mutex::new(None));
    let run_result = {
        let (latest, status, stop, worker) = (latest.clone(), status.clone(), stop.clone(), worker.clone());
        eframe::run_native(
            "喜洋洋播放器",
            options,
            Box::new(move |cc| {
                // 窗口就绪后再启动播放线程，表面需要 egui 上下文
                let surface = FrameSurface::new(cc.egui_ctx.clone(), latest.clone());
                match spawn_playback(backend, path, config, surface, status.clone(), stop.clone()) {
                    Ok(handle) => *worker.lock() = Some(handle),
                    Err(e) => {
                        error!("❌ 无法启动播放线程: {}", e);
                        *status.lock() = SessionStatus::Failed(e.to_string());
                    }
                }
                Box::new(PlayerWindow::new(cc, latest, status, stop, title, close_on_finish))
            }),
        )
    };

    // 窗口已关闭：停止并等待播放线程完成 teardown
    stop.request_stop();
    if let Some(handle) = worker.lock().take() {
        if handle.join().is_err() {
            error!("❌ 播放线程异常退出");
        }
    }

    run_result.map_err(|e| anyhow::anyhow!("应用启动失败: {}", e))?;

    match &*status.lock() {
        SessionStatus::Failed(message) => Err(anyhow::anyhow!("播放失败: {}", message)),
        SessionStatus::Finished(summary) => {
            info!("📊 播放统计: {}", serde_json::to_string(summary).unwrap_or_default());
            Ok(())
        }
        _ => Ok(()),
    }
}

/// 播放线程：会话在线程内创建，音频流不需要跨线程移动
fn spawn_playback(
    backend: FfmpegBackend,
    path: PathBuf,
    config: PlayerConfig,
    mut surface: FrameSurface,
    status: SharedStatus,
    stop: StopHandle,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("playback".to_string()).spawn(move || {
        let mut session = PlaybackSession::new(backend, CpalSinkFactory, config).with_stop_handle(stop);

        let info = match session.open(&path) {
            Ok(info) => info,
            Err(e) => {
                error!("❌ 打开失败: {}", e);
                *status.lock() = SessionStatus::Failed(e.to_string());
                return;
            }
        };
        *status.lock() = SessionStatus::Playing(info);

        let result = session.run(&mut surface);
        info!("🖼️ 窗口共收到 {} 帧", surface.frames());
        *status.lock() = match result {
            Ok(summary) => SessionStatus::Finished(summary),
            Err(e) => SessionStatus::Failed(e.to_string()),
        };
    })
}
