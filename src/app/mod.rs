use egui::{Color32, Context, FontData, FontDefinitions, FontFamily, TextureHandle, TextureOptions, Ui};
use log::{info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{MediaInfo, PlaybackSummary};
use crate::player::StopHandle;
use crate::renderer::SharedFrame;

/// 播放线程向窗口报告的会话状态
#[derive(Debug, Clone, Default)]
pub enum SessionStatus {
    #[default]
    Opening,
    Playing(MediaInfo),
    Finished(PlaybackSummary),
    Failed(String),
}

impl SessionStatus {
    pub fn is_done(&self) -> bool {
        matches!(self, SessionStatus::Finished(_) | SessionStatus::Failed(_))
    }
}

pub type SharedStatus = Arc<Mutex<SessionStatus>>;

/// 播放窗口：显示最新一帧，关闭时通知播放线程停止
pub struct PlayerWindow {
    latest: SharedFrame,
    status: SharedStatus,
    stop: StopHandle,
    texture: Option<TextureHandle>,
    title: String,
    close_on_finish: bool,
    close_sent: bool,
}

impl PlayerWindow {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        latest: SharedFrame,
        status: SharedStatus,
        stop: StopHandle,
        title: String,
        close_on_finish: bool,
    ) -> Self {
        Self::setup_chinese_fonts(&cc.egui_ctx);
        Self {
            latest,
            status,
            stop,
            texture: None,
            title,
            close_on_finish,
            close_sent: false,
        }
    }

    /// 设置中文字体
    fn setup_chinese_fonts(ctx: &Context) {
        let mut fonts = FontDefinitions::default();

        #[cfg(target_os = "windows")]
        let chinese_font_paths = vec![
            "C:/Windows/Fonts/msyh.ttc",   // 微软雅黑
            "C:/Windows/Fonts/simhei.ttf", // 黑体
        ];

        #[cfg(target_os = "macos")]
        let chinese_font_paths = vec!["/System/Library/Fonts/PingFang.ttc"];

        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let chinese_font_paths = vec![
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
        ];

        let loaded = chinese_font_paths
            .into_iter()
            .filter(|p| Path::new(p).exists())
            .find_map(|p| match std::fs::read(p) {
                Ok(data) => Some((p, data)),
                Err(e) => {
                    warn!("⚠️ 无法读取字体文件 {}: {}", p, e);
                    None
                }
            });

        match loaded {
            Some((path, data)) => {
                fonts
                    .font_data
                    .insert("chinese_font".to_owned(), FontData::from_owned(data));
                for family in [FontFamily::Proportional, FontFamily::Monospace] {
                    if let Some(list) = fonts.families.get_mut(&family) {
                        list.insert(0, "chinese_font".to_owned());
                    }
                }
                info!("✅ 成功加载中文字体: {}", path);
            }
            None => warn!("⚠️ 未找到可用的中文字体文件，中文可能显示为方块"),
        }

        ctx.set_fonts(fonts);
    }

    /// 把播放线程发布的最新帧上传为纹理
    fn upload_latest_frame(&mut self, ctx: &Context) {
        let Some(image) = self.latest.lock().take() else {
            return;
        };
        match &mut self.texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => self.texture = Some(ctx.load_texture("video_frame", image, TextureOptions::LINEAR)),
        }
    }

    /// 渲染视频区域（保持宽高比居中）
    fn render_video_area(&self, ui: &mut Ui, status: &SessionStatus) {
        let rect = ui.available_rect_before_wrap();
        ui.painter().rect_filled(rect, 0.0, Color32::BLACK);

        if let Some(texture) = &self.texture {
            let size = texture.size_vec2();
            let scale = (rect.width() / size.x).min(rect.height() / size.y);
            let fitted = egui::Rect::from_center_size(rect.center(), size * scale);
            ui.painter().image(
                texture.id(),
                fitted,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                Color32::WHITE,
            );
            return;
        }

        let (icon, text, color) = match status {
            SessionStatus::Opening => ("⏳", "正在打开...".to_string(), Color32::LIGHT_GRAY),
            SessionStatus::Playing(_) => ("🎬", "等待第一帧...".to_string(), Color32::LIGHT_GRAY),
            SessionStatus::Finished(_) => ("⏹", "播放结束".to_string(), Color32::GRAY),
            SessionStatus::Failed(message) => ("❌", message.clone(), Color32::LIGHT_RED),
        };
        ui.allocate_ui_at_rect(rect, |ui| {
            ui.centered_and_justified(|ui| {
                ui.vertical_centered(|ui| {
                    ui.label(egui::RichText::new(icon).size(48.0).color(color));
                    ui.add_space(10.0);
                    ui.label(egui::RichText::new(text).size(16.0).color(color));
                });
            });
        });
    }
}

impl eframe::App for PlayerWindow {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.upload_latest_frame(ctx);
        let status = self.status.lock().clone();

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                self.render_video_area(ui, &status);
            });

        if status.is_done() && self.close_on_finish && !self.close_sent {
            info!("🔚 播放结束，关闭窗口: {}", self.title);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            self.close_sent = true;
        }

        // 帧到达时播放线程会主动请求重绘，这里只为刷新状态文字
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("🔚 窗口关闭，请求停止播放");
        self.stop.request_stop();
    }
}
