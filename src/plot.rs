use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use eframe::egui;
use log::{error, info};

use crate::pipeline::Pipeline;
use crate::spectrogram::{RgbImage, StatusEvent};

const SCALE_WIDTH: f32 = 50.0;
const PALETTE_WIDTH: f32 = 40.0;
const REPAINT_INTERVAL: Duration = Duration::from_millis(16);

fn to_color_image(image: &RgbImage) -> egui::ColorImage {
    egui::ColorImage::from_rgb([image.width(), image.height()], &image.to_rgb_bytes())
}

/// A texture that is re-uploaded only when its content changes.
struct CachedTexture {
    name: &'static str,
    handle: Option<egui::TextureHandle>,
}

impl CachedTexture {
    fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    fn update(&mut self, ctx: &egui::Context, image: &RgbImage) {
        let color_image = to_color_image(image);
        match &mut self.handle {
            Some(handle) => handle.set(color_image, egui::TextureOptions::NEAREST),
            None => {
                self.handle =
                    Some(ctx.load_texture(self.name, color_image, egui::TextureOptions::NEAREST))
            }
        }
    }

    fn show(&self, ui: &mut egui::Ui, size: egui::Vec2) {
        if let Some(handle) = &self.handle {
            ui.add(egui::Image::new(egui::load::SizedTexture::new(handle.id(), size)));
        }
    }
}

struct StatusLine {
    text: String,
    expires: Option<Instant>,
}

/// Display surface for the spectrogram: reports its size to the pipeline and shows what it renders.
pub struct SpectrogramApp {
    pipeline: Arc<Mutex<Pipeline>>,
    status_rx: Receiver<StatusEvent>,
    connected: Arc<AtomicBool>,
    spectrogram: CachedTexture,
    palette: CachedTexture,
    scale: CachedTexture,
    last_frame: Option<u64>,
    last_size: (usize, usize),
    last_palette: (i32, i32, usize),
    status: StatusLine,
}

impl SpectrogramApp {
    pub fn new(
        pipeline: Arc<Mutex<Pipeline>>,
        status_rx: Receiver<StatusEvent>,
        connected: Arc<AtomicBool>,
        initial_status: String,
    ) -> Self {
        Self {
            pipeline,
            status_rx,
            connected,
            spectrogram: CachedTexture::new("spectrogram"),
            palette: CachedTexture::new("palette"),
            scale: CachedTexture::new("frequency_scale"),
            last_frame: None,
            last_size: (0, 0),
            last_palette: (0, 0, 0),
            status: StatusLine {
                text: initial_status,
                expires: Some(Instant::now() + Duration::from_secs(3)),
            },
        }
    }

    fn show_message(&mut self, text: String, millis: u64) {
        let expires = if millis == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_millis(millis))
        };
        self.status = StatusLine { text, expires };
    }

    fn drain_status(&mut self) {
        while let Ok(event) = self.status_rx.try_recv() {
            self.show_message(event.to_string(), event.display_millis());
        }
        if let Some(expires) = self.status.expires {
            if Instant::now() >= expires {
                self.status.text.clear();
                self.status.expires = None;
            }
        }
    }
}

impl eframe::App for SpectrogramApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(REPAINT_INTERVAL);
        ctx.set_visuals(egui::Visuals::dark());
        self.drain_status();

        let connected = self.connected.load(Ordering::SeqCst);
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(self.status.text.as_str());
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(if connected { "Connected" } else { "No data" });
                });
            });
        });

        egui::SidePanel::left("frequency_scale")
            .exact_width(SCALE_WIDTH)
            .resizable(false)
            .show(ctx, |ui| {
                let size = ui.available_size();
                self.scale.show(ui, size);
            });

        egui::SidePanel::right("palette")
            .exact_width(PALETTE_WIDTH)
            .resizable(false)
            .show(ctx, |ui| {
                let size = ui.available_size();
                self.palette.show(ui, size);
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let available = ui.available_size();
                let size = (available.x.max(0.0) as usize, available.y.max(0.0) as usize);

                let mut pipeline = match self.pipeline.lock() {
                    Ok(pipeline) => pipeline,
                    Err(_) => {
                        error!("Pipeline mutex poisoned; nothing to draw");
                        return;
                    }
                };
                pipeline.set_display_size(size.0, size.1);
                let spectrogram = pipeline.spectrogram();

                let frame = spectrogram.frames_drawn();
                let visible = size.0 > 0 && size.1 > 0;
                if visible && (self.last_frame != Some(frame) || self.last_size != size) {
                    self.spectrogram.update(ctx, &spectrogram.render(size.0, size.1));
                }

                let palette = spectrogram.palette();
                let palette_key = (palette.brightness(), palette.contrast(), size.1);
                let stale = self.last_size != size || self.last_palette != palette_key;
                if visible && (stale || self.last_frame.is_none()) {
                    let side_height = size.1.max(1);
                    self.palette.update(
                        ctx,
                        &spectrogram.palette_image(PALETTE_WIDTH as usize, side_height),
                    );
                    self.scale.update(
                        ctx,
                        &spectrogram.frequency_scale_image(SCALE_WIDTH as usize, side_height),
                    );
                    self.last_palette = palette_key;
                }
                drop(pipeline);

                self.last_frame = Some(frame);
                self.last_size = size;
                self.spectrogram.show(ui, available);
            });
    }
}

/// Opens the viewer window; returns when it is closed.
pub fn run_native(app: SpectrogramApp) -> anyhow::Result<()> {
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1024.0, 600.0])
            .with_min_inner_size([750.0, 300.0]),
        vsync: true,
        ..Default::default()
    };

    info!("Starting viewer window");
    eframe::run_native(
        "TCP Spectrogram",
        native_options,
        Box::new(|_cc| Box::new(app)),
    )
    .map_err(|e| anyhow::anyhow!("GUI error: {}", e))
}
