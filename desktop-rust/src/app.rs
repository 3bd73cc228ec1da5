use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};

use anyhow::Result;
use eframe::egui::{self, Color32, RichText};
use eframe::egui::{FontData, FontDefinitions, FontFamily};
use scan_extract_common::{
    apply_crop, plan_crop, render_pages, DisplayGeometry, DisplayNode, EncodedImage, Event,
    ExtractError, ExtractionResult, PhaseKind, RequestId, FAILURE_KIND_PREFIX,
};

use crate::io::{decode_rgba, load_result, load_source_image, request_dir, write_request_image};
use crate::model::AppState;

const ACCENT: Color32 = Color32::from_rgb(246, 196, 69);
const PAPER: Color32 = Color32::from_rgb(250, 248, 242);
const INK: Color32 = Color32::from_rgb(30, 30, 30);

pub struct DesktopApp {
    state: AppState,
    status: String,
    extract_rx: Option<Receiver<UiMessage>>,
    source_texture: Option<egui::TextureHandle>,
    extracted_texture: Option<egui::TextureHandle>,
    geometry: Option<DisplayGeometry>,
}

enum UiMessage {
    ExtractDone {
        request: RequestId,
        outcome: std::result::Result<ExtractionResult, ExtractError>,
    },
}

impl Default for DesktopApp {
    fn default() -> Self {
        Self {
            state: AppState::default(),
            status: String::new(),
            extract_rx: None,
            source_texture: None,
            extracted_texture: None,
            geometry: None,
        }
    }
}

impl DesktopApp {
    fn open_image(&mut self, ctx: &egui::Context) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Image", &["png", "jpg", "jpeg", "webp", "gif", "bmp"])
            .pick_file()
        {
            match self.load_from_path(ctx, &path) {
                Ok(_) => self.status = format!("Loaded {}", path.display()),
                Err(err) => self.status = format!("Load failed: {err:#}"),
            }
        }
    }

    fn load_from_path(&mut self, ctx: &egui::Context, path: &Path) -> Result<()> {
        let source = load_source_image(path)?;
        self.source_texture = Some(load_texture(ctx, "source", &source)?);
        self.extracted_texture = None;
        self.geometry = None;
        self.state.source_path = Some(path.to_path_buf());
        self.state.end_drag();
        self.state.dispatch(Event::Upload(source));
        Ok(())
    }

    fn confirm_crop(&mut self, ctx: &egui::Context) {
        let Some(source) = self.state.view.source_image().cloned() else {
            return;
        };
        let geometry = self
            .geometry
            .unwrap_or_else(|| DisplayGeometry::unscaled(source.width(), source.height()));
        let completed = self.state.view.crop_state().and_then(|c| c.completed);
        let plan = match plan_crop(completed.as_ref(), &geometry) {
            Ok(plan) => plan,
            Err(err) => {
                self.status = format!("Crop rejected: {err}");
                return;
            }
        };

        let extracted = match apply_crop(&source, &plan) {
            Ok(image) => image,
            Err(err) => {
                self.status = format!("Crop failed, using original: {err}");
                source
            }
        };
        self.extracted_texture = load_texture(ctx, "extracted", &extracted).ok();
        self.state.dispatch(Event::ConfirmCrop(extracted));
    }

    fn start_extraction(&mut self) {
        if !self.state.view.can_start_extraction() {
            return;
        }
        self.state.dispatch(Event::StartExtraction);
        let (Some(request), Some(image)) = (
            self.state.view.pending_request(),
            self.state.view.extracted_image().cloned(),
        ) else {
            return;
        };

        let image_path = match write_request_image(&request_dir(), request, &image) {
            Ok(path) => path,
            Err(err) => {
                self.finish_extraction(request, Err(ExtractError::Transport(format!("{err:#}"))));
                return;
            }
        };
        let output = image_path.with_extension("result.json");

        let cli = resolve_cli_binary();
        let (tx, rx) = mpsc::channel();
        self.extract_rx = Some(rx);
        self.status = "Analyzing...".to_string();

        std::thread::spawn(move || {
            let result = std::process::Command::new(cli)
                .args([
                    "scan",
                    image_path.to_string_lossy().as_ref(),
                    "--output",
                    output.to_string_lossy().as_ref(),
                    "--quiet",
                ])
                .output();

            let outcome = match result {
                Ok(out) if out.status.success() => {
                    load_result(&output).map_err(|e| ExtractError::MalformedData(format!("{e:#}")))
                }
                Ok(out) => {
                    let stderr = String::from_utf8_lossy(&out.stderr);
                    Err(classify_failure(stderr.trim()))
                }
                Err(err) => Err(ExtractError::Transport(err.to_string())),
            };
            let _ = std::fs::remove_file(&image_path);
            let _ = std::fs::remove_file(&output);
            let _ = tx.send(UiMessage::ExtractDone { request, outcome });
        });
    }

    fn finish_extraction(
        &mut self,
        request: RequestId,
        outcome: std::result::Result<ExtractionResult, ExtractError>,
    ) {
        if let Some(status) = self.state.outcome_status(request, &outcome) {
            self.status = status;
        }
        self.state.dispatch(Event::ExtractionFinished { request, outcome });
    }

    fn reset(&mut self) {
        self.state.dispatch(Event::Reset);
        self.state.source_path = None;
        self.state.end_drag();
        self.source_texture = None;
        self.extracted_texture = None;
        self.geometry = None;
        self.status.clear();
    }

    fn poll_messages(&mut self) {
        let Some(rx) = &self.extract_rx else {
            return;
        };
        if let Ok(UiMessage::ExtractDone { request, outcome }) = rx.try_recv() {
            self.extract_rx = None;
            self.finish_extraction(request, outcome);
        }
    }

    fn show_cropper(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let Some(texture) = self.source_texture.clone() else {
            return;
        };
        let Some(source) = self.state.view.source_image() else {
            return;
        };
        let natural = source.dimensions();

        let available = ui.available_size() - egui::vec2(0.0, 8.0);
        let scale = (available.x / natural.0 as f32)
            .min(available.y / natural.1 as f32)
            .min(1.0)
            .max(0.05);
        let size = egui::vec2(natural.0 as f32 * scale, natural.1 as f32 * scale);
        let displayed = (size.x as f64, size.y as f64);

        let (rect, response) = ui.allocate_exact_size(size, egui::Sense::drag());
        let painter = ui.painter_at(rect);
        painter.image(
            texture.id(),
            rect,
            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
            Color32::WHITE,
        );

        self.geometry = Some(DisplayGeometry::new(
            natural,
            displayed,
            ctx.pixels_per_point() as f64,
        ));

        let to_local = |pos: egui::Pos2| ((pos.x - rect.min.x) as f64, (pos.y - rect.min.y) as f64);
        if response.drag_started() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.state.begin_drag(to_local(pos));
            }
        }
        if response.dragged() || response.drag_stopped() {
            let selection = response
                .interact_pointer_pos()
                .and_then(|pos| self.state.drag_selection(to_local(pos), displayed));
            if let Some(selection) = selection {
                self.state.dispatch(Event::UpdateSelection(selection));
                if response.drag_stopped() {
                    self.state.dispatch(Event::CompleteCrop(selection));
                }
            }
            if response.drag_stopped() {
                self.state.end_drag();
            }
        }

        if let Some(crop) = self.state.view.crop_state() {
            let px = crop.selection.clamp_to(displayed.0, displayed.1);
            let sel = egui::Rect::from_min_size(
                rect.min + egui::vec2(px.x as f32, px.y as f32),
                egui::vec2(px.width as f32, px.height as f32),
            );
            let shade = Color32::from_black_alpha(110);
            for band in [
                egui::Rect::from_min_max(rect.min, egui::pos2(rect.max.x, sel.min.y)),
                egui::Rect::from_min_max(egui::pos2(rect.min.x, sel.max.y), rect.max),
                egui::Rect::from_min_max(egui::pos2(rect.min.x, sel.min.y), egui::pos2(sel.min.x, sel.max.y)),
                egui::Rect::from_min_max(egui::pos2(sel.max.x, sel.min.y), egui::pos2(rect.max.x, sel.max.y)),
            ] {
                painter.rect_filled(band, 0.0, shade);
            }
            painter.rect_stroke(sel, 0.0, egui::Stroke::new(2.0, ACCENT));
        }
    }

    fn show_extracted(&self, ui: &mut egui::Ui) {
        let Some(texture) = &self.extracted_texture else {
            ui.label("(preview unavailable)");
            return;
        };
        let tex_size = texture.size_vec2();
        let available = ui.available_size() - egui::vec2(0.0, 8.0);
        let scale = (available.x / tex_size.x).min(available.y / tex_size.y).min(1.0).max(0.05);
        ui.add(egui::Image::new(texture).fit_to_exact_size(tex_size * scale));
    }

    fn show_paper(&self, ui: &mut egui::Ui, result: &ExtractionResult) {
        let pages = render_pages(result);
        let total = pages.len();
        egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
            for (index, page) in pages.iter().enumerate() {
                egui::Frame::none()
                    .fill(PAPER)
                    .stroke(egui::Stroke::new(1.0, Color32::from_gray(200)))
                    .rounding(egui::Rounding::same(4.0))
                    .inner_margin(egui::Margin::same(24.0))
                    .show(ui, |ui| {
                        ui.set_min_width(ui.available_width());
                        ui.visuals_mut().override_text_color = Some(INK);
                        if let Some(number) = page.number {
                            ui.label(RichText::new(format!("Page {number} / {total}")).small().color(Color32::from_gray(120)));
                            ui.add_space(6.0);
                        }
                        ui.push_id(("page", index), |ui| show_node(ui, &page.body));
                    });
                ui.add_space(12.0);
            }
        });
    }
}

/// 表示ノードを紙面風に描画（深さごとに字下げ・見出しを小さく）
fn show_node(ui: &mut egui::Ui, node: &DisplayNode) {
    match node {
        DisplayNode::Leaf(text) => {
            ui.label(text);
        }
        DisplayNode::List { items, .. } => {
            for (i, item) in items.iter().enumerate() {
                match item {
                    DisplayNode::Leaf(text) => {
                        ui.label(format!("• {text}"));
                    }
                    nested => {
                        ui.label("•");
                        ui.indent(("item", i), |ui| show_node(ui, nested));
                    }
                }
            }
        }
        DisplayNode::Section { depth, fields } => {
            let size = (18.0 - *depth as f32 * 2.0).max(12.0);
            for (i, field) in fields.iter().enumerate() {
                ui.label(RichText::new(&field.label).strong().size(size));
                ui.indent(("field", i), |ui| show_node(ui, &field.value));
                if *depth == 0 {
                    ui.add_space(6.0);
                }
            }
        }
    }
}

fn load_texture(ctx: &egui::Context, name: &str, image: &EncodedImage) -> Result<egui::TextureHandle> {
    let (size, pixels) = decode_rgba(image)?;
    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, &pixels);
    Ok(ctx.load_texture(name, color_image, egui::TextureOptions::LINEAR))
}

/// CLIのエラー出力から失敗理由を推定
///
/// `failure-kind:` 行があればそれに従い、なければ表示文言から判断する。
fn classify_failure(stderr: &str) -> ExtractError {
    let kind = stderr
        .lines()
        .find_map(|line| line.trim().strip_prefix(FAILURE_KIND_PREFIX));
    let detail = stderr
        .lines()
        .filter(|line| !line.trim().starts_with(FAILURE_KIND_PREFIX))
        .collect::<Vec<_>>()
        .join("\n");
    let tagged = kind.and_then(|kind| ExtractError::from_kind(kind, detail));
    if let Some(err) = tagged {
        err
    } else if stderr.contains(&ExtractError::MissingCredential.to_string()) {
        ExtractError::MissingCredential
    } else if stderr.contains(&ExtractError::EmptyResponse.to_string()) {
        ExtractError::EmptyResponse
    } else {
        ExtractError::Transport(stderr.to_string())
    }
}

pub fn configure_fonts(ctx: &egui::Context) {
    let mut fonts = FontDefinitions::default();
    let candidates = [
        r"C:\Windows\Fonts\meiryo.ttc",
        r"C:\Windows\Fonts\msgothic.ttc",
        "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
        "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/tlwg/Garuda.ttf",
    ];

    for path in candidates {
        if let Ok(data) = std::fs::read(path) {
            fonts.font_data.insert("fallback".to_string(), FontData::from_owned(data));
            for family in [FontFamily::Proportional, FontFamily::Monospace] {
                fonts.families.entry(family).or_default().push("fallback".to_string());
            }
            ctx.set_fonts(fonts);
            return;
        }
    }
}

impl eframe::App for DesktopApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.extract_rx.is_some() {
            ctx.request_repaint();
        }
        self.poll_messages();

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Open Image").clicked() {
                        self.open_image(ctx);
                        ui.close_menu();
                    }
                    let reset_enabled = self.state.view.kind() != PhaseKind::Empty;
                    if ui.add_enabled(reset_enabled, egui::Button::new("Reset")).clicked() {
                        self.reset();
                        ui.close_menu();
                    }
                });

                ui.separator();
                ui.label(RichText::new(self.state.view.kind().to_string()).color(ACCENT));
                if let Some(path) = &self.state.source_path {
                    ui.label(RichText::new(path.display().to_string()).color(Color32::from_gray(150)));
                }
                if !self.status.is_empty() {
                    ui.label(RichText::new(&self.status).color(Color32::from_gray(170)));
                }
            });
        });

        egui::TopBottomPanel::bottom("actions").show(ctx, |ui| {
            if let Some(message) = self.state.view.error() {
                ui.label(RichText::new(message).color(Color32::from_rgb(220, 80, 80)));
            }
            ui.horizontal(|ui| match self.state.view.kind() {
                PhaseKind::Empty => {
                    if ui.button("Open Image").clicked() {
                        self.open_image(ctx);
                    }
                }
                PhaseKind::Cropping => {
                    ui.label("Drag on the image to select the document area.");
                    if ui.button(RichText::new("Confirm Crop").color(ACCENT)).clicked() {
                        self.confirm_crop(ctx);
                    }
                }
                PhaseKind::ReadyToAnalyze => {
                    if ui.button("Adjust Crop").clicked() {
                        self.state.dispatch(Event::AdjustCrop);
                    }
                    if ui.button(RichText::new("Analyze").color(ACCENT)).clicked() {
                        self.start_extraction();
                    }
                }
                PhaseKind::Analyzing => {
                    ui.spinner();
                    ui.label("Analyzing...");
                }
                PhaseKind::HasResult => {
                    if ui.button(RichText::new("Show Result").color(ACCENT)).clicked() {
                        self.state.dispatch(Event::ConfirmShowResult);
                    }
                    if ui.button("Analyze Again").clicked() {
                        self.start_extraction();
                    }
                }
                PhaseKind::ResultShown => {
                    if ui.button("Start Over").clicked() {
                        self.reset();
                    }
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.state.view.kind() {
            PhaseKind::Empty => {
                ui.centered_and_justified(|ui| {
                    ui.label("Open a document image to begin.");
                });
            }
            PhaseKind::Cropping => self.show_cropper(ui, ctx),
            PhaseKind::ReadyToAnalyze | PhaseKind::Analyzing => self.show_extracted(ui),
            PhaseKind::HasResult => {
                let documents = self.state.view.result().map_or(0, |r| r.documents().len());
                ui.heading(format!("Extraction complete: {documents} document(s)"));
                ui.separator();
                self.show_extracted(ui);
            }
            PhaseKind::ResultShown => {
                if let Some(result) = self.state.view.result() {
                    self.show_paper(ui, result);
                }
            }
        });
    }
}

fn resolve_cli_binary() -> PathBuf {
    let name = if cfg!(windows) { "scan-extract.exe" } else { "scan-extract" };
    let exe = std::env::current_exe().ok();
    if let Some(base_dir) = exe.as_ref().and_then(|p| p.parent()) {
        let local = base_dir.join(name);
        if local.exists() {
            return local;
        }
        if let Some(target_dir) = base_dir.parent() {
            for profile in ["debug", "release"] {
                let sibling = target_dir.join(profile).join(name);
                if sibling.exists() {
                    return sibling;
                }
            }
        }
    }
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure("エラー: APIキーが設定されていません"),
            ExtractError::MissingCredential
        );
        assert_eq!(
            classify_failure("エラー: AIからの応答テキストがありません"),
            ExtractError::EmptyResponse
        );
        assert!(matches!(classify_failure("エラー: 通信エラー: HTTP error! status: 500"), ExtractError::Transport(_)));
    }

    #[test]
    fn test_classify_failure_reads_kind_line() {
        let stderr = "エラー: AIの応答を解析できません: trailing comma\nfailure-kind: malformed_data";
        assert_eq!(
            classify_failure(stderr),
            ExtractError::MalformedData("エラー: AIの応答を解析できません: trailing comma".into())
        );

        assert_eq!(
            classify_failure("エラー: ...\nfailure-kind: configuration"),
            ExtractError::MissingCredential
        );
        assert_eq!(
            classify_failure("エラー: ...\nfailure-kind: empty_response"),
            ExtractError::EmptyResponse
        );
        assert!(matches!(
            classify_failure("エラー: ...\nfailure-kind: transport"),
            ExtractError::Transport(_)
        ));
        assert!(matches!(
            classify_failure("エラー: ...\nfailure-kind: something_else"),
            ExtractError::Transport(_)
        ));
    }
}
