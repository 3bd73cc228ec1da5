use std::path::PathBuf;

use scan_extract_common::{CropRect, Event, ExtractError, ExtractionResult, RequestId, ViewState};

#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub view: ViewState,
    pub source_path: Option<PathBuf>,
    /// ドラッグ開始点（表示座標）
    pub drag_origin: Option<(f64, f64)>,
}

impl AppState {
    pub fn dispatch(&mut self, event: Event) {
        self.view = std::mem::take(&mut self.view).apply(event);
    }

    pub fn begin_drag(&mut self, point: (f64, f64)) {
        self.drag_origin = Some(point);
    }

    /// ドラッグ中の点から選択範囲を作る（表示領域内に収める）
    pub fn drag_selection(&self, point: (f64, f64), displayed: (f64, f64)) -> Option<CropRect> {
        let origin = self.drag_origin?;
        Some(CropRect::from_corners(origin, point).clamp_to(displayed.0, displayed.1))
    }

    pub fn end_drag(&mut self) {
        self.drag_origin = None;
    }

    /// 解析結果に応じた状態表示（待っていない通し番号なら None）
    pub fn outcome_status(
        &self,
        request: RequestId,
        outcome: &Result<ExtractionResult, ExtractError>,
    ) -> Option<String> {
        if self.view.pending_request() != Some(request) {
            return None;
        }
        Some(match outcome {
            Ok(_) => "Analyze complete".to_string(),
            Err(err) => format!("Analyze failed ({})", err.kind()),
        })
    }
}
