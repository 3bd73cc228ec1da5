//! 画面操作の制御
//!
//! 状態機械 `ViewState` と抽出クライアントを束ね、
//! 切り抜き確定（画像生成）と解析（非同期通信）の副作用を担当する。

use scan_extract_common::{
    apply_crop, plan_crop, CropPlan, CropRect, DisplayGeometry, Event, ExtractError, ExtractedImage,
    ExtractionResult, PhaseKind, RequestId, SourceImage, ViewState,
};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::extractor::{ExtractionClient, Sleeper, Transport};

pub struct Controller<T, S> {
    state: ViewState,
    client: ExtractionClient<T, S>,
}

impl<T: Transport, S: Sleeper> Controller<T, S> {
    pub fn new(client: ExtractionClient<T, S>) -> Self {
        Self {
            state: ViewState::new(),
            client,
        }
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn client(&self) -> &ExtractionClient<T, S> {
        &self.client
    }

    fn dispatch(&mut self, event: Event) {
        let before = self.state.kind();
        self.state = std::mem::take(&mut self.state).apply(event);
        let after = self.state.kind();
        if before != after {
            debug!(from = %before, to = %after, "Phase changed");
        }
    }

    pub fn upload(&mut self, source: SourceImage) {
        info!(
            width = source.width(),
            height = source.height(),
            mime = source.mime_type(),
            "Image uploaded"
        );
        self.dispatch(Event::Upload(source));
    }

    pub fn update_selection(&mut self, selection: CropRect) {
        self.dispatch(Event::UpdateSelection(selection));
    }

    pub fn complete_crop(&mut self, rect: CropRect) {
        self.dispatch(Event::CompleteCrop(rect));
    }

    /// 切り抜きを確定する
    ///
    /// 確定矩形がない・面積0なら元画像をそのまま使う。
    /// 画像の切り抜きに失敗した場合も元画像で続行する。
    /// 表示寸法・倍率が不正ならエラーを返し、切り抜き中のまま留まる。
    /// 切り抜き中でなければ何もしない。
    pub fn confirm_crop(&mut self, geometry: &DisplayGeometry) -> Result<Option<CropPlan>> {
        if self.state.kind() != PhaseKind::Cropping {
            return Ok(None);
        }
        let Some(source) = self.state.source_image().cloned() else {
            return Ok(None);
        };
        let completed = self.state.crop_state().and_then(|c| c.completed);

        let plan = plan_crop(completed.as_ref(), geometry)?;
        let extracted = match apply_crop(&source, &plan) {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "Crop failed, using original image");
                source
            }
        };
        debug!(
            passthrough = plan.is_passthrough(),
            width = extracted.width(),
            height = extracted.height(),
            "Crop confirmed"
        );

        self.dispatch(Event::ConfirmCrop(extracted));
        Ok(Some(plan))
    }

    pub fn adjust_crop(&mut self) {
        self.dispatch(Event::AdjustCrop);
    }

    pub fn confirm_show_result(&mut self) {
        self.dispatch(Event::ConfirmShowResult);
    }

    pub fn reset(&mut self) {
        self.dispatch(Event::Reset);
    }

    /// 解析を開始し、送信する画像と通し番号を返す
    pub fn begin_extraction(&mut self) -> Option<(RequestId, ExtractedImage)> {
        if !self.state.can_start_extraction() {
            return None;
        }
        self.dispatch(Event::StartExtraction);
        let request = self.state.pending_request()?;
        let image = self.state.extracted_image()?.clone();
        Some((request, image))
    }

    /// 解析結果を反映する（古い通し番号の結果は捨てる）
    pub fn finish_extraction(
        &mut self,
        request: RequestId,
        outcome: std::result::Result<ExtractionResult, ExtractError>,
    ) {
        if self.state.pending_request() != Some(request) {
            debug!(request, "Discarding stale extraction result");
        }
        self.dispatch(Event::ExtractionFinished { request, outcome });
    }

    /// 解析開始から結果反映までを行う
    ///
    /// 開始できない状態なら何もせず false を返す。
    pub async fn run_extraction(&mut self) -> bool {
        let Some((request, image)) = self.begin_extraction() else {
            return false;
        };
        let outcome = self.client.extract(&image).await;
        self.finish_extraction(request, outcome);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::{ClientSettings, TransportError};
    use scan_extract_common::{DocValue, USER_FACING_ERROR};
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use std::result::Result;

    struct Canned(Mutex<VecDeque<Result<Value, TransportError>>>);

    impl Transport for Canned {
        async fn post_json(&self, _url: &str, _body: &Value) -> Result<Value, TransportError> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connection("closed".into())))
        }
    }

    struct NoWait;

    impl Sleeper for NoWait {
        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            std::future::ready(())
        }
    }

    fn controller(api_key: Option<&str>, replies: Vec<Result<Value, TransportError>>) -> Controller<Canned, NoWait> {
        let settings = ClientSettings {
            api_key: api_key.map(str::to_string),
            model: "gemini-2.5-flash".into(),
            endpoint: "https://example.test/v1beta".into(),
            max_attempts: 5,
            label_language: "Thai".into(),
        };
        Controller::new(ExtractionClient::new(settings, Canned(Mutex::new(replies.into())), NoWait))
    }

    fn reply(text: &str) -> Result<Value, TransportError> {
        Ok(json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}))
    }

    fn png(width: u32, height: u32) -> SourceImage {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 100, 50]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        SourceImage::from_bytes(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_full_flow() {
        let mut ctl = controller(Some("k"), vec![reply(r#"{"Invoice No.": "INV-1"}"#)]);
        ctl.upload(png(200, 100));
        assert_eq!(ctl.state().kind(), PhaseKind::Cropping);

        ctl.complete_crop(CropRect::pixels(0.0, 0.0, 100.0, 50.0));
        let plan = ctl.confirm_crop(&DisplayGeometry::unscaled(200, 100)).unwrap().unwrap();
        assert!(!plan.is_passthrough());
        assert_eq!(ctl.state().extracted_image().unwrap().dimensions(), (100, 50));
        assert_eq!(ctl.state().extracted_image().unwrap().mime_type(), "image/jpeg");

        assert!(ctl.run_extraction().await);
        assert_eq!(ctl.state().kind(), PhaseKind::HasResult);
        match ctl.state().result().unwrap() {
            ExtractionResult::Single(doc) => assert_eq!(doc.get("Invoice No."), Some(&DocValue::text("INV-1"))),
            other => panic!("unexpected: {:?}", other),
        }

        ctl.confirm_show_result();
        assert_eq!(ctl.state().kind(), PhaseKind::ResultShown);

        ctl.reset();
        assert_eq!(ctl.state().kind(), PhaseKind::Empty);
    }

    #[tokio::test]
    async fn test_confirm_without_drag_is_passthrough() {
        let mut ctl = controller(Some("k"), vec![]);
        let source = png(40, 30);
        ctl.upload(source.clone());

        let plan = ctl.confirm_crop(&DisplayGeometry::unscaled(40, 30)).unwrap().unwrap();
        assert!(plan.is_passthrough());
        assert_eq!(ctl.state().extracted_image(), Some(&source));
    }

    #[test]
    fn test_undecodable_source_falls_back_to_original() {
        let mut ctl = controller(Some("k"), vec![]);
        let source = SourceImage::new(vec![1, 2, 3], "image/jpeg", 100, 100);
        ctl.upload(source.clone());
        ctl.complete_crop(CropRect::pixels(10.0, 10.0, 50.0, 50.0));

        let plan = ctl.confirm_crop(&DisplayGeometry::unscaled(100, 100)).unwrap().unwrap();
        assert!(!plan.is_passthrough());
        assert_eq!(ctl.state().kind(), PhaseKind::ReadyToAnalyze);
        assert_eq!(ctl.state().extracted_image(), Some(&source));
    }

    #[test]
    fn test_confirm_outside_cropping_is_noop() {
        let mut ctl = controller(Some("k"), vec![]);
        assert!(ctl.confirm_crop(&DisplayGeometry::unscaled(10, 10)).unwrap().is_none());
        assert_eq!(ctl.state().kind(), PhaseKind::Empty);
    }

    #[test]
    fn test_invalid_pixel_ratio_keeps_cropping() {
        let mut ctl = controller(Some("k"), vec![]);
        ctl.upload(png(40, 30));
        ctl.complete_crop(CropRect::pixels(0.0, 0.0, 20.0, 10.0));

        let err = ctl.confirm_crop(&DisplayGeometry::new((40, 30), (40.0, 30.0), 0.0)).unwrap_err();
        assert!(matches!(err, crate::error::ScanError::Common(scan_extract_common::Error::Geometry(_))));
        assert_eq!(ctl.state().kind(), PhaseKind::Cropping);
        assert!(ctl.state().extracted_image().is_none());
    }

    #[tokio::test]
    async fn test_missing_key_returns_to_ready_with_message() {
        let mut ctl = controller(None, vec![reply("{}")]);
        ctl.upload(png(20, 20));
        ctl.confirm_crop(&DisplayGeometry::unscaled(20, 20)).unwrap();

        assert!(ctl.run_extraction().await);
        assert_eq!(ctl.state().kind(), PhaseKind::ReadyToAnalyze);
        assert_eq!(ctl.state().error(), Some(USER_FACING_ERROR));
        assert_eq!(ctl.state().failure(), Some(&ExtractError::MissingCredential));
    }

    #[tokio::test]
    async fn test_cannot_extract_before_confirm() {
        let mut ctl = controller(Some("k"), vec![reply("{}")]);
        assert!(!ctl.run_extraction().await);
        ctl.upload(png(20, 20));
        assert!(!ctl.run_extraction().await);
        assert_eq!(ctl.state().kind(), PhaseKind::Cropping);
    }

    #[tokio::test]
    async fn test_stale_result_after_reset_is_ignored() {
        let mut ctl = controller(Some("k"), vec![]);
        ctl.upload(png(20, 20));
        ctl.confirm_crop(&DisplayGeometry::unscaled(20, 20)).unwrap();
        let (first, _) = ctl.begin_extraction().unwrap();

        ctl.reset();
        ctl.upload(png(20, 20));
        ctl.confirm_crop(&DisplayGeometry::unscaled(20, 20)).unwrap();
        let (second, _) = ctl.begin_extraction().unwrap();
        assert_ne!(first, second);

        ctl.finish_extraction(first, Ok(ExtractionResult::Single(DocValue::text("old"))));
        assert_eq!(ctl.state().kind(), PhaseKind::Analyzing);

        ctl.finish_extraction(second, Ok(ExtractionResult::Single(DocValue::text("new"))));
        assert_eq!(
            ctl.state().result(),
            Some(&ExtractionResult::Single(DocValue::text("new")))
        );
    }

    #[tokio::test]
    async fn test_reanalyze_from_result() {
        let mut ctl = controller(
            Some("k"),
            vec![reply(r#"{"a": 1}"#), reply(r#"[{"a": 1}, {"a": 2}]"#)],
        );
        ctl.upload(png(20, 20));
        ctl.confirm_crop(&DisplayGeometry::unscaled(20, 20)).unwrap();
        assert!(ctl.run_extraction().await);
        assert!(!ctl.state().result().unwrap().is_multi_page());

        assert!(ctl.run_extraction().await);
        assert!(ctl.state().result().unwrap().is_multi_page());
    }
}
