//! 画面状態の状態機械
//!
//! Empty → Cropping → ReadyToAnalyze → Analyzing → HasResult → ResultShown
//! の遷移を純粋関数 `ViewState::apply(state, event) -> state` で表す。
//!
//! 切り抜き画像・抽出結果は各フェーズのデータとして持つので、
//! 「切り抜き画像があるのは ReadyToAnalyze 以降」「抽出結果があるのは
//! HasResult / ResultShown のみ」は型で保証される。

use crate::crop::CropRect;
use crate::error::ExtractError;
use crate::types::{ExtractedImage, ExtractionResult, SourceImage};

/// 抽出リクエストの通し番号（単調増加）
pub type RequestId = u64;

/// 切り抜き矩形の状態
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropState {
    /// ドラッグ中の選択範囲
    pub selection: CropRect,
    /// ドラッグ完了時に確定した矩形（未操作ならNone）
    pub completed: Option<CropRect>,
}

impl Default for CropState {
    fn default() -> Self {
        Self {
            selection: CropRect::default_selection(),
            completed: None,
        }
    }
}

/// フェーズ
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Empty,
    Cropping {
        source: SourceImage,
        crop: CropState,
    },
    ReadyToAnalyze {
        source: SourceImage,
        crop: CropState,
        extracted: ExtractedImage,
    },
    Analyzing {
        source: SourceImage,
        crop: CropState,
        extracted: ExtractedImage,
        request: RequestId,
    },
    HasResult {
        source: SourceImage,
        crop: CropState,
        extracted: ExtractedImage,
        result: ExtractionResult,
    },
    ResultShown {
        source: SourceImage,
        crop: CropState,
        extracted: ExtractedImage,
        result: ExtractionResult,
    },
}

/// フェーズの種類（データなし）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Empty,
    Cropping,
    ReadyToAnalyze,
    Analyzing,
    HasResult,
    ResultShown,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PhaseKind::Empty => "empty",
            PhaseKind::Cropping => "cropping",
            PhaseKind::ReadyToAnalyze => "ready",
            PhaseKind::Analyzing => "analyzing",
            PhaseKind::HasResult => "has-result",
            PhaseKind::ResultShown => "result-shown",
        };
        write!(f, "{}", name)
    }
}

/// 利用者操作・処理完了イベント
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// 画像を選択（どのフェーズからでも受け付ける）
    Upload(SourceImage),
    /// ドラッグ中の選択範囲を更新
    UpdateSelection(CropRect),
    /// ドラッグ完了
    CompleteCrop(CropRect),
    /// 切り抜き確定（切り抜き画像は呼び出し側で作る）
    ConfirmCrop(ExtractedImage),
    /// 切り抜きをやり直す
    AdjustCrop,
    /// 解析開始 / 再解析
    StartExtraction,
    /// 解析完了
    ExtractionFinished {
        request: RequestId,
        outcome: Result<ExtractionResult, ExtractError>,
    },
    /// 結果の紙面表示へ進む
    ConfirmShowResult,
    /// 最初からやり直す
    Reset,
}

/// 画面状態
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    phase: Phase,
    error: Option<String>,
    failure: Option<ExtractError>,
    last_request: RequestId,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            phase: Phase::Empty,
            error: None,
            failure: None,
            last_request: 0,
        }
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// イベントを適用した次の状態を返す
    ///
    /// 現在のフェーズで受け付けないイベントは無視する。
    /// 解析完了イベントは、解析中かつ通し番号が一致する場合のみ反映する。
    pub fn apply(self, event: Event) -> Self {
        let ViewState { phase, error, failure, last_request } = self;

        let next = |phase: Phase| ViewState {
            phase,
            error: None,
            failure: None,
            last_request,
        };

        match (phase, event) {
            (_, Event::Reset) => next(Phase::Empty),

            (_, Event::Upload(source)) => next(Phase::Cropping {
                source,
                crop: CropState::default(),
            }),

            (Phase::Cropping { source, crop }, Event::UpdateSelection(selection)) => ViewState {
                phase: Phase::Cropping {
                    source,
                    crop: CropState { selection, ..crop },
                },
                error,
                failure,
                last_request,
            },

            (Phase::Cropping { source, crop }, Event::CompleteCrop(rect)) => ViewState {
                phase: Phase::Cropping {
                    source,
                    crop: CropState { completed: Some(rect), ..crop },
                },
                error,
                failure,
                last_request,
            },

            (Phase::Cropping { source, crop }, Event::ConfirmCrop(extracted)) => {
                next(Phase::ReadyToAnalyze { source, crop, extracted })
            }

            (Phase::ReadyToAnalyze { source, crop, .. }, Event::AdjustCrop) => {
                next(Phase::Cropping { source, crop })
            }

            (
                Phase::ReadyToAnalyze { source, crop, extracted }
                | Phase::HasResult { source, crop, extracted, .. },
                Event::StartExtraction,
            ) => {
                let request = last_request + 1;
                ViewState {
                    phase: Phase::Analyzing { source, crop, extracted, request },
                    error: None,
                    failure: None,
                    last_request: request,
                }
            }

            (
                Phase::Analyzing { source, crop, extracted, request: current },
                Event::ExtractionFinished { request, outcome },
            ) if request == current => match outcome {
                Ok(result) => next(Phase::HasResult { source, crop, extracted, result }),
                Err(err) => ViewState {
                    phase: Phase::ReadyToAnalyze { source, crop, extracted },
                    error: Some(err.user_message().to_string()),
                    failure: Some(err),
                    last_request,
                },
            },

            (Phase::HasResult { source, crop, extracted, result }, Event::ConfirmShowResult) => {
                next(Phase::ResultShown { source, crop, extracted, result })
            }

            (phase, _) => ViewState { phase, error, failure, last_request },
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn kind(&self) -> PhaseKind {
        match &self.phase {
            Phase::Empty => PhaseKind::Empty,
            Phase::Cropping { .. } => PhaseKind::Cropping,
            Phase::ReadyToAnalyze { .. } => PhaseKind::ReadyToAnalyze,
            Phase::Analyzing { .. } => PhaseKind::Analyzing,
            Phase::HasResult { .. } => PhaseKind::HasResult,
            Phase::ResultShown { .. } => PhaseKind::ResultShown,
        }
    }

    /// 利用者向けエラーメッセージ
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 直近の失敗理由（ログ・テスト用）
    pub fn failure(&self) -> Option<&ExtractError> {
        self.failure.as_ref()
    }

    pub fn source_image(&self) -> Option<&SourceImage> {
        match &self.phase {
            Phase::Empty => None,
            Phase::Cropping { source, .. }
            | Phase::ReadyToAnalyze { source, .. }
            | Phase::Analyzing { source, .. }
            | Phase::HasResult { source, .. }
            | Phase::ResultShown { source, .. } => Some(source),
        }
    }

    pub fn crop_state(&self) -> Option<&CropState> {
        match &self.phase {
            Phase::Empty => None,
            Phase::Cropping { crop, .. }
            | Phase::ReadyToAnalyze { crop, .. }
            | Phase::Analyzing { crop, .. }
            | Phase::HasResult { crop, .. }
            | Phase::ResultShown { crop, .. } => Some(crop),
        }
    }

    pub fn extracted_image(&self) -> Option<&ExtractedImage> {
        match &self.phase {
            Phase::Empty | Phase::Cropping { .. } => None,
            Phase::ReadyToAnalyze { extracted, .. }
            | Phase::Analyzing { extracted, .. }
            | Phase::HasResult { extracted, .. }
            | Phase::ResultShown { extracted, .. } => Some(extracted),
        }
    }

    pub fn result(&self) -> Option<&ExtractionResult> {
        match &self.phase {
            Phase::HasResult { result, .. } | Phase::ResultShown { result, .. } => Some(result),
            _ => None,
        }
    }

    /// 解析中ならその通し番号
    pub fn pending_request(&self) -> Option<RequestId> {
        match &self.phase {
            Phase::Analyzing { request, .. } => Some(*request),
            _ => None,
        }
    }

    /// 解析ボタンを有効にするか
    pub fn can_start_extraction(&self) -> bool {
        matches!(self.kind(), PhaseKind::ReadyToAnalyze | PhaseKind::HasResult)
    }
}
