//! Scan & Extract Common Library
//!
//! CLIとデスクトップで共有される型とユーティリティ

pub mod crop;
pub mod error;
pub mod parser;
pub mod prompts;
pub mod render;
pub mod request;
pub mod session;
pub mod types;

pub use crop::{plan_crop, CropPlan, CropRect, CropUnit, DisplayGeometry, SourceRect, MAX_OUTPUT_SIDE};
#[cfg(feature = "raster")]
pub use crop::{apply_crop, crop_image};
pub use error::{Error, ExtractError, Result, FAILURE_KIND_PREFIX, USER_FACING_ERROR};
pub use parser::{parse_extraction_response, parse_extraction_text, parse_json_text, strip_code_fences};
pub use prompts::{build_extraction_prompt, DEFAULT_LABEL_LANGUAGE};
pub use render::{
    flatten_node, flatten_value, pages_to_text, render, render_pages, to_text, DisplayNode, Field, FlatEntry,
    FlatLeaf, Page, PathSegment,
};
pub use request::GeminiRequest;
pub use session::{CropState, Event, Phase, PhaseKind, RequestId, ViewState};
pub use types::{decode_data_url, DocValue, EncodedImage, ExtractedImage, ExtractionResult, Scalar, SourceImage};
