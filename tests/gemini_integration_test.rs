//! 実際の Gemini API を使う結合テスト
//!
//! GEMINI_API_KEY が未設定ならスキップする。

use scan_extract::config::Config;
use scan_extract::extractor::ExtractionClient;
use scan_extract_common::{ExtractedImage, ExtractionResult};

fn sample_image() -> ExtractedImage {
    let mut img = image::RgbImage::from_pixel(320, 120, image::Rgb([255, 255, 255]));
    for x in 20..300 {
        for y in 55..65 {
            img.put_pixel(x, y, image::Rgb([0, 0, 0]));
        }
    }
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    ExtractedImage::from_bytes(bytes).expect("decode png")
}

#[tokio::test]
async fn gemini_extraction_integration() {
    match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {}
        _ => {
            eprintln!("GEMINI_API_KEY not set; skipping integration test");
            return;
        }
    }

    let config = Config {
        max_attempts: 2,
        ..Default::default()
    };
    let client = ExtractionClient::from_config(&config).expect("client");
    let result = client.extract(&sample_image()).await.expect("extraction failed");

    match result {
        ExtractionResult::Single(doc) => assert!(doc.is_mapping()),
        ExtractionResult::Pages(docs) => assert!(!docs.is_empty()),
    }
}
