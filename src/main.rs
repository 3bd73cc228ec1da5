use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scan_extract::{cli, config, controller, error, extractor, image_io};
use scan_extract_common::{
    apply_crop, pages_to_text, plan_crop, render_pages, ExtractionResult, FAILURE_KIND_PREFIX,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use config::Config;
use controller::Controller;
use error::{Result, ScanError};
use extractor::ExtractionClient;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("エラー: {}", err);
        if let Some(kind) = err.failure_kind() {
            eprintln!("{}{}", FAILURE_KIND_PREFIX, kind);
        }
        if err.is_missing_credential() {
            eprintln!(
                "ヒント: scan-extract config --set-api-key <KEY> で設定するか、環境変数 {} を指定してください",
                config::API_KEY_ENV
            );
        }
        std::process::exit(1);
    }
}

/// ログ出力の初期化（RUST_LOG を優先、なければ -v で debug）
fn init_logging(verbose: bool) {
    let default = if verbose { "scan_extract=debug,scan_extract_common=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn spinner(message: &str) -> ProgressBar {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.enable_steady_tick(Duration::from_millis(100));
    progress.set_message(message.to_string());
    progress
}

fn print_result(result: &ExtractionResult) {
    println!("{}", pages_to_text(&render_pages(result)));
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;

    match cli.command {
        Commands::Scan { image, crop, output, quiet } => {
            println!("📄 scan-extract - 書類解析\n");

            // 1. 画像読み込み
            println!("[1/3] 画像を読み込み中...");
            let source = image_io::load_image(&image)?;
            println!("✔ {}x{} ({})\n", source.width(), source.height(), source.mime_type());

            // 2. 切り抜き
            println!("[2/3] 切り抜き中...");
            let geometry = crop.geometry(&source);
            let mut controller = Controller::new(ExtractionClient::from_config(&config)?);
            controller.upload(source);
            if let Some(rect) = crop.completed_rect() {
                controller.complete_crop(rect);
            }
            let plan = controller.confirm_crop(&geometry)?;
            if let Some(extracted) = controller.state().extracted_image() {
                let note = if plan.is_some_and(|p| p.is_passthrough()) { "（画像全体）" } else { "" };
                println!("✔ {}x{}{}\n", extracted.width(), extracted.height(), note);
            }

            // 3. AI解析
            println!("[3/3] AI解析中...");
            let progress = spinner("Gemini に問い合わせ中");
            controller.run_extraction().await;
            progress.finish_and_clear();

            let state = controller.state();
            let result = match (state.result(), state.failure()) {
                (Some(result), _) => result,
                (None, Some(failure)) => return Err(ScanError::Extract(failure.clone())),
                (None, None) => {
                    return Err(ScanError::InvalidArgument("解析を開始できませんでした".into()))
                }
            };
            println!("✔ 解析完了（{}件）\n", result.documents().len());

            let output = output.unwrap_or_else(|| image_io::default_output_path(&image, "result.json"));
            image_io::save_result(&output, result)?;
            println!("✔ 結果を保存: {}", output.display());

            if !quiet {
                println!();
                print_result(result);
            }

            println!("\n✅ 完了");
        }

        Commands::Crop { image, crop, output } => {
            println!("✂ scan-extract - 切り抜き\n");

            let source = image_io::load_image(&image)?;
            let plan = plan_crop(crop.completed_rect().as_ref(), &crop.geometry(&source))?;
            let extracted = apply_crop(&source, &plan)?;

            let output = output.unwrap_or_else(|| image_io::crop_output_path(&image, &extracted));
            image_io::write_image(&output, &extracted)?;
            println!(
                "✔ {}x{} を保存: {}",
                extracted.width(),
                extracted.height(),
                output.display()
            );
        }

        Commands::Render { input } => {
            let result = image_io::load_result(&input)?;
            print_result(&result);
        }

        Commands::Config { set_api_key, set_model, set_language, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if let Some(model) = set_model {
                config.model = model;
                config.save()?;
                println!("✔ モデルを設定しました: {}", config.model);
            }

            if let Some(language) = set_language {
                config.label_language = language;
                config.save()?;
                println!("✔ 見出しの言語を設定しました: {}", config.label_language);
            }

            if show {
                println!("設定: {}", Config::config_path()?.display());
                println!("  モデル: {}", config.model);
                println!("  エンドポイント: {}", config.endpoint);
                println!("  最大試行回数: {}", config.max_attempts);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  見出しの言語: {}", config.label_language);
                println!(
                    "  APIキー: {}",
                    if config.get_api_key().is_some() { "設定済み" } else { "未設定" }
                );
            }
        }
    }

    Ok(())
}
