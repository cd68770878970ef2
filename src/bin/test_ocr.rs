//! Quick OCR check: preprocess one image the way /analyze does and print what
//! the configured engine reads.
//! Run with: cargo run --release --bin test_ocr -- <image_path>

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tracing::info;

use medilens_vision::core::config::OcrConfig;
use medilens_vision::services::ocr::{collect_rec_texts, engine_from_config};
use medilens_vision::utils::{decode_image, preprocess_for_ocr};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("medilens_vision::services::ocr=debug,test_ocr=info")
        .with_target(false)
        .init();

    // Get image path from args
    let args: Vec<String> = std::env::args().collect();
    let sample_path = if args.len() > 1 {
        args[1].clone()
    } else {
        "test_sample.jpg".to_string()
    };

    if !Path::new(&sample_path).exists() {
        eprintln!("Image not found: {}", sample_path);
        std::process::exit(1);
    }

    let config = OcrConfig::from_env().context("Failed to load OCR configuration")?;

    info!("Loading image: {}", sample_path);
    let bytes = std::fs::read(&sample_path)?;
    let image = decode_image(&bytes).context("Could not decode image")?;
    info!("Image dimensions: {}x{}", image.width(), image.height());

    let processed = preprocess_for_ocr(&image);
    info!(
        "Preprocessed dimensions: {}x{}",
        processed.width(),
        processed.height()
    );

    let temp_png = tempfile::Builder::new()
        .prefix("medilens-ocr-")
        .suffix(".png")
        .tempfile()?;
    processed.save_with_format(temp_png.path(), image::ImageFormat::Png)?;

    let engine = engine_from_config(&config);
    info!("\n=== Running {} ({}) ===", engine.name(), config.command);
    let start = Instant::now();
    let pages = engine.recognize(temp_png.path()).await?;
    let lines = collect_rec_texts(&pages);

    println!("\n=== Results ({}ms) ===", start.elapsed().as_millis());
    if lines.is_empty() {
        println!("  (empty)");
    } else {
        for (i, line) in lines.iter().enumerate() {
            println!("  {}. {}", i + 1, line);
        }
    }
    println!("\nJoined: {}", lines.join(" "));

    Ok(())
}
