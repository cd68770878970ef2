use image::{
    DynamicImage, GrayImage, ImageDecoder, ImageError, ImageFormat, ImageReader, Luma, Rgb,
    RgbImage,
};
use std::io::Cursor;

use crate::core::errors::{AnalyzeError, AnalyzeResult};

/// Upscale factor applied before OCR (both axes).
pub const RESIZE_FACTOR: f64 = 1.5;

/// 3x3 sharpening kernel applied as the last preprocessing step.
pub const SHARPEN_KERNEL: [[i32; 3]; 3] = [[0, -1, 0], [-1, 5, -1], [0, -1, 0]];

// BT.601 luma weights in 14-bit fixed point; they sum to 1 << 14.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

// Bicubic resampling as OpenCV's INTER_CUBIC: a = -0.75, weights in 11-bit
// fixed point, two passes rounded together at the end, edges replicated.
const CUBIC_A: f32 = -0.75;
const RESIZE_COEF_BITS: u32 = 11;
const RESIZE_COEF_SCALE: f32 = (1 << RESIZE_COEF_BITS) as f32;

/// Decode an uploaded image, honouring its EXIF orientation.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Run the OCR preprocessing chain: resize, grayscale, normalize, sharpen.
pub fn preprocess_for_ocr(img: &DynamicImage) -> GrayImage {
    let resized = resize_by_factor(img, RESIZE_FACTOR);
    let gray = to_grayscale(&resized);
    let normalized = normalize_min_max(&gray);
    sharpen(&normalized)
}

/// Bicubic resize by `factor`. The target size is rounded half-to-even,
/// so 3 px at 1.5x becomes 4 px, not 5.
pub fn resize_by_factor(img: &DynamicImage, factor: f64) -> RgbImage {
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    let new_w = ((w as f64 * factor).round_ties_even() as u32).max(1);
    let new_h = ((h as f64 * factor).round_ties_even() as u32).max(1);

    let x_taps = cubic_taps(w, new_w, factor);
    let y_taps = cubic_taps(h, new_h, factor);

    // Horizontal pass, kept at full precision
    let stride = new_w as usize * 3;
    let mut rows = vec![0i64; stride * h as usize];
    for y in 0..h {
        let row = &mut rows[y as usize * stride..(y as usize + 1) * stride];
        for (dx, tap) in x_taps.iter().enumerate() {
            for c in 0..3 {
                row[dx * 3 + c] = tap
                    .src
                    .iter()
                    .zip(tap.weights)
                    .map(|(&sx, wt)| rgb.get_pixel(sx, y)[c] as i64 * wt)
                    .sum();
            }
        }
    }

    let shift = 2 * RESIZE_COEF_BITS;
    RgbImage::from_fn(new_w, new_h, |dx, dy| {
        let tap = &y_taps[dy as usize];
        let mut px = [0u8; 3];
        for (c, out) in px.iter_mut().enumerate() {
            let acc: i64 = tap
                .src
                .iter()
                .zip(tap.weights)
                .map(|(&sy, wt)| rows[sy as usize * stride + dx as usize * 3 + c] * wt)
                .sum();
            *out = ((acc + (1 << (shift - 1))) >> shift).clamp(0, 255) as u8;
        }
        Rgb(px)
    })
}

/// Four source indices and their fixed-point weights for one output index.
struct CubicTap {
    src: [u32; 4],
    weights: [i64; 4],
}

fn cubic_taps(src_len: u32, dst_len: u32, factor: f64) -> Vec<CubicTap> {
    let scale = 1.0 / factor;
    let last = src_len as i64 - 1;
    (0..dst_len)
        .map(|d| {
            let f = ((d as f64 + 0.5) * scale - 0.5) as f32;
            let start = f.floor();
            let s = start as i64;
            CubicTap {
                src: [0i64, 1, 2, 3].map(|k| (s - 1 + k).clamp(0, last) as u32),
                weights: cubic_weights(f - start),
            }
        })
        .collect()
}

fn cubic_weights(x: f32) -> [i64; 4] {
    let a = CUBIC_A;
    let c0 = ((a * (x + 1.0) - 5.0 * a) * (x + 1.0) + 8.0 * a) * (x + 1.0) - 4.0 * a;
    let c1 = ((a + 2.0) * x - (a + 3.0)) * x * x + 1.0;
    let c2 = ((a + 2.0) * (1.0 - x) - (a + 3.0)) * (1.0 - x) * (1.0 - x) + 1.0;
    let c3 = 1.0 - c0 - c1 - c2;
    [c0, c1, c2, c3].map(|c| (c * RESIZE_COEF_SCALE).round_ties_even() as i64)
}

/// Single-channel grayscale with BT.601 weights (0.299 R + 0.587 G + 0.114 B).
pub fn to_grayscale(rgb: &RgbImage) -> GrayImage {
    let (w, h) = rgb.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (r as u32 * LUMA_R
            + g as u32 * LUMA_G
            + b as u32 * LUMA_B
            + (1 << (LUMA_SHIFT - 1)))
            >> LUMA_SHIFT;
        Luma([luma.min(255) as u8])
    })
}

/// Stretch intensities linearly so the darkest pixel becomes 0 and the
/// brightest 255. A uniform image maps to all zeros.
pub fn normalize_min_max(gray: &GrayImage) -> GrayImage {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    let range = max as f64 - min as f64;
    let scale = if range > f64::EPSILON { 255.0 / range } else { 0.0 };
    let shift = -(min as f64) * scale;

    let mut out = gray.clone();
    for p in out.pixels_mut() {
        let v = (p[0] as f64 * scale + shift).round_ties_even();
        p[0] = v.clamp(0.0, 255.0) as u8;
    }
    out
}

/// Convolve with [`SHARPEN_KERNEL`], saturating to 0..=255.
/// Borders are mirrored without repeating the edge pixel (reflect-101).
pub fn sharpen(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let mut acc = 0i32;
        for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
            for (kx, &k) in row.iter().enumerate() {
                if k == 0 {
                    continue;
                }
                let sx = reflect_101(x as i64 + kx as i64 - 1, w);
                let sy = reflect_101(y as i64 + ky as i64 - 1, h);
                acc += k * gray.get_pixel(sx, sy)[0] as i32;
            }
        }
        Luma([acc.clamp(0, 255) as u8])
    })
}

fn reflect_101(i: i64, len: u32) -> u32 {
    let n = len as i64;
    if n <= 1 {
        return 0;
    }
    let i = if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    };
    i as u32
}

/// Encode a grayscale image as PNG bytes.
pub fn encode_png(gray: &GrayImage) -> Result<Vec<u8>, ImageError> {
    let mut png_bytes = Vec::new();
    gray.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
    Ok(png_bytes)
}

/// Asynchronously decode an upload using spawn_blocking.
///
/// A decode failure is reported as [`AnalyzeError::InvalidImage`].
pub async fn load_image_from_memory_async(bytes: Vec<u8>) -> AnalyzeResult<DynamicImage> {
    tokio::task::spawn_blocking(move || decode_image(&bytes).map_err(AnalyzeError::InvalidImage))
        .await
        .map_err(|e| AnalyzeError::TaskJoinFailed(e.to_string()))?
}

/// Asynchronously preprocess an image and encode the result as PNG in a
/// single blocking task.
pub async fn preprocess_and_encode_png_async(img: DynamicImage) -> AnalyzeResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let gray = preprocess_for_ocr(&img);
        encode_png(&gray).map_err(AnalyzeError::ImageProcessing)
    })
    .await
    .map_err(|e| AnalyzeError::TaskJoinFailed(e.to_string()))?
}
