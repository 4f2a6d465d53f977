//! HTTP handlers and shared response helpers.

mod analytics;
mod health;
mod probe;
mod search;
mod tilejson;
mod tiles;

pub use self::analytics::{
    area_handler, clusters_handler, density_handler, distance_handler, nearest_handler,
    ring_handler,
};
pub use self::health::{health_handler, metrics_handler, ready_handler};
pub use self::probe::probe_handler;
pub use self::search::search_handler;
pub use self::tilejson::tilejson_handler;
pub use self::tiles::tile_handler;

use axum::{
    http::{header, StatusCode},
    response::Response,
};

use tile_common::{TileError, TileResult};

/// Content type for a tile format extension.
pub(crate) fn content_type_for(format: &str) -> TileResult<&'static str> {
    match format {
        "pbf" | "mvt" => Ok("application/x-protobuf"),
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "webp" => Ok("image/webp"),
        other => Err(TileError::UnsupportedFormat(other.to_string())),
    }
}

/// Build a binary tile response with long-lived caching headers.
pub(crate) fn tile_response(content_type: &'static str, body: Vec<u8>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "public, max-age=3600")
        .body(body.into())
        .expect("static response parts")
}

// ============================================================================
// Image Format Conversion
// ============================================================================

/// Default JPEG quality; override with JPEG_QUALITY.
const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Default WebP quality; override with WEBP_QUALITY.
const DEFAULT_WEBP_QUALITY: f32 = 85.0;

/// Convert PNG tile data to JPEG. Alpha is composited onto white
/// because JPEG has no transparency.
pub(crate) fn convert_png_to_jpeg(png_data: &[u8]) -> TileResult<Vec<u8>> {
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    let quality = std::env::var("JPEG_QUALITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .unwrap_or(DEFAULT_JPEG_QUALITY)
        .min(100);

    let img = image::load_from_memory_with_format(png_data, ImageFormat::Png)
        .map_err(|e| TileError::Internal(format!("Failed to decode PNG: {}", e)))?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut flattened = RgbaImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as f32 / 255.0;
        flattened.put_pixel(
            x,
            y,
            Rgba([
                (r as f32 * alpha + 255.0 * (1.0 - alpha)) as u8,
                (g as f32 * alpha + 255.0 * (1.0 - alpha)) as u8,
                (b as f32 * alpha + 255.0 * (1.0 - alpha)) as u8,
                255,
            ]),
        );
    }

    let rgb = image::DynamicImage::ImageRgba8(flattened).to_rgb8();
    let mut jpeg = Vec::new();
    let mut cursor = Cursor::new(&mut jpeg);
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder
        .encode(&rgb, width, height, image::ColorType::Rgb8)
        .map_err(|e| TileError::Internal(format!("Failed to encode JPEG: {}", e)))?;

    Ok(jpeg)
}

/// Convert PNG tile data to WebP, preserving transparency.
pub(crate) fn convert_png_to_webp(png_data: &[u8]) -> TileResult<Vec<u8>> {
    use image::ImageFormat;

    let quality = std::env::var("WEBP_QUALITY")
        .ok()
        .and_then(|v| v.parse::<f32>().ok())
        .unwrap_or(DEFAULT_WEBP_QUALITY)
        .clamp(0.0, 100.0);

    let img = image::load_from_memory_with_format(png_data, ImageFormat::Png)
        .map_err(|e| TileError::Internal(format!("Failed to decode PNG: {}", e)))?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), width, height);
    Ok(encoder.encode(quality).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("pbf").unwrap(), "application/x-protobuf");
        assert_eq!(content_type_for("png").unwrap(), "image/png");
        assert_eq!(content_type_for("webp").unwrap(), "image/webp");
        assert!(content_type_for("tiff").is_err());
    }

    #[test]
    fn test_format_conversions_roundtrip() {
        // A tiny valid PNG from the raster encoder
        let pixels = vec![200u8; 8 * 8 * 4];
        let png = cog_reader::png::create_png(&pixels, 8, 8).unwrap();

        let jpeg = convert_png_to_jpeg(&png).unwrap();
        assert_eq!(&jpeg[0..2], &[0xff, 0xd8]); // JPEG SOI marker

        let webp = convert_png_to_webp(&png).unwrap();
        assert_eq!(&webp[0..4], b"RIFF");
        assert_eq!(&webp[8..12], b"WEBP");
    }
}
