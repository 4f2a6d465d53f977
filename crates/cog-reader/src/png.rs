//! PNG encoding for raster tile output.
//!
//! Written by hand: signature, IHDR, IDAT (zlib via flate2), IEND,
//! with CRCs from crc32fast. Tiles are RGBA; fully opaque grayscale
//! output uses color type 0 for smaller files.

use std::io::Write;

use tile_common::{TileError, TileResult};

/// Create an RGBA PNG (color type 6).
pub fn create_png(pixels: &[u8], width: usize, height: usize) -> TileResult<Vec<u8>> {
    if pixels.len() != width * height * 4 {
        return Err(TileError::Internal(format!(
            "pixel buffer is {} bytes, expected {}",
            pixels.len(),
            width * height * 4
        )));
    }

    let mut png = Vec::new();

    // PNG signature
    png.extend_from_slice(&[137, 80, 78, 71, 13, 10, 26, 10]);

    // IHDR chunk
    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&(width as u32).to_be_bytes());
    ihdr.extend_from_slice(&(height as u32).to_be_bytes());
    ihdr.push(8); // bit depth
    ihdr.push(6); // color type (RGBA)
    ihdr.push(0); // compression method
    ihdr.push(0); // filter method
    ihdr.push(0); // interlace method
    write_chunk(&mut png, b"IHDR", &ihdr);

    // IDAT chunk: each scanline prefixed with filter type 0
    let mut raw = Vec::with_capacity(height * (1 + width * 4));
    for row in pixels.chunks_exact(width * 4) {
        raw.push(0);
        raw.extend_from_slice(row);
    }
    write_chunk(&mut png, b"IDAT", &deflate(&raw)?);

    // IEND chunk
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Create a grayscale PNG (color type 0) from single-channel pixels.
pub fn create_png_gray(pixels: &[u8], width: usize, height: usize) -> TileResult<Vec<u8>> {
    if pixels.len() != width * height {
        return Err(TileError::Internal(format!(
            "pixel buffer is {} bytes, expected {}",
            pixels.len(),
            width * height
        )));
    }

    let mut png = Vec::new();
    png.extend_from_slice(&[137, 80, 78, 71, 13, 10, 26, 10]);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&(width as u32).to_be_bytes());
    ihdr.extend_from_slice(&(height as u32).to_be_bytes());
    ihdr.push(8);
    ihdr.push(0); // color type grayscale
    ihdr.push(0);
    ihdr.push(0);
    ihdr.push(0);
    write_chunk(&mut png, b"IHDR", &ihdr);

    let mut raw = Vec::with_capacity(height * (1 + width));
    for row in pixels.chunks_exact(width) {
        raw.push(0);
        raw.extend_from_slice(row);
    }
    write_chunk(&mut png, b"IDAT", &deflate(&raw)?);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

fn deflate(raw: &[u8]) -> TileResult<Vec<u8>> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder
        .write_all(raw)
        .map_err(|e| TileError::Internal(format!("IDAT compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| TileError::Internal(format!("IDAT compression failed: {}", e)))
}

/// Write a PNG chunk with its CRC.
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut crc_data = Vec::with_capacity(4 + data.len());
    crc_data.extend_from_slice(chunk_type);
    crc_data.extend_from_slice(data);
    png.extend_from_slice(&crc32fast::hash(&crc_data).to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_png_structure() {
        let pixels = vec![255u8; 4 * 4 * 4];
        let png = create_png(&pixels, 4, 4).unwrap();

        assert_eq!(&png[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
        // IHDR follows immediately: length 13, type, width 4
        assert_eq!(&png[8..12], &13u32.to_be_bytes());
        assert_eq!(&png[12..16], b"IHDR");
        assert_eq!(&png[16..20], &4u32.to_be_bytes());
        // Color type RGBA
        assert_eq!(png[25], 6);
        // Ends with IEND
        assert_eq!(&png[png.len() - 8..png.len() - 4], b"IEND");
    }

    #[test]
    fn test_gray_png_structure() {
        let pixels = vec![128u8; 8 * 8];
        let png = create_png_gray(&pixels, 8, 8).unwrap();
        assert_eq!(&png[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
        assert_eq!(png[25], 0); // grayscale
    }

    #[test]
    fn test_wrong_buffer_size_rejected() {
        assert!(create_png(&[0u8; 10], 4, 4).is_err());
        assert!(create_png_gray(&[0u8; 10], 4, 4).is_err());
    }

    #[test]
    fn test_deterministic_output() {
        let pixels: Vec<u8> = (0..16 * 16 * 4).map(|i| (i % 251) as u8).collect();
        assert_eq!(
            create_png(&pixels, 16, 16).unwrap(),
            create_png(&pixels, 16, 16).unwrap()
        );
    }
}
