use image::{codecs::jpeg::JpegEncoder, ImageResult, RgbImage};

/// Self-contained JPEG for storage on a frame and upload to the oracle.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).encode_image(image)?;
    Ok(bytes)
}
