//! Upload decoding and format normalization

use std::io::Cursor;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{ImageFormat, RgbImage};

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("empty upload")]
    Empty,
    #[error("{0}")]
    Decode(#[from] image::ImageError),
}

/// Image bytes ready to inline into a remote request
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImagePayload {
    pub fn base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64())
    }
}

/// A decoded upload plus what the remote tier needs to see it
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub rgb: RgbImage,
    pub payload: Arc<ImagePayload>,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }
}

/// Decode an upload into RGB8 and pick the bytes sent to remote providers
pub fn decode(bytes: Vec<u8>) -> Result<DecodedImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }

    let format = image::guess_format(&bytes)?;
    let rgb = image::load_from_memory_with_format(&bytes, format)?.to_rgb8();

    let payload = match remote_mime(format) {
        Some(mime) => ImagePayload { mime_type: mime.to_string(), data: bytes },
        None => ImagePayload { mime_type: "image/png".to_string(), data: encode_png(&rgb)? },
    };

    Ok(DecodedImage { rgb, payload: Arc::new(payload) })
}

/// PNG bytes of an RGB image
pub fn encode_png(rgb: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    rgb.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Formats vision providers accept as-is
fn remote_mime(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        _ => None,
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    /// Small valid PNG for tests across the crate
    pub fn sample_png() -> Vec<u8> {
        let rgb = RgbImage::from_pixel(16, 12, image::Rgb([200, 120, 40]));
        encode_png(&rgb).unwrap()
    }

    #[test]
    fn test_decode_png_passes_bytes_through() {
        let bytes = sample_png();
        let decoded = assert_ok!(decode(bytes.clone()));

        assert_eq!((decoded.width(), decoded.height()), (16, 12));
        assert_eq!(decoded.payload.mime_type, "image/png");
        assert_eq!(decoded.payload.data, bytes);
        assert!(decoded.payload.data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_decode_bmp_is_reencoded() {
        let rgb = RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]));
        let mut bmp = Cursor::new(Vec::new());
        rgb.write_to(&mut bmp, ImageFormat::Bmp).unwrap();

        let decoded = decode(bmp.into_inner()).unwrap();
        assert_eq!(decoded.payload.mime_type, "image/png");
        assert_eq!(image::guess_format(&decoded.payload.data).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(Vec::new()), Err(ImageError::Empty)));
        assert_err!(decode(b"definitely not an image".to_vec()));
    }
}
