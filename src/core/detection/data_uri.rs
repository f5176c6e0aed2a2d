use base64::Engine;

use crate::core::error::DetectionError;
use crate::core::media::EncodedImage;

/// Decode a `data:<mime>;base64,<payload>` URI into image bytes.
pub fn decode_data_uri(uri: &str) -> Result<EncodedImage, DetectionError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| DetectionError::InvalidResponse("image is not a data URI".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| DetectionError::InvalidResponse("data URI has no payload".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| DetectionError::InvalidResponse("data URI is not base64".into()))?;
    let mime = if mime.is_empty() { "image/jpeg" } else { mime };

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| DetectionError::InvalidResponse(format!("bad base64 payload: {e}")))?;
    if bytes.is_empty() {
        return Err(DetectionError::InvalidResponse("empty image payload".into()));
    }
    Ok(EncodedImage::new(bytes, mime))
}

pub fn encode_data_uri(image: &EncodedImage) -> String {
    format!(
        "data:{};base64,{}",
        image.mime_type(),
        base64::engine::general_purpose::STANDARD.encode(image.bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_jpeg_data_uri() {
        let img = decode_data_uri("data:image/jpeg;base64,/9j/AA==").expect("decode");
        assert_eq!(img.mime_type(), "image/jpeg");
        assert_eq!(img.bytes(), &[0xff, 0xd8, 0xff, 0x00]);
    }

    #[test]
    fn test_encode_then_decode_keeps_mime() {
        let original = EncodedImage::new(vec![1, 2, 3, 4, 5], "image/png");
        let back = decode_data_uri(&encode_data_uri(&original)).expect("decode");
        assert_eq!(back, original);
    }

    #[test]
    fn test_rejects_non_data_uri() {
        assert!(matches!(
            decode_data_uri("https://example.com/a.jpg"),
            Err(DetectionError::InvalidResponse(_))
        ));
        assert!(decode_data_uri("data:image/jpeg,plain").is_err());
        assert!(decode_data_uri("data:image/jpeg;base64,").is_err());
        assert!(decode_data_uri("data:image/jpeg;base64,!!!").is_err());
    }
}
