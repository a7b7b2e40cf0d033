//! Image payload validation.
//!
//! Payloads arrive either as base64 text (optionally wrapped in a
//! `data:image/<mime>;base64,` header) or as raw bytes from a multipart
//! upload. Validation only checks encoding, size and the declared type;
//! the bytes themselves are never sniffed, the upstream model does the
//! actual image decoding.

use std::borrow::Cow;

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};

/// Anything shorter than this after decoding is not treated as an image.
pub const MIN_IMAGE_BYTES: usize = 100;
/// Limit for the `standard` deployment profile.
pub const STANDARD_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
/// Limit for the `extended` deployment profile.
pub const EXTENDED_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub const ALLOWED_MIME_TYPES: [&str; 5] = ["image/jpeg", "image/jpg", "image/png", "image/gif", "image/webp"];
const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];
const DEFAULT_MIME: &str = "image/jpeg";

// Encoders disagree on the unused bits of the final symbol, so accept any.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("image data is empty")]
    Empty,
    #[error("malformed encoding: image data is not valid base64")]
    MalformedEncoding,
    #[error("image data is too small ({len} bytes) to be a real image")]
    TooSmall { len: usize },
    #[error("image is too large ({len} bytes, maximum {max} bytes); reduce the image size")]
    TooLarge { len: usize, max: usize },
    #[error("unsupported type '{0}' (allowed: jpeg, png, gif, webp)")]
    UnsupportedType(String),
}

/// A payload that passed validation: decoded bytes plus the declared type.
#[derive(Debug, Clone)]
pub struct ValidImage {
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

impl ValidImage {
    pub fn mime_or_default(&self) -> &str {
        self.mime.as_deref().unwrap_or(DEFAULT_MIME)
    }

    /// Re-encodes the bytes as a `data:` URI for the upstream request.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_or_default(), STANDARD.encode(&self.bytes))
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn size_kb(&self) -> f64 {
        (self.bytes.len() as f64 / 1024.0 * 10.0).round() / 10.0
    }
}

/// Raw input handed to the validator.
pub enum ImagePayload<'a> {
    /// Base64 text, with or without a data-URI header.
    Encoded(&'a str),
    /// Bytes read from a multipart field.
    Binary {
        bytes: Vec<u8>,
        content_type: Option<&'a str>,
        file_name: Option<&'a str>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ImageValidator {
    max_bytes: usize,
}

impl ImageValidator {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn validate(&self, payload: ImagePayload<'_>) -> Result<ValidImage, ImageError> {
        match payload {
            ImagePayload::Encoded(raw) => self.validate_encoded(raw),
            ImagePayload::Binary { bytes, content_type, file_name } => {
                self.validate_binary(bytes, content_type, file_name)
            }
        }
    }

    fn validate_encoded(&self, raw: &str) -> Result<ValidImage, ImageError> {
        let (declared, data) = split_data_uri(raw)?;
        if data.is_empty() {
            return Err(ImageError::Empty);
        }
        let bytes = decode_padded(data)?;
        self.check_size(bytes.len())?;
        let mime = declared.map(|m| normalize_mime(&m)).transpose()?;
        Ok(ValidImage { bytes, mime })
    }

    fn validate_binary(
        &self,
        bytes: Vec<u8>,
        content_type: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<ValidImage, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        self.check_size(bytes.len())?;

        let from_extension = file_name.map(mime_from_file_name).transpose()?.flatten();
        // Browsers send octet-stream when they cannot tell, which is the same as no type.
        let declared = content_type
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
            .filter(|ct| !ct.is_empty() && !ct.eq_ignore_ascii_case("application/octet-stream"));

        let mime = match declared {
            Some(ct) => Some(normalize_mime(ct)?),
            None => from_extension,
        };
        Ok(ValidImage { bytes, mime })
    }

    fn check_size(&self, len: usize) -> Result<(), ImageError> {
        if len < MIN_IMAGE_BYTES {
            return Err(ImageError::TooSmall { len });
        }
        if len > self.max_bytes {
            return Err(ImageError::TooLarge { len, max: self.max_bytes });
        }
        Ok(())
    }
}

/// Splits an optional `data:<mime>;base64,` header from the payload.
pub(crate) fn split_data_uri(raw: &str) -> Result<(Option<String>, &str), ImageError> {
    let raw = raw.trim();
    let Some(rest) = raw.strip_prefix("data:") else {
        return Ok((None, raw));
    };
    let Some((header, data)) = rest.split_once(',') else {
        return Err(ImageError::MalformedEncoding);
    };
    let mut parts = header.split(';');
    let mime = parts.next().unwrap_or_default().trim();
    if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(ImageError::MalformedEncoding);
    }
    let mime = (!mime.is_empty()).then(|| mime.to_string());
    Ok((mime, data.trim()))
}

/// Decodes base64, restoring any padding the sender dropped.
pub(crate) fn decode_padded(data: &str) -> Result<Vec<u8>, ImageError> {
    let mut text: Cow<'_, str> = if data.bytes().any(|b| b.is_ascii_whitespace()) {
        Cow::Owned(data.chars().filter(|c| !c.is_ascii_whitespace()).collect())
    } else {
        Cow::Borrowed(data)
    };

    let missing = text.len() % 4;
    if missing != 0 {
        text.to_mut().extend(std::iter::repeat_n('=', 4 - missing));
    }

    LENIENT_BASE64
        .decode(text.as_bytes())
        .map_err(|_| ImageError::MalformedEncoding)
}

fn normalize_mime(mime: &str) -> Result<String, ImageError> {
    let lowered = mime.trim().to_ascii_lowercase();
    if ALLOWED_MIME_TYPES.contains(&lowered.as_str()) {
        Ok(lowered)
    } else {
        Err(ImageError::UnsupportedType(mime.trim().to_string()))
    }
}

fn mime_from_file_name(name: &str) -> Result<Option<String>, ImageError> {
    let Some((_, ext)) = name.rsplit_once('.') else {
        return Ok(None);
    };
    let ext = ext.to_ascii_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ImageError::UnsupportedType(format!(".{ext}")));
    }
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        other => return Ok(Some(format!("image/{other}"))),
    };
    Ok(Some(mime.to_string()))
}

#[cfg(test)]
#[path = "image_test.rs"]
mod tests;
