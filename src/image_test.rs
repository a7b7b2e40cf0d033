use super::*;

fn sample_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from(i * 7 % 251).unwrap()).collect()
}

fn validator() -> ImageValidator {
    ImageValidator::new(STANDARD_MAX_IMAGE_BYTES)
}

#[test]
fn accepts_plain_base64() {
    let bytes = sample_bytes(512);
    let encoded = STANDARD.encode(&bytes);
    let image = validator().validate(ImagePayload::Encoded(&encoded)).unwrap();
    assert_eq!(image.bytes, bytes);
    assert!(image.mime.is_none());
    assert_eq!(image.mime_or_default(), "image/jpeg");
}

#[test]
fn strips_data_uri_and_keeps_mime() {
    let bytes = sample_bytes(300);
    let uri = format!("data:image/png;base64,{}", STANDARD.encode(&bytes));
    let image = validator().validate(ImagePayload::Encoded(&uri)).unwrap();
    assert_eq!(image.bytes, bytes);
    assert_eq!(image.mime.as_deref(), Some("image/png"));
    assert!(image.to_data_uri().starts_with("data:image/png;base64,"));
}

#[test]
fn missing_padding_decodes_like_padded_form() {
    // 301, 302 and 304 bytes leave 2, 1 and 2 padding characters respectively.
    for len in [301, 302, 304] {
        let bytes = sample_bytes(len);
        let padded = STANDARD.encode(&bytes);
        let unpadded = padded.trim_end_matches('=');
        assert_ne!(padded.len(), unpadded.len(), "len {len} should need padding");

        let from_padded = decode_padded(&padded).unwrap();
        let from_unpadded = decode_padded(unpadded).unwrap();
        assert_eq!(from_padded, from_unpadded);
        assert_eq!(STANDARD.encode(&from_unpadded).trim_end_matches('='), unpadded);
    }
}

#[test]
fn tolerates_line_breaks_in_base64() {
    let bytes = sample_bytes(400);
    let encoded = STANDARD.encode(&bytes);
    let wrapped: String = encoded
        .as_bytes()
        .chunks(76)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
    assert_eq!(decode_padded(&wrapped).unwrap(), bytes);
}

#[test]
fn rejects_malformed_base64() {
    let err = validator()
        .validate(ImagePayload::Encoded("this is *not* base64 at all!!"))
        .unwrap_err();
    assert_eq!(err, ImageError::MalformedEncoding);
    assert!(err.to_string().starts_with("malformed encoding"));
}

#[test]
fn rejects_data_uri_without_base64_marker() {
    let err = validator()
        .validate(ImagePayload::Encoded("data:image/png,abcd"))
        .unwrap_err();
    assert_eq!(err, ImageError::MalformedEncoding);
}

#[test]
fn rejects_small_payload_regardless_of_mime() {
    let tiny = STANDARD.encode(sample_bytes(99));
    for prefix in ["", "data:image/png;base64,", "data:image/webp;base64,"] {
        let payload = format!("{prefix}{tiny}");
        let err = validator().validate(ImagePayload::Encoded(&payload)).unwrap_err();
        assert_eq!(err, ImageError::TooSmall { len: 99 });
    }
}

#[test]
fn accepts_exactly_minimum_size() {
    let encoded = STANDARD.encode(sample_bytes(MIN_IMAGE_BYTES));
    assert!(validator().validate(ImagePayload::Encoded(&encoded)).is_ok());
}

#[test]
fn rejects_oversized_payload() {
    let small_limit = ImageValidator::new(1024);
    let encoded = STANDARD.encode(sample_bytes(1025));
    let err = small_limit.validate(ImagePayload::Encoded(&encoded)).unwrap_err();
    assert_eq!(err, ImageError::TooLarge { len: 1025, max: 1024 });
}

#[test]
fn rejects_unsupported_declared_type() {
    let uri = format!("data:image/bmp;base64,{}", STANDARD.encode(sample_bytes(200)));
    let err = validator().validate(ImagePayload::Encoded(&uri)).unwrap_err();
    assert_eq!(err, ImageError::UnsupportedType("image/bmp".to_string()));
    assert!(err.to_string().starts_with("unsupported type"));
}

#[test]
fn accepts_every_allowed_type() {
    let data = STANDARD.encode(sample_bytes(200));
    for mime in ALLOWED_MIME_TYPES {
        let uri = format!("data:{mime};base64,{data}");
        let image = validator().validate(ImagePayload::Encoded(&uri)).unwrap();
        assert_eq!(image.mime.as_deref(), Some(mime));
    }
}

#[test]
fn binary_upload_uses_content_type() {
    let image = validator()
        .validate(ImagePayload::Binary {
            bytes: sample_bytes(2048),
            content_type: Some("image/webp"),
            file_name: Some("quiz.webp"),
        })
        .unwrap();
    assert_eq!(image.mime.as_deref(), Some("image/webp"));
    assert!((image.size_kb() - 2.0).abs() < f64::EPSILON);
}

#[test]
fn binary_upload_falls_back_to_extension() {
    let image = validator()
        .validate(ImagePayload::Binary {
            bytes: sample_bytes(2048),
            content_type: Some("application/octet-stream"),
            file_name: Some("Quiz.JPG"),
        })
        .unwrap();
    assert_eq!(image.mime.as_deref(), Some("image/jpeg"));
}

#[test]
fn binary_upload_rejects_bad_extension() {
    let err = validator()
        .validate(ImagePayload::Binary {
            bytes: sample_bytes(2048),
            content_type: None,
            file_name: Some("notes.pdf"),
        })
        .unwrap_err();
    assert_eq!(err, ImageError::UnsupportedType(".pdf".to_string()));
}

#[test]
fn binary_upload_rejects_empty_body() {
    let err = validator()
        .validate(ImagePayload::Binary { bytes: Vec::new(), content_type: None, file_name: None })
        .unwrap_err();
    assert_eq!(err, ImageError::Empty);
}
