//! EXIF-backed metadata policy.
//!
//! Reads date fields with `kamadak-exif`, builds a fresh TIFF block with its
//! writer and splices it into the JPEG's APP1 segment with `img-parts`. Any
//! EXIF already present in the output is replaced.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use exif::experimental::Writer;
use exif::{Context, Exif, Field, In, Reader, Tag, Value};
use img_parts::jpeg::Jpeg;
use img_parts::ImageEXIF;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::io::Cursor;
use tracing::{debug, warn};

use super::decision::{post_write, pre_write};
use super::error::MetadataError;
use super::traits::MetadataPolicy;
use super::types::{
    ApplyResult, DerivedTimestamp, ExifTimestampField, MetadataPolicyMode,
};
use crate::catalog::DeliveryId;
use crate::codec::ImageFile;

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

const OFFSET_TIME: Tag = Tag(Context::Exif, 0x9010);
const OFFSET_TIME_ORIGINAL: Tag = Tag(Context::Exif, 0x9011);
const OFFSET_TIME_DIGITIZED: Tag = Tag(Context::Exif, 0x9012);

/// Offset tags in lookup priority order.
const OFFSET_TAGS: [Tag; 3] = [OFFSET_TIME_ORIGINAL, OFFSET_TIME_DIGITIZED, OFFSET_TIME];

static OFFSET_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[+-]\d{2}:\d{2}$").ok());

impl ExifTimestampField {
    fn tag(&self) -> Tag {
        match self {
            Self::DateTimeOriginal => Tag::DateTimeOriginal,
            Self::DateTimeDigitized => Tag::DateTimeDigitized,
            Self::DateTime => Tag::DateTime,
        }
    }
}

/// Default `MetadataPolicy`.
#[derive(Debug, Default, Clone)]
pub struct ExifMetadataPolicy;

impl ExifMetadataPolicy {
    pub fn new() -> Self {
        Self
    }
}

fn is_valid_exif_date(value: &str) -> bool {
    NaiveDateTime::parse_from_str(value, EXIF_DATE_FORMAT).is_ok()
}

fn is_valid_offset(value: &str) -> bool {
    OFFSET_PATTERN
        .as_ref()
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

fn ascii_field(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .and_then(|part| std::str::from_utf8(part).ok())
            .map(|s| s.trim_end_matches(|c: char| c == '\0' || c == ' ').to_string()),
        _ => None,
    }
}

/// First well-formed date field, with the first well-formed offset if any.
fn read_exif_timestamp(data: &[u8]) -> Option<DerivedTimestamp> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(data))
        .ok()?;

    let offset = OFFSET_TAGS
        .iter()
        .filter_map(|tag| ascii_field(&exif, *tag))
        .find(|value| is_valid_offset(value));

    ExifTimestampField::PRIORITY.iter().find_map(|field| {
        let value = ascii_field(&exif, field.tag())?;
        if !is_valid_exif_date(&value) {
            debug!(field = ?field, value = %value, "Skipping malformed EXIF date");
            return None;
        }
        Some(DerivedTimestamp::Exif {
            field: *field,
            value,
            offset: offset.clone(),
        })
    })
}

fn local_time(epoch_ms: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(epoch_ms).single()
}

/// `+HH:MM` offset of the local zone at `time`.
fn format_offset(time: &DateTime<Local>) -> String {
    time.format("%:z").to_string()
}

/// Date string and optional offset to write for a derived timestamp.
fn exif_date_strings(derived: &DerivedTimestamp) -> Option<(String, Option<String>)> {
    match derived {
        DerivedTimestamp::Exif { value, offset, .. } => Some((value.clone(), offset.clone())),
        DerivedTimestamp::File { epoch_ms, offset } => {
            let time = local_time(*epoch_ms)?;
            let offset = if offset.is_empty() {
                format_offset(&time)
            } else {
                offset.clone()
            };
            Some((time.format(EXIF_DATE_FORMAT).to_string(), Some(offset)))
        }
        DerivedTimestamp::Unavailable => None,
    }
}

fn ascii(tag: Tag, value: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![value.as_bytes().to_vec()]),
    }
}

/// Serializes fields into a big-endian TIFF block.
fn tiff_block(fields: &[Field]) -> Result<Bytes, exif::Error> {
    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut out = Cursor::new(Vec::new());
    writer.write(&mut out, false)?;
    Ok(Bytes::from(out.into_inner()))
}

fn timestamp_fields(date: &str, offset: Option<&str>) -> Vec<Field> {
    let mut fields = vec![
        ascii(Tag::DateTime, date),
        ascii(Tag::DateTimeOriginal, date),
        ascii(Tag::DateTimeDigitized, date),
    ];
    if let Some(offset) = offset {
        for tag in [OFFSET_TIME, OFFSET_TIME_ORIGINAL, OFFSET_TIME_DIGITIZED] {
            fields.push(ascii(tag, offset));
        }
    }
    fields
}

/// Replaces the JPEG's EXIF segment with the given timestamp.
fn inject(data: &Bytes, date: &str, offset: Option<&str>) -> Result<Bytes, String> {
    let mut jpeg = Jpeg::from_bytes(data.clone()).map_err(|e| e.to_string())?;
    let block = tiff_block(&timestamp_fields(date, offset)).map_err(|e| e.to_string())?;
    jpeg.set_exif(Some(block));
    Ok(jpeg.encoder().bytes())
}

#[async_trait]
impl MetadataPolicy for ExifMetadataPolicy {
    fn name(&self) -> &str {
        "exif"
    }

    async fn derive_timestamp(&self, file: &ImageFile) -> Result<DerivedTimestamp, MetadataError> {
        if let Some(derived) = read_exif_timestamp(&file.data) {
            return Ok(derived);
        }

        if let Some(epoch_ms) = file.last_modified_ms.filter(|ms| *ms > 0) {
            if let Some(time) = local_time(epoch_ms) {
                return Ok(DerivedTimestamp::File {
                    epoch_ms,
                    offset: format_offset(&time),
                });
            }
        }

        Ok(DerivedTimestamp::Unavailable)
    }

    async fn apply_timestamp(
        &self,
        file: ImageFile,
        derived: &DerivedTimestamp,
        delivery: DeliveryId,
        mode: MetadataPolicyMode,
    ) -> Result<ApplyResult, MetadataError> {
        if let Some(decision) = pre_write(file.is_jpeg(), derived.kind()) {
            return Ok(ApplyResult {
                file,
                status: decision.status,
                warning_reason: decision.reason,
            });
        }

        let written = match exif_date_strings(derived) {
            Some((date, offset)) => match inject(&file.data, &date, offset.as_deref()) {
                Ok(data) => Some(ImageFile { data, ..file.clone() }),
                Err(reason) => {
                    warn!(name = %file.name, reason = %reason, "EXIF injection failed");
                    None
                }
            },
            None => None,
        };

        let decision = post_write(written.is_some(), delivery.definition());
        debug!(
            name = %file.name,
            delivery = ?delivery,
            mode = ?mode,
            status = ?decision.status,
            "Applied capture timestamp"
        );

        Ok(ApplyResult {
            file: written.unwrap_or(file),
            status: decision.status,
            warning_reason: decision.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{MetadataStatus, REASON_INJECT_FAILED, REASON_UNSUPPORTED};
    use crate::testing::fixtures;

    fn jpeg_with_fields(fields: &[Field]) -> ImageFile {
        let mut jpeg = Jpeg::from_bytes(Bytes::from(fixtures::jpeg_bytes(2, 2))).unwrap();
        jpeg.set_exif(Some(tiff_block(fields).unwrap()));
        ImageFile::new("photo.jpg", "image/jpeg", jpeg.encoder().bytes())
    }

    #[tokio::test]
    async fn test_derive_prefers_date_time_original() {
        let file = jpeg_with_fields(&[
            ascii(Tag::DateTime, "2020:01:01 00:00:00"),
            ascii(Tag::DateTimeOriginal, "2021:06:15 08:30:00"),
            ascii(OFFSET_TIME_ORIGINAL, "+02:00"),
        ]);
        let derived = ExifMetadataPolicy::new().derive_timestamp(&file).await.unwrap();
        assert_eq!(
            derived,
            DerivedTimestamp::Exif {
                field: ExifTimestampField::DateTimeOriginal,
                value: "2021:06:15 08:30:00".to_string(),
                offset: Some("+02:00".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_derive_skips_malformed_dates() {
        let file = jpeg_with_fields(&[
            ascii(Tag::DateTimeOriginal, "not a date"),
            ascii(Tag::DateTime, "2019:12:31 23:59:59"),
            ascii(OFFSET_TIME, "junk"),
        ]);
        let derived = ExifMetadataPolicy::new().derive_timestamp(&file).await.unwrap();
        assert_eq!(
            derived,
            DerivedTimestamp::Exif {
                field: ExifTimestampField::DateTime,
                value: "2019:12:31 23:59:59".to_string(),
                offset: None,
            }
        );
    }

    #[tokio::test]
    async fn test_derive_falls_back_to_file_time() {
        let file = ImageFile::new("a.png", "image/png", fixtures::png_bytes(1, 1))
            .with_last_modified(1_700_000_000_000);
        let derived = ExifMetadataPolicy::new().derive_timestamp(&file).await.unwrap();
        match derived {
            DerivedTimestamp::File { epoch_ms, offset } => {
                assert_eq!(epoch_ms, 1_700_000_000_000);
                assert!(is_valid_offset(&offset), "bad offset {}", offset);
            }
            other => panic!("expected file timestamp, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_derive_unavailable_without_positive_mtime() {
        let policy = ExifMetadataPolicy::new();
        let file = ImageFile::new("a.png", "image/png", fixtures::png_bytes(1, 1));
        assert_eq!(
            policy.derive_timestamp(&file).await.unwrap(),
            DerivedTimestamp::Unavailable
        );
        let file = file.with_last_modified(0);
        assert_eq!(
            policy.derive_timestamp(&file).await.unwrap(),
            DerivedTimestamp::Unavailable
        );
    }

    #[tokio::test]
    async fn test_apply_writes_readable_timestamp() {
        let policy = ExifMetadataPolicy::new();
        let file = ImageFile::new("out.jpg", "image/jpeg", fixtures::jpeg_bytes(4, 4));
        let derived = DerivedTimestamp::Exif {
            field: ExifTimestampField::DateTimeDigitized,
            value: "2022:03:04 05:06:07".to_string(),
            offset: Some("-05:00".to_string()),
        };

        let result = policy
            .apply_timestamp(file, &derived, DeliveryId::Photos, MetadataPolicyMode::Strict)
            .await
            .unwrap();
        assert_eq!(result.status, MetadataStatus::Guaranteed);
        assert!(result.warning_reason.is_none());

        let reread = policy.derive_timestamp(&result.file).await.unwrap();
        assert_eq!(
            reread,
            DerivedTimestamp::Exif {
                field: ExifTimestampField::DateTimeOriginal,
                value: "2022:03:04 05:06:07".to_string(),
                offset: Some("-05:00".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_apply_file_time_uses_local_calendar() {
        let policy = ExifMetadataPolicy::new();
        let epoch_ms = 1_650_000_000_000;
        let expected = local_time(epoch_ms)
            .unwrap()
            .format(EXIF_DATE_FORMAT)
            .to_string();
        let derived = DerivedTimestamp::File {
            epoch_ms,
            offset: "+09:00".to_string(),
        };
        let file = ImageFile::new("out.jpg", "image/jpeg", fixtures::jpeg_bytes(2, 2));

        let result = policy
            .apply_timestamp(file, &derived, DeliveryId::Photos, MetadataPolicyMode::FallbackFiletime)
            .await
            .unwrap();
        match policy.derive_timestamp(&result.file).await.unwrap() {
            DerivedTimestamp::Exif { value, offset, .. } => {
                assert_eq!(value, expected);
                assert_eq!(offset.as_deref(), Some("+09:00"));
            }
            other => panic!("expected exif timestamp, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_apply_to_png_is_unsupported_and_untouched() {
        let policy = ExifMetadataPolicy::new();
        let file = ImageFile::new("out.png", "image/png", fixtures::png_bytes(2, 2));
        let original = file.data.clone();
        let derived = DerivedTimestamp::File {
            epoch_ms: 1_000,
            offset: "+00:00".to_string(),
        };

        let result = policy
            .apply_timestamp(file, &derived, DeliveryId::Photos, MetadataPolicyMode::Strict)
            .await
            .unwrap();
        assert_eq!(result.status, MetadataStatus::Warning);
        assert_eq!(result.warning_reason.as_deref(), Some(REASON_UNSUPPORTED));
        assert_eq!(result.file.data, original);
    }

    #[tokio::test]
    async fn test_apply_to_corrupt_jpeg_reports_injection_failure() {
        let policy = ExifMetadataPolicy::new();
        let file = ImageFile::new("out.jpg", "image/jpeg", vec![0u8; 8]);
        let derived = DerivedTimestamp::Exif {
            field: ExifTimestampField::DateTime,
            value: "2022:03:04 05:06:07".to_string(),
            offset: None,
        };

        let result = policy
            .apply_timestamp(file, &derived, DeliveryId::Photos, MetadataPolicyMode::Strict)
            .await
            .unwrap();
        assert_eq!(result.status, MetadataStatus::Warning);
        assert_eq!(result.warning_reason.as_deref(), Some(REASON_INJECT_FAILED));
        assert_eq!(&result.file.data[..], &[0u8; 8]);
    }

    #[tokio::test]
    async fn test_apply_for_unverified_delivery_still_writes() {
        let policy = ExifMetadataPolicy::new();
        let file = ImageFile::new("out.jpg", "image/jpeg", fixtures::jpeg_bytes(2, 2));
        let derived = DerivedTimestamp::Exif {
            field: ExifTimestampField::DateTime,
            value: "2022:03:04 05:06:07".to_string(),
            offset: None,
        };

        let result = policy
            .apply_timestamp(file, &derived, DeliveryId::Files, MetadataPolicyMode::FallbackFiletime)
            .await
            .unwrap();
        assert_eq!(result.status, MetadataStatus::Skipped);
        assert_eq!(
            result.warning_reason.as_deref(),
            Some("iOS Files App is not verified yet")
        );
        assert!(matches!(
            policy.derive_timestamp(&result.file).await.unwrap(),
            DerivedTimestamp::Exif { .. }
        ));
    }
}
