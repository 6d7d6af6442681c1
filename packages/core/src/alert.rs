//! Defect alert record and inbound payload decoding.
//!
//! Producers publish loosely-typed JSON; [`Alert::decode`] is the only
//! place that turns it into a typed [`Alert`]. Anything that fails here is
//! dropped by the listener without touching the store or the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format used for `received_at` and for normalised epoch timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One defect-detection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Store-assigned row id. `None` when persistence failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Producer event time, opaque apart from ordering and bucketing.
    pub timestamp: String,
    pub defect_type: String,
    pub confidence: f64,
    pub frame_number: Option<i64>,
    pub total_defects_session: i64,
    /// Ingestion time assigned by this service.
    pub received_at: String,
}

/// Reasons an inbound payload is rejected.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Producer timestamps arrive either as text or as a Unix epoch number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProducerTimestamp {
    Text(String),
    Epoch(f64),
}

impl ProducerTimestamp {
    fn normalise(self) -> Result<String, DecodeError> {
        match self {
            ProducerTimestamp::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(DecodeError::MissingField("timestamp"));
                }
                Ok(trimmed.to_string())
            }
            ProducerTimestamp::Epoch(secs) => {
                let whole = secs.floor();
                let nanos = ((secs - whole) * 1e9) as u32;
                DateTime::from_timestamp(whole as i64, nanos)
                    .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
                    .ok_or_else(|| DecodeError::InvalidField {
                        field: "timestamp",
                        reason: format!("epoch {} is out of range", secs),
                    })
            }
        }
    }
}

/// Wire shape of an inbound message. Every field is optional here so that
/// missing values surface as [`DecodeError::MissingField`] rather than a
/// generic serde message.
#[derive(Debug, Deserialize)]
struct AlertMessage {
    timestamp: Option<ProducerTimestamp>,
    defect_type: Option<String>,
    confidence: Option<f64>,
    #[serde(default, alias = "frame_number")]
    frame: Option<i64>,
    #[serde(default)]
    total_defects_session: Option<i64>,
}

impl Alert {
    /// Build an alert that has not been persisted yet.
    pub fn new(
        timestamp: impl Into<String>,
        defect_type: impl Into<String>,
        confidence: f64,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            timestamp: timestamp.into(),
            defect_type: defect_type.into(),
            confidence,
            frame_number: None,
            total_defects_session: 0,
            received_at: received_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Decode a raw payload, stamping `received_at` with the given instant.
    pub fn decode(payload: &[u8], received_at: DateTime<Utc>) -> Result<Self, DecodeError> {
        let message: AlertMessage = serde_json::from_slice(payload)?;

        let timestamp = message
            .timestamp
            .ok_or(DecodeError::MissingField("timestamp"))?
            .normalise()?;

        let defect_type = message
            .defect_type
            .ok_or(DecodeError::MissingField("defect_type"))?;
        let defect_type = defect_type.trim();
        if defect_type.is_empty() {
            return Err(DecodeError::InvalidField {
                field: "defect_type",
                reason: "must not be empty".to_string(),
            });
        }

        let confidence = message
            .confidence
            .ok_or(DecodeError::MissingField("confidence"))?;

        Ok(Self {
            id: None,
            timestamp,
            defect_type: defect_type.to_string(),
            confidence,
            frame_number: message.frame,
            total_defects_session: message.total_defects_session.unwrap_or(0),
            received_at: received_at.format(TIMESTAMP_FORMAT).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 5).unwrap()
    }

    #[test]
    fn decode_minimal_payload() {
        let payload = br#"{"timestamp":"2024-01-01 10:00:00","defect_type":"crack","confidence":0.92}"#;
        let alert = Alert::decode(payload, received()).unwrap();

        assert_eq!(alert.id, None);
        assert_eq!(alert.timestamp, "2024-01-01 10:00:00");
        assert_eq!(alert.defect_type, "crack");
        assert_eq!(alert.confidence, 0.92);
        assert_eq!(alert.frame_number, None);
        assert_eq!(alert.total_defects_session, 0);
        assert_eq!(alert.received_at, "2024-01-01 10:00:05");
    }

    #[test]
    fn decode_reads_optional_fields() {
        let payload = br#"{
            "timestamp": "2024-01-01 10:00:00",
            "defect_type": "scratch",
            "confidence": 0.5,
            "frame": 1200,
            "total_defects_session": 7
        }"#;
        let alert = Alert::decode(payload, received()).unwrap();

        assert_eq!(alert.frame_number, Some(1200));
        assert_eq!(alert.total_defects_session, 7);
    }

    #[test]
    fn decode_accepts_frame_number_alias() {
        let payload = br#"{"timestamp":"t","defect_type":"dent","confidence":1,"frame_number":3}"#;
        let alert = Alert::decode(payload, received()).unwrap();
        assert_eq!(alert.frame_number, Some(3));
    }

    #[test]
    fn decode_normalises_epoch_timestamp() {
        let payload = br#"{"timestamp":1704103200,"defect_type":"crack","confidence":0.8}"#;
        let alert = Alert::decode(payload, received()).unwrap();
        assert_eq!(alert.timestamp, "2024-01-01 10:00:00");
    }

    #[test]
    fn decode_ignores_unknown_fields() {
        let payload = br#"{"timestamp":"t","defect_type":"crack","confidence":0.1,"camera":"line-2"}"#;
        assert!(Alert::decode(payload, received()).is_ok());
    }

    #[test]
    fn missing_defect_type_is_rejected() {
        let payload = br#"{"timestamp":"2024-01-01 10:00:00","confidence":0.92}"#;
        let err = Alert::decode(payload, received()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("defect_type")));
    }

    #[test]
    fn missing_confidence_is_rejected() {
        let payload = br#"{"timestamp":"2024-01-01 10:00:00","defect_type":"crack"}"#;
        let err = Alert::decode(payload, received()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("confidence")));
    }

    #[test]
    fn missing_timestamp_is_rejected() {
        let payload = br#"{"defect_type":"crack","confidence":0.3}"#;
        let err = Alert::decode(payload, received()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField("timestamp")));
    }

    #[test]
    fn blank_defect_type_is_rejected() {
        let payload = br#"{"timestamp":"t","defect_type":"   ","confidence":0.3}"#;
        let err = Alert::decode(payload, received()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "defect_type", .. }));
    }

    #[test]
    fn non_json_payload_is_malformed() {
        let err = Alert::decode(b"not json at all", received()).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn wrongly_typed_confidence_is_malformed() {
        let payload = br#"{"timestamp":"t","defect_type":"crack","confidence":"high"}"#;
        let err = Alert::decode(payload, received()).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn serialises_without_id_when_unpersisted() {
        let alert = Alert::new("2024-01-01 10:00:00", "crack", 0.9, received());
        let json = serde_json::to_value(&alert).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["defect_type"], "crack");
        assert_eq!(json["frame_number"], serde_json::Value::Null);
    }
}
