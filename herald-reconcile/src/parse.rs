//! Deriving structured delivery events from raw activity records.

use ahash::AHashMap;
use herald_common::Channel;
use herald_ledger::{DeliveryEvent, EventKind};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::activity::RawActivityRecord;

/// Derive a delivery event from a raw activity record.
///
/// Returns `None` for records that cannot be reconciled; that is an
/// expected exclusion, never an error:
/// - a name without a `_sent`/`_failed` suffix
/// - a payload without a resolvable campaign id
///
/// The channel comes from the name prefix, falling back to a `channel`
/// field in the payload, falling back to `default_channel`. The payload is
/// parsed defensively: malformed JSON yields an empty payload rather than
/// aborting the batch. The reference id is coerced to a string, `"0"` when
/// absent, so the conflict key is stable across runs.
#[must_use]
pub fn derive_event(record: &RawActivityRecord, default_channel: Channel) -> Option<DeliveryEvent> {
    let (prefix, event) = if let Some(prefix) = record.name.strip_suffix("_sent") {
        (prefix, EventKind::Sent)
    } else if let Some(prefix) = record.name.strip_suffix("_failed") {
        (prefix, EventKind::Failed)
    } else {
        debug!(id = record.id, name = %record.name, "Not a delivery activity, excluding");
        return None;
    };

    let payload = decode_payload(&record.data);

    let channel = prefix.parse::<Channel>().ok().or_else(|| {
        payload
            .get("channel")
            .and_then(Value::as_str)
            .and_then(|value| value.parse().ok())
    });
    let channel = channel.unwrap_or_else(|| {
        warn!(
            id = record.id,
            name = %record.name,
            fallback = %default_channel,
            "No resolvable channel, falling back to default"
        );
        default_channel
    });

    let Some(campaign_id) = read_u64(&payload, "campaign_id") else {
        warn!(id = record.id, name = %record.name, "No campaign id in payload, skipping");
        return None;
    };

    let reference_id = match payload.get("reference_id") {
        Some(Value::String(value)) => value.clone(),
        Some(Value::Number(value)) => value.to_string(),
        _ => "0".to_string(),
    };
    let reference_type = payload
        .get("reference_type")
        .and_then(Value::as_str)
        .map(str::to_string);

    // Result detail is carried into metadata only when present.
    let meta = payload.get("result").map(|value| {
        let mut meta = AHashMap::new();
        let rendered = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        meta.insert("result".to_string(), rendered);
        meta
    });

    Some(DeliveryEvent {
        project_id: record.project_id,
        campaign_id,
        user_id: record.user_id,
        channel,
        event,
        reference_type,
        reference_id,
        provider_id: None,
        provider_message_id: None,
        meta,
        created_at: record.created_at,
        updated_at: record.created_at,
    })
}

/// Decode the free-form payload into an object, defensively.
///
/// Accepts a JSON object or a JSON string containing one; anything else
/// (including malformed JSON inside a string) yields an empty payload.
fn decode_payload(data: &Value) -> Map<String, Value> {
    match data {
        Value::Object(map) => map.clone(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        },
        _ => Map::new(),
    }
}

/// Read a u64 field that may arrive as a number or a numeric string.
fn read_u64(payload: &Map<String, Value>, field: &str) -> Option<u64> {
    match payload.get(field)? {
        Value::Number(value) => value.as_u64(),
        Value::String(value) => value.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn record(name: &str, data: Value) -> RawActivityRecord {
        RawActivityRecord::new(1, 7, 3, name, data, Utc::now())
    }

    #[test]
    fn name_parsing_round_trips_every_channel() {
        for channel in Channel::ALL {
            let sent = record(&format!("{channel}_sent"), json!({"campaign_id": 9}));
            let derived = derive_event(&sent, Channel::Email).unwrap();
            assert_eq!(derived.channel, channel);
            assert_eq!(derived.event, EventKind::Sent);

            let failed = record(&format!("{channel}_failed"), json!({"campaign_id": 9}));
            let derived = derive_event(&failed, Channel::Email).unwrap();
            assert_eq!(derived.channel, channel);
            assert_eq!(derived.event, EventKind::Failed);
        }
    }

    #[test]
    fn other_names_are_excluded_without_error() {
        for name in ["email_opened", "campaign_created", "sent", ""] {
            assert!(derive_event(&record(name, json!({"campaign_id": 9})), Channel::Email).is_none());
        }
    }

    #[test]
    fn unknown_prefix_falls_back_to_payload_channel_then_default() {
        let from_payload = record(
            "message_sent",
            json!({"campaign_id": 9, "channel": "push"}),
        );
        assert_eq!(
            derive_event(&from_payload, Channel::Email).unwrap().channel,
            Channel::Push
        );

        let no_channel = record("message_sent", json!({"campaign_id": 9}));
        assert_eq!(
            derive_event(&no_channel, Channel::Email).unwrap().channel,
            Channel::Email
        );
    }

    #[test]
    fn missing_campaign_id_skips_the_record() {
        assert!(derive_event(&record("email_sent", json!({})), Channel::Email).is_none());
        assert!(
            derive_event(
                &record("email_sent", json!({"campaign_id": "not-a-number"})),
                Channel::Email
            )
            .is_none()
        );
    }

    #[test]
    fn campaign_id_accepts_numeric_strings() {
        let derived = derive_event(
            &record("email_sent", json!({"campaign_id": "9"})),
            Channel::Email,
        )
        .unwrap();
        assert_eq!(derived.campaign_id, 9);
    }

    #[test]
    fn reference_id_is_coerced_and_stable() {
        // Absent: always "0".
        let derived = derive_event(
            &record("email_sent", json!({"campaign_id": 9})),
            Channel::Email,
        )
        .unwrap();
        assert_eq!(derived.reference_id, "0");

        // Numeric: coerced to its decimal string.
        let derived = derive_event(
            &record("email_sent", json!({"campaign_id": 9, "reference_id": 42})),
            Channel::Email,
        )
        .unwrap();
        assert_eq!(derived.reference_id, "42");

        // Two derivations of the same record share a conflict key.
        let row = record("email_sent", json!({"campaign_id": 9}));
        let first = derive_event(&row, Channel::Email).unwrap();
        let second = derive_event(&row, Channel::Email).unwrap();
        assert_eq!(first.key(), second.key());
    }

    #[test]
    fn json_string_payloads_are_decoded() {
        let derived = derive_event(
            &record(
                "email_sent",
                json!("{\"campaign_id\":9,\"reference_id\":\"abc\"}"),
            ),
            Channel::Email,
        )
        .unwrap();
        assert_eq!(derived.campaign_id, 9);
        assert_eq!(derived.reference_id, "abc");
    }

    #[test]
    fn malformed_payload_yields_empty_payload_not_a_crash() {
        // Malformed JSON string: empty payload, so no campaign id, so skipped.
        assert!(
            derive_event(
                &record("email_sent", json!("{not json at all")),
                Channel::Email
            )
            .is_none()
        );
        // Non-object payloads behave the same.
        assert!(derive_event(&record("email_sent", json!(17)), Channel::Email).is_none());
    }

    #[test]
    fn result_detail_is_carried_only_when_present() {
        let with_result = derive_event(
            &record(
                "push_failed",
                json!({"campaign_id": 11, "result": "device_token_invalid"}),
            ),
            Channel::Email,
        )
        .unwrap();
        assert_eq!(
            with_result
                .meta
                .as_ref()
                .and_then(|meta| meta.get("result"))
                .map(String::as_str),
            Some("device_token_invalid")
        );

        let without_result = derive_event(
            &record("push_failed", json!({"campaign_id": 11})),
            Channel::Email,
        )
        .unwrap();
        assert!(without_result.meta.is_none());
    }
}
