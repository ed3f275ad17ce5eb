//! # record
//!
//! Decoded telemetry values and the immutable record the relay fans out.
//!
//! A [`TelemetryFrame`] is what the decoder produces from one datagram: one
//! value per schema field, in schema order. The relay wraps it in a
//! [`TelemetryRecord`] together with its receive time and sequence number.
//!
//! ## JSON shape
//! One flat object: every schema field under its camelCase name, followed by
//! `timestamp` (receive time, unix ms) and `packetCount` (sequence number).

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::schema::PacketSchema;

// ── Field value ───────────────────────────────────────────────────────────────

/// Integer fields without a conversion stay integers; everything else is a float.
#[derive(Debug, Clone, Copy)]
pub enum FieldValue {
    Int(i64),
    Float(f32),
}

impl FieldValue {
    pub fn as_f64(self) -> f64 {
        match self {
            FieldValue::Int(v) => v as f64,
            FieldValue::Float(v) => v as f64,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(v),
            FieldValue::Float(_) => None,
        }
    }
}

// Bitwise for floats, so identical datagrams compare equal even when they carry NaN.
impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Int(v) => serializer.serialize_i64(*v),
            // serde_json writes non-finite floats as null
            FieldValue::Float(v) => serializer.serialize_f32(*v),
        }
    }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TelemetryFrame {
    schema: &'static PacketSchema,
    values: Vec<FieldValue>,
}

impl TelemetryFrame {
    pub(crate) fn new(schema: &'static PacketSchema, values: Vec<FieldValue>) -> Self {
        debug_assert_eq!(schema.fields().len(), values.len());
        Self { schema, values }
    }

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.schema.index_of(name).map(|i| self.values[i])
    }

    /// Shorthand for `get(name).map(FieldValue::as_f64)`.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).map(FieldValue::as_f64)
    }

    /// `(name, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, FieldValue)> + '_ {
        self.schema
            .fields()
            .iter()
            .zip(self.values.iter())
            .map(|(spec, value)| (spec.name, *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for TelemetryFrame {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.schema, other.schema) && self.values == other.values
    }
}

impl Eq for TelemetryFrame {}

// ── Record ────────────────────────────────────────────────────────────────────

/// One successfully decoded datagram. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub received_at_ms: u64,
    /// Position of this record in the accepted stream, starting at 1.
    pub sequence_number: u64,
    pub frame: TelemetryFrame,
}

impl TelemetryRecord {
    pub fn new(frame: TelemetryFrame, received_at_ms: u64, sequence_number: u64) -> Self {
        Self {
            received_at_ms,
            sequence_number,
            frame,
        }
    }

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.frame.get(name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for TelemetryRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.frame.len() + 2))?;
        for (name, value) in self.frame.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.serialize_entry("timestamp", &self.received_at_ms)?;
        map.serialize_entry("packetCount", &self.sequence_number)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PacketBuilder;
    use crate::decoder::decode;
    use crate::schema::{DASH_PACKET_SIZE, DASH_SCHEMA};

    fn sample_record() -> TelemetryRecord {
        let bytes = PacketBuilder::new(&DASH_SCHEMA)
            .set("currentEngineRpm", 6500.0)
            .unwrap()
            .set("gear", 4.0)
            .unwrap()
            .build();
        TelemetryRecord::new(decode(&bytes).unwrap(), 1_700_000_000_123, 42)
    }

    #[test]
    fn json_is_flat_with_metadata() {
        let json: serde_json::Value = serde_json::from_str(&sample_record().to_json().unwrap()).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj.len(), DASH_SCHEMA.fields().len() + 2);
        assert_eq!(obj["timestamp"], 1_700_000_000_123u64);
        assert_eq!(obj["packetCount"], 42);
        assert_eq!(obj["gear"], 4);
        assert!((obj["currentEngineRpm"].as_f64().unwrap() - 6500.0).abs() < 1e-3);
        assert!(obj.values().all(|v| !v.is_object() && !v.is_array()));
    }

    #[test]
    fn json_keys_follow_schema_order() {
        let json = sample_record().to_json().unwrap();
        let first = json.find("\"isRaceOn\"").unwrap();
        let last = json.find("\"trackOrdinal\"").unwrap();
        let meta = json.find("\"timestamp\"").unwrap();
        assert!(first < last && last < meta);
    }

    #[test]
    fn integer_fields_serialize_as_integers() {
        let json = sample_record().to_json().unwrap();
        assert!(json.contains("\"carOrdinal\":0"));
        assert!(json.contains("\"lapNumber\":0"));
    }

    #[test]
    fn nan_values_compare_equal_bitwise() {
        let nan = FieldValue::Float(f32::NAN);
        assert_eq!(nan, nan);
        assert_ne!(FieldValue::Int(1), FieldValue::Float(1.0));
    }

    #[test]
    fn frame_lookup() {
        let record = sample_record();
        assert_eq!(record.get("gear").and_then(FieldValue::as_i64), Some(4));
        assert_eq!(record.frame.len(), DASH_SCHEMA.fields().len());
        assert!(record.get("bogus").is_none());
        assert_eq!(DASH_SCHEMA.packet_size(), DASH_PACKET_SIZE);
    }
}
