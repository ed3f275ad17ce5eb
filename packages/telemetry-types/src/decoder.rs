//! # decoder
//!
//! Turns one raw datagram into a [`TelemetryFrame`] by walking a
//! [`PacketSchema`]. Pure: no I/O, no state, safe to call from any task.
//!
//! ## Invariants
//! - A buffer shorter than `schema.packet_size` is rejected before any read.
//! - Every field read goes through a checked slice; a miss rejects the whole
//!   datagram. There are no partial frames.
//! - Bytes past the last field are ignored.

use bytes::Buf;

use crate::error::DecodeError;
use crate::record::{FieldValue, TelemetryFrame};
use crate::schema::{Conversion, FieldSpec, FieldType, PacketSchema, DASH_SCHEMA};

/// Decode a datagram in the default "Dash" format.
pub fn decode(buf: &[u8]) -> Result<TelemetryFrame, DecodeError> {
    decode_with(&DASH_SCHEMA, buf)
}

pub fn decode_with(schema: &'static PacketSchema, buf: &[u8]) -> Result<TelemetryFrame, DecodeError> {
    if buf.len() < schema.packet_size() {
        return Err(DecodeError::TooShort {
            len: buf.len(),
            expected: schema.packet_size(),
        });
    }

    let values = schema
        .fields()
        .iter()
        .map(|spec| read_field(spec, buf))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TelemetryFrame::new(schema, values))
}

fn read_field(spec: &FieldSpec, buf: &[u8]) -> Result<FieldValue, DecodeError> {
    let mut raw = buf
        .get(spec.offset..spec.end())
        .ok_or(DecodeError::FieldOutOfBounds {
            field: spec.name,
            offset: spec.offset,
            end: spec.end(),
            len: buf.len(),
        })?;

    // `raw` is exactly `spec.ty.width()` bytes, so the Buf getters cannot run short.
    let value = match spec.ty {
        FieldType::I32 => FieldValue::Int(raw.get_i32_le() as i64),
        FieldType::U32 => FieldValue::Int(raw.get_u32_le() as i64),
        FieldType::U16 => FieldValue::Int(raw.get_u16_le() as i64),
        FieldType::U8 => FieldValue::Int(raw.get_u8() as i64),
        FieldType::I8 => FieldValue::Int(raw.get_i8() as i64),
        FieldType::F32 => FieldValue::Float(raw.get_f32_le()),
    };

    Ok(match spec.conversion {
        Conversion::None => value,
        conversion => FieldValue::Float(conversion.apply(value.as_f64()) as f32),
    })
}
