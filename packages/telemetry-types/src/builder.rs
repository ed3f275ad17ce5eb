//! # builder
//!
//! Encodes telemetry datagrams from published values, the inverse of the
//! decoder. Used by the simulator and by tests that need realistic packets.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::BuildError;
use crate::schema::{FieldSpec, FieldType, PacketSchema};

/// Zero-initialised datagram of `schema.packet_size` bytes, filled field by field.
///
/// Values are given in published units (e.g. tire temps in °F, wheel speed in
/// rpm) and inverse-converted before being written in the wire type.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    schema: &'static PacketSchema,
    buf: BytesMut,
}

impl PacketBuilder {
    pub fn new(schema: &'static PacketSchema) -> Self {
        Self {
            schema,
            buf: BytesMut::zeroed(schema.packet_size()),
        }
    }

    pub fn set(mut self, name: &str, value: f64) -> Result<Self, BuildError> {
        let spec = self
            .schema
            .field(name)
            .ok_or_else(|| BuildError::UnknownField(name.to_string()))?;
        self.write(spec, value);
        Ok(self)
    }

    /// Sets every `(name, value)` pair, stopping at the first unknown name.
    pub fn set_all<'a>(
        mut self,
        values: impl IntoIterator<Item = (&'a str, f64)>,
    ) -> Result<Self, BuildError> {
        for (name, value) in values {
            self = self.set(name, value)?;
        }
        Ok(self)
    }

    pub fn build(self) -> Bytes {
        self.buf.freeze()
    }

    fn write(&mut self, spec: &FieldSpec, value: f64) {
        let raw = spec.conversion.invert(value);
        let mut slot = &mut self.buf[spec.offset..spec.end()];
        // Integer casts saturate, which is what a sender clamping to the wire type would do.
        match spec.ty {
            FieldType::I32 => slot.put_i32_le(raw.round() as i32),
            FieldType::U32 => slot.put_u32_le(raw.round() as u32),
            FieldType::U16 => slot.put_u16_le(raw.round() as u16),
            FieldType::U8 => slot.put_u8(raw.round() as u8),
            FieldType::I8 => slot.put_i8(raw.round() as i8),
            FieldType::F32 => slot.put_f32_le(raw as f32),
        }
    }
}
