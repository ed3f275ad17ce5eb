//! # telemetry-types
//!
//! Wire schema, decoder and record types for the racing-sim "Dash" UDP
//! telemetry datagram.
//!
//! These types are used by:
//! - `relay-backend`: decoding datagrams and fanning records out to WebSocket subscribers
//! - `telemetry-simulator`: encoding synthetic datagrams for local testing
//!
//! ## Units
//! Values are published in the units named by the field: `*Rpm` in rev/min,
//! `tireTemp*` in °F, `speed` in m/s with `speedKmh`/`speedMph` alongside,
//! `power` in W with `powerHp`, pedals and suspension travel as 0.0–1.0.

pub mod builder;
pub mod decoder;
pub mod error;
pub mod record;
pub mod schema;

pub use builder::PacketBuilder;
pub use decoder::{decode, decode_with};
pub use error::{BuildError, DecodeError, SchemaError};
pub use record::{FieldValue, TelemetryFrame, TelemetryRecord};
pub use schema::{Conversion, FieldSpec, FieldType, PacketSchema, DASH_PACKET_SIZE, DASH_SCHEMA};
