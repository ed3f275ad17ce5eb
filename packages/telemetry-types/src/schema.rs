//! # schema
//!
//! Byte layout of the "Dash" telemetry datagram, as pure data.
//!
//! The table below is the single source of truth for the decoder, the packet
//! builder and the tests. Adding a field means adding one row here; the
//! decoder walks the table and never names a field itself.
//!
//! ## Layout (331 bytes, little-endian)
//! - `0..232`   sled block: engine, motion, per-wheel suspension/slip/rotation
//! - `232..311` dash block: position, speed, power, tire temps, laps, inputs
//! - `311..327` tire wear fractions
//! - `327..331` track ordinal
//!
//! Offsets follow community documentation of the format, validated against
//! captures. Temperatures are Celsius on the wire and published in Fahrenheit.

use crate::error::SchemaError;

// ── Numeric wire types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    I32,
    U32,
    F32,
    U16,
    U8,
    I8,
}

impl FieldType {
    /// Width on the wire in bytes.
    pub const fn width(self) -> usize {
        match self {
            FieldType::I32 | FieldType::U32 | FieldType::F32 => 4,
            FieldType::U16 => 2,
            FieldType::U8 | FieldType::I8 => 1,
        }
    }
}

// ── Unit conversions ──────────────────────────────────────────────────────────

const RAD_PER_SEC_TO_RPM: f64 = 30.0 / std::f64::consts::PI;
const MPS_TO_KMH: f64 = 3.6;
const MPS_TO_MPH: f64 = 2.236_936;
const WATTS_PER_HP: f64 = 745.699_872;

/// Applied to the raw wire value after it is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    None,
    /// rad/s → revolutions per minute (× 9.5493)
    RadPerSecToRpm,
    /// °C → °F
    CelsiusToFahrenheit,
    MpsToKmh,
    MpsToMph,
    WattsToHorsepower,
    /// u8 0–255 → 0.0–1.0 (pedals)
    UnitByte,
    /// i8 −127–127 → −1.0–1.0 (steering, driving line)
    SignedUnitByte,
}

impl Conversion {
    pub fn apply(self, raw: f64) -> f64 {
        match self {
            Conversion::None => raw,
            Conversion::RadPerSecToRpm => raw * RAD_PER_SEC_TO_RPM,
            Conversion::CelsiusToFahrenheit => raw * 9.0 / 5.0 + 32.0,
            Conversion::MpsToKmh => raw * MPS_TO_KMH,
            Conversion::MpsToMph => raw * MPS_TO_MPH,
            Conversion::WattsToHorsepower => raw / WATTS_PER_HP,
            Conversion::UnitByte => raw / 255.0,
            Conversion::SignedUnitByte => raw / 127.0,
        }
    }

    /// Inverse of [`Conversion::apply`], used when encoding.
    pub fn invert(self, value: f64) -> f64 {
        match self {
            Conversion::None => value,
            Conversion::RadPerSecToRpm => value / RAD_PER_SEC_TO_RPM,
            Conversion::CelsiusToFahrenheit => (value - 32.0) * 5.0 / 9.0,
            Conversion::MpsToKmh => value / MPS_TO_KMH,
            Conversion::MpsToMph => value / MPS_TO_MPH,
            Conversion::WattsToHorsepower => value * WATTS_PER_HP,
            Conversion::UnitByte => value * 255.0,
            Conversion::SignedUnitByte => value * 127.0,
        }
    }
}

// ── Field & schema ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Published (camelCase) name, also the JSON key.
    pub name: &'static str,
    pub offset: usize,
    pub ty: FieldType,
    pub conversion: Conversion,
}

impl FieldSpec {
    pub const fn end(&self) -> usize {
        self.offset + self.ty.width()
    }
}

const fn field(name: &'static str, offset: usize, ty: FieldType, conversion: Conversion) -> FieldSpec {
    FieldSpec { name, offset, ty, conversion }
}

const fn f32_at(name: &'static str, offset: usize) -> FieldSpec {
    field(name, offset, FieldType::F32, Conversion::None)
}

const fn i32_at(name: &'static str, offset: usize) -> FieldSpec {
    field(name, offset, FieldType::I32, Conversion::None)
}

/// Ordered, immutable description of one datagram format.
#[derive(Debug)]
pub struct PacketSchema {
    pub name: &'static str,
    pub packet_size: usize,
    pub fields: &'static [FieldSpec],
}

impl PacketSchema {
    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Checks that every field fits inside `packet_size` and names are unique.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for (i, f) in self.fields.iter().enumerate() {
            if f.end() > self.packet_size {
                return Err(SchemaError::OutOfBounds {
                    field: f.name,
                    end: f.end(),
                    packet_size: self.packet_size,
                });
            }
            if self.fields[..i].iter().any(|prev| prev.name == f.name) {
                return Err(SchemaError::DuplicateName { field: f.name });
            }
        }
        Ok(())
    }
}

// ── Dash format table ─────────────────────────────────────────────────────────

pub const DASH_PACKET_SIZE: usize = 331;

use Conversion as C;
use FieldType as T;

static DASH_FIELDS: &[FieldSpec] = &[
    // Sled
    i32_at("isRaceOn", 0),
    field("timestampMs", 4, T::U32, C::None),
    f32_at("engineMaxRpm", 8),
    f32_at("engineIdleRpm", 12),
    f32_at("currentEngineRpm", 16),
    f32_at("accelerationX", 20),
    f32_at("accelerationY", 24),
    f32_at("accelerationZ", 28),
    f32_at("velocityX", 32),
    f32_at("velocityY", 36),
    f32_at("velocityZ", 40),
    f32_at("angularVelocityX", 44),
    f32_at("angularVelocityY", 48),
    f32_at("angularVelocityZ", 52),
    f32_at("yaw", 56),
    f32_at("pitch", 60),
    f32_at("roll", 64),
    f32_at("suspensionTravelFrontLeft", 68),
    f32_at("suspensionTravelFrontRight", 72),
    f32_at("suspensionTravelRearLeft", 76),
    f32_at("suspensionTravelRearRight", 80),
    f32_at("tireSlipRatioFrontLeft", 84),
    f32_at("tireSlipRatioFrontRight", 88),
    f32_at("tireSlipRatioRearLeft", 92),
    f32_at("tireSlipRatioRearRight", 96),
    field("wheelRpmFrontLeft", 100, T::F32, C::RadPerSecToRpm),
    field("wheelRpmFrontRight", 104, T::F32, C::RadPerSecToRpm),
    field("wheelRpmRearLeft", 108, T::F32, C::RadPerSecToRpm),
    field("wheelRpmRearRight", 112, T::F32, C::RadPerSecToRpm),
    i32_at("wheelOnRumbleStripFrontLeft", 116),
    i32_at("wheelOnRumbleStripFrontRight", 120),
    i32_at("wheelOnRumbleStripRearLeft", 124),
    i32_at("wheelOnRumbleStripRearRight", 128),
    f32_at("wheelInPuddleDepthFrontLeft", 132),
    f32_at("wheelInPuddleDepthFrontRight", 136),
    f32_at("wheelInPuddleDepthRearLeft", 140),
    f32_at("wheelInPuddleDepthRearRight", 144),
    f32_at("surfaceRumbleFrontLeft", 148),
    f32_at("surfaceRumbleFrontRight", 152),
    f32_at("surfaceRumbleRearLeft", 156),
    f32_at("surfaceRumbleRearRight", 160),
    f32_at("tireSlipAngleFrontLeft", 164),
    f32_at("tireSlipAngleFrontRight", 168),
    f32_at("tireSlipAngleRearLeft", 172),
    f32_at("tireSlipAngleRearRight", 176),
    f32_at("tireCombinedSlipFrontLeft", 180),
    f32_at("tireCombinedSlipFrontRight", 184),
    f32_at("tireCombinedSlipRearLeft", 188),
    f32_at("tireCombinedSlipRearRight", 192),
    f32_at("suspensionTravelMetersFrontLeft", 196),
    f32_at("suspensionTravelMetersFrontRight", 200),
    f32_at("suspensionTravelMetersRearLeft", 204),
    f32_at("suspensionTravelMetersRearRight", 208),
    i32_at("carOrdinal", 212),
    i32_at("carClass", 216),
    i32_at("carPerformanceIndex", 220),
    i32_at("drivetrainType", 224),
    i32_at("numCylinders", 228),
    // Dash
    f32_at("positionX", 232),
    f32_at("positionY", 236),
    f32_at("positionZ", 240),
    f32_at("speed", 244),
    field("speedKmh", 244, T::F32, C::MpsToKmh),
    field("speedMph", 244, T::F32, C::MpsToMph),
    f32_at("power", 248),
    field("powerHp", 248, T::F32, C::WattsToHorsepower),
    f32_at("torque", 252),
    field("tireTempFrontLeft", 256, T::F32, C::CelsiusToFahrenheit),
    field("tireTempFrontRight", 260, T::F32, C::CelsiusToFahrenheit),
    field("tireTempRearLeft", 264, T::F32, C::CelsiusToFahrenheit),
    field("tireTempRearRight", 268, T::F32, C::CelsiusToFahrenheit),
    f32_at("boost", 272),
    f32_at("fuel", 276),
    f32_at("distanceTraveled", 280),
    f32_at("bestLap", 284),
    f32_at("lastLap", 288),
    f32_at("currentLap", 292),
    f32_at("currentRaceTime", 296),
    field("lapNumber", 300, T::U16, C::None),
    field("racePosition", 302, T::U8, C::None),
    field("throttle", 303, T::U8, C::UnitByte),
    field("brake", 304, T::U8, C::UnitByte),
    field("clutch", 305, T::U8, C::UnitByte),
    field("handBrake", 306, T::U8, C::UnitByte),
    field("gear", 307, T::U8, C::None),
    field("steer", 308, T::I8, C::SignedUnitByte),
    field("normalizedDrivingLine", 309, T::I8, C::SignedUnitByte),
    field("normalizedAiBrakeDifference", 310, T::I8, C::SignedUnitByte),
    // Tire wear
    f32_at("tireWearFrontLeft", 311),
    f32_at("tireWearFrontRight", 315),
    f32_at("tireWearRearLeft", 319),
    f32_at("tireWearRearRight", 323),
    i32_at("trackOrdinal", 327),
];

/// The 331-byte "Dash" datagram.
pub static DASH_SCHEMA: PacketSchema = PacketSchema {
    name: "dash",
    packet_size: DASH_PACKET_SIZE,
    fields: DASH_FIELDS,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_schema_is_valid() {
        assert_eq!(DASH_SCHEMA.validate(), Ok(()));
    }

    #[test]
    fn last_field_ends_exactly_at_packet_size() {
        let max_end = DASH_SCHEMA.fields().iter().map(FieldSpec::end).max();
        assert_eq!(max_end, Some(DASH_PACKET_SIZE));
    }

    #[test]
    fn lookup_by_name() {
        let rpm = DASH_SCHEMA.field("currentEngineRpm").unwrap();
        assert_eq!(rpm.offset, 16);
        assert_eq!(rpm.ty, FieldType::F32);
        assert!(DASH_SCHEMA.field("noSuchField").is_none());
        assert_eq!(DASH_SCHEMA.index_of("isRaceOn"), Some(0));
    }

    #[test]
    fn derived_speed_fields_share_the_wire_offset() {
        let speed = DASH_SCHEMA.field("speed").unwrap().offset;
        assert_eq!(DASH_SCHEMA.field("speedKmh").unwrap().offset, speed);
        assert_eq!(DASH_SCHEMA.field("speedMph").unwrap().offset, speed);
    }

    #[test]
    fn validate_rejects_field_past_end() {
        static BAD: PacketSchema = PacketSchema {
            name: "bad",
            packet_size: 6,
            fields: &[f32_at("a", 0), f32_at("b", 4)],
        };
        assert!(matches!(BAD.validate(), Err(SchemaError::OutOfBounds { field: "b", end: 8, .. })));
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        static DUP: PacketSchema = PacketSchema {
            name: "dup",
            packet_size: 8,
            fields: &[f32_at("a", 0), f32_at("a", 4)],
        };
        assert_eq!(DUP.validate(), Err(SchemaError::DuplicateName { field: "a" }));
    }

    #[test]
    fn conversions_match_reference_formulas() {
        let x = 100.0;
        assert!((Conversion::RadPerSecToRpm.apply(x) - x * 9.5493).abs() < 0.01);
        assert_eq!(Conversion::CelsiusToFahrenheit.apply(100.0), 212.0);
        assert_eq!(Conversion::CelsiusToFahrenheit.apply(-40.0), -40.0);
        assert_eq!(Conversion::UnitByte.apply(255.0), 1.0);
        assert_eq!(Conversion::SignedUnitByte.apply(-127.0), -1.0);
    }

    #[test]
    fn conversions_invert() {
        let all = [
            Conversion::None,
            Conversion::RadPerSecToRpm,
            Conversion::CelsiusToFahrenheit,
            Conversion::MpsToKmh,
            Conversion::MpsToMph,
            Conversion::WattsToHorsepower,
            Conversion::UnitByte,
            Conversion::SignedUnitByte,
        ];
        for c in all {
            let v = 42.5;
            assert!((c.invert(c.apply(v)) - v).abs() < 1e-9, "{c:?}");
        }
    }
}
