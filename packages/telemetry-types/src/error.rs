use thiserror::Error;

/// A datagram that could not be turned into a frame. Both variants mean
/// "malformed input": the caller drops the datagram and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("datagram too short: {len} bytes, expected at least {expected}")]
    TooShort { len: usize, expected: usize },

    #[error("field `{field}` at {offset}..{end} lies outside a {len}-byte datagram")]
    FieldOutOfBounds {
        field: &'static str,
        offset: usize,
        end: usize,
        len: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("field `{field}` ends at byte {end}, past packet size {packet_size}")]
    OutOfBounds {
        field: &'static str,
        end: usize,
        packet_size: usize,
    },

    #[error("field `{field}` declared twice")]
    DuplicateName { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("unknown telemetry field `{0}`")]
    UnknownField(String),
}
