//! Wire Codec Errors

use super::tag::CommandTag;

/// Failure to encode or decode a command record.
///
/// Every decode failure is fatal for the sending peer: once a record
/// cannot be framed, the rest of its stream cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The record needs more bytes than were supplied.
    #[error("Truncated record: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required to finish the record.
        needed: usize,
        /// Bytes actually supplied.
        available: usize,
    },

    /// The tag byte names no command.
    #[error("Unrecognized command tag {0:#04x}")]
    UnknownTag(u8),

    /// A declared body length exceeds the protocol ceiling.
    #[error("Declared body of {declared} bytes exceeds maximum {max}")]
    BodyTooLarge {
        /// Length from the record header.
        declared: usize,
        /// Ceiling for this layout.
        max: usize,
    },

    /// Chat text without a terminator inside the length limit.
    #[error("Text exceeds {max} bytes")]
    TextTooLong {
        /// Maximum text length.
        max: usize,
    },

    /// Chat text that is not UTF-8 or contains an interior NUL.
    #[error("Text is not valid UTF-8")]
    InvalidText,

    /// Encoding a command whose variant does not match its tag's layout.
    #[error("Command variant does not match layout of {tag}")]
    LayoutMismatch {
        /// Offending tag.
        tag: CommandTag,
    },
}
