//! OpenFlow protocol errors returned by the decoders.
//!
//! Every variant corresponds to one OpenFlow (or Nicira extension) error code, so a decode
//! failure can be reported straight back to the peer. `Display` prints the code's name.

use std::io;

use thiserror::Error;

/// An OpenFlow error code produced while decoding a message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfpError {
    /// Inner and outer protocol versions disagree, or the version is unknown.
    #[error("OFPBRC_BAD_VERSION")]
    VersionMismatch,
    /// Message type not supported.
    #[error("OFPBRC_BAD_TYPE")]
    BadType,
    /// Stats or multipart type not supported.
    #[error("OFPBRC_BAD_STAT")]
    BadMultipart,
    /// Vendor or experimenter id not supported.
    #[error("OFPBRC_BAD_VENDOR")]
    BadVendor,
    /// Vendor or experimenter subtype not supported.
    #[error("OFPBRC_BAD_SUBTYPE")]
    BadSubtype,
    /// Declared record or message length is invalid or exceeds the buffer.
    #[error("OFPBRC_BAD_LEN")]
    BadLength,
    /// Reserved field is nonzero.
    #[error("NXBRC_MUST_BE_ZERO")]
    MustBeZero,
    /// Flow update carries an unrecognized event kind.
    #[error("NXBRC_FM_BAD_EVENT")]
    BadEvent,
    /// Flow monitor flags outside the recognized set, or none of add/delete/modify.
    #[error("OFPMOFC_BAD_FLAGS")]
    BadFlags,
    /// Unknown flow monitor command.
    #[error("OFPMOFC_BAD_COMMAND")]
    BadCommand,
    /// Length of a forwarded inner message is inconsistent.
    #[error("OFPBFC_MSG_BAD_LEN")]
    MsgBadLength,
    /// Forwarded inner message is not a group or meter modification.
    #[error("OFPBFC_MSG_UNSUP")]
    UnsupportedBody,
    /// Unsupported match type.
    #[error("OFPBMC_BAD_TYPE")]
    BadMatchType,
    /// Match or statistics field length is invalid, or a statistic is repeated.
    #[error("OFPBMC_BAD_LEN")]
    BadMatchLength,
    /// Unknown or malformed match or statistics field.
    #[error("OFPBMC_BAD_FIELD")]
    BadField,
    /// A match field appears more than once.
    #[error("OFPBMC_DUP_FIELD")]
    DupField,
    /// Action length is invalid.
    #[error("OFPBAC_BAD_LEN")]
    BadActionLength,
    /// Instruction length is invalid.
    #[error("OFPBIC_BAD_LEN")]
    BadInstructionLength,
    /// Port number cannot be represented.
    #[error("OFPBAC_BAD_OUT_PORT")]
    BadOutPort,
    /// Unknown group modification command.
    #[error("OFPGMFC_BAD_COMMAND")]
    BadGroupCommand,
    /// Unknown group type.
    #[error("OFPGMFC_BAD_TYPE")]
    BadGroupType,
    /// Malformed group bucket.
    #[error("OFPGMFC_BAD_BUCKET")]
    BadBucket,
    /// Malformed meter band.
    #[error("OFPMMFC_BAD_BAND")]
    BadBand,
    /// Unknown meter modification command.
    #[error("OFPMMFC_BAD_COMMAND")]
    BadMeterCommand,
}

/// Reads from a bounds-checked slice only fail when the slice runs short.
impl From<io::Error> for OfpError {
    fn from(_: io::Error) -> OfpError {
        OfpError::BadLength
    }
}

pub type Result<T> = std::result::Result<T, OfpError>;

/// A free-text request could not be parsed. The message is meant for a human operator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseError(pub String);
