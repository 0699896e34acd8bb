use std::io;

use failure::Fail;

/// Recoverable, repair-level issues.
///
/// In strict mode any of these aborts the operation as an `Error::Repair`.
/// In soft mode (`RepairFlags::IGNORE_WARNINGS`) the repair engine logs a
/// warning through the diagnostics context, applies its best-effort fix,
/// and keeps going; at most one of these is kept as the pass's sticky
/// outcome and returned once repair finishes.
#[derive(Debug, Fail, Clone, Copy, PartialEq, Eq)]
pub enum RepairIssue {
    #[fail(display = "application has no page count field")]
    MissingPageCount,
    #[fail(display = "application has an incorrect page count field")]
    IncorrectPageCount,
    #[fail(display = "application has no key ID")]
    MissingKeyId,
    #[fail(display = "application has no date stamp")]
    MissingDateStamp,
    #[fail(display = "application has no program image field")]
    MissingProgramImage,
    #[fail(display = "application header is not a multiple of 2 bytes")]
    MisalignedProgramImage,
    #[fail(display = "application contains invalid program data")]
    InvalidProgramData,
    #[fail(display = "application has an invalid size")]
    InvalidProgramSize,
    #[fail(display = "application ends too close to a page boundary")]
    FinalPageTooLong,
    #[fail(display = "field is too small to hold the requested length")]
    FieldTooSmall,
}

/// Fatal, critical-band issues. These abort the operation regardless of
/// repair flags.
#[derive(Debug, Fail)]
pub enum FatalError {
    #[fail(display = "out of memory")]
    OutOfMemory,
    #[fail(display = "I/O error: {}", _0)]
    Io(#[fail(cause)] io::Error),
    #[fail(display = "invalid hex syntax")]
    HexSyntax,
    #[fail(display = "unrecognized file format")]
    UnknownFileFormat,
    #[fail(display = "calc/data type combination is not recognized")]
    UnknownProgramType,
    #[fail(display = "no app header found")]
    MissingHeader,
    #[fail(display = "application does not have a Rabin signature")]
    MissingRabinSignature,
    #[fail(display = "application does not have an RSA signature")]
    MissingRsaSignature,
    #[fail(display = "incorrect application length")]
    IncorrectProgramSize,
    #[fail(display = "cannot find key file for key ID {:04X}", _0)]
    KeyNotFound(u32),
    #[fail(display = "invalid key file syntax")]
    KeySyntax,
    #[fail(display = "private key incorrect (does not match public key)")]
    InvalidKey,
    #[fail(display = "unable to sign/validate: public key missing")]
    MissingPublicKey,
    #[fail(display = "unable to sign: private key missing")]
    MissingPrivateKey,
    #[fail(display = "unable to sign: unsuitable Rabin key")]
    UnsuitableRabinKey,
    #[fail(display = "unable to sign: unsuitable RSA key")]
    UnsuitableRsaKey,
    #[fail(display = "signature incorrect")]
    SignatureIncorrect,
}

impl From<io::Error> for FatalError {
    fn from(e: io::Error) -> Self {
        FatalError::Io(e)
    }
}

#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "{}", _0)]
    Repair(RepairIssue),
    #[fail(display = "{}", _0)]
    Fatal(FatalError),
}

impl From<RepairIssue> for Error {
    fn from(e: RepairIssue) -> Self {
        Error::Repair(e)
    }
}

impl From<FatalError> for Error {
    fn from(e: FatalError) -> Self {
        Error::Fatal(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Fatal(FatalError::Io(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
