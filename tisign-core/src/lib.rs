//! Core signing/validation engine for TI graphing-calculator Flash
//! app and OS images: TLV header codec, Rabin and RSA signature
//! schemes, and the byte-exact header repair passes TI's boot code
//! requires.

#[macro_use]
extern crate lazy_static;

pub mod bigint;
pub mod context;
pub mod error;
pub mod image;
pub mod key;
pub mod keyfile;
pub mod keytable;
pub mod repair;
pub mod signature;
pub mod tlv;
pub mod types;

pub use error::{Error, Result};
pub use image::Image;
pub use key::Key;
pub use types::{CalcType, DataType, HashType, RepairFlags};

/// Repair, then sign, a program image end to end -- the `sign`
/// subcommand's core operation.
pub fn repair_and_sign(
    image: &mut Image,
    key: &mut Key,
    flags: RepairFlags,
    rootnum: u8,
) -> Result<()> {
    repair_image(image, flags)?;
    signature::sign_program(image, key, rootnum)
}

/// Run the repair pass appropriate to `image.calc_type`/`data_type`.
pub fn repair_image(image: &mut Image, flags: RepairFlags) -> Result<()> {
    use crate::types::DataType::*;
    if image.calc_type.is_ti8x() {
        match image.data_type {
            App => repair::repair_ti8x_app(image, flags),
            Os => repair::repair_ti8x_os(image, flags),
            _ => Err(error::FatalError::UnknownProgramType.into()),
        }
    } else if image.calc_type.is_ti9x() {
        match image.data_type {
            App => repair::repair_ti9x_app(image, flags),
            Os => repair::repair_ti9x_os(image, flags),
            _ => Err(error::FatalError::UnknownProgramType.into()),
        }
    } else {
        Err(error::FatalError::UnknownProgramType.into())
    }
}

/// Validate a signed program image, resolving its key by ID if one
/// was not explicitly supplied.
pub fn validate(image: &Image, key: &Key) -> Result<()> {
    signature::validate_program(image, key)
}
