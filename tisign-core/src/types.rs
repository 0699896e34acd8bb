//! Small fixed enumerations shared by the image, key and signature
//! modules.

/// Target calculator family. The numeric values match the leading
/// byte of the corresponding variable/app header and double as the
/// high byte of certain TLV tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalcType {
    Unknown,
    Ti73,
    Ti83Plus,
    Ti89,
    Ti92Plus,
}

impl CalcType {
    pub fn from_u8(v: u8) -> CalcType {
        match v {
            0x74 => CalcType::Ti73,
            0x73 => CalcType::Ti83Plus,
            0x98 => CalcType::Ti89,
            0x88 => CalcType::Ti92Plus,
            _ => CalcType::Unknown,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            CalcType::Unknown => 0,
            CalcType::Ti73 => 0x74,
            CalcType::Ti83Plus => 0x73,
            CalcType::Ti89 => 0x98,
            CalcType::Ti92Plus => 0x88,
        }
    }

    /// TI-73/83+ family: signed app images with a Rabin signature and
    /// an MD5-based OS hash.
    pub fn is_ti8x(self) -> bool {
        matches!(self, CalcType::Ti73 | CalcType::Ti83Plus)
    }

    /// TI-89/92+ family: signed app images with an RSA signature and
    /// an SHA-256-based OS hash.
    pub fn is_ti9x(self) -> bool {
        matches!(self, CalcType::Ti89 | CalcType::Ti92Plus)
    }
}

/// Kind of payload carried by a program image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Unknown,
    Os,
    App,
    Cert,
}

impl DataType {
    pub fn from_u8(v: u8) -> DataType {
        match v {
            0x23 => DataType::Os,
            0x24 => DataType::App,
            0x25 => DataType::Cert,
            _ => DataType::Unknown,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            DataType::Unknown => 0,
            DataType::Os => 0x23,
            DataType::App => 0x24,
            DataType::Cert => 0x25,
        }
    }
}

/// Hash function used when forming the signed digest. TI-8x keys hash
/// with MD5, TI-9x keys with SHA-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    Md5,
    Sha256,
}

impl HashType {
    pub fn digest_len(self) -> usize {
        match self {
            HashType::Md5 => 16,
            HashType::Sha256 => 32,
        }
    }
}

bitflags::bitflags! {
    /// Flags controlling the repair pass, combined from the historical
    /// tool's `RSRepairFlags` and `RSInputFlags`/`RSOutputFlags` families
    /// that concern in-memory image shaping (the file-I/O-only flags
    /// live in the CLI crate instead).
    pub struct RepairFlags: u32 {
        /// Downgrade every repair-band issue to a warning instead of
        /// aborting the pass.
        const IGNORE_WARNINGS = 1;
        /// Strip any pre-existing signature field before repairing.
        const REMOVE_OLD_SIGNATURE = 2;
        /// Rewrite the page-count header field rather than merely
        /// checking it.
        const FIX_PAGE_COUNT = 4;
        /// Rewrite the OS size field rather than merely checking it.
        const FIX_OS_SIZE = 8;
        /// Pad the application with a trailing page when the final
        /// page would otherwise run up against the page boundary.
        const ZEALOUSLY_PAD_APP = 16;
    }
}

impl Default for RepairFlags {
    fn default() -> Self {
        RepairFlags::empty()
    }
}
