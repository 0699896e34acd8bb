//! On-disk program encodings: raw binary and a plain hex dump format.

use std::fs;
use std::path::Path;

use failure::{bail, Error};

/// Bytes plus page numbers recovered while parsing a plain hex file
/// (empty for raw binary, which carries no explicit page markers).
pub struct Loaded {
    pub data: Vec<u8>,
    pub page_numbers: Vec<u32>,
}

/// Load a program image file, auto-detecting raw binary vs. plain
/// hex by the first non-whitespace byte.
pub fn load(path: &Path) -> Result<Loaded, Error> {
    let raw = fs::read(path)?;
    let first_nonspace = raw.iter().find(|&&b| !(b as char).is_whitespace());

    match first_nonspace {
        Some(0x80) | Some(0x81) => Ok(Loaded {
            data: raw,
            page_numbers: Vec::new(),
        }),
        Some(_) => {
            let text = String::from_utf8(raw).map_err(|_| Error::from(crate::CliError::UnknownFormat))?;
            parse_hex(&text)
        }
        None => bail!("empty image file"),
    }
}

fn parse_hex(text: &str) -> Result<Loaded, Error> {
    let mut data = Vec::new();
    let mut page_numbers = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(page_str) = line.strip_prefix('@') {
            let page = u32::from_str_radix(page_str.trim(), 16)
                .map_err(|_| crate::CliError::UnknownFormat)?;
            page_numbers.push(page);
            continue;
        }

        let (addr_str, rest) = line
            .split_once(':')
            .ok_or(crate::CliError::UnknownFormat)?;
        let addr = u32::from_str_radix(addr_str.trim(), 16).map_err(|_| crate::CliError::UnknownFormat)?;

        let offset = data.len() as u32;
        if addr as usize > data.len() {
            bail!("hex line address {:04X} does not follow contiguously", addr);
        }
        let _ = offset;

        for byte_str in rest.split_whitespace() {
            let byte = u8::from_str_radix(byte_str, 16).map_err(|_| crate::CliError::UnknownFormat)?;
            data.push(byte);
        }
    }

    Ok(Loaded { data, page_numbers })
}

/// Write `data` back out as raw binary, appending `.signed` to the
/// stem of `original`.
pub fn write_signed(original: &Path, data: &[u8]) -> Result<std::path::PathBuf, Error> {
    let mut out_path = original.to_path_buf();
    let mut name = out_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".signed");
    out_path.set_file_name(name);
    fs::write(&out_path, data)?;
    Ok(out_path)
}
