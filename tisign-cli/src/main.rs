use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{App, Arg, ArgMatches, SubCommand};
use clap::AppSettings::*;
use failure::{Error, Fail};

mod config;
mod format;

use config::Config;
use tisign_core::types::{CalcType, DataType, HashType, RepairFlags};
use tisign_core::{context, keytable, Image, Key};

#[derive(Debug, Fail)]
pub enum CliError {
    #[fail(display = "unrecognized file format")]
    UnknownFormat,
    #[fail(display = "unable to determine calculator/data type from image header")]
    UnknownImageType,
    #[fail(display = "no key ID given and none could be inferred from the image")]
    NoKeyId,
}

fn main() {
    let app = App::new("tisign")
        .about("Sign and validate TI graphing calculator Flash app/OS images")
        .settings(&[ArgRequiredElseHelp, ColoredHelp, DisableHelpSubcommand, DeriveDisplayOrder])
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Increase diagnostic verbosity"))
        .arg(Arg::with_name("config").long("config").takes_value(true).help("Path to tisign.toml"))
        .subcommand(
            SubCommand::with_name("sign")
                .about("Repair and sign an image")
                .arg(Arg::with_name("image").required(true))
                .arg(Arg::with_name("key-id").long("key-id").takes_value(true))
                .arg(Arg::with_name("key-dir").long("key-dir").takes_value(true))
                .arg(Arg::with_name("root").long("root").takes_value(true).default_value("0"))
                .arg(Arg::with_name("ignore-warnings").long("ignore-warnings"))
                .arg(Arg::with_name("remove-old-signature").long("remove-old-signature"))
                .arg(Arg::with_name("fix-page-count").long("fix-page-count"))
                .arg(Arg::with_name("fix-os-size").long("fix-os-size"))
                .arg(Arg::with_name("zealously-pad").long("zealously-pad")),
        )
        .subcommand(
            SubCommand::with_name("validate")
                .about("Validate an image's signature")
                .arg(Arg::with_name("image").required(true))
                .arg(Arg::with_name("key-id").long("key-id").takes_value(true))
                .arg(Arg::with_name("key-dir").long("key-dir").takes_value(true)),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Show header/signature information")
                .arg(Arg::with_name("image").required(true)),
        );

    let matches = app.get_matches();
    context::set_progname("tisign");
    context::set_verbose(matches.occurrences_of("verbose") as i32);

    let config_path = matches
        .value_of("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tisign.toml"));
    let config = Config::load(&config_path).unwrap_or_default();

    if let Some(dir) = &config.key_dir {
        if std::env::var("TISIGN_KEY_DIR").is_err() {
            std::env::set_var("TISIGN_KEY_DIR", dir);
        }
    }

    let result = match matches.subcommand() {
        ("sign", Some(m)) => cmd_sign(m, &config),
        ("validate", Some(m)) => cmd_validate(m),
        ("info", Some(m)) => cmd_info(m),
        _ => Ok(()),
    };

    if let Err(ref e) = result {
        eprintln!("error: {}", format_error(e));
        exit(1);
    }
}

fn format_error(err: &Error) -> String {
    let mut output = err.to_string();
    let mut prev = err.as_fail();
    while let Some(next) = prev.cause() {
        output.push_str(": ");
        output.push_str(&next.to_string());
        prev = next;
    }
    output
}

/// Inspect the leading bytes of a loaded image to infer its
/// calculator/data type, matching the leading-byte conventions each
/// repair variant itself checks.
fn infer_types(data: &[u8]) -> Result<(CalcType, DataType), Error> {
    if data.len() < 2 {
        return Err(CliError::UnknownImageType.into());
    }
    match data[0] {
        0x80 if data[1] == 0x0f => Ok((CalcType::Ti83Plus, DataType::App)),
        0x81 if data[1] == 0x0f => Ok((CalcType::Ti83Plus, DataType::App)),
        0x80 if (data[1] & 0xf0) == 0 => Ok((CalcType::Ti89, DataType::Os)),
        0x81 if (data[1] & 0xf0) == 0 => Ok((CalcType::Ti89, DataType::App)),
        _ => Err(CliError::UnknownImageType.into()),
    }
}

fn build_image(path: &Path) -> Result<Image, Error> {
    let loaded = format::load(path)?;
    let (calc_type, data_type) = infer_types(&loaded.data)?;
    let hash_type = if calc_type.is_ti9x() { HashType::Sha256 } else { HashType::Md5 };
    let mut image = Image::with_data(calc_type, data_type, hash_type, loaded.data);
    image.page_numbers = loaded.page_numbers;
    Ok(image)
}

fn load_key(image: &Image, key_id_arg: Option<&str>) -> Result<Key, Error> {
    let id = match key_id_arg {
        Some(s) => u32::from_str_radix(s.trim_start_matches("0x"), 16)?,
        None => {
            let id = image.key_id();
            if id == 0 {
                return Err(CliError::NoKeyId.into());
            }
            id
        }
    };
    keytable::find_for_id(id, true).map_err(|e| failure::format_err!("{}", e))
}

fn repair_flags_from(m: &ArgMatches, config: &Config) -> RepairFlags {
    let mut flags = RepairFlags::empty();
    if m.is_present("ignore-warnings") || config.ignore_warnings {
        flags |= RepairFlags::IGNORE_WARNINGS;
    }
    if m.is_present("remove-old-signature") || config.remove_old_signature {
        flags |= RepairFlags::REMOVE_OLD_SIGNATURE;
    }
    if m.is_present("fix-page-count") || config.fix_page_count {
        flags |= RepairFlags::FIX_PAGE_COUNT;
    }
    if m.is_present("fix-os-size") || config.fix_os_size {
        flags |= RepairFlags::FIX_OS_SIZE;
    }
    if m.is_present("zealously-pad") || config.zealously_pad {
        flags |= RepairFlags::ZEALOUSLY_PAD_APP;
    }
    flags
}

fn cmd_sign(m: &ArgMatches, config: &Config) -> Result<(), Error> {
    let image_path = Path::new(m.value_of("image").unwrap());
    let mut image = build_image(image_path)?;

    if let Some(dir) = m.value_of("key-dir") {
        std::env::set_var("TISIGN_KEY_DIR", dir);
    }

    let mut key = load_key(&image, m.value_of("key-id"))?;
    let flags = repair_flags_from(m, config);
    let rootnum: u8 = m.value_of("root").unwrap_or("0").parse()?;

    tisign_core::repair_and_sign(&mut image, &mut key, flags, rootnum)
        .map_err(|e| failure::format_err!("{}", e))?;

    let out_path = format::write_signed(image_path, &image.data)?;
    println!("wrote {}", out_path.display());
    Ok(())
}

fn cmd_validate(m: &ArgMatches) -> Result<(), Error> {
    let image_path = Path::new(m.value_of("image").unwrap());
    let image = build_image(image_path)?;

    if let Some(dir) = m.value_of("key-dir") {
        std::env::set_var("TISIGN_KEY_DIR", dir);
    }

    let key = load_key(&image, m.value_of("key-id"))?;
    match tisign_core::validate(&image, &key) {
        Ok(()) => {
            println!("OK");
            Ok(())
        }
        Err(e) => {
            eprintln!("FAILED: {}", e);
            exit(1);
        }
    }
}

fn cmd_info(m: &ArgMatches) -> Result<(), Error> {
    let image_path = Path::new(m.value_of("image").unwrap());
    let image = build_image(image_path)?;

    println!("calc type: {:?}", image.calc_type);
    println!("data type: {:?}", image.data_type);
    println!("length: {} bytes", image.data.len());
    println!("key id: {:04X}", image.key_id());
    if !image.page_numbers.is_empty() {
        println!("pages: {:?}", image.page_numbers);
    }
    Ok(())
}
