use num_bigint::BigInt;

use tisign_core::image::Image;
use tisign_core::key::Key;
use tisign_core::types::{CalcType, DataType, HashType, RepairFlags};
use tisign_core::{repair_and_sign, validate};

fn toy_rabin_key() -> Key {
    let p = BigInt::from(11u32);
    let q = BigInt::from(23u32);
    let mut k = Key::new();
    k.n = &p * &q;
    k.p = p;
    k.q = q;
    k
}

fn minimal_ti8x_app() -> Vec<u8> {
    let mut data = vec![0x80u8, 0x0f, 0, 0, 0, 0];
    data.extend_from_slice(&[0x80, 0x81, 0x01]); // page count
    data.extend_from_slice(&[0x80, 0x11, 0x00]); // key id
    data.extend_from_slice(&[0x03, 0x22, 0x09, 0x01, 0x02, 0x00]); // date stamp
    data.extend_from_slice(&[0x80, 0x70, 0x00]); // program image marker
    data.push(0xAB);
    let total = data.len() as u32;
    data[2] = ((total >> 24) & 0xff) as u8;
    data[3] = ((total >> 16) & 0xff) as u8;
    data[4] = ((total >> 8) & 0xff) as u8;
    data[5] = (total & 0xff) as u8;
    data
}

#[test]
fn repair_then_sign_then_validate_round_trips() {
    let mut image = Image::with_data(CalcType::Ti83Plus, DataType::App, HashType::Md5, minimal_ti8x_app());
    let mut key = toy_rabin_key();

    repair_and_sign(&mut image, &mut key, RepairFlags::empty(), 0).unwrap();
    assert!(validate(&image, &key).is_ok());
}

#[test]
fn tampered_payload_fails_validation() {
    let mut image = Image::with_data(CalcType::Ti83Plus, DataType::App, HashType::Md5, minimal_ti8x_app());
    let mut key = toy_rabin_key();
    repair_and_sign(&mut image, &mut key, RepairFlags::empty(), 0).unwrap();

    // Flip a payload byte after signing; the hash it was signed over
    // no longer matches.
    let idx = image.data.len() - 10;
    image.data[idx] ^= 0xff;

    assert!(validate(&image, &key).is_err());
}

#[test]
fn every_rootnum_produces_a_valid_signature() {
    for rootnum in 0u8..4 {
        let mut image = Image::with_data(CalcType::Ti83Plus, DataType::App, HashType::Md5, minimal_ti8x_app());
        let mut key = toy_rabin_key();
        repair_and_sign(&mut image, &mut key, RepairFlags::empty(), rootnum).unwrap();
        assert!(validate(&image, &key).is_ok(), "rootnum {} failed", rootnum);
    }
}

#[test]
fn missing_header_is_fatal_not_repairable() {
    let mut image = Image::with_data(CalcType::Ti83Plus, DataType::App, HashType::Md5, vec![1, 2, 3]);
    let mut key = toy_rabin_key();
    let err = repair_and_sign(&mut image, &mut key, RepairFlags::empty(), 0).unwrap_err();
    assert!(matches!(err, tisign_core::Error::Fatal(_)));
}
