/// Raw-array sidecar output in numpy's archive format.
///
/// Each `.npz` holds a single `data.npy` member, so `numpy.load(path)["data"]`
/// recovers the array exactly as the annotation tooling expects.
use std::fs::File;
use std::io::Write;
use std::path::Path;

use thiserror::Error;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

#[derive(Debug, Error)]
pub enum NpzError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Writes a row-major u16 array of the given (height, width).
pub fn write_npz_u16(path: &Path, data: &[u16], shape: (usize, usize)) -> Result<(), NpzError> {
    let mut payload = Vec::with_capacity(data.len() * 2);
    for value in data {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    write_archive(path, &npy_bytes("<u2", &[shape.0, shape.1], &payload))
}

/// Writes a stack of equally sized u8 masks as one (count, height, width)
/// array.
pub fn write_npz_u8_stack(
    path: &Path,
    masks: &[Vec<u8>],
    shape: (usize, usize),
) -> Result<(), NpzError> {
    let mut payload = Vec::with_capacity(masks.len() * shape.0 * shape.1);
    for mask in masks {
        payload.extend_from_slice(mask);
    }
    write_archive(path, &npy_bytes("|u1", &[masks.len(), shape.0, shape.1], &payload))
}

fn write_archive(path: &Path, npy: &[u8]) -> Result<(), NpzError> {
    let mut writer = ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file("data.npy", options)?;
    writer.write_all(npy)?;
    writer.finish()?;
    Ok(())
}

/// Serializes one array in NPY format version 1.0.
fn npy_bytes(descr: &str, shape: &[usize], payload: &[u8]) -> Vec<u8> {
    let dims = shape
        .iter()
        .map(|d| format!("{d},"))
        .collect::<Vec<_>>()
        .concat();
    let mut header = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': ({dims}), }}");

    // Magic (8 bytes) + header length (2 bytes) + header must align to 64.
    let unpadded = 8 + 2 + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let mut bytes = Vec::with_capacity(10 + header.len() + payload.len());
    bytes.extend_from_slice(b"\x93NUMPY\x01\x00");
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(payload);
    bytes
}
