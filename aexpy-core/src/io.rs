//! Reading and writing products as (optionally gzipped) JSON.
//!
//! `-` stands for stdin when reading and stdout when writing. Gzip input is
//! recognised by its magic bytes, so callers never need to say whether a
//! file is compressed.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::models::AnyProduct;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == "-"
}

/// Decompress `bytes` when they start with the gzip magic.
pub fn decode(bytes: Vec<u8>) -> Result<Vec<u8>> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        GzDecoder::new(bytes.as_slice()).read_to_end(&mut out)?;
        Ok(out)
    } else {
        Ok(bytes)
    }
}

pub fn encode(bytes: &[u8], gzip: bool) -> Result<Vec<u8>> {
    if !gzip {
        return Ok(bytes.to_vec());
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Raw (decompressed) contents of a file or stdin.
pub fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if is_stdio(path) {
        std::io::stdin().lock().read_to_end(&mut bytes)?;
    } else {
        File::open(path)?.read_to_end(&mut bytes)?;
    }
    decode(bytes)
}

pub fn write_bytes(path: &Path, bytes: &[u8], gzip: bool) -> Result<()> {
    let data = encode(bytes, gzip)?;
    if is_stdio(path) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        lock.write_all(&data)?;
        lock.flush()?;
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&data)?;
    writer.flush()?;
    Ok(())
}

/// Read one typed product.
pub fn read_product<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = read_bytes(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Read a product of any stage, discriminated by its keys.
pub fn read_any(path: &Path) -> Result<AnyProduct> {
    let bytes = read_bytes(path)?;
    AnyProduct::from_value(serde_json::from_slice(&bytes)?)
}

pub fn write_product<T: Serialize>(path: &Path, product: &T, gzip: bool) -> Result<()> {
    let json = serde_json::to_vec(product)?;
    write_bytes(path, &json, gzip)
}
