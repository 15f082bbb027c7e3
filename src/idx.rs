use crate::DatasetError;
use std::fs;
use std::path::Path;

const UNSIGNED_BYTE: u8 = 0x08;

/// An IDX tensor of unsigned bytes.
#[derive(Debug)]
pub(crate) struct IdxTensor {
    pub dims: Vec<usize>,
    pub data: Vec<u8>,
}

pub(crate) fn read(path: &Path) -> Result<IdxTensor, DatasetError> {
    let bytes = fs::read(path)?;
    parse(path, bytes)
}

/// Parses `bytes`; `path` is only used for error reporting.
pub(crate) fn parse(path: &Path, mut bytes: Vec<u8>) -> Result<IdxTensor, DatasetError> {
    if bytes.len() < 4 || bytes[0] != 0 || bytes[1] != 0 {
        return Err(DatasetError::InvalidIdxMagic {
            path: path.to_path_buf(),
        });
    }
    let type_code = bytes[2];
    if type_code != UNSIGNED_BYTE {
        return Err(DatasetError::UnsupportedIdxType {
            path: path.to_path_buf(),
            type_code,
        });
    }
    let ndim = bytes[3] as usize;
    let header_len = 4 + 4 * ndim;
    if bytes.len() < header_len {
        return Err(DatasetError::IdxLengthMismatch {
            path: path.to_path_buf(),
            expected: header_len,
            actual: bytes.len(),
        });
    }

    let dims: Vec<usize> = bytes[4..header_len]
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as usize)
        .collect();
    let expected = dims
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .unwrap_or(usize::MAX);
    let actual = bytes.len() - header_len;
    if expected != actual {
        return Err(DatasetError::IdxLengthMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }

    bytes.drain(..header_len);
    Ok(IdxTensor { dims, data: bytes })
}

impl IdxTensor {
    pub(crate) fn expect_rank(&self, path: &Path, rank: usize) -> Result<(), DatasetError> {
        if self.dims.len() == rank {
            Ok(())
        } else {
            Err(DatasetError::IdxDimensions {
                path: path.to_path_buf(),
                expected: rank,
                actual: self.dims.len(),
            })
        }
    }
}

/// Encodes an unsigned byte tensor, the inverse of [`parse`].
#[cfg(test)]
pub(crate) fn encode(dims: &[u32], data: &[u8]) -> Vec<u8> {
    let mut out = vec![0, 0, UNSIGNED_BYTE, dims.len() as u8];
    for dim in dims {
        out.extend_from_slice(&dim.to_be_bytes());
    }
    out.extend_from_slice(data);
    out
}
