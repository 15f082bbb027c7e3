#![deny(missing_docs)]
//! This crates aims to emulate and be compatible with the dataset providers of the
//! [torchvision](https://github.com/pytorch/vision) python package.
//!
//! It limits itself to the MNIST family of datasets: fetching the archives from their
//! mirrors, verifying and extracting them with the same on-disk layout as torchvision,
//! and reading the extracted files back.
//!
//! ```no_run
//! # async fn run() -> Result<(), vision_datasets::DatasetError> {
//! use vision_datasets::{Dataset, MnistBuilder, Split};
//!
//! let mnist = MnistBuilder::new("data").split(Split::Train).build().await?;
//! assert_eq!(mnist.len(), 60_000);
//! # Ok(())
//! # }
//! ```
use std::path::PathBuf;
use thiserror::Error;

pub mod download;
mod idx;
pub mod mnist;

pub use mnist::{DatasetKind, Mnist, MnistBuilder, MnistItem, Resource, Split};

/// The default trait to implement to get the simplest API
pub trait Dataset {
    /// The type of objects contained in the dataset
    type Item;

    /// The length of the dataset
    fn len(&self) -> usize;

    /// Whether the dataset holds no items at all
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get item at specific index. Should return `None` if and only if
    /// `index >= dataset.len()`.
    fn get(&self, index: usize) -> Option<Self::Item>;
}

/// Generic structure to iterate over [`Dataset`].
pub struct DatasetIterator<'a, D> {
    dataset: &'a D,
    index: usize,
}

/// Iterate of the dataset in order
pub fn iter<D: Dataset>(dataset: &D) -> DatasetIterator<'_, D> {
    DatasetIterator { dataset, index: 0 }
}

impl<'a, D: Dataset> Iterator for DatasetIterator<'a, D> {
    type Item = D::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let object = self.dataset.get(self.index);
        self.index += 1;
        object
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dataset.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl<'a, D: Dataset> ExactSizeIterator for DatasetIterator<'a, D> {}

/// Error type for datasets
#[derive(Debug, Error)]
pub enum DatasetError {
    /// Error in the request
    #[error("request error: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Filesystem error while writing or reading the dataset
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// The mirror answered, but not with a success status.
    #[error("{url} returned HTTP {status}")]
    HttpStatus {
        /// The requested url
        url: String,
        /// The status the server answered with
        status: reqwest::StatusCode,
    },

    /// The downloaded file does not hash to the published checksum.
    #[error("checksum mismatch for {}: expected md5 {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        /// The offending file
        path: PathBuf,
        /// The published md5
        expected: String,
        /// The md5 of the file on disk
        actual: String,
    },

    /// Every mirror failed for a resource. Holds the error of the last mirror tried.
    #[error("error downloading {filename}: {source}")]
    DownloadFailed {
        /// The resource that could not be fetched
        filename: String,
        /// The last mirror's failure
        #[source]
        source: Box<DatasetError>,
    },

    /// The dataset files are absent and downloading was disabled.
    #[error("Dataset not found in {}. You can use download=true to download it", path.display())]
    NotFound {
        /// The raw folder that was inspected
        path: PathBuf,
    },

    /// Only `.gz` archives can be extracted.
    #[error("{} is not a gzip archive", path.display())]
    NotGzip {
        /// The archive path
        path: PathBuf,
    },

    /// The IDX header does not start with two zero bytes.
    #[error("invalid idx magic number in {}", path.display())]
    InvalidIdxMagic {
        /// The offending file
        path: PathBuf,
    },

    /// The IDX element type is not unsigned byte.
    #[error("unsupported idx element type 0x{type_code:02x} in {}", path.display())]
    UnsupportedIdxType {
        /// The offending file
        path: PathBuf,
        /// The type byte found in the header
        type_code: u8,
    },

    /// The IDX payload does not match the dimensions of its header.
    #[error("idx file {} should hold {expected} bytes, found {actual}", path.display())]
    IdxLengthMismatch {
        /// The offending file
        path: PathBuf,
        /// Bytes announced by the header
        expected: usize,
        /// Bytes present after the header
        actual: usize,
    },

    /// The IDX tensor does not have the rank expected for images or labels.
    #[error("idx file {} has {actual} dimensions, expected {expected}", path.display())]
    IdxDimensions {
        /// The offending file
        path: PathBuf,
        /// Expected rank
        expected: usize,
        /// Rank found in the header
        actual: usize,
    },

    /// Images and labels files disagree on the number of samples.
    #[error("found {images} images but {labels} labels")]
    LengthMismatch {
        /// Number of images
        images: usize,
        /// Number of labels
        labels: usize,
    },

    /// The dataset name is not one this crate knows about.
    #[error("unknown dataset {0:?}, expected one of mnist, fashion-mnist, kmnist")]
    UnknownDataset(String),

    /// The split name is neither train nor test.
    #[error("unknown split {0:?}, expected train or test")]
    UnknownSplit(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Squares(usize);

    impl Dataset for Squares {
        type Item = usize;

        fn len(&self) -> usize {
            self.0
        }

        fn get(&self, index: usize) -> Option<usize> {
            (index < self.0).then(|| index * index)
        }
    }

    #[test]
    fn iterates_in_order() {
        let dataset = Squares(4);
        let items: Vec<_> = iter(&dataset).collect();
        assert_eq!(items, vec![0, 1, 4, 9]);
        assert_eq!(iter(&dataset).len(), 4);
    }

    #[test]
    fn empty_dataset() {
        let dataset = Squares(0);
        assert!(dataset.is_empty());
        assert_eq!(iter(&dataset).next(), None);
    }

    #[test]
    fn download_failed_keeps_source() {
        let err = DatasetError::DownloadFailed {
            filename: "train-images-idx3-ubyte.gz".to_string(),
            source: Box::new(DatasetError::NotGzip {
                path: PathBuf::from("x"),
            }),
        };
        assert_eq!(
            err.to_string(),
            "error downloading train-images-idx3-ubyte.gz: x is not a gzip archive"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
