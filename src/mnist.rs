//! The MNIST family: MNIST, Fashion-MNIST and KMNIST.
//!
//! All three share the same four-archive layout and the IDX file format, only their
//! mirrors, checksums and class names differ. Files land in
//! `<root>/<folder>/raw/`, the same place torchvision puts them, so a directory
//! populated by either can be used by the other.
use crate::download::download_and_extract;
use crate::{idx, Dataset, DatasetError};
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// Available datasets supported by the crate.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DatasetKind {
    /// MNIST handwritten digits dataset.
    #[default]
    Mnist,
    /// Zalando's article images, a drop-in replacement for MNIST.
    FashionMnist,
    /// Kuzushiji (cursive Japanese) characters.
    Kmnist,
}

/// Which partition of the dataset to load.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Split {
    /// The 60 000 training samples.
    #[default]
    Train,
    /// The 10 000 evaluation samples.
    Test,
}

/// One archive published on every mirror of a dataset.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resource {
    /// The archive name, relative to the mirror url
    pub filename: String,
    /// Expected md5 of the archive, `None` skips the check
    pub md5: Option<String>,
}

impl Resource {
    /// A resource with a known checksum.
    pub fn new(filename: &str, md5: &str) -> Self {
        Self {
            filename: filename.to_string(),
            md5: Some(md5.to_string()),
        }
    }

    /// A resource that is accepted as downloaded.
    pub fn unchecked(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            md5: None,
        }
    }

    /// The name of the file once extracted.
    pub fn extracted_name(&self) -> &str {
        self.filename
            .strip_suffix(".gz")
            .unwrap_or(&self.filename)
    }
}

const MNIST_CLASSES: [&str; 10] = [
    "0 - zero",
    "1 - one",
    "2 - two",
    "3 - three",
    "4 - four",
    "5 - five",
    "6 - six",
    "7 - seven",
    "8 - eight",
    "9 - nine",
];

const FASHION_MNIST_CLASSES: [&str; 10] = [
    "T-shirt/top",
    "Trouser",
    "Pullover",
    "Dress",
    "Coat",
    "Sandal",
    "Shirt",
    "Sneaker",
    "Bag",
    "Ankle boot",
];

const KMNIST_CLASSES: [&str; 10] = ["o", "ki", "su", "tsu", "na", "ha", "ma", "ya", "re", "wo"];

impl DatasetKind {
    /// Parse a dataset name into a `DatasetKind`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mnist" => Some(DatasetKind::Mnist),
            "fashion-mnist" | "fashionmnist" | "fashion_mnist" => Some(DatasetKind::FashionMnist),
            "kmnist" => Some(DatasetKind::Kmnist),
            _ => None,
        }
    }

    /// Directory under the root holding this dataset.
    pub fn folder(&self) -> &'static str {
        match self {
            DatasetKind::Mnist => "MNIST",
            DatasetKind::FashionMnist => "FashionMNIST",
            DatasetKind::Kmnist => "KMNIST",
        }
    }

    /// Base urls tried in order, each ending with a slash.
    pub fn mirrors(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Mnist => &[
                "https://ossci-datasets.s3.amazonaws.com/mnist/",
                "http://yann.lecun.com/exdb/mnist/",
            ],
            DatasetKind::FashionMnist => {
                &["http://fashion-mnist.s3-website.eu-central-1.amazonaws.com/"]
            }
            DatasetKind::Kmnist => &["http://codh.rois.ac.jp/kmnist/dataset/kmnist/"],
        }
    }

    /// The four archives, training images and labels first.
    pub fn resources(&self) -> Vec<Resource> {
        let sums = match self {
            DatasetKind::Mnist => [
                "f68b3c2dcbeaaa9fbdd348bbdeb94873",
                "d53e105ee54ea40749a09fcbcd1e9432",
                "9fb629c4189551a2d022fa330f9573f3",
                "ec29112dd5afa0611ce80d1b7f8ba6ea",
            ],
            DatasetKind::FashionMnist => [
                "8d4fb7e6c68d591d4c3dfef9ec88bf0d",
                "25c81989df183df01b3e8a0aad5dffbe",
                "bef4ecab320f06d8554ea6380940ec79",
                "bb300cfdad3c16e7a12a480ee83cd310",
            ],
            DatasetKind::Kmnist => [
                "bdb82020997e1d708af4cf47b453dcf7",
                "e144d726b3acfaa3e44228e80efcd344",
                "5c965bf0a639b31b8f53240b1b52f4d7",
                "7320c461ea6c1c855c0b718fb2a4b134",
            ],
        };
        [
            "train-images-idx3-ubyte.gz",
            "train-labels-idx1-ubyte.gz",
            "t10k-images-idx3-ubyte.gz",
            "t10k-labels-idx1-ubyte.gz",
        ]
        .iter()
        .zip(sums)
        .map(|(filename, md5)| Resource::new(filename, md5))
        .collect()
    }

    /// Human readable class names, indexed by label.
    pub fn classes(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::Mnist => &MNIST_CLASSES,
            DatasetKind::FashionMnist => &FASHION_MNIST_CLASSES,
            DatasetKind::Kmnist => &KMNIST_CLASSES,
        }
    }
}

impl FromStr for DatasetKind {
    type Err = DatasetError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetKind::from_name(s).ok_or_else(|| DatasetError::UnknownDataset(s.to_string()))
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DatasetKind::Mnist => "mnist",
            DatasetKind::FashionMnist => "fashion-mnist",
            DatasetKind::Kmnist => "kmnist",
        })
    }
}

impl Split {
    /// Prefix of the files holding this split.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "t10k",
        }
    }
}

impl FromStr for Split {
    type Err = DatasetError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" | "training" => Ok(Split::Train),
            "test" | "t10k" | "eval" | "evaluation" => Ok(Split::Test),
            _ => Err(DatasetError::UnknownSplit(s.to_string())),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Split::Train => "train",
            Split::Test => "test",
        })
    }
}

/// Builder for [`Mnist`], mirrors the knobs of torchvision's constructor.
#[derive(Clone, Debug)]
pub struct MnistBuilder {
    root: PathBuf,
    kind: DatasetKind,
    split: Split,
    download: bool,
    progress: bool,
    mirrors: Vec<String>,
    resources: Vec<Resource>,
    client: Option<Client>,
}

impl MnistBuilder {
    /// MNIST training split under `root`, downloading if absent, with progress bars.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        let kind = DatasetKind::Mnist;
        Self {
            root: root.into(),
            kind,
            split: Split::Train,
            download: true,
            progress: true,
            mirrors: kind.mirrors().iter().map(|m| m.to_string()).collect(),
            resources: kind.resources(),
            client: None,
        }
    }

    /// Switch dataset. Resets mirrors and resources to the ones of `kind`.
    pub fn kind(mut self, kind: DatasetKind) -> Self {
        self.kind = kind;
        self.mirrors = kind.mirrors().iter().map(|m| m.to_string()).collect();
        self.resources = kind.resources();
        self
    }

    /// Which partition [`MnistBuilder::build`] loads.
    pub fn split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }

    /// Whether missing files may be fetched. When disabled, absent files are an error.
    pub fn download(mut self, download: bool) -> Self {
        self.download = download;
        self
    }

    /// Show a progress bar per downloaded file.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the mirror list. A missing trailing slash is added.
    pub fn with_mirrors<I, S>(mut self, mirrors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mirrors = mirrors
            .into_iter()
            .map(|mirror| {
                let mut mirror: String = mirror.into();
                if !mirror.ends_with('/') {
                    mirror.push('/');
                }
                mirror
            })
            .collect();
        self
    }

    /// Replace the published archives, e.g. to pin other checksums.
    ///
    /// Extracted names must keep the `{train,t10k}-{images-idx3,labels-idx1}-ubyte`
    /// layout, [`Mnist::load`] looks the split up by those names.
    pub fn with_resources(mut self, resources: Vec<Resource>) -> Self {
        self.resources = resources;
        self
    }

    /// Use a preconfigured http client (proxies, timeouts...).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// `<root>/<folder>/raw`
    pub fn raw_folder(&self) -> PathBuf {
        self.root.join(self.kind.folder()).join("raw")
    }

    /// Whether every extracted file is present.
    pub fn check_exists(&self) -> bool {
        let raw_folder = self.raw_folder();
        self.resources
            .iter()
            .all(|resource| raw_folder.join(resource.extracted_name()).is_file())
    }

    /// Fetch the archives unless every extracted file is present already.
    pub async fn fetch(&self) -> Result<(), DatasetError> {
        if self.check_exists() {
            info!(kind = %self.kind, path = %self.raw_folder().display(), "dataset already present");
            return Ok(());
        }
        let raw_folder = self.raw_folder();
        std::fs::create_dir_all(&raw_folder)?;
        let client = match &self.client {
            Some(client) => client.clone(),
            None => Client::builder().build()?,
        };

        for resource in &self.resources {
            self.fetch_resource(&client, &raw_folder, resource).await?;
        }
        Ok(())
    }

    async fn fetch_resource(
        &self,
        client: &Client,
        raw_folder: &Path,
        resource: &Resource,
    ) -> Result<(), DatasetError> {
        let archive = raw_folder.join(&resource.filename);
        let mut last_error = None;
        for mirror in &self.mirrors {
            let url = format!("{mirror}{}", resource.filename);
            match download_and_extract(
                client,
                &url,
                &archive,
                resource.md5.as_deref(),
                self.progress,
            )
            .await
            {
                Ok(_) => return Ok(()),
                Err(err @ (DatasetError::RequestError(_) | DatasetError::HttpStatus { .. })) => {
                    warn!(%url, error = %err, "failed to download, trying next mirror");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        let source = last_error.unwrap_or_else(|| {
            DatasetError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no mirror configured",
            ))
        });
        Err(DatasetError::DownloadFailed {
            filename: resource.filename.clone(),
            source: Box::new(source),
        })
    }

    /// Ensure the dataset is on disk, downloading it if allowed, then load the split.
    pub async fn build(self) -> Result<Mnist, DatasetError> {
        if self.download {
            self.fetch().await?;
        }
        if !self.check_exists() {
            return Err(DatasetError::NotFound {
                path: self.raw_folder(),
            });
        }
        Mnist::load(&self.raw_folder(), self.kind, self.split)
    }
}

/// A loaded split of one of the MNIST-like datasets.
#[derive(Debug)]
pub struct Mnist {
    kind: DatasetKind,
    split: Split,
    raw_folder: PathBuf,
    rows: usize,
    cols: usize,
    images: Vec<u8>,
    labels: Vec<u8>,
}

/// A single sample.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MnistItem {
    /// Row-major grayscale pixels, `rows * cols` of them
    pub image: Vec<u8>,
    /// The class index
    pub label: u8,
}

impl Mnist {
    /// Read an already extracted split from `raw_folder`, without any network access.
    pub fn load(raw_folder: &Path, kind: DatasetKind, split: Split) -> Result<Self, DatasetError> {
        let prefix = split.file_prefix();
        let images_path = raw_folder.join(format!("{prefix}-images-idx3-ubyte"));
        let labels_path = raw_folder.join(format!("{prefix}-labels-idx1-ubyte"));

        for path in [&images_path, &labels_path] {
            if !path.is_file() {
                return Err(DatasetError::NotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        let images = idx::read(&images_path)?;
        images.expect_rank(&images_path, 3)?;
        let labels = idx::read(&labels_path)?;
        labels.expect_rank(&labels_path, 1)?;

        if images.dims[0] != labels.dims[0] {
            return Err(DatasetError::LengthMismatch {
                images: images.dims[0],
                labels: labels.dims[0],
            });
        }
        Ok(Self {
            kind,
            split,
            raw_folder: raw_folder.to_path_buf(),
            rows: images.dims[1],
            cols: images.dims[2],
            images: images.data,
            labels: labels.data,
        })
    }

    /// Which dataset this is.
    pub fn kind(&self) -> DatasetKind {
        self.kind
    }

    /// Which partition was loaded.
    pub fn split(&self) -> Split {
        self.split
    }

    /// Where the files live.
    pub fn raw_folder(&self) -> &Path {
        &self.raw_folder
    }

    /// Image height.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Image width.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Every label, in order.
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Class names, indexed by label.
    pub fn classes(&self) -> &'static [&'static str] {
        self.kind.classes()
    }

    /// Borrow the pixels of one image.
    pub fn image(&self, index: usize) -> Option<&[u8]> {
        if index >= self.labels.len() {
            return None;
        }
        let size = self.rows * self.cols;
        let start = index.checked_mul(size)?;
        let end = start.checked_add(size)?;
        self.images.get(start..end)
    }
}

impl Dataset for Mnist {
    type Item = MnistItem;

    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Option<Self::Item> {
        let label = *self.labels.get(index)?;
        let image = self.image(index)?.to_vec();
        Some(MnistItem { image, label })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idx::encode;
    use std::fs;

    fn write_split(raw: &Path, prefix: &str, count: u32) {
        let pixels: Vec<u8> = (0..count * 4).map(|p| p as u8).collect();
        let labels: Vec<u8> = (0..count).map(|l| (l % 10) as u8).collect();
        fs::write(
            raw.join(format!("{prefix}-images-idx3-ubyte")),
            encode(&[count, 2, 2], &pixels),
        )
        .unwrap();
        fs::write(
            raw.join(format!("{prefix}-labels-idx1-ubyte")),
            encode(&[count], &labels),
        )
        .unwrap();
    }

    #[test]
    fn resources_follow_torchvision_names() {
        let resources = DatasetKind::Mnist.resources();
        let names: Vec<_> = resources.iter().map(Resource::extracted_name).collect();
        assert_eq!(
            names,
            vec![
                "train-images-idx3-ubyte",
                "train-labels-idx1-ubyte",
                "t10k-images-idx3-ubyte",
                "t10k-labels-idx1-ubyte",
            ]
        );
        assert_eq!(
            resources[0].md5.as_deref(),
            Some("f68b3c2dcbeaaa9fbdd348bbdeb94873")
        );
    }

    #[test]
    fn parse_names() {
        assert_eq!("MNIST".parse::<DatasetKind>().unwrap(), DatasetKind::Mnist);
        assert_eq!(
            "fashion-mnist".parse::<DatasetKind>().unwrap(),
            DatasetKind::FashionMnist
        );
        assert!(matches!(
            "cifar10".parse::<DatasetKind>(),
            Err(DatasetError::UnknownDataset(_))
        ));
        assert_eq!("t10k".parse::<Split>().unwrap(), Split::Test);
        assert!("validation".parse::<Split>().is_err());
        assert_eq!(DatasetKind::Kmnist.to_string(), "kmnist");
    }

    #[test]
    fn raw_folder_layout() {
        let builder = MnistBuilder::new("data").kind(DatasetKind::FashionMnist);
        assert_eq!(
            builder.raw_folder(),
            Path::new("data").join("FashionMNIST").join("raw")
        );
    }

    #[test]
    fn mirrors_get_a_trailing_slash() {
        let builder = MnistBuilder::new("data").with_mirrors(["http://a", "http://b/"]);
        assert_eq!(builder.mirrors, vec!["http://a/", "http://b/"]);
    }

    #[test]
    fn loads_both_splits() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), "train", 5);
        write_split(dir.path(), "t10k", 2);

        let train = Mnist::load(dir.path(), DatasetKind::Mnist, Split::Train).unwrap();
        assert_eq!(train.len(), 5);
        assert_eq!((train.rows(), train.cols()), (2, 2));
        assert_eq!(
            train.get(1),
            Some(MnistItem {
                image: vec![4, 5, 6, 7],
                label: 1
            })
        );
        assert_eq!(train.get(5), None);
        assert_eq!(crate::iter(&train).count(), 5);

        let test = Mnist::load(dir.path(), DatasetKind::Mnist, Split::Test).unwrap();
        assert_eq!(test.len(), 2);
        assert_eq!(test.split(), Split::Test);
        assert_eq!(test.classes()[1], "1 - one");
    }

    #[test]
    fn mismatched_counts() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), "train", 3);
        fs::write(
            dir.path().join("train-labels-idx1-ubyte"),
            encode(&[2], &[0, 1]),
        )
        .unwrap();
        assert!(matches!(
            Mnist::load(dir.path(), DatasetKind::Mnist, Split::Train),
            Err(DatasetError::LengthMismatch {
                images: 3,
                labels: 2
            })
        ));
    }

    #[test]
    fn image_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        write_split(dir.path(), "train", 1);
        let mnist = Mnist::load(dir.path(), DatasetKind::Mnist, Split::Train).unwrap();
        assert_eq!(mnist.image(0), Some(&[0, 1, 2, 3][..]));
        assert_eq!(mnist.image(1), None);
        assert_eq!(mnist.image(usize::MAX / 4), None);
        assert_eq!(mnist.image(usize::MAX), None);
    }

    #[test]
    fn empty_images_have_no_out_of_range_items() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("train-images-idx3-ubyte"),
            encode(&[1, 0, 0], &[]),
        )
        .unwrap();
        fs::write(dir.path().join("train-labels-idx1-ubyte"), encode(&[1], &[3])).unwrap();
        let mnist = Mnist::load(dir.path(), DatasetKind::Mnist, Split::Train).unwrap();
        assert_eq!(mnist.image(0), Some(&[][..]));
        assert_eq!(mnist.image(5), None);
        assert_eq!(mnist.get(5), None);
    }

    #[tokio::test]
    async fn renamed_resources_report_the_missing_split() {
        let dir = tempfile::tempdir().unwrap();
        let builder = MnistBuilder::new(dir.path())
            .download(false)
            .with_resources(vec![Resource::unchecked("digits.gz")]);
        let raw = builder.raw_folder();
        fs::create_dir_all(&raw).unwrap();
        fs::write(raw.join("digits"), b"").unwrap();
        assert!(builder.check_exists());

        match builder.build().await {
            Err(DatasetError::NotFound { path }) => {
                assert_eq!(path, raw.join("train-images-idx3-ubyte"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn check_exists_needs_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let builder = MnistBuilder::new(dir.path());
        let raw = builder.raw_folder();
        fs::create_dir_all(&raw).unwrap();
        write_split(&raw, "train", 1);
        assert!(!builder.check_exists());
        write_split(&raw, "t10k", 1);
        assert!(builder.check_exists());
    }

    #[tokio::test]
    async fn build_uses_present_files_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let builder = MnistBuilder::new(dir.path())
            .split(Split::Test)
            .download(false);
        let raw = builder.raw_folder();
        fs::create_dir_all(&raw).unwrap();
        write_split(&raw, "train", 3);
        write_split(&raw, "t10k", 2);

        let mnist = builder.build().await.unwrap();
        assert_eq!(mnist.len(), 2);
    }
}
