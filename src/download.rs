//! Fetching, verifying and extracting single archives.
use crate::DatasetError;
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PROGRESS_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{wide_bar}] {bytes}/{total_bytes} ({bytes_per_sec})";

/// Lowercase hex md5 of the file at `path`.
pub fn calculate_md5(path: &Path) -> Result<String, DatasetError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut context = md5::Context::new();
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        let read = buf.len();
        context.consume(buf);
        reader.consume(read);
    }
    Ok(format!("{:x}", context.finalize()))
}

/// Whether `path` exists and, when an md5 is given, hashes to it.
pub fn check_integrity(path: &Path, md5: Option<&str>) -> Result<bool, DatasetError> {
    if !path.is_file() {
        return Ok(false);
    }
    match md5 {
        None => Ok(true),
        Some(expected) => Ok(calculate_md5(path)? == expected),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

fn progress_bar(total: Option<u64>, name: &str, progress: bool) -> ProgressBar {
    if !progress {
        return ProgressBar::hidden();
    }
    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message(name.to_string());
    bar
}

/// Download `url` into `dest`, unless `dest` already holds a file matching `md5`.
///
/// The body is streamed to `<dest>.part` and only renamed to `dest` once complete.
/// The checksum is verified after the download; a mismatch is an error.
pub async fn download_url(
    client: &Client,
    url: &str,
    dest: &Path,
    md5: Option<&str>,
    progress: bool,
) -> Result<(), DatasetError> {
    if check_integrity(dest, md5)? {
        info!(path = %dest.display(), "using downloaded and verified file");
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    info!(url, path = %dest.display(), "downloading");
    let mut response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DatasetError::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    let name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bar = progress_bar(response.content_length(), &name, progress);
    let partial = partial_path(dest);
    let mut writer = BufWriter::new(File::create(&partial)?);
    let written = async {
        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk)?;
            bar.inc(chunk.len() as u64);
        }
        writer.flush()?;
        Ok::<_, DatasetError>(())
    }
    .await;
    bar.finish_and_clear();
    drop(writer);
    if let Err(err) = written {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }
    fs::rename(&partial, dest)?;
    debug!(path = %dest.display(), "download complete");

    if let Some(expected) = md5 {
        let actual = calculate_md5(dest)?;
        if actual != expected {
            return Err(DatasetError::ChecksumMismatch {
                path: dest.to_path_buf(),
                expected: expected.to_string(),
                actual,
            });
        }
    }
    Ok(())
}

/// Gunzip `archive` next to itself, dropping the `.gz` suffix. The archive is kept.
///
/// Returns the path of the extracted file.
pub fn extract_gzip(archive: &Path) -> Result<PathBuf, DatasetError> {
    let target = match archive.to_str().and_then(|s| s.strip_suffix(".gz")) {
        Some(stripped) if !stripped.is_empty() => PathBuf::from(stripped),
        _ => {
            return Err(DatasetError::NotGzip {
                path: archive.to_path_buf(),
            })
        }
    };
    debug!(from = %archive.display(), to = %target.display(), "extracting");

    let mut decoder = GzDecoder::new(BufReader::new(File::open(archive)?));
    let partial = partial_path(&target);
    let mut writer = BufWriter::new(File::create(&partial)?);
    let copied = io::copy(&mut decoder, &mut writer).and_then(|_| writer.flush());
    drop(writer);
    if let Err(err) = copied {
        let _ = fs::remove_file(&partial);
        return Err(err.into());
    }
    fs::rename(&partial, &target)?;
    Ok(target)
}

/// [`download_url`] followed by [`extract_gzip`].
pub async fn download_and_extract(
    client: &Client,
    url: &str,
    archive: &Path,
    md5: Option<&str>,
    progress: bool,
) -> Result<PathBuf, DatasetError> {
    download_url(client, url, archive, md5, progress).await?;
    extract_gzip(archive)
}
