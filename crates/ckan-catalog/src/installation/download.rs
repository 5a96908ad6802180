//! Downloads a release's content.

use std::path::PathBuf;
use thiserror::Error;

use crate::metadb::package::Release;

/// Errors that can occur during the download process.
#[derive(Debug, Error)]
pub enum DownloadError {
	/// Given release cannot be downloaded as it has no download information.
	#[error("release {0} does not have downloadable content.")]
	MissingDownload(String),
	/// The downloaded content hash does not match hash in the release.
	#[error("downloaded content hash does not match hash in release {0}.")]
	DifferentHashes(String),
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
}

/// Where a release's archive is cached, `download_dir/FAR-1_0.16.1.2.zip` for example.
pub fn release_download_path(config: &crate::Config, release: &Release) -> PathBuf {
	let version = release.version.original().unwrap_or_default()
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || ".-+".contains(c) { c } else { '_' })
		.collect::<String>();
	config.download_dir().join(format!("{}-{}.zip", release.package_id, version))
}

/// Downloads a release's content into the download cache.
///
/// # Parameters
/// - `config` - Required for getting download paths and checksum settings.
/// - `client` - Client to download with.
/// - `release` - Release to download.
/// - `force` - Overwrite an existing download.
///
/// # Errors
/// - [`DownloadError::MissingDownload`] for releases without a `download` url.
/// - [`DownloadError::DifferentHashes`] when checksums are enabled and the content doesn't match `download_hash.sha256`, nothing is written.
pub async fn download_release(config: &crate::Config, client: &reqwest::Client, release: &Release, force: bool) -> Result<PathBuf, DownloadError> {
	let download_path = release_download_path(config, release);
	if download_path.exists() && !force {
		log::info!("Release {} contents already downloaded, skipping.", release);
		return Ok(download_path);
	}

	let url = release.download.as_ref().ok_or_else(|| DownloadError::MissingDownload(release.to_string()))?;

	log::info!("Downloading release {} from {}", release, url);
	let content = client
		.get(url)
		.send()
		.await?
		.error_for_status()?
		.bytes()
		.await?
		.to_vec();

	if config.do_checksums() {
		if let Some(release_hash) = &release.download_hash.sha256 {
			let content_hash = sha256::digest(content.as_slice());
			if !release_hash.eq_ignore_ascii_case(&content_hash) {
				log::error!("Checksum mismatch for {}: expected {}, got {}", release, release_hash, content_hash);
				return Err(DownloadError::DifferentHashes(release.to_string()));
			}
		} else if release.download_hash.sha1.is_some() {
			log::debug!("Release {} only has a sha1 hash, skipping checksum.", release);
		}
	}

	log::info!("Writing release download to disk: {}", release);
	tokio::fs::create_dir_all(config.download_dir()).await?;
	tokio::fs::write(&download_path, &content).await?;

	Ok(download_path)
}
