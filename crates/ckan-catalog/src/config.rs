use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_METADATA_URL: &str = "https://github.com/KSP-CKAN/CKAN-meta/archive/master.zip";

/// How the entries of the metadata archive are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionMode {
	/// One entry at a time on a single blocking thread.
	Sequential,
	/// Entries spread across `workers` blocking threads.
	Concurrent { workers: usize },
}

impl Default for IngestionMode {
	fn default() -> Self {
		let workers = std::thread::available_parallelism().map_or(4, |n| n.get());
		Self::Concurrent { workers }
	}
}

#[derive(Debug, Clone)]
pub struct Config {
	metadata_url: String,
	download_dir: PathBuf,
	data_dir: PathBuf,
	https_only: bool,
	do_checksums: bool,
	request_timeout: Duration,
	ingestion_mode: IngestionMode,
}

/// Gets a base directory from the environment, falling back to the temp dir when the variables are missing.
fn base_dir(xdg: &str, home_fallback: &str) -> PathBuf {
	#[cfg(target_os = "windows")]
	let path = {
		let _ = (xdg, home_fallback);
		std::env::var_os("APPDATA").map(PathBuf::from)
	};

	#[cfg(not(target_os = "windows"))]
	let path = std::env::var_os(xdg)
		.map(PathBuf::from)
		.or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(home_fallback)));

	path.unwrap_or_else(|| {
		log::warn!("No home directory found, using the temp directory for data.");
		std::env::temp_dir()
	}).join("ckan-catalog")
}

impl Default for Config {
	fn default() -> Self {
		Self {
			metadata_url: DEFAULT_METADATA_URL.to_string(),
			download_dir: base_dir("XDG_CACHE_HOME", ".cache").join("downloads"),
			data_dir: base_dir("XDG_DATA_HOME", ".local/share").join("data"),
			https_only: true,
			do_checksums: true,
			request_timeout: Duration::from_secs(60),
			ingestion_mode: IngestionMode::default(),
		}
	}
}

impl Config {
	pub fn metadata_url(&self) -> &str {
		&self.metadata_url
	}
	pub fn set_metadata_url(&mut self, metadata_url: impl Into<String>) {
		self.metadata_url = metadata_url.into();
	}

	/// Where release archives are cached.
	pub fn download_dir(&self) -> &Path {
		&self.download_dir
	}
	/// The directory is created when first written to.
	pub fn set_download_dir(&mut self, download_dir: PathBuf) {
		self.download_dir = download_dir;
	}

	/// Where the catalog cache is kept.
	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}
	pub fn set_data_dir(&mut self, data_dir: PathBuf) {
		self.data_dir = data_dir;
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}

	/// Should downloads be checked against the release's `download_hash`.
	pub fn do_checksums(&self) -> bool {
		self.do_checksums
	}
	pub fn set_do_checksums(&mut self, do_checksums: bool) {
		self.do_checksums = do_checksums;
	}

	pub fn request_timeout(&self) -> Duration {
		self.request_timeout
	}
	pub fn set_request_timeout(&mut self, request_timeout: Duration) {
		self.request_timeout = request_timeout;
	}

	pub fn ingestion_mode(&self) -> IngestionMode {
		self.ingestion_mode
	}
	pub fn set_ingestion_mode(&mut self, ingestion_mode: IngestionMode) {
		self.ingestion_mode = ingestion_mode;
	}

	/// Builds the HTTP client used for every request.
	pub fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
		reqwest::Client::builder()
			.https_only(self.https_only)
			.timeout(self.request_timeout)
			.build()
	}
}
