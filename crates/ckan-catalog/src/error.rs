//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("bincode error: {0}")]
	Bincode(#[from] bincode::Error),
	#[error("zip error: {0}")]
	Zip(#[from] zip::result::ZipError),
	#[error("ingestion failed: {0}")]
	Ingestion(#[from] crate::metadb::IngestionError),
	#[error("install failed: {0}")]
	Install(#[from] crate::installation::InstallError),
	#[error("download failed: {0}")]
	Download(#[from] crate::installation::download::DownloadError),
	#[error("background task failed: {0}")]
	Task(#[from] tokio::task::JoinError),
	#[error("package {0} is not in the catalog")]
	MissingPackage(String),
}
