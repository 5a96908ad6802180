//! Building a [`Catalog`] from the CKAN-meta archive.
//!
//! The archive is a zip of `.ckan` documents inside a single wrapper directory, `CKAN-meta-master/FAR/FAR-0.16.1.2.ckan` for example.
//! Files directly inside the wrapper (readmes, build info) are not release documents and are skipped.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, PoisonError};

use super::catalog::Catalog;
use super::package::{Release, VersionValue};
use super::package::import::{read_release, Diagnostics, DecodeError};
use crate::config::IngestionMode;

type Archive = zip::ZipArchive<Cursor<Arc<[u8]>>>;

/// Largest release document that will be read, real ones are a few KiB.
pub const MAX_DOCUMENT_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
	#[error("failed to fetch metadata archive: {0}")]
	FetchFailed(#[from] reqwest::Error),
	#[error("metadata archive is unreadable: {0}")]
	ArchiveUnreadable(#[from] zip::result::ZipError),
	#[error("couldn't decode entry {path}: {cause}")]
	EntryDecodeFailed { path: String, cause: EntryError },
	#[error("ingestion worker failed: {0}")]
	WorkerFailed(#[from] tokio::task::JoinError),
}

/// Why a single archive entry couldn't be turned into a release.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
	#[error("zip error: {0}")]
	Zip(#[from] zip::result::ZipError),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("{0}")]
	Decode(#[from] DecodeError),
	#[error("document is too large ({size} bytes)")]
	TooLarge { size: u64 },
}

/// What happened to the entries of an archive.
#[derive(Debug, Default)]
pub struct IngestionReport {
	/// Documents which decoded into a release.
	pub decoded: usize,
	/// Decoded releases that weren't already in the catalog.
	pub inserted: usize,
	/// Decoded releases that took the place of one from the base catalog.
	pub replaced: usize,
	/// Total decode warnings across all documents.
	pub warnings: usize,
	/// Entries that were skipped, always [`IngestionError::EntryDecodeFailed`].
	pub failures: Vec<IngestionError>,
}

impl IngestionReport {
	fn absorb(&mut self, other: IngestionReport) {
		self.decoded += other.decoded;
		self.inserted += other.inserted;
		self.replaced += other.replaced;
		self.warnings += other.warnings;
		self.failures.extend(other.failures);
	}
}

/// Gets the metadata archive as bytes.
pub async fn fetch_archive(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, IngestionError> {
	log::info!("Fetching metadata archive from {}", url);
	let bytes = client
		.get(url)
		.send()
		.await?
		.error_for_status()?
		.bytes()
		.await?;
	log::debug!("Fetched {} bytes of metadata.", bytes.len());
	Ok(bytes.to_vec())
}

/// Releases decoded during one ingestion, keyed by identifier and version.
///
/// When two entries hold the same release the one earliest in the archive is kept,
/// so the outcome doesn't depend on which worker gets there first.
#[derive(Debug, Default)]
struct Staging {
	releases: HashMap<(String, VersionValue), (usize, Release)>,
}

impl Staging {
	fn insert(&mut self, index: usize, release: Release) {
		match self.releases.entry((release.package_id.clone(), release.version.clone())) {
			Entry::Vacant(slot) => { slot.insert((index, release)); },
			Entry::Occupied(mut slot) => {
				log::debug!("Release {} appears more than once in the archive, keeping the first.", release);
				if index < slot.get().0 {
					slot.insert((index, release));
				}
			},
		}
	}

	/// Applies the staged releases over a copy of `base`, in archive order.
	///
	/// A staged release takes the place of the base release with the same identifier and version.
	fn apply(self, base: &Catalog, report: &mut IngestionReport) -> Catalog {
		let mut releases = self.releases.into_values().collect::<Vec<_>>();
		releases.sort_unstable_by_key(|(index, _)| *index);

		let mut catalog = base.clone();
		for (_, release) in releases {
			match catalog.replace_release(release) {
				Some(previous) => {
					log::trace!("Replaced {} from the previous catalog.", previous);
					report.replaced += 1;
				},
				None => report.inserted += 1,
			}
		}
		catalog
	}
}

/// Decodes every release document in `bytes` and merges them into a copy of `base`.
///
/// `base` is never modified, the caller publishes the returned catalog in one assignment.
/// Releases from the archive replace the ones in `base` with the same identifier and version.
///
/// # Errors
/// - [`IngestionError::ArchiveUnreadable`] when `bytes` isn't a zip archive.
/// - [`IngestionError::WorkerFailed`] when a decode task panicked.
///
/// A document that fails to decode is logged, recorded in the report and skipped.
pub async fn ingest_archive(bytes: impl Into<Arc<[u8]>>, base: &Catalog, mode: IngestionMode) -> Result<(Catalog, IngestionReport), IngestionError> {
	let archive = zip::ZipArchive::new(Cursor::new(bytes.into()))?;
	let indices = release_entries(&archive)?;
	log::info!("Ingesting {} metadata documents ({:?})", indices.len(), mode);

	let (staging, mut report) = match mode {
		IngestionMode::Sequential => {
			tokio::task::spawn_blocking(move || decode_sequential(archive, &indices)).await?
		},
		IngestionMode::Concurrent { workers } => decode_concurrent(archive, indices, workers).await?,
	};
	let catalog = staging.apply(base, &mut report);

	log::info!(
		"Ingestion finished: {} decoded, {} new, {} replaced, {} failed, {} warnings",
		report.decoded, report.inserted, report.replaced, report.failures.len(), report.warnings,
	);
	Ok((catalog, report))
}

fn decode_sequential(mut archive: Archive, indices: &[usize]) -> (Staging, IngestionReport) {
	let mut staging = Staging::default();
	let mut report = IngestionReport::default();
	for &index in indices {
		if let Some(release) = decode_entry(&mut archive, index, &mut report) {
			staging.insert(index, release);
		}
	}
	(staging, report)
}

async fn decode_concurrent(archive: Archive, indices: Vec<usize>, workers: usize) -> Result<(Staging, IngestionReport), IngestionError> {
	let workers = workers.clamp(1, indices.len().max(1));
	let indices = Arc::<[usize]>::from(indices);
	let staging = Arc::new(Mutex::new(Staging::default()));

	let handles = (0..workers).map(|worker| {
		/* Each worker reads through its own handle, the parsed central directory is shared */
		let mut archive = archive.clone();
		let indices = indices.clone();
		let staging = staging.clone();
		tokio::task::spawn_blocking(move || {
			let mut report = IngestionReport::default();
			for &index in indices.iter().skip(worker).step_by(workers) {
				if let Some(release) = decode_entry(&mut archive, index, &mut report) {
					staging.lock().unwrap_or_else(PoisonError::into_inner).insert(index, release);
				}
			}
			report
		})
	}).collect::<Vec<_>>();

	/* Barrier, nothing is published until every worker is done */
	let mut report = IngestionReport::default();
	for handle in handles {
		report.absorb(handle.await?);
	}

	let staging = match Arc::try_unwrap(staging) {
		Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
		Err(shared) => std::mem::take(&mut *shared.lock().unwrap_or_else(PoisonError::into_inner)),
	};
	Ok((staging, report))
}

/// Reads and decodes one entry, recording the outcome in `report`.
fn decode_entry(archive: &mut Archive, index: usize, report: &mut IngestionReport) -> Option<Release> {
	let mut path = format!("#{}", index);
	let result = (|| -> Result<(Release, usize), EntryError> {
		let mut file = archive.by_index(index)?;
		path = file.name().to_string();
		/* The declared size is only a hint, the read itself is capped too */
		if file.size() > MAX_DOCUMENT_SIZE {
			return Err(EntryError::TooLarge { size: file.size() });
		}
		let mut buf = Vec::<u8>::with_capacity(file.size().min(64 * 1024) as usize);
		file.by_ref().take(MAX_DOCUMENT_SIZE + 1).read_to_end(&mut buf)?;
		if buf.len() as u64 > MAX_DOCUMENT_SIZE {
			return Err(EntryError::TooLarge { size: buf.len() as u64 });
		}
		let mut diagnostics = Diagnostics::new(path.clone());
		let release = read_release(&buf, &mut diagnostics)?;
		Ok((release, diagnostics.warnings().len()))
	})();

	match result {
		Ok((release, warnings)) => {
			log::trace!("Decoded {} from {}", release, path);
			report.decoded += 1;
			report.warnings += warnings;
			Some(release)
		},
		Err(cause) => {
			let e = IngestionError::EntryDecodeFailed { path, cause };
			log::warn!("{}", e);
			report.failures.push(e);
			None
		},
	}
}

/// Finds the archive's wrapper directory, the first path component shared by every entry.
///
/// An archive with entries at its root has no wrapper.
fn wrapper_directory(names: &[&str]) -> Option<String> {
	let first = names.first()?.split('/').next()?;
	let wrapped = names.iter().all(|name| {
		let mut components = name.split('/');
		components.next() == Some(first) && components.next().is_some()
	});
	wrapped.then(|| first.to_string())
}

/// Indices of the entries holding release documents.
///
/// Directories, symlinks and files directly inside the wrapper are skipped.
fn release_entries(archive: &Archive) -> Result<Vec<usize>, zip::result::ZipError> {
	const S_IFMT: u32 = 0o170000;
	const S_IFLNK: u32 = 0o120000;

	let mut archive = archive.clone();
	let mut entries = Vec::<(usize, String, bool)>::with_capacity(archive.len());
	for i in 0..archive.len() {
		let file = archive.by_index_raw(i)?;
		let is_symlink = file.unix_mode().map_or(false, |mode| mode & S_IFMT == S_IFLNK);
		entries.push((i, file.name().to_string(), file.is_dir() || is_symlink));
	}

	let names = entries.iter().map(|(_, name, _)| name.as_str()).collect::<Vec<_>>();
	let wrapper = wrapper_directory(&names);
	if let Some(wrapper) = &wrapper {
		log::debug!("Metadata archive wrapper is {}", wrapper);
	}

	Ok(entries.into_iter()
		.filter(|(_, name, skip)| {
			if *skip {
				return false
			}
			let parent = name.rsplit_once('/').map(|(parent, _)| parent);
			match &wrapper {
				Some(wrapper) => parent != Some(wrapper.as_str()),
				None => true,
			}
		})
		.map(|(i, _, _)| i)
		.collect())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test] fn wrapper_is_common_first_component() { assert_eq!(wrapper_directory(&["CKAN-meta-master/", "CKAN-meta-master/FAR/a.ckan"]), Some("CKAN-meta-master".into())) }
	#[test] fn root_files_mean_no_wrapper() { assert_eq!(wrapper_directory(&["FAR/a.ckan", "README.md"]), None) }
	#[test] fn different_roots_mean_no_wrapper() { assert_eq!(wrapper_directory(&["A/a.ckan", "B/b.ckan"]), None) }
	#[test] fn empty_archive_has_no_wrapper() { assert_eq!(wrapper_directory(&[]), None) }
}
