//! Writing resolved files to their destinations.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use super::{InstallError, InstallMapping};

fn extract_failed(path: &Path) -> impl FnOnce(std::io::Error) -> InstallError + '_ {
	move |cause| InstallError::ExtractFailed { path: path.to_path_buf(), cause }
}

/// Extracts every mapped entry of a zip archive.
///
/// # Returns
/// The destinations written to.
///
/// # Errors
/// [`InstallError::ExtractFailed`] on the first file that can't be read or written, files already written are left in place.
pub fn extract_mappings<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, mappings: &[InstallMapping]) -> Result<Vec<PathBuf>, InstallError> {
	let mut written = Vec::<PathBuf>::with_capacity(mappings.len());
	for mapping in mappings {
		let destination = &mapping.destination;
		log::trace!("Extracting {} to {}", mapping.source, destination.display());

		let mut file = archive.by_name(&mapping.source)
			.map_err(std::io::Error::from)
			.map_err(extract_failed(destination))?;
		if let Some(parent) = destination.parent() {
			std::fs::create_dir_all(parent).map_err(extract_failed(destination))?;
		}
		let mut out = std::fs::File::create(destination).map_err(extract_failed(destination))?;
		std::io::copy(&mut file, &mut out).map_err(extract_failed(destination))?;

		written.push(destination.clone());
	}
	Ok(written)
}

/// Copies every mapped entry out of an already extracted archive at `root`.
///
/// # Errors
/// [`InstallError::ExtractFailed`] on the first file that can't be copied.
pub fn copy_mappings(root: impl AsRef<Path>, mappings: &[InstallMapping]) -> Result<Vec<PathBuf>, InstallError> {
	let root = root.as_ref();
	let mut written = Vec::<PathBuf>::with_capacity(mappings.len());
	for mapping in mappings {
		let destination = &mapping.destination;
		if let Some(parent) = destination.parent() {
			std::fs::create_dir_all(parent).map_err(extract_failed(destination))?;
		}
		std::fs::copy(root.join(&mapping.source), destination).map_err(extract_failed(destination))?;
		written.push(destination.clone());
	}
	Ok(written)
}
