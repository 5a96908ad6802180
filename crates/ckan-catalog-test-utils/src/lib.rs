//! Various helper functions for testing
//!
//! functions in this module should use results and not use any panics to avoid confusion in callers

use std::io::{Cursor, Write};

/// Builds a zip archive in memory.
///
/// Names ending in `/` are added as directories, everything else as a file with the given content.
pub fn build_zip<N: AsRef<str>, C: AsRef<[u8]>>(entries: impl IntoIterator<Item = (N, C)>) -> zip::result::ZipResult<Vec<u8>> {
	let mut writer = zip::ZipWriter::new(Cursor::new(Vec::<u8>::new()));
	let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
	for (name, content) in entries {
		let name = name.as_ref();
		if name.ends_with('/') {
			writer.add_directory(name, options)?;
		} else {
			writer.start_file(name, options)?;
			writer.write_all(content.as_ref())?;
		}
	}
	Ok(writer.finish()?.into_inner())
}

/// A minimal valid release document.
pub fn release_json(identifier: &str, version: &str) -> serde_json::Value {
	serde_json::json!({
		"spec_version": "v1.4",
		"identifier": identifier,
		"name": identifier,
		"abstract": format!("The {} mod", identifier),
		"license": "MIT",
		"version": version,
		"download": format!("https://example.com/{}-{}.zip", identifier, version),
	})
}

/// Builds a CKAN-meta style archive, documents are stored as `CKAN-meta-master/<identifier>/<identifier>-<n>.ckan`.
///
/// The wrapper also gets a readme and a `builds.json` like the real archive.
pub fn build_meta_archive(documents: &[serde_json::Value]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
	let mut entries = vec![
		("CKAN-meta-master/".to_string(), Vec::new()),
		("CKAN-meta-master/README.md".to_string(), b"# CKAN-meta".to_vec()),
		("CKAN-meta-master/builds.json".to_string(), b"{ \"builds\": {} }".to_vec()),
	];
	for (i, document) in documents.iter().enumerate() {
		let identifier = document.get("identifier").and_then(|v| v.as_str()).unwrap_or("unknown");
		entries.push((format!("CKAN-meta-master/{}/{}-{}.ckan", identifier, identifier, i), serde_json::to_vec_pretty(document)?));
	}
	Ok(build_zip(entries)?)
}

/// Writes `archive` to a new temporary directory, returning the directory and the archive's path.
pub fn write_temp_archive(archive: &[u8]) -> std::io::Result<(tempfile::TempDir, std::path::PathBuf)> {
	let dir = tempfile::tempdir()?;
	let path = dir.path().join("archive.zip");
	std::fs::write(&path, archive)?;
	Ok((dir, path))
}
