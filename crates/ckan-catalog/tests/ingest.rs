use std::io::Write;
use std::sync::{Arc, Mutex};

use ckan_catalog::{Catalog, Config, Engine, EngineEvent, IngestionMode};
use ckan_catalog::engine::{CycleState, RefreshOutcome};
use ckan_catalog::metadb::{ingest_archive, IngestionError};
use ckan_catalog::metadb::generation::EntryError;
use ckan_catalog_test_utils::{build_meta_archive, build_zip, release_json};

fn init_logs() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// Packages and their sorted release versions.
fn summary(catalog: &Catalog) -> Vec<(String, Vec<String>)> {
	catalog.packages()
		.map(|p| {
			let mut versions = p.releases().iter().map(|r| r.version.original().unwrap_or_default().to_string()).collect::<Vec<_>>();
			versions.sort();
			(p.id().to_string(), versions)
		})
		.collect()
}

fn documents() -> Vec<serde_json::Value> {
	let mut depends_on_mm = release_json("KerbalEngineer", "1.1.9.0");
	depends_on_mm["depends"] = serde_json::json!([{ "name": "ModuleManager", "min_version": "4.0" }]);

	let mut broken = release_json("Broken", "1.0");
	broken.as_object_mut().unwrap().remove("license");

	vec![
		release_json("FAR", "1:0.16.1.1"),
		release_json("FAR", "1:0.16.1.2"),
		release_json("ModuleManager", "4.2.3"),
		depends_on_mm,
		broken,
		release_json("FAR", "1:0.16.1.2"),
	]
}

fn test_config(data_dir: &std::path::Path) -> Config {
	let mut config = Config::default();
	config.set_https_only(false);
	config.set_data_dir(data_dir.to_path_buf());
	config.set_download_dir(data_dir.join("downloads"));
	config
}

#[tokio::test]
async fn same_identifier_gives_one_package() {
	init_logs();
	let archive = build_meta_archive(&documents()).unwrap();
	let (catalog, report) = ingest_archive(archive, &Catalog::new(), IngestionMode::Sequential).await.unwrap();

	let far = catalog.get("FAR").unwrap();
	assert_eq!(far.releases().len(), 2);
	assert_eq!(catalog.len(), 3);
	assert_eq!(report.decoded, 5);
	assert_eq!(report.inserted, 4);
	assert_eq!(report.failures.len(), 1);
	assert!(matches!(&report.failures[0], IngestionError::EntryDecodeFailed { path, .. } if path.contains("Broken")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sequential_and_concurrent_agree() {
	init_logs();
	let mut docs = documents();
	for i in 0..200 {
		docs.push(release_json(&format!("Mod{}", i % 37), &format!("1.{}", i)));
	}
	let archive = build_meta_archive(&docs).unwrap();

	let (sequential, seq_report) = ingest_archive(archive.clone(), &Catalog::new(), IngestionMode::Sequential).await.unwrap();
	for workers in [1, 3, 8] {
		let (concurrent, report) = ingest_archive(archive.clone(), &Catalog::new(), IngestionMode::Concurrent { workers }).await.unwrap();
		assert_eq!(summary(&concurrent), summary(&sequential));
		assert_eq!(report.decoded, seq_report.decoded);
		assert_eq!(report.inserted, seq_report.inserted);
		assert_eq!(report.failures.len(), seq_report.failures.len());
	}
}

#[tokio::test]
async fn staging_starts_from_base() {
	let first = build_meta_archive(&[release_json("A", "1.0")]).unwrap();
	let second = build_meta_archive(&[release_json("A", "2.0"), release_json("B", "1.0")]).unwrap();

	let (base, _) = ingest_archive(first, &Catalog::new(), IngestionMode::Sequential).await.unwrap();
	let (merged, _) = ingest_archive(second, &base, IngestionMode::Concurrent { workers: 2 }).await.unwrap();

	assert_eq!(base.len(), 1);
	assert_eq!(summary(&merged), vec![
		("A".to_string(), vec!["1.0".to_string(), "2.0".to_string()]),
		("B".to_string(), vec!["1.0".to_string()]),
	]);
}

fn far_with_download(url: &str) -> serde_json::Value {
	let mut doc = release_json("FAR", "1.0");
	doc["download"] = serde_json::json!(url);
	doc
}

fn far_download(catalog: &Catalog) -> Option<String> {
	catalog.get_release("FAR", "1.0")?.download.clone()
}

#[tokio::test]
async fn edited_document_replaces_previous_release() {
	let first = build_meta_archive(&[far_with_download("https://old.example/FAR.zip"), release_json("A", "1.0")]).unwrap();
	let second = build_meta_archive(&[far_with_download("https://fixed.example/FAR.zip")]).unwrap();

	let (base, _) = ingest_archive(first, &Catalog::new(), IngestionMode::Sequential).await.unwrap();
	for mode in [IngestionMode::Sequential, IngestionMode::Concurrent { workers: 2 }] {
		let (updated, report) = ingest_archive(second.clone(), &base, mode).await.unwrap();
		assert_eq!(far_download(&updated).as_deref(), Some("https://fixed.example/FAR.zip"));
		assert_eq!(updated.get("FAR").unwrap().releases().len(), 1);
		assert_eq!(updated.get("A").unwrap().releases().len(), 1);
		assert_eq!((report.inserted, report.replaced), (0, 1));
	}
	assert_eq!(far_download(&base).as_deref(), Some("https://old.example/FAR.zip"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_documents_keep_the_first_entry() {
	let mut docs = vec![far_with_download("https://first.example/FAR.zip")];
	for i in 0..20 {
		docs.push(release_json(&format!("Mod{}", i), "1.0"));
		docs.push(far_with_download(&format!("https://later{}.example/FAR.zip", i)));
	}
	let archive = build_meta_archive(&docs).unwrap();

	let modes = [IngestionMode::Sequential, IngestionMode::Concurrent { workers: 1 }, IngestionMode::Concurrent { workers: 3 }, IngestionMode::Concurrent { workers: 8 }];
	for mode in modes {
		let (catalog, report) = ingest_archive(archive.clone(), &Catalog::new(), mode).await.unwrap();
		assert_eq!(far_download(&catalog).as_deref(), Some("https://first.example/FAR.zip"), "{:?}", mode);
		assert_eq!(report.decoded, 41);
		assert_eq!(report.inserted, 21);
	}
}

#[tokio::test]
async fn oversized_document_is_skipped() {
	/* Valid JSON, just padded past the limit */
	let mut padded = vec![b' '; ckan_catalog::metadb::generation::MAX_DOCUMENT_SIZE as usize];
	padded.extend(serde_json::to_vec(&release_json("Big", "1.0")).unwrap());
	let archive = build_zip([
		("CKAN-meta-master/A/A-1.ckan", serde_json::to_vec(&release_json("A", "1.0")).unwrap()),
		("CKAN-meta-master/Big/Big-1.ckan", padded),
	]).unwrap();

	let (catalog, report) = ingest_archive(archive, &Catalog::new(), IngestionMode::Concurrent { workers: 2 }).await.unwrap();
	assert_eq!(catalog.len(), 1);
	assert!(catalog.get("Big").is_none());
	assert_eq!(report.failures.len(), 1);
	assert!(matches!(
		&report.failures[0],
		IngestionError::EntryDecodeFailed { path, cause: EntryError::TooLarge { .. } } if path.contains("Big")
	));
}

#[tokio::test]
async fn wrapper_files_and_directories_are_skipped() {
	let archive = build_zip([
		("CKAN-meta-master/", Vec::new()),
		("CKAN-meta-master/README.md", b"not json".to_vec()),
		("CKAN-meta-master/A/", Vec::new()),
		("CKAN-meta-master/A/A-1.ckan", serde_json::to_vec(&release_json("A", "1.0")).unwrap()),
	]).unwrap();
	let (catalog, report) = ingest_archive(archive, &Catalog::new(), IngestionMode::Sequential).await.unwrap();
	assert_eq!(catalog.len(), 1);
	assert!(report.failures.is_empty());
}

#[tokio::test]
async fn unreadable_archive_fails() {
	let result = ingest_archive(b"PK nope".to_vec(), &Catalog::new(), IngestionMode::Sequential).await;
	assert!(matches!(result, Err(IngestionError::ArchiveUnreadable(_))));
}

#[tokio::test]
async fn refresh_fetches_and_publishes() {
	init_logs();
	let dir = tempfile::tempdir().unwrap();
	let mut server = mockito::Server::new_async().await;
	let mock = server.mock("GET", "/master.zip")
		.with_status(200)
		.with_body(build_meta_archive(&documents()).unwrap())
		.create_async()
		.await;

	let mut config = test_config(dir.path());
	config.set_metadata_url(format!("{}/master.zip", server.url()));
	let engine = Engine::with_catalog(config, Catalog::new()).unwrap();
	let mut events = engine.subscribe();

	let snapshot = engine.catalog();
	let outcome = engine.refresh_catalog().await.unwrap();

	mock.assert_async().await;
	assert!(matches!(outcome, RefreshOutcome::Updated(report) if report.decoded == 5));
	assert_eq!(events.recv().await.unwrap(), EngineEvent::CatalogUpdated);
	assert_eq!(engine.cycle_state(), CycleState::Idle);
	assert!(snapshot.is_empty());
	assert_eq!(engine.catalog().len(), 3);

	/* The published catalog was cached and a new engine picks it up */
	assert!(dir.path().join("catalog.bin").exists());
	let reloaded = Engine::new(engine.config().clone()).unwrap();
	assert_eq!(summary(&reloaded.catalog()), summary(&engine.catalog()));
}

#[tokio::test]
async fn failed_fetch_leaves_catalog_untouched() {
	let dir = tempfile::tempdir().unwrap();
	let mut server = mockito::Server::new_async().await;
	let failing = server.mock("GET", "/master.zip")
		.with_status(500)
		.create_async()
		.await;

	let mut config = test_config(dir.path());
	config.set_metadata_url(format!("{}/master.zip", server.url()));
	let mut existing = Catalog::new();
	existing.insert_release(ckan_catalog::Release::new("Old", "1.0".parse().unwrap()));
	let engine = Engine::with_catalog(config, existing).unwrap();
	let mut events = engine.subscribe();

	let result = engine.refresh_catalog().await;
	failing.assert_async().await;
	assert!(matches!(result, Err(ckan_catalog::Error::Ingestion(IngestionError::FetchFailed(_)))));
	assert!(matches!(engine.cycle_state(), CycleState::Failed(_)));
	assert!(matches!(events.recv().await.unwrap(), EngineEvent::CatalogUpdateFailed(_)));
	assert_eq!(summary(&engine.catalog()), vec![("Old".to_string(), vec!["1.0".to_string()])]);

	/* A failed cycle can be retried */
	failing.remove_async().await;
	server.mock("GET", "/master.zip")
		.with_status(200)
		.with_body(build_meta_archive(&[release_json("New", "1.0")]).unwrap())
		.create_async()
		.await;
	assert!(matches!(engine.refresh_catalog().await.unwrap(), RefreshOutcome::Updated(_)));
	assert_eq!(engine.catalog().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_while_running_is_dropped() {
	let dir = tempfile::tempdir().unwrap();
	let mut server = mockito::Server::new_async().await;

	/* The response is held back until the test releases it */
	let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
	let release_rx = Arc::new(Mutex::new(release_rx));
	let body = build_meta_archive(&[release_json("A", "1.0")]).unwrap();
	server.mock("GET", "/master.zip")
		.with_status(200)
		.with_chunked_body(move |w| {
			let _ = release_rx.lock().unwrap().recv();
			w.write_all(&body)
		})
		.create_async()
		.await;

	let mut config = test_config(dir.path());
	config.set_metadata_url(format!("{}/master.zip", server.url()));
	let engine = Arc::new(Engine::with_catalog(config, Catalog::new()).unwrap());

	let first = engine.spawn_refresh();
	while engine.cycle_state() != CycleState::Running {
		tokio::time::sleep(std::time::Duration::from_millis(5)).await;
	}

	assert!(matches!(engine.refresh_catalog().await.unwrap(), RefreshOutcome::AlreadyRunning));
	assert!(engine.catalog().is_empty());

	release_tx.send(()).unwrap();
	assert!(matches!(first.await.unwrap().unwrap(), RefreshOutcome::Updated(_)));
	assert_eq!(engine.catalog().len(), 1);
	assert_eq!(engine.cycle_state(), CycleState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_refresh_can_be_retried() {
	let dir = tempfile::tempdir().unwrap();
	let mut server = mockito::Server::new_async().await;

	/* Never answers while the sender is alive */
	let (hold_tx, hold_rx) = std::sync::mpsc::channel::<()>();
	let hold_rx = Arc::new(Mutex::new(hold_rx));
	server.mock("GET", "/master.zip")
		.with_status(200)
		.with_chunked_body(move |_| {
			let _ = hold_rx.lock().unwrap().recv();
			Ok(())
		})
		.create_async()
		.await;

	let mut config = test_config(dir.path());
	config.set_metadata_url(format!("{}/master.zip", server.url()));
	let engine = Engine::with_catalog(config, Catalog::new()).unwrap();
	let mut events = engine.subscribe();

	let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), engine.refresh_catalog()).await;
	assert!(timed_out.is_err());
	drop(hold_tx);
	assert!(matches!(engine.cycle_state(), CycleState::Failed(_)));
	assert!(matches!(events.recv().await.unwrap(), EngineEvent::CatalogUpdateFailed(_)));

	let archive = build_meta_archive(&[release_json("A", "1.0")]).unwrap();
	assert!(matches!(engine.refresh_catalog_from(archive).await.unwrap(), RefreshOutcome::Updated(_)));
	assert_eq!(engine.cycle_state(), CycleState::Idle);
	assert_eq!(engine.catalog().len(), 1);
}
