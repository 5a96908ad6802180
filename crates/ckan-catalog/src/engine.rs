//! The engine owns the published catalog and the install targets.
//!
//! Frontends hold an [`Engine`] (usually in an `Arc`), call its operations and [`subscribe()`](Engine::subscribe) to
//! [`EngineEvent`]s to know when to redraw.
//!
//! The catalog is only ever replaced whole, readers holding an `Arc<Catalog>` from [`Engine::catalog()`] keep seeing
//! the catalog as it was when they got it.

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::{Config, Catalog, Release, Target};
use crate::metadb::{IngestionError, IngestionReport};
use crate::installation::{self, ArchiveIndex, InstallMapping};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
	CatalogUpdated,
	CatalogUpdateFailed(String),
	TargetsUpdated,
}

/// State of the catalog refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CycleState {
	#[default] Idle,
	Running,
	/// The last refresh failed, the published catalog is the one from before it. Another refresh may be started.
	Failed(String),
}

#[derive(Debug)]
pub enum RefreshOutcome {
	/// A new catalog was published.
	Updated(IngestionReport),
	/// Another refresh was running, this request was dropped.
	AlreadyRunning,
}

#[derive(Debug)]
struct EngineState {
	catalog: Arc<Catalog>,
	cycle: CycleState,
	targets: Vec<Target>,
}

#[derive(Debug)]
pub struct Engine {
	config: Config,
	client: reqwest::Client,
	events: broadcast::Sender<EngineEvent>,
	/* Catalog, cycle and targets change together so they share a lock */
	state: Mutex<EngineState>,
}

impl Engine {
	/// Creates an engine starting from the cached catalog in `data_dir`, or an empty one.
	///
	/// # Errors
	/// - [`Reqwest`](crate::error::Error::Reqwest) when the HTTP client can't be built.
	pub fn new(config: Config) -> crate::Result<Self> {
		let catalog = match Catalog::load_from_disk(&config) {
			Ok(catalog) => {
				log::info!("Loaded cached catalog with {} packages.", catalog.len());
				catalog
			},
			Err(crate::Error::IO(e)) if e.kind() == std::io::ErrorKind::NotFound => {
				log::debug!("No cached catalog, starting empty.");
				Catalog::new()
			},
			Err(e) => {
				log::warn!("Failed to read cached catalog, starting empty: {}", e);
				Catalog::new()
			},
		};
		Self::with_catalog(config, catalog)
	}

	/// Creates an engine publishing `catalog`, the cache is not read.
	pub fn with_catalog(config: Config, catalog: Catalog) -> crate::Result<Self> {
		let client = config.build_client()?;
		let (events, _) = broadcast::channel(16);
		Ok(Self {
			config,
			client,
			events,
			state: Mutex::new(EngineState {
				catalog: Arc::new(catalog),
				cycle: CycleState::Idle,
				targets: Vec::new(),
			}),
		})
	}

	fn state(&self) -> MutexGuard<'_, EngineState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn emit(&self, event: EngineEvent) {
		if self.events.send(event.clone()).is_err() {
			log::trace!("No subscribers for {:?}", event);
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
		self.events.subscribe()
	}

	/// A snapshot of the published catalog.
	pub fn catalog(&self) -> Arc<Catalog> {
		self.state().catalog.clone()
	}

	pub fn cycle_state(&self) -> CycleState {
		self.state().cycle.clone()
	}

	/* Targets */

	pub fn targets(&self) -> Vec<Target> {
		self.state().targets.clone()
	}

	/// Adds targets whose names aren't already taken.
	///
	/// # Returns
	/// The number of targets added.
	pub fn add_targets(&self, targets: impl IntoIterator<Item = Target>) -> usize {
		let added = {
			let mut state = self.state();
			let mut added = 0;
			for target in targets {
				if state.targets.iter().any(|t| t.name() == target.name()) {
					log::warn!("A target named {} already exists, ignoring.", target.name());
					continue;
				}
				log::debug!("Adding target {} at {}", target.name(), target.path().display());
				state.targets.push(target);
				added += 1;
			}
			added
		};
		if added > 0 {
			self.emit(EngineEvent::TargetsUpdated);
		}
		added
	}

	/* Catalog */

	/// Downloads the metadata archive and publishes a catalog with its releases merged in.
	///
	/// # Errors
	/// Fetch and archive failures, the published catalog is left as it was and the cycle state becomes [`CycleState::Failed`].
	pub async fn refresh_catalog(&self) -> crate::Result<RefreshOutcome> {
		let client = &self.client;
		let url = self.config.metadata_url();
		self.run_cycle(async move { crate::metadb::fetch_archive(client, url).await }).await
	}

	/// Same as [`refresh_catalog()`](Engine::refresh_catalog) using an archive that's already in memory.
	pub async fn refresh_catalog_from(&self, archive: Vec<u8>) -> crate::Result<RefreshOutcome> {
		self.run_cycle(async move { Ok(archive) }).await
	}

	/// Runs [`refresh_catalog()`](Engine::refresh_catalog) on the runtime without waiting for it.
	pub fn spawn_refresh(self: &Arc<Self>) -> tokio::task::JoinHandle<crate::Result<RefreshOutcome>> {
		let engine = self.clone();
		tokio::spawn(async move { engine.refresh_catalog().await })
	}

	async fn run_cycle(&self, archive: impl Future<Output = Result<Vec<u8>, IngestionError>>) -> crate::Result<RefreshOutcome> {
		/* Checking and setting happen under one lock so two refreshes can't both start */
		let base = {
			let mut state = self.state();
			if state.cycle == CycleState::Running {
				log::info!("Catalog refresh already running, ignoring request.");
				return Ok(RefreshOutcome::AlreadyRunning);
			}
			state.cycle = CycleState::Running;
			state.catalog.clone()
		};
		let mut guard = CycleGuard { engine: self, finished: false };

		let result = async {
			let bytes = archive.await?;
			crate::metadb::ingest_archive(bytes, &base, self.config.ingestion_mode()).await
		}.await;

		match result {
			Ok((catalog, report)) => {
				let catalog = Arc::new(catalog);
				{
					let mut state = self.state();
					state.catalog = catalog.clone();
					state.cycle = CycleState::Idle;
				}
				guard.finished = true;
				log::info!("Published catalog with {} packages.", catalog.len());
				self.emit(EngineEvent::CatalogUpdated);
				self.save_catalog(catalog).await;
				Ok(RefreshOutcome::Updated(report))
			},
			Err(e) => {
				log::error!("Catalog refresh failed: {}", e);
				self.fail_cycle(e.to_string());
				guard.finished = true;
				Err(e.into())
			},
		}
	}

	fn fail_cycle(&self, reason: String) {
		self.state().cycle = CycleState::Failed(reason.clone());
		self.emit(EngineEvent::CatalogUpdateFailed(reason));
	}

	async fn save_catalog(&self, catalog: Arc<Catalog>) {
		let config = self.config.clone();
		match tokio::task::spawn_blocking(move || catalog.save_to_disk(&config)).await {
			Ok(Ok(())) => {},
			Ok(Err(e)) => log::warn!("Failed to cache catalog: {}", e),
			Err(e) => log::warn!("Failed to cache catalog: {}", e),
		}
	}

	/* Installation */

	/// Downloads a release and works out where its files go in `targets`.
	pub async fn resolve_install(&self, release: &Release, targets: &[Target]) -> crate::Result<Vec<InstallMapping>> {
		let (_, mappings) = self.prepare_install(release, targets).await?;
		Ok(mappings)
	}

	async fn prepare_install(&self, release: &Release, targets: &[Target]) -> crate::Result<(zip::ZipArchive<std::fs::File>, Vec<InstallMapping>)> {
		if !release.is_installable() {
			return Err(installation::InstallError::NotInstallable(release.to_string()).into());
		}
		let path = installation::download::download_release(&self.config, &self.client, release, false).await?;

		let release = release.clone();
		let targets = targets.to_vec();
		tokio::task::spawn_blocking(move || {
			let mut archive = zip::ZipArchive::new(std::fs::File::open(path)?)?;
			let index = ArchiveIndex::from_zip(&mut archive)?;
			let mappings = installation::resolve_install(&release, &index, &targets)?;
			Ok::<_, crate::Error>((archive, mappings))
		}).await?
	}

	/// Installs each release into every target.
	///
	/// # Returns
	/// Each release with the files written for it or the reason it failed, one failing doesn't stop the others.
	pub async fn install_releases(&self, releases: &[Release]) -> Vec<(Release, crate::Result<Vec<PathBuf>>)> {
		let targets = self.targets();
		if targets.is_empty() {
			log::warn!("No targets to install into.");
		}

		let mut results = Vec::<(Release, crate::Result<Vec<PathBuf>>)>::with_capacity(releases.len());
		for release in releases {
			let result = async {
				let (mut archive, mappings) = self.prepare_install(release, &targets).await?;
				let written = tokio::task::spawn_blocking(move || installation::content::extract_mappings(&mut archive, &mappings)).await??;
				log::info!("Installed {} files for {}", written.len(), release);
				Ok::<_, crate::Error>(written)
			}.await;
			if let Err(e) = &result {
				log::error!("Failed to install {}: {}", release, e);
			}
			results.push((release.clone(), result));
		}
		results
	}
}

/// Fails a cycle that was dropped before it finished, so it doesn't stay [`CycleState::Running`].
struct CycleGuard<'a> {
	engine: &'a Engine,
	finished: bool,
}

impl Drop for CycleGuard<'_> {
	fn drop(&mut self) {
		if !self.finished {
			log::warn!("Catalog refresh was cancelled.");
			self.engine.fail_cycle("refresh was cancelled".to_string());
		}
	}
}
