use ckan_catalog::{Engine, IngestionMode, Target};
use ckan_catalog::metadb::package::RelationshipKind;

#[tokio::main]
async fn main() {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",       "Show help");
		opts.optflag( "v", "verbose",    "Increased vebosity");
		opts.optflag( "s", "sequential", "Decode the metadata archive on a single worker");
		opts.optopt(  "u", "url",        "Metadata archive to download", "URL");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); return }
		};

		if parsed_options.opt_present("h") || parsed_options.free.is_empty() {
			eprintln!("{}", opts.usage("Usage: ckan-catalog-terminal [options] refresh | list | show <id> | install <game-dir> <id> [version]"));
			return;
		}

		parsed_options
	};

	let level = if parsed_options.opt_present("v") { log::LevelFilter::Debug } else { log::LevelFilter::Info };
	env_logger::Builder::new().filter_level(level).parse_default_env().init();

	let mut config = ckan_catalog::Config::default();
	if parsed_options.opt_present("s") {
		config.set_ingestion_mode(IngestionMode::Sequential);
	}
	if let Some(url) = parsed_options.opt_str("u") {
		config.set_metadata_url(url);
	}

	let engine = match Engine::new(config) {
		Ok(engine) => engine,
		Err(e) => { log::error!("Failed to start: {}", e); return },
	};

	let free = &parsed_options.free;
	let result = match free[0].as_str() {
		"refresh" => refresh(&engine).await,
		"list" => list(&engine),
		"show" => match free.get(1) {
			Some(id) => show(&engine, id),
			None => Err(Error::MissingArgument("package identifier")),
		},
		"install" => match (free.get(1), free.get(2)) {
			(Some(dir), Some(id)) => install(&engine, dir, id, free.get(3).map(String::as_str)).await,
			(None, _) => Err(Error::MissingArgument("game directory")),
			(_, None) => Err(Error::MissingArgument("package identifier")),
		},
		other => Err(Error::UnknownCommand(other.to_string())),
	};

	if let Err(e) = result {
		log::error!("{}", e);
		std::process::exit(1);
	}
}

async fn refresh(engine: &Engine) -> Result<(), Error> {
	match engine.refresh_catalog().await? {
		ckan_catalog::engine::RefreshOutcome::Updated(report) => {
			println!("Decoded {} releases, {} new, {} updated.", report.decoded, report.inserted, report.replaced);
			if !report.failures.is_empty() {
				println!("{} documents failed to decode:", report.failures.len());
				for failure in &report.failures {
					println!("\t{}", failure);
				}
			}
			println!("Catalog has {} packages.", engine.catalog().len());
		},
		ckan_catalog::engine::RefreshOutcome::AlreadyRunning => println!("A refresh is already running."),
	}
	Ok(())
}

fn list(engine: &Engine) -> Result<(), Error> {
	let catalog = engine.catalog();
	if catalog.is_empty() {
		println!("Catalog is empty, run `refresh` first.");
	}
	for package in catalog.packages() {
		if let Some(latest) = package.latest() {
			println!("{}\t{}", latest, latest.blurb);
		}
	}
	Ok(())
}

fn show(engine: &Engine, id: &str) -> Result<(), Error> {
	let catalog = engine.catalog();
	let package = catalog.get(id).ok_or_else(|| ckan_catalog::Error::MissingPackage(id.to_string()))?;
	let Some(latest) = package.latest() else { return Ok(()) };

	println!("{} ({})", latest.name, package.id());
	println!("\t{}", latest.blurb);
	println!("\tLicense: {}", latest.licenses.join(", "));
	for kind in RelationshipKind::ALL {
		if let Some(expr) = latest.relationship(kind) {
			println!("\t{}: {}", kind.key(), expr);
		}
	}
	println!("\tVersions:");
	let mut releases = package.releases().iter().collect::<Vec<_>>();
	releases.sort_by(|a, b| b.version.cmp(&a.version));
	for release in releases {
		println!("\t\t{}", release.version.original().unwrap_or_default());
	}
	Ok(())
}

async fn install(engine: &Engine, dir: &str, id: &str, version: Option<&str>) -> Result<(), Error> {
	let target = Target::new("cli", dir)?;
	engine.add_targets([target]);

	let catalog = engine.catalog();
	let release = match version {
		Some(version) => catalog.get_release(id, version),
		None => catalog.get(id).and_then(|p| p.latest()),
	}.ok_or_else(|| ckan_catalog::Error::MissingPackage(id.to_string()))?;

	for (release, result) in engine.install_releases(&[release.clone()]).await {
		let written = result?;
		println!("Installed {} ({} files)", release, written.len());
	}
	Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("CKAN catalog error: {0}")]
	Catalog(#[from] ckan_catalog::Error),
	#[error("Missing argument: {0}")]
	MissingArgument(&'static str),
	#[error("Unknown command: {0}")]
	UnknownCommand(String),
}
