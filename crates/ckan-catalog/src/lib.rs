pub mod error;
pub use error::Result;
pub use error::Error;

pub mod metadb;
pub use metadb::Catalog;
pub use metadb::Release;

pub mod config;
pub use config::Config;
pub use config::IngestionMode;

pub mod installation;
pub mod game_instance;
pub use game_instance::Target;

pub mod engine;
pub use engine::Engine;
pub use engine::EngineEvent;
