use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing::info;

use imgcache::cache::{ImageStorage, PlaceholderPolicy};
use imgcache::{
  logging, Config, DiskStorage, ImageQuery, NoopStorage, ResolveRequest, Resolver, ResourceId,
  WriteSource,
};

#[derive(Parser, Debug)]
#[command(name = "imgcache")]
#[command(about = "Offline-capable local cache for remote images")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/imgcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Print the URI to display for a resource right now
  Resolve {
    id: String,
    /// URL from the system of record
    #[arg(short, long)]
    authoritative: Option<String>,
    /// Deprecated fallback URL
    #[arg(short, long)]
    legacy: Option<String>,
    /// Wait for the background upgrade and print the cached path too
    #[arg(short, long)]
    wait: bool,
    /// Print JSON instead of plain URIs
    #[arg(long)]
    json: bool,
  },
  /// Download several resources concurrently (ID=URL pairs)
  Prefetch {
    #[arg(required = true, value_name = "ID=URL")]
    entries: Vec<String>,
  },
  /// Store an image from a URL, data: payload or local file
  Write {
    id: String,
    /// Remote URL or data:<mime>;base64,<payload>
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    source: Option<String>,
    /// Read raw image bytes from a file
    #[arg(short, long)]
    file: Option<PathBuf>,
  },
  /// Print the cached path of a resource, failing if absent
  Read { id: String },
  /// Print where a resource would be cached
  Path { id: String },
  /// Remove one cached resource
  Delete { id: String },
  /// Remove every cached resource
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.log_file.as_deref())?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let placeholders = PlaceholderPolicy::from(&config.placeholder);

  if config.cache.enabled {
    let storage = DiskStorage::open(&config)?;
    run(Resolver::new(storage, placeholders), args.command).await
  } else {
    info!("image cache disabled by configuration");
    run(Resolver::new(NoopStorage, placeholders), args.command).await
  }
}

async fn run<S: ImageStorage>(resolver: Resolver<S>, command: Command) -> Result<()> {
  let storage = resolver.storage().clone();

  match command {
    Command::Resolve {
      id,
      authoritative,
      legacy,
      wait,
      json,
    } => {
      let mut query = ImageQuery::new(resolver);
      let uri = query.load(ResolveRequest::new(
        id,
        authoritative.as_deref(),
        legacy.as_deref(),
      ));
      let upgraded = wait && query.upgraded().await;

      if json {
        let output = serde_json::json!({
          "resolved": uri,
          "upgraded": upgraded.then(|| query.uri().cloned()).flatten(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
      } else {
        println!("{}", uri);
        if let Some(current) = query.uri().filter(|_| upgraded) {
          println!("{}", current);
        }
      }
    }
    Command::Prefetch { entries } => {
      let mut queries = Vec::with_capacity(entries.len());
      for entry in &entries {
        let (id, url) = entry
          .split_once('=')
          .ok_or_else(|| eyre!("Expected ID=URL, got {:?}", entry))?;
        let mut query = ImageQuery::new(resolver.clone());
        query.load(ResolveRequest::new(id, Some(url), None));
        queries.push(query);
      }

      let results =
        futures::future::join_all(queries.iter_mut().map(|query| query.upgraded())).await;

      let mut failed = 0;
      for (query, upgraded) in queries.iter().zip(results) {
        let id = query.request().map(|r| r.id.as_str()).unwrap_or_default();
        match query.uri() {
          Some(uri) if upgraded => println!("{}\t{}", id, uri),
          _ => {
            failed += 1;
            eprintln!("{}\tnot cached", id);
          }
        }
      }
      if failed > 0 {
        return Err(eyre!("{} of {} images could not be cached", failed, entries.len()));
      }
    }
    Command::Write { id, source, file } => {
      let source = match (source, file) {
        (_, Some(path)) => WriteSource::Bytes(
          tokio::fs::read(&path)
            .await
            .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?,
        ),
        (Some(uri), None) => WriteSource::from_uri(&uri),
        (None, None) => return Err(eyre!("Nothing to write")),
      };

      let id = ResourceId::new(id);
      let path = storage
        .write(&id, source)
        .await
        .ok_or_else(|| eyre!("Failed to cache {}", id))?;
      println!("{}", path.display());
    }
    Command::Read { id } => {
      let id = ResourceId::new(id);
      let path = storage
        .read(&id)
        .ok_or_else(|| eyre!("{} is not cached", id))?;
      println!("{}", path.display());
    }
    Command::Path { id } => {
      println!("{}", storage.path_for(&ResourceId::new(id)).display());
    }
    Command::Delete { id } => storage.delete(&ResourceId::new(id)).await,
    Command::Clear => storage.clear().await,
  }

  Ok(())
}
