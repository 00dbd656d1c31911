//! Command-line reader for a catalog export.
//!
//! - Parse `<catalog.json> <work-id> [chapter-id]`.
//! - Load configuration from `conf/config.toml`.
//! - Open a reading session for the work (counting the view and restoring
//!   the last chapter for novels), lay the document out at the configured
//!   container width and print what the reader page would show.

use anyhow::{Result, anyhow};
use folio::catalog::Catalog;
use folio::config::load_config;
use folio::counter::{CounterOutbox, CounterService, LoggingCounterService, RestCounterService};
use folio::document::DocumentStatus;
use folio::session::ReadingSession;
use folio::store::{FileStore, MemoryStore};
use folio::viewport::Container;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

struct Args {
    catalog: PathBuf,
    work_id: String,
    chapter_id: Option<String>,
}

/// Terminal "container" of a fixed width.
struct Terminal {
    width: f32,
}

impl Container for Terminal {
    fn content_width(&self) -> f32 {
        self.width
    }
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let args = parse_args()?;
    let config = load_config(Path::new("conf/config.toml"));
    if config_level_applies(env::var_os("RUST_LOG")) {
        set_log_level(reload_handle, config.log_level.as_filter_str());
    } else {
        info!("RUST_LOG is set; ignoring config log level");
    }
    info!(
        path = %args.catalog.display(),
        level = %config.log_level,
        "Starting reader"
    );

    let catalog = Catalog::load(&args.catalog)?;
    let work = catalog
        .work(&args.work_id)
        .cloned()
        .ok_or_else(|| anyhow!("Work not found: {}", args.work_id))?;
    let chapters = catalog.chapters(&work.id);

    let service: Arc<dyn CounterService> = match RestCounterService::from_config(&config)? {
        Some(rest) => Arc::new(rest),
        None => Arc::new(LoggingCounterService),
    };
    let outbox = CounterOutbox::from_config(service, &config);
    let durable = FileStore::new(&config.store_dir);

    let width = config.default_container_width;
    let mut session = ReadingSession::open(
        config,
        work,
        chapters,
        args.chapter_id.as_deref(),
        durable,
        MemoryStore::new(),
        outbox,
    )?;

    let source = session.default_source();
    let status = session
        .mount_document(source, &Terminal { width }, false)
        .clone();

    print_summary(&session, &status);
    session.close();
    Ok(())
}

fn print_summary<D, S>(session: &ReadingSession<D, S>, status: &DocumentStatus)
where
    D: folio::store::KeyValueStore + Clone,
    S: folio::store::KeyValueStore,
{
    let work = session.work();
    println!("{}", work.title);
    if let Some(description) = work.description.as_deref() {
        println!("{description}");
    }
    if let Some(engagement) = session.work_engagement() {
        let heart = if engagement.liked { "liked" } else { "not liked" };
        println!("{} likes ({heart})", engagement.displayed_count);
    }
    if let Some(chapter) = session.selected_chapter() {
        println!(
            "Chapter {} of {}: {}",
            chapter.chapter_number,
            session.chapters().len(),
            chapter.title
        );
    }
    if let Some(label) = session.read_time_label() {
        println!("{label}");
    }

    match status {
        DocumentStatus::Ready { page_count } => {
            println!(
                "{page_count} page(s) at {} units wide",
                session.viewport().render_width()
            );
            if let Some(first) = session.document().and_then(|doc| doc.pages().first()) {
                println!();
                for line in &first.lines {
                    println!("{line}");
                }
            }
        }
        DocumentStatus::Failed { message } => println!("{message}"),
        DocumentStatus::Loading => println!("Loading..."),
    }
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let usage = || anyhow!("Usage: folio <catalog.json> <work-id> [chapter-id]");
    let catalog = PathBuf::from(args.next().ok_or_else(usage)?);
    let work_id = args.next().ok_or_else(usage)?;
    let chapter_id = args.next();

    if !catalog.exists() {
        return Err(anyhow!("File not found: {}", catalog.display()));
    }
    Ok(Args {
        catalog,
        work_id,
        chapter_id,
    })
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

/// An explicit `RUST_LOG` wins over the config file.
fn config_level_applies(rust_log: Option<OsString>) -> bool {
    rust_log.is_none_or(|value| value.is_empty())
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}
