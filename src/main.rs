use std::path::PathBuf;
use std::process::ExitCode;

// used for the command line
use clap::{Parser, Subcommand};

// used for logging, RUST_LOG wins over the configured filter
use tracing::error;
use tracing_subscriber::EnvFilter;

use yank::config::Settings;
use yank::console::ConsoleRenderer;
use yank::display::{columns_view, display_tables, DisplayProjector, Renderer, View};
use yank::error::Result;
use yank::fetch::NoFetcher;
use yank::persist::{PersistenceMode, Registry};
use yank::query::{FilterExpression, SortExpression};

#[derive(Parser)]
#[command(name = "yank", version, about = "Browse records collected into a yank database")]
struct Cli {
    /// Settings file, defaults to ./yank.toml when present
    #[arg(long)]
    config: Option<PathBuf>,
    /// Database file, overriding database.path
    #[arg(long)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive table browser
    Tables,
    /// One page of records
    List {
        table: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        filter: Option<String>,
        /// Keep reading list commands from stdin
        #[arg(long, short)]
        interactive: bool,
    },
    /// One record in detail
    Detail { table: String, id: i64 },
    /// Columns of a table
    Columns { table: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match run(cli, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "yank failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, settings: Settings) -> Result<()> {
    let mode = match cli.db.or(settings.database.path.clone()) {
        Some(path) => PersistenceMode::File(path),
        None => PersistenceMode::InMemory,
    };
    let registry = Registry::new(mode)?;
    let mut renderer = ConsoleRenderer::stdio();
    let mut fetcher = NoFetcher;
    match cli.command.unwrap_or(Command::Tables) {
        Command::Tables => display_tables(&registry, &mut renderer, &mut fetcher, &settings.display),
        Command::List { table, limit, offset, sort, filter, interactive } => {
            let store = registry.store(&table)?;
            let projector = DisplayProjector::new(&store, settings.display.clone());
            let mut state = projector.state();
            if let Some(limit) = limit {
                state.set_limit(limit, &settings.display);
            }
            state.offset = offset;
            state.sort = sort.as_deref().map(SortExpression::parse).unwrap_or_default();
            state.filter = filter.as_deref().map(FilterExpression::parse).unwrap_or_default();
            if interactive {
                projector.interact_from(&mut renderer, &mut fetcher, state).map(|_| ())
            } else {
                projector.display_list(&mut renderer, &state).map(|_| ())
            }
        }
        Command::Detail { table, id } => {
            let store = registry.store(&table)?;
            DisplayProjector::new(&store, settings.display.clone()).display_detail(&mut renderer, id)
        }
        Command::Columns { table } => renderer.render(&View::Table(columns_view(&registry, &table)?)),
    }
}
