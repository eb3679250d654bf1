mod event;

use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use event::{Event, EventHandler};
use storefront::api::ApiClient;
use storefront::config::{ApiConfig, Config};
use storefront::news::{
  HttpNewsSource, ListParams, NewsItem, NewsQueries, DEFAULT_LIMIT, DEFAULT_PAGE,
};
use storefront::query::{QueryClient, QueryState, QueryStatus};

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Query the game-account storefront's news feed")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storefront/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Service base URL (overrides the config file and STOREFRONT_API_URL)
  #[arg(long)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// News feed queries
  #[command(subcommand)]
  News(NewsCommand),
}

#[derive(Subcommand, Debug)]
enum NewsCommand {
  /// One page of the news listing
  List {
    #[arg(long, default_value_t = DEFAULT_PAGE)]
    page: u32,
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: u32,
    #[arg(short, long)]
    search: Option<String>,
  },
  /// Featured news
  Featured {
    #[arg(short, long)]
    limit: Option<u32>,
  },
  /// Most recent news
  Latest {
    #[arg(short, long)]
    limit: Option<u32>,
  },
  /// A single news item
  Get { id: String },
  /// Keep featured and latest news fresh, printing every change
  Watch {
    /// Seconds between staleness checks
    #[arg(long, default_value_t = 30)]
    tick: u64,
    #[arg(short, long)]
    limit: Option<u32>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override base URL if specified on command line
  let config = if let Some(base_url) = args.api_url {
    Config {
      api: ApiConfig {
        base_url,
        ..config.api
      },
      ..config
    }
  } else {
    config
  };
  config.validate()?;

  let _log_guard = init_logging(&config)?;

  let api = ApiClient::new(&config.api)?;
  let client = QueryClient::new(config.cache.client_config());
  let gc = client.spawn_gc(config.cache.gc_interval());
  let news = NewsQueries::new(client, Arc::new(HttpNewsSource::new(api)))
    .with_retry(config.cache.retry);

  let result = match args.command {
    Command::News(command) => run_news(&news, command).await,
  };

  gc.abort();
  result
}

fn init_logging(config: &Config) -> Result<WorkerGuard> {
  let dir = config.log_directory()?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => EnvFilter::try_new(config.log.filter.as_deref().unwrap_or("storefront=info"))
      .map_err(|e| eyre!("Invalid log filter: {}", e))?,
  };

  let (writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "storefront.log"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

async fn run_news(news: &NewsQueries, command: NewsCommand) -> Result<()> {
  match command {
    NewsCommand::List {
      page,
      limit,
      search,
    } => {
      let params = ListParams {
        page,
        limit,
        search,
      };
      print_result(news.get_list(params).settled().await)
    }
    NewsCommand::Featured { limit } => print_result(news.get_featured(limit).settled().await),
    NewsCommand::Latest { limit } => print_result(news.get_latest(limit).settled().await),
    NewsCommand::Get { id } => print_result(news.get_by_id(Some(&id)).settled().await),
    NewsCommand::Watch { tick, limit } => watch(news, Duration::from_secs(tick.max(1)), limit).await,
  }
}

/// Print data as JSON, or fail with the query's error.
fn print_result<T: Serialize>(state: QueryState<T>) -> Result<()> {
  match (state.data, state.error) {
    (_, Some(err)) => Err(err.into()),
    (Some(data), None) => {
      println!("{}", serde_json::to_string_pretty(&*data)?);
      Ok(())
    }
    (None, None) => {
      eprintln!("Nothing to fetch.");
      Ok(())
    }
  }
}

async fn watch(news: &NewsQueries, tick: Duration, limit: Option<u32>) -> Result<()> {
  let mut featured = news.get_featured(limit);
  let mut latest = news.get_latest(limit);
  let mut events = EventHandler::new(tick);

  report("featured", &featured.state());
  report("latest", &latest.state());

  loop {
    tokio::select! {
      Some(state) = featured.changed() => report("featured", &state),
      Some(state) = latest.changed() => report("latest", &state),
      event = events.next() => match event {
        Some(Event::Tick) => {
          featured.refresh_if_stale();
          latest.refresh_if_stale();
        }
        Some(Event::Shutdown) | None => break,
      },
    }
  }

  Ok(())
}

fn report(label: &str, state: &QueryState<Vec<NewsItem>>) {
  let now = Local::now().format("%H:%M:%S");
  match state.status {
    QueryStatus::Idle => println!("[{}] {}: idle", now, label),
    QueryStatus::Pending if state.is_refreshing() => println!("[{}] {}: refreshing", now, label),
    QueryStatus::Pending => println!("[{}] {}: loading", now, label),
    QueryStatus::Success => {
      let count = state.data().map(Vec::len).unwrap_or_default();
      println!(
        "[{}] {}: {} items (fetched {})",
        now,
        label,
        count,
        fetched_label(state.fetched_at)
      );
      for item in state.data().into_iter().flatten() {
        println!(
          "    {:<8} {}",
          item.id,
          item.str_field("title").unwrap_or("(untitled)")
        );
      }
    }
    QueryStatus::Error => {
      let error = state
        .error()
        .map(ToString::to_string)
        .unwrap_or_else(|| "unknown error".to_string());
      println!("[{}] {}: error: {}", now, label, error);
    }
  }
}

fn fetched_label(fetched_at: Option<DateTime<Utc>>) -> String {
  fetched_at
    .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
    .unwrap_or_else(|| "never".to_string())
}
