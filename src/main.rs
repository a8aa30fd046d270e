use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

use reviewq::cache::PriorityCache;
use reviewq::domain::{ItemKind, PriorityRecord, PrioritySource, ShieldRecord};
use reviewq::graph::{GraphAccess, MemoryGraph, load_incremental_items};
use reviewq::id::{format_ms, now_ms};
use reviewq::priority::PriorityResolver;
use reviewq::scheduler::{QueueMode, QueueScheduler, SelectRequest, Selection, SessionManager};
use reviewq::scope::ScopeResolver;
use reviewq::shield::{KB_SCOPE, ShieldHistory};
use reviewq::storage::{JsonlStorage, MemoryStorage, durable_dir};

fn setup_logging(default_filter: &str) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reviewq")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("reviewq.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Everything a command needs, wired from config and the graph snapshot.
struct App {
    config: Config,
    graph_path: PathBuf,
    graph: Arc<MemoryGraph>,
    resolver: Arc<PriorityResolver>,
    scopes: Arc<ScopeResolver>,
    cache: Arc<PriorityCache<MemoryStorage>>,
    durable: Arc<JsonlStorage>,
}

impl App {
    fn open(cli: &Cli, config: Config) -> Result<Self> {
        let graph = Arc::new(
            MemoryGraph::load(&cli.graph).context(format!("Failed to load graph from {}", cli.graph.display()))?,
        );
        let resolver = Arc::new(
            PriorityResolver::new(graph.clone()).with_default_priority(config.priority.default_priority as i64),
        );
        let scopes = Arc::new(ScopeResolver::new(graph.clone()));
        let cache = PriorityCache::new(resolver.clone(), Arc::new(MemoryStorage::new()), config.cache.debounce());

        let dir = durable_dir(&config.storage.data_dir, &cli.graph)?;
        let durable = Arc::new(JsonlStorage::new(&dir).context("Failed to open durable store")?);
        info!("Durable store at {}", dir.display());

        Ok(Self {
            config,
            graph_path: cli.graph.clone(),
            graph,
            resolver,
            scopes,
            cache,
            durable,
        })
    }

    /// Fill the cache. Deferred builds rank tagged nodes first, then work through
    /// the rest in paced batches; Ctrl-C stops phase 2 and keeps what was merged.
    async fn populate_cache(&self, deferred: bool) -> Result<()> {
        if !deferred {
            self.cache.build_optimized(self.config.cache.batch_size).await?;
            return Ok(());
        }

        let options = self.config.cache.build_options();
        let phase2 = self.cache.build(options.batch_size).await?;
        info!("Phase 1 ranked {} nodes, {} deferred", self.cache.len().await, phase2.remaining());

        let cancel = CancellationToken::new();
        let mut handle = self.cache.spawn_deferred(phase2, options, cancel.clone());
        let outcome = tokio::select! {
            joined = &mut handle => joined,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                handle.await
            }
        };
        match outcome.context("Deferred cache build task failed")? {
            Ok(merged) => info!("Phase 2 merged {} nodes", merged),
            Err(e) if e.is_cancelled() => {
                println!("{}", "Cache build interrupted, showing partial ranking".yellow());
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn save_graph(&self) -> Result<()> {
        self.graph
            .save(&self.graph_path)
            .context(format!("Failed to write graph to {}", self.graph_path.display()))
    }

    fn session_manager(&self, seed: Option<u64>) -> SessionManager<MemoryStorage, JsonlStorage> {
        let mut scheduler = QueueScheduler::new(self.graph.clone(), self.scopes.clone())
            .with_interleave(self.config.queue.interleave());
        if let Some(seed) = seed {
            scheduler = scheduler.with_seed(seed);
        }
        SessionManager::new(
            self.graph.clone(),
            self.scopes.clone(),
            scheduler,
            self.cache.clone(),
            ShieldHistory::new(self.durable.clone()),
        )
    }

    async fn node_label(&self, node_id: &str) -> String {
        match self.graph.node(node_id).await {
            Ok(Some(node)) if !node.name.is_empty() => format!("{} ({})", node.name, node_id),
            _ => node_id.to_string(),
        }
    }
}

fn source_colored(source: PrioritySource) -> ColoredString {
    match source {
        PrioritySource::Manual => source.as_str().green(),
        PrioritySource::Inherited => source.as_str().cyan(),
        PrioritySource::Default => source.as_str().dimmed(),
    }
}

fn format_shield(record: &ShieldRecord) -> String {
    match (record.absolute, record.percentile) {
        (Some(absolute), Some(percentile)) => format!(
            "top miss priority {} at {}% of {}",
            absolute, percentile, record.universe_size
        ),
        _ => format!("{} ({} items)", "fully protected".green(), record.universe_size),
    }
}

async fn run_application(cli: &Cli, config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    let app = App::open(cli, config)?;

    match &cli.command {
        Commands::Resolve { node } => handle_resolve_command(&app, node).await,
        Commands::Set { node, priority } => handle_set_command(&app, node, *priority).await,
        Commands::Clear { node } => handle_clear_command(&app, node).await,
        Commands::Rank { scope, limit, deferred } => {
            handle_rank_command(&app, scope.as_deref(), *limit, *deferred).await
        }
        Commands::Scope { root } => handle_scope_command(&app, root).await,
        Commands::Next {
            scope,
            mode,
            steps,
            randomness,
            seed,
            cooldown,
        } => {
            let options = NextOptions {
                mode: mode.as_deref(),
                steps: *steps,
                randomness: *randomness,
                seed: *seed,
                cooldown: *cooldown,
            };
            handle_next_command(&app, scope.clone(), options).await
        }
        Commands::Shield { scope, deferred } => handle_shield_command(&app, scope.clone(), *deferred).await,
        Commands::History { scope } => handle_history_command(&app, scope.as_deref()),
    }
}

async fn handle_resolve_command(app: &App, node: &str) -> Result<()> {
    info!("Resolving priority for {}", node);
    let resolution = app.resolver.resolve_priority(node).await?;
    println!(
        "{} {} [{}]",
        app.node_label(node).await.bold(),
        resolution.priority.to_string().yellow(),
        source_colored(resolution.source)
    );
    Ok(())
}

async fn handle_set_command(app: &App, node: &str, priority: i64) -> Result<()> {
    info!("Setting priority {} on {}", priority, node);
    let record = app.resolver.set_priority(node, priority, PrioritySource::Manual).await?;
    app.save_graph()?;
    println!(
        "{} {} -> {} (at {})",
        "Set:".green(),
        app.node_label(node).await,
        record.priority,
        format_ms(record.last_updated)
    );
    Ok(())
}

async fn handle_clear_command(app: &App, node: &str) -> Result<()> {
    info!("Clearing priority on {}", node);
    app.resolver.remove_priority(node).await?;
    app.save_graph()?;
    let resolution = app.resolver.resolve_priority(node).await?;
    println!(
        "{} {} now resolves to {} [{}]",
        "Cleared:".red(),
        app.node_label(node).await,
        resolution.priority,
        source_colored(resolution.source)
    );
    Ok(())
}

async fn handle_rank_command(app: &App, scope: Option<&str>, limit: usize, deferred: bool) -> Result<()> {
    info!("Ranking priorities (scope: {:?})", scope);
    app.populate_cache(deferred).await?;

    let records = app.cache.records().await;
    let (rows, scope_set): (Vec<PriorityRecord>, _) = match scope {
        Some(root) => {
            let scope_set = app.scopes.build_scope(root, &Default::default()).await?;
            let rows = records.into_iter().filter(|r| scope_set.contains(&r.node_id)).collect();
            (rows, Some(scope_set))
        }
        None => (records, None),
    };

    if rows.is_empty() {
        println!("{}", "No prioritized nodes".yellow());
        return Ok(());
    }

    println!("{:>4} {:>5} {:>6}  {:<10} {}", "#", "prio", "pct", "source", "node");
    for (i, record) in rows.iter().take(limit).enumerate() {
        let percentile = match &scope_set {
            Some(set) => app.cache.scoped_percentile(&record.node_id, set).await,
            None => record.kb_percentile,
        };
        let percentile = percentile.map(|p| format!("{p}%")).unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4} {:>5} {:>6}  {:<10} {}",
            i + 1,
            record.priority,
            percentile,
            source_colored(record.source),
            app.node_label(&record.node_id).await
        );
    }
    if rows.len() > limit {
        println!("{}", format!("... {} more", rows.len() - limit).dimmed());
    }
    Ok(())
}

async fn handle_scope_command(app: &App, root: &str) -> Result<()> {
    info!("Building scope for {}", root);
    let scope = app.scopes.build_scope(root, &Default::default()).await?;
    if scope.is_empty() {
        println!("{} {}", "Unknown root:".red(), root);
        return Ok(());
    }

    let mut ids: Vec<&String> = scope.iter().collect();
    ids.sort();
    println!("{} {} nodes", "Scope:".green(), ids.len());
    for id in ids {
        println!("  {}", app.node_label(id).await);
    }
    Ok(())
}

struct NextOptions<'a> {
    mode: Option<&'a str>,
    steps: usize,
    randomness: Option<f64>,
    seed: Option<u64>,
    cooldown: bool,
}

async fn handle_next_command(app: &App, scope: Option<String>, options: NextOptions<'_>) -> Result<()> {
    let mode: QueueMode = match options.mode {
        Some(m) => m.parse()?,
        None => app.config.queue.mode,
    };
    let randomness = options.randomness.unwrap_or(app.config.queue.randomness);
    info!("Running {} steps in {} mode (scope: {:?})", options.steps, mode, scope);

    let items = load_incremental_items(app.graph.as_ref()).await?;
    let mut manager = app.session_manager(options.seed);
    if options.cooldown {
        manager
            .scheduler()
            .start_cooldown(Duration::from_secs(app.config.queue.cooldown_secs))?;
        println!("{}", "Cooldown active: incremental items held back".yellow());
    }
    manager.enter(scope);

    for step in 1..=options.steps {
        let request = SelectRequest::new(mode, now_ms()).with_randomness(randomness);
        match manager.next(&items, &request).await? {
            Selection::Item(item) => println!(
                "{:>3}: {} {} [{}]",
                step,
                "item".cyan(),
                app.node_label(&item.node_id).await,
                item.priority
            ),
            Selection::Continue => println!("{:>3}: {}", step, "card".dimmed()),
        }
    }

    let entries = manager.exit(now_ms()).await?;
    info!("Session recorded {} shield entries", entries.len());
    Ok(())
}

async fn handle_shield_command(app: &App, scope: Option<String>, deferred: bool) -> Result<()> {
    info!("Computing shield (scope: {:?})", scope);
    app.populate_cache(deferred).await?;

    let mut manager = app.session_manager(None);
    manager.enter(scope);
    manager.ready().await;
    let entries = manager.exit(now_ms()).await?;

    for entry in entries {
        println!("{:<12} {:<12} {}", entry.scope.bold(), entry.kind.as_str(), format_shield(&entry.record));
    }
    Ok(())
}

fn handle_history_command(app: &App, scope: Option<&str>) -> Result<()> {
    let scope = scope.unwrap_or(KB_SCOPE);
    info!("Showing shield history for {}", scope);
    let history = ShieldHistory::new(app.durable.clone());

    for kind in ItemKind::all() {
        println!("{} {}", kind.to_string().bold(), scope);
        let entries = history.history(scope, *kind)?;
        if entries.is_empty() {
            println!("  {}", "no history".dimmed());
        }
        for entry in entries {
            println!("  {}  {}", entry.date, format_shield(&entry.record));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(config.log_filter()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, config).await.context("Application failed")?;

    Ok(())
}
