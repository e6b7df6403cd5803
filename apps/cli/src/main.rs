mod host;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use importwatch_core::{
    ChangeMask, FeatureStatus, FileChangeService, FileMonitor, HostServices, ImportSet,
    ImportSetComputer, ImportWatcherFeature, SolutionEvent, SolutionSnapshot, TreeProjector,
};
use importwatch_project::{
    ImportReader, ImportsNode, ItemId, MsBuildImportReader, PropertyKey, PropertyValue,
    SolutionFile,
};
use importwatch_settings::{FeatureToggle, PreferencesStore};

use crate::host::{
    ConsoleOpener, ConsoleTreeRegistry, FileSolutionHost, ReloadRequests, StderrNotifier,
};

#[derive(Parser)]
#[command(
    name = "importwatch",
    about = "Watch the files a solution's projects import and request a reload when they change",
    author,
    version
)]
struct Cli {
    /// 偏好設定檔路徑。 / Preferences file (defaults to .importwatch/preferences.json).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// 輸出除錯紀錄。 / Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 列出專案匯入的檔案。 / List the files imported by one or more projects.
    Imports(ImportsArgs),
    /// 顯示方案的匯入檔虛擬節點。 / Print the watched-imports node of a solution.
    Tree(SolutionArgs),
    /// 監看方案匯入檔並於變更時要求重新載入。 / Watch a solution's imports and request reloads.
    Watch(WatchArgs),
    /// 啟用匯入監看。 / Enable the imports watcher.
    Enable,
    /// 停用匯入監看。 / Disable the imports watcher.
    Disable,
    /// 顯示匯入監看是否啟用。 / Show whether the imports watcher is enabled.
    Status,
}

#[derive(Args)]
struct ImportsArgs {
    /// 專案檔路徑。 / Project files to read.
    #[arg(required = true, value_name = "PROJECT")]
    projects: Vec<PathBuf>,
}

#[derive(Args)]
struct SolutionArgs {
    /// 方案檔路徑。 / Solution file.
    #[arg(value_name = "SOLUTION")]
    solution: PathBuf,
}

#[derive(Args)]
struct WatchArgs {
    /// 方案檔路徑。 / Solution file.
    #[arg(value_name = "SOLUTION")]
    solution: PathBuf,
    /// 監看秒數；省略則持續執行。 / Stop after this many seconds instead of running until killed.
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,
    /// 忽略停用設定直接執行。 / Run even when the watcher is disabled in preferences.
    #[arg(long)]
    force: bool,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let Cli {
        config,
        verbose,
        command,
    } = Cli::parse();
    init_logging(verbose);

    let config = match config {
        Some(path) => path,
        None => default_config_path()?,
    };
    match command {
        Commands::Imports(args) => execute_imports(args),
        Commands::Tree(args) => execute_tree(args),
        Commands::Watch(args) => execute_watch(args, &config),
        Commands::Enable => set_enabled(&config, true),
        Commands::Disable => set_enabled(&config, false),
        Commands::Status => show_status(&config),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}

fn default_config_path() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("failed to resolve current directory")?;
    Ok(cwd.join(".importwatch").join("preferences.json"))
}

fn canonical(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("'{}' does not exist", path.display()))
}

fn execute_imports(args: ImportsArgs) -> Result<()> {
    let reader = MsBuildImportReader::new();
    let mut imports = Vec::new();
    for project in &args.projects {
        let project = canonical(project)?;
        let paths = reader
            .import_paths(&project)
            .with_context(|| format!("failed to read imports of {}", project.display()))?;
        imports.extend(paths);
    }
    let set = ImportSet::from_unsorted(None, imports);
    if set.is_empty() {
        println!("No imports found");
    }
    for path in &set.paths {
        println!("{}", path.display());
    }
    Ok(())
}

fn snapshot_of(solution: &SolutionFile) -> SolutionSnapshot {
    SolutionSnapshot {
        solution_path: Some(solution.path().to_path_buf()),
        project_paths: solution
            .projects()
            .iter()
            .map(|project| project.path.clone())
            .collect(),
    }
}

fn execute_tree(args: SolutionArgs) -> Result<()> {
    let solution_path = canonical(&args.solution)?;
    let solution = SolutionFile::load(&solution_path)
        .with_context(|| format!("failed to load solution {}", solution_path.display()))?;

    let computer = ImportSetComputer::new(Arc::new(MsBuildImportReader::new()));
    let projector = Arc::new(TreeProjector::new(
        Arc::new(ConsoleTreeRegistry),
        Arc::new(ConsoleOpener),
    ));
    {
        let projector = Arc::clone(&projector);
        computer
            .changes()
            .subscribe(move |set: &ImportSet| projector.on_import_set_changed(set));
    }
    computer.on_solution_event(&SolutionEvent::Changed(snapshot_of(&solution)))?;

    match projector.node() {
        Some(node) => print_node(&node),
        None => println!("No imports found"),
    }
    Ok(())
}

fn print_node(node: &ImportsNode) {
    let caption = match node.property(ItemId::ROOT, PropertyKey::Caption) {
        Ok(PropertyValue::Text(text)) => text,
        _ => String::new(),
    };
    println!("{caption} ({})", node.item_count());

    let mut id = node.first_child();
    while let Some(path) = node.item_path(id) {
        let name = match node.property(id, PropertyKey::Caption) {
            Ok(PropertyValue::Text(text)) => text,
            _ => String::new(),
        };
        println!("{:>4}  {name}  {}", id.as_u32(), path.display());
        id = node.next_sibling(id);
    }
}

fn execute_watch(args: WatchArgs, config: &Path) -> Result<()> {
    let store = PreferencesStore::load(config)
        .with_context(|| format!("failed to load preferences from {}", config.display()))?;
    let enabled = store.import_watcher_enabled();
    if !enabled && !args.force {
        bail!("the imports watcher is disabled; run `importwatch enable` or pass --force");
    }
    let solution_path = canonical(&args.solution)?;

    let monitor = Arc::new(FileMonitor::new().context("failed to start file monitor")?);
    let host = Arc::new(FileSolutionHost::new());
    let services = HostServices {
        solution: host.clone(),
        file_changes: monitor.clone(),
        tree_registry: Arc::new(ConsoleTreeRegistry),
        opener: Arc::new(ConsoleOpener),
        import_reader: Arc::new(MsBuildImportReader::new()),
        notifier: Arc::new(StderrNotifier),
    };
    let toggle = Arc::new(FeatureToggle::new(true));
    let feature = ImportWatcherFeature::new(services, toggle);
    feature.initialize();

    host.open(&solution_path)
        .with_context(|| format!("failed to open solution {}", solution_path.display()))?;
    if let FeatureStatus::Faulted(message) = feature.status() {
        bail!("imports watcher stopped: {message}");
    }
    let watched = feature.watched_paths();
    println!(
        "Watching {} import(s) of {}",
        watched.len(),
        solution_path.display()
    );
    for path in &watched {
        println!("  {}", path.display());
    }

    let (tx, rx) = mpsc::channel();
    let reload_cookie = monitor
        .advise(
            &solution_path,
            ChangeMask::TIME,
            Arc::new(ReloadRequests(Mutex::new(tx))),
        )
        .with_context(|| format!("failed to watch {}", solution_path.display()))?;

    let deadline = args
        .duration
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        let wait = match deadline {
            Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => break,
            },
            None => Duration::from_secs(3600),
        };
        match rx.recv_timeout(wait) {
            Ok(path) => {
                println!("Solution changed on disk, reloading {}", path.display());
                // Drain bursts so one change reloads once.
                while rx.try_recv().is_ok() {}
                host.reload()
                    .with_context(|| format!("failed to reload {}", path.display()))?;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if let FeatureStatus::Faulted(message) = feature.status() {
            bail!("imports watcher stopped: {message}");
        }
    }

    monitor
        .unadvise(reload_cookie)
        .context("failed to stop watching the solution file")?;
    host.close();
    feature.shutdown();
    println!("Stopped watching {}", solution_path.display());
    Ok(())
}

fn set_enabled(config: &Path, enabled: bool) -> Result<()> {
    let mut store = PreferencesStore::load(config)
        .with_context(|| format!("failed to load preferences from {}", config.display()))?;
    store
        .set_import_watcher_enabled(enabled)
        .with_context(|| format!("failed to save preferences to {}", config.display()))?;
    println!(
        "Imports watcher {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn show_status(config: &Path) -> Result<()> {
    let store = PreferencesStore::load(config)
        .with_context(|| format!("failed to load preferences from {}", config.display()))?;
    let enabled = store.import_watcher_enabled();
    println!(
        "Imports watcher: {} ({})",
        if enabled { "enabled" } else { "disabled" },
        store.path().display()
    );
    Ok(())
}
