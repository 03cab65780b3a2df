use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tabox_dnd::{
    CollectionDropTarget, CommandQueue, DragCommand, FolderDropTarget, GroupDropTarget, TabDropTarget, Workspace,
};
use tabox_migrate::{BackupEngine, MigrationCoordinator, MigrationOutcome};
use tabox_store::{
    CollectionStore, ExportPayload, FolderDeletion, FolderError, KeyValueStore, LibsqlStore, LoadOptions, SortBy,
    SortOrder, StoreStats,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::TaboxConfig;

#[derive(Parser)]
#[command(name = "tabox", version, about = "Manage saved tab collections, folders, backups and schema migrations")]
struct Cli {
    /// Read config.toml from this directory instead of the platform default
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and prepare an empty store
    Init,
    /// Show store statistics and schema version
    Status,
    /// Bring stored data up to the current schema
    Migrate {
        /// Run even if migration history says it already completed
        #[arg(long)]
        force: bool,
        /// Only print what would run
        #[arg(long)]
        dry_run: bool,
    },
    /// List collections
    List {
        /// Only collections in this folder
        #[arg(long, conflicts_with = "root")]
        folder: Option<String>,
        /// Only root-level collections
        #[arg(long)]
        root: bool,
        #[arg(long, value_enum, default_value = "updated")]
        sort: SortArg,
        #[arg(long)]
        asc: bool,
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Manage folders
    Folders {
        #[command(subcommand)]
        action: FolderAction,
    },
    /// Copy a collection under a new name
    Duplicate { uid: String },
    /// Delete a collection
    Delete { uid: String },
    /// Reorder or move tabs, groups, collections and folders
    Move {
        #[command(subcommand)]
        action: MoveAction,
    },
    /// Manage storage backups
    Backups {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Export collections as JSON
    Export {
        #[arg(long, conflicts_with = "collection")]
        folder: Option<String>,
        #[arg(long)]
        collection: Option<String>,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Import a JSON export (full, folder, collection array or single collection)
    Import { path: PathBuf },
    /// Fuzzy-search collection names, tab titles and URLs
    Search {
        query: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum FolderAction {
    List,
    Create {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    Rename {
        uid: String,
        name: String,
    },
    Delete {
        uid: String,
        /// Move contained collections to the root level first
        #[arg(long, conflicts_with = "delete_contents")]
        move_to_root: bool,
        /// Delete contained collections too
        #[arg(long)]
        delete_contents: bool,
    },
    Duplicate {
        uid: String,
    },
    /// Put a collection into a folder
    Add {
        collection: String,
        folder: String,
    },
    /// Move a collection back to the root level
    Remove {
        collection: String,
    },
}

#[derive(Subcommand)]
enum MoveAction {
    Tab {
        tab: String,
        /// Collection the tab is in
        #[arg(long)]
        from: String,
        /// Another collection; the tab is appended there
        #[arg(long)]
        to: Option<String>,
        #[arg(long, conflicts_with_all = ["group", "ungroup", "to"])]
        onto_tab: Option<String>,
        #[arg(long, conflicts_with_all = ["ungroup", "to"])]
        group: Option<String>,
        #[arg(long, conflicts_with = "to")]
        ungroup: bool,
    },
    Group {
        group: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: Option<String>,
        #[arg(long, conflicts_with_all = ["onto_tab", "to"])]
        onto_group: Option<String>,
        #[arg(long, conflicts_with = "to")]
        onto_tab: Option<String>,
    },
    Collection {
        uid: String,
        /// Drop onto another collection's position
        #[arg(long, conflicts_with_all = ["folder", "root"])]
        onto: Option<String>,
        #[arg(long, conflicts_with = "root")]
        folder: Option<String>,
        #[arg(long)]
        root: bool,
    },
    Folder {
        uid: String,
        #[arg(long)]
        onto: String,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    List {
        #[arg(long = "type")]
        backup_type: Option<String>,
    },
    Create {
        #[arg(long, default_value = "manual backup")]
        reason: String,
    },
    Restore {
        key: String,
        /// Skip validating the backup before restoring
        #[arg(long)]
        no_validate: bool,
    },
    /// Prune backups and finished rollback chains
    Cleanup,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg {
    Updated,
    Name,
    Color,
    Manual,
}

impl From<SortArg> for SortBy {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Updated => SortBy::LastUpdated,
            SortArg::Name => SortBy::Name,
            SortArg::Color => SortBy::Color,
            SortArg::Manual => SortBy::Manual,
        }
    }
}

#[derive(Tabled)]
struct CollectionRow {
    #[tabled(rename = "UID")]
    uid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Tabs")]
    tabs: usize,
    #[tabled(rename = "Groups")]
    groups: usize,
    #[tabled(rename = "Folder")]
    folder: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

#[derive(Tabled)]
struct FolderRow {
    #[tabled(rename = "UID")]
    uid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Color")]
    color: String,
    #[tabled(rename = "Collections")]
    collections: usize,
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Type")]
    backup_type: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Collections")]
    collections: usize,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

struct App {
    config: TaboxConfig,
    kv: Arc<dyn KeyValueStore>,
    store: CollectionStore,
}

impl App {
    async fn open(config: TaboxConfig) -> Result<Self> {
        let path = config.db_path()?;
        debug!(path = %path.display(), "opening store");
        let kv: Arc<dyn KeyValueStore> = Arc::new(
            LibsqlStore::open(&path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?,
        );
        Ok(Self {
            store: CollectionStore::new(kv.clone()),
            kv,
            config,
        })
    }

    fn coordinator(&self) -> MigrationCoordinator {
        MigrationCoordinator::new(
            self.kv.clone(),
            self.config.backup.clone(),
            self.config.migration.clone(),
        )
    }

    fn backups(&self) -> BackupEngine {
        BackupEngine::new(self.kv.clone(), self.config.backup.clone())
    }

    /// Migrates on open, the way the extension does on startup.
    async fn open_migrated(config: TaboxConfig) -> Result<Self> {
        let app = Self::open(config).await?;
        let outcome = app.coordinator().execute_migration(false).await;
        if !outcome.success {
            print_outcome(&outcome);
            bail!("stored data could not be migrated; run `tabox migrate` for details");
        }
        if !outcome.skipped {
            print_outcome(&outcome);
        }
        Ok(app)
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => TaboxConfig::config_dir()?,
    };
    let config = TaboxConfig::load(&config_dir)?;
    init_tracing(&config.log_level);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli.command, config, config_dir))
}

async fn run(command: Commands, config: TaboxConfig, config_dir: PathBuf) -> Result<()> {
    match command {
        Commands::Init => cmd_init(config, config_dir).await,
        Commands::Status => cmd_status(App::open(config).await?).await,
        Commands::Migrate { force, dry_run } => cmd_migrate(App::open(config).await?, force, dry_run).await,
        Commands::List {
            folder,
            root,
            sort,
            asc,
            limit,
        } => cmd_list(App::open_migrated(config).await?, folder, root, sort, asc, limit).await,
        Commands::Folders { action } => cmd_folders(App::open_migrated(config).await?, action).await,
        Commands::Duplicate { uid } => {
            let app = App::open_migrated(config).await?;
            match app.store.duplicate_collection(&uid).await? {
                Some(copy) => println!("{} Created {} ({})", "✓".green(), copy.name.cyan(), copy.uid.dimmed()),
                None => bail!("no collection {}", uid),
            }
            Ok(())
        }
        Commands::Delete { uid } => {
            let app = App::open_migrated(config).await?;
            if !app.store.delete_collection(&uid).await? {
                bail!("no collection {}", uid);
            }
            println!("{} Deleted collection {}", "✓".green(), uid.dimmed());
            Ok(())
        }
        Commands::Move { action } => cmd_move(App::open_migrated(config).await?, action).await,
        Commands::Backups { action } => cmd_backups(App::open(config).await?, action).await,
        Commands::Export {
            folder,
            collection,
            out,
        } => cmd_export(App::open_migrated(config).await?, folder, collection, out).await,
        Commands::Import { path } => cmd_import(App::open_migrated(config).await?, path).await,
        Commands::Search { query, limit } => cmd_search(App::open_migrated(config).await?, query, limit).await,
    }
}

fn format_ms(ms: i64) -> String {
    tabox_core::ms_timestamp_to_datetime(ms)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn format_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{} B", bytes)
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

fn print_outcome(outcome: &MigrationOutcome) {
    let from = outcome.from_version.as_deref().unwrap_or("?");
    let to = outcome.to_version.as_deref().unwrap_or("?");
    if outcome.success {
        if outcome.skipped {
            println!("{} Storage is already at {}", "✓".green(), to.cyan());
        } else {
            println!("{} Migrated storage {} → {}", "✓".green(), from, to.cyan());
            for step in &outcome.steps_completed {
                println!("    {}", step.dimmed());
            }
        }
        return;
    }
    eprintln!(
        "{} Migration from {} failed: {}",
        "✗".red(),
        from,
        outcome.error.as_deref().unwrap_or("unknown error")
    );
    match outcome.rollback_success {
        Some(true) => eprintln!("  Storage was rolled back to its pre-migration state"),
        Some(false) => eprintln!("  {}", "Rollback failed; restore a backup with `tabox backups restore`".red()),
        None => {}
    }
}

async fn cmd_init(config: TaboxConfig, config_dir: PathBuf) -> Result<()> {
    let path = if config_dir.join("config.toml").exists() {
        config_dir.join("config.toml")
    } else {
        config.save(&config_dir)?
    };
    println!("{} Config: {}", "✓".green(), path.display());

    let app = App::open(config).await?;
    println!("  Data dir: {}", app.config.data_dir()?.display());
    let outcome = app.coordinator().execute_migration(false).await;
    print_outcome(&outcome);
    if !outcome.success {
        bail!("store initialization failed");
    }
    Ok(())
}

async fn cmd_status(app: App) -> Result<()> {
    let stats = match app.store.get_stats().await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "index statistics unavailable");
            StoreStats::default()
        }
    };
    let assessment = app.coordinator().assess_migration_needs().await?;

    println!("{}", "tabox store status".bold());
    println!("  Collections: {}", stats.total_collections.to_string().cyan());
    println!("    at root:   {}", stats.root_collections);
    println!("  Folders:     {}", stats.total_folders.to_string().cyan());
    println!("  Tabs:        {}", stats.total_tabs.to_string().cyan());
    println!("  Storage:     {}", format_bytes(stats.bytes_in_use));
    if let Some(newest) = stats.newest_update {
        println!("  Updated:     {}", format_ms(newest).dimmed());
    }

    println!();
    println!(
        "  Schema:      {} ({} format)",
        assessment.current_version.cyan(),
        assessment.format.as_str()
    );
    if assessment.needs_migration {
        let steps: Vec<&str> = assessment.steps.iter().map(|s| s.name()).collect();
        println!("  {} {}", "Migration needed:".yellow(), steps.join(" → "));
    } else {
        println!("  {}", "Up to date".green());
    }
    println!("  {}", assessment.reason.dimmed());
    Ok(())
}

async fn cmd_migrate(app: App, force: bool, dry_run: bool) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    let coordinator = app.coordinator();
    if dry_run {
        let assessment = coordinator.assess_migration_needs().await?;
        println!("Detected version {} ({})", assessment.current_version.cyan(), assessment.reason);
        if assessment.steps.is_empty() {
            println!("Nothing to do.");
        }
        for (i, step) in assessment.steps.iter().enumerate() {
            let backup = if i == 0 || !step.is_side_effect_safe() {
                "backup"
            } else {
                "reuses previous backup"
            };
            println!("  {}. {} {}", i + 1, step.name(), format!("({})", backup).dimmed());
        }
        println!("{}", "(dry run, nothing written)".dimmed());
        return Ok(());
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    pb.set_message("Migrating storage...");
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    let outcome = coordinator.execute_migration(force).await;
    pb.finish_and_clear();

    print_outcome(&outcome);
    if !outcome.success {
        bail!("migration failed");
    }
    Ok(())
}

async fn cmd_list(app: App, folder: Option<String>, root: bool, sort: SortArg, asc: bool, limit: usize) -> Result<()> {
    let options = LoadOptions {
        metadata_only: false,
        sort_by: Some(sort.into()),
        sort_order: if asc { SortOrder::Asc } else { SortOrder::Desc },
    };
    let collections = app.store.load_all_collections(&options).await?;
    let folder_names: std::collections::HashMap<String, String> = app
        .store
        .load_all_folders(None)
        .await?
        .into_iter()
        .map(|f| (f.uid, f.name))
        .collect();

    let rows: Vec<CollectionRow> = collections
        .iter()
        .filter(|c| match (&folder, root) {
            (Some(f), _) => c.parent_id.as_deref() == Some(f.as_str()),
            (None, true) => c.is_root(),
            (None, false) => true,
        })
        .take(limit)
        .map(|c| CollectionRow {
            uid: c.uid.clone(),
            name: c.name.clone(),
            tabs: c.tab_count(),
            groups: c.chrome_groups.len(),
            folder: c
                .parent_id
                .as_ref()
                .map(|p| folder_names.get(p).cloned().unwrap_or_else(|| p.clone()))
                .unwrap_or_default(),
            updated: format_ms(c.last_updated),
        })
        .collect();

    if rows.is_empty() {
        println!("No collections found.");
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    Ok(())
}

async fn cmd_folders(app: App, action: FolderAction) -> Result<()> {
    let store = &app.store;
    match action {
        FolderAction::List => {
            let folders = store.load_all_folders(Some((SortBy::Manual, SortOrder::Asc))).await?;
            if folders.is_empty() {
                println!("No folders.");
                return Ok(());
            }
            let rows: Vec<FolderRow> = folders
                .into_iter()
                .map(|f| FolderRow {
                    uid: f.uid,
                    name: f.name,
                    color: f.color,
                    collections: f.collection_count,
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{}", table);
        }
        FolderAction::Create { name, color } => {
            let folder = store.create_folder(&name, color.as_deref()).await?;
            println!("{} Created folder {} ({})", "✓".green(), folder.name.cyan(), folder.uid.dimmed());
        }
        FolderAction::Rename { uid, name } => {
            if !store.rename_folder(&uid, &name).await? {
                bail!("no folder {}", uid);
            }
            println!("{} Renamed folder to {}", "✓".green(), name.cyan());
        }
        FolderAction::Delete {
            uid,
            move_to_root,
            delete_contents,
        } => {
            let mode = if move_to_root {
                FolderDeletion::MoveContentsToRoot
            } else if delete_contents {
                FolderDeletion::DeleteContents
            } else {
                FolderDeletion::RequireEmpty
            };
            match store.delete_folder(&uid, mode).await {
                Ok(true) => println!("{} Deleted folder {}", "✓".green(), uid.dimmed()),
                Ok(false) => bail!("no folder {}", uid),
                Err(e) => {
                    if let Some(FolderError::FolderNotEmpty { count, .. }) = e.downcast_ref::<FolderError>() {
                        bail!(
                            "folder holds {} collection(s); pass --move-to-root or --delete-contents",
                            count
                        );
                    }
                    return Err(e);
                }
            }
        }
        FolderAction::Duplicate { uid } => match store.duplicate_folder(&uid).await? {
            Some(copy) => println!(
                "{} Created {} with {} collection(s)",
                "✓".green(),
                copy.folder.name.cyan(),
                copy.collections.len()
            ),
            None => bail!("no folder {}", uid),
        },
        FolderAction::Add { collection, folder } => {
            if !store.move_collection_to_folder(&collection, &folder).await? {
                bail!("no collection {} or folder {}", collection, folder);
            }
            println!("{} Moved {} into {}", "✓".green(), collection.dimmed(), folder.dimmed());
        }
        FolderAction::Remove { collection } => {
            if !store.remove_collection_from_folder(&collection).await? {
                bail!("no collection {}", collection);
            }
            println!("{} Moved {} to the root level", "✓".green(), collection.dimmed());
        }
    }
    Ok(())
}

fn move_command(action: MoveAction) -> Result<DragCommand> {
    Ok(match action {
        MoveAction::Tab {
            tab,
            from,
            to: Some(to),
            ..
        } if to != from => DragCommand::MoveTabAcross {
            source: from,
            target: to,
            tab,
        },
        MoveAction::Tab {
            tab,
            from,
            onto_tab,
            group,
            ungroup,
            ..
        } => {
            let target = match (onto_tab, group, ungroup) {
                (Some(t), _, _) => TabDropTarget::Tab(t),
                (None, Some(g), _) => TabDropTarget::Group(g),
                (None, None, true) => TabDropTarget::Ungrouped,
                (None, None, false) => bail!("pass --onto-tab, --group, --ungroup or --to"),
            };
            DragCommand::MoveTab {
                collection: from,
                tab,
                target,
            }
        }
        MoveAction::Group {
            group,
            from,
            to: Some(to),
            ..
        } if to != from => DragCommand::MoveGroupAcross {
            source: from,
            target: to,
            group,
        },
        MoveAction::Group {
            group,
            from,
            onto_group,
            onto_tab,
            ..
        } => DragCommand::MoveGroup {
            collection: from,
            group,
            target: match (onto_group, onto_tab) {
                (Some(g), _) => GroupDropTarget::Group(g),
                (None, Some(t)) => GroupDropTarget::Tab(t),
                (None, None) => GroupDropTarget::Nothing,
            },
        },
        MoveAction::Collection {
            uid,
            onto,
            folder,
            root,
        } => {
            let target = match (onto, folder, root) {
                (Some(c), _, _) => CollectionDropTarget::Collection(c),
                (None, Some(f), _) => CollectionDropTarget::Folder(f),
                (None, None, true) => CollectionDropTarget::RootZone,
                (None, None, false) => bail!("pass --onto, --folder or --root"),
            };
            DragCommand::MoveCollection { collection: uid, target }
        }
        MoveAction::Folder { uid, onto } => DragCommand::MoveFolder {
            folder: uid,
            target: FolderDropTarget::Folder(onto),
        },
    })
}

async fn cmd_move(app: App, action: MoveAction) -> Result<()> {
    let command = move_command(action)?;
    let mut workspace = Workspace::load(&app.store).await?;
    let mut queue = CommandQueue::new();

    if !queue.submit(&mut workspace, command, tabox_core::now_ms())? {
        println!("Nothing to move.");
        return Ok(());
    }
    let report = queue
        .flush(&app.store, &workspace, |_, err| {
            eprintln!("{} Could not save move: {:#}", "✗".red(), err);
        })
        .await;
    if report.failed > 0 {
        bail!("move was not saved");
    }
    if report.refresh_required {
        println!("{}", "Moved, but the new position could not be saved; order was left as stored".yellow());
    } else {
        println!("{} Moved", "✓".green());
    }
    Ok(())
}

async fn cmd_backups(app: App, action: BackupAction) -> Result<()> {
    let engine = app.backups();
    match action {
        BackupAction::List { backup_type } => {
            let backups = engine.get_available_backups(backup_type.as_deref()).await?;
            if backups.is_empty() {
                println!("No backups.");
                return Ok(());
            }
            let rows: Vec<BackupRow> = backups
                .into_iter()
                .map(|b| BackupRow {
                    key: b.key,
                    backup_type: if b.minimal {
                        format!("{} (minimal)", b.backup_type)
                    } else {
                        b.backup_type
                    },
                    created: format_ms(b.timestamp),
                    collections: b.collection_count,
                    size: format_bytes(b.data_size),
                    reason: b.reason,
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{}", table);
        }
        BackupAction::Create { reason } => {
            let outcome = engine.create_backup("manual", &reason, None).await?;
            match outcome.key() {
                Some(key) => println!("{} Backup saved as {}", "✓".green(), key.cyan()),
                None => println!("{}", "Storage is nearly full; backup skipped".yellow()),
            }
        }
        BackupAction::Restore { key, no_validate } => {
            if !engine.restore_from_backup(&key, !no_validate).await? {
                bail!("backup {} was not restored", key);
            }
            println!("{} Restored {}", "✓".green(), key.cyan());
        }
        BackupAction::Cleanup => {
            let removed = engine.cleanup_for_current_usage().await?;
            println!("{} Removed {} old backup(s)", "✓".green(), removed);
        }
    }
    Ok(())
}

async fn cmd_export(app: App, folder: Option<String>, collection: Option<String>, out: Option<PathBuf>) -> Result<()> {
    let payload = match (folder, collection) {
        (Some(uid), _) => app
            .store
            .export_folder(&uid)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no folder {}", uid))?,
        (None, Some(uid)) => app
            .store
            .export_collection(&uid)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no collection {}", uid))?,
        (None, None) => app.store.export_all().await?,
    };
    let content = serde_json::to_string_pretty(&payload.to_json()?)?;

    if let Some(path) = out {
        std::fs::write(&path, &content).with_context(|| format!("failed to write {}", path.display()))?;
        println!(
            "{} Exported {} collection(s) to {}",
            "✓".green(),
            payload.collection_count(),
            path.display()
        );
    } else {
        println!("{}", content);
    }
    Ok(())
}

async fn cmd_import(app: App, path: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content).context("import file is not valid JSON")?;
    let payload = ExportPayload::parse(value)?;
    let report = app.store.import(payload).await?;
    println!(
        "{} Imported {} collection(s), {} folder(s)",
        "✓".green(),
        report.collections_imported,
        report.folders_imported
    );
    if report.renamed > 0 {
        println!("  {} renamed to avoid duplicate names", report.renamed);
    }
    Ok(())
}

async fn cmd_search(app: App, query: String, limit: usize) -> Result<()> {
    let collections = app.store.load_all_collections(&LoadOptions::default()).await?;
    let hits: Vec<_> = tabox_search::search(&query, &collections).into_iter().take(limit).collect();
    if hits.is_empty() {
        println!("No results for '{}'", query);
        return Ok(());
    }
    println!("{} results for '{}':", hits.len(), query.bold());
    for hit in &hits {
        println!(
            "  [{}] {} {} {}",
            hit.score,
            hit.collection_name.cyan(),
            "›".dimmed(),
            hit.text
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(0), "1970-01-01 00:00");
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_move_command_mapping() {
        let cli = Cli::parse_from(["tabox", "move", "tab", "t1", "--from", "a", "--to", "b"]);
        let Commands::Move { action } = cli.command else {
            panic!("expected move");
        };
        assert_eq!(
            move_command(action).unwrap(),
            DragCommand::MoveTabAcross {
                source: "a".into(),
                target: "b".into(),
                tab: "t1".into()
            }
        );

        let cli = Cli::parse_from(["tabox", "move", "collection", "c1", "--root"]);
        let Commands::Move { action } = cli.command else {
            panic!("expected move");
        };
        assert_eq!(
            move_command(action).unwrap(),
            DragCommand::MoveCollection {
                collection: "c1".into(),
                target: CollectionDropTarget::RootZone
            }
        );

        let cli = Cli::parse_from(["tabox", "move", "tab", "t1", "--from", "a"]);
        let Commands::Move { action } = cli.command else {
            panic!("expected move");
        };
        assert!(move_command(action).is_err());
    }
}
