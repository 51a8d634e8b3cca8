//! erlmodel CLI - query and watch the model of an Erlang workspace

use clap::{Parser, Subcommand};
use colored::Colorize;
use erlmodel_core::{
    Config, DeltaKind, Element, ElementChangeListener, ElementInfo, ErrorEnvelope, FsWorkspace,
    Handle, Model, ModelError, ModelWatcher, ResourceDelta, ResourceId, Target, Workspace,
    UNKNOWN_MODULE,
};
use erlmodel_rpc::{
    ChangedFile, RefactorError, Refactoring, RefactoringOutcome, RefactoringParams, RpcChannel,
    StdioTransport,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "erlmodel")]
#[command(about = "Query the structure of an Erlang workspace", long_about = None)]
struct Cli {
    /// Workspace root (default: nearest directory with erlmodel.toml)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Runtime command for refactorings, overriding [rpc] runtime_command
    #[arg(long, global = true, env = "ERLMODEL_RUNTIME")]
    runtime: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default erlmodel.toml
    Init,

    /// List projects carrying the nature marker
    Projects,

    /// List top-level directories that are not projects
    NonMembers,

    /// List modules of a project
    Modules {
        project: String,
        /// Glob over module names (default: all)
        pattern: Option<String>,
    },

    /// Find functions by module glob and name regex
    Functions {
        project: String,
        module: String,
        function: String,
        #[arg(long)]
        arity: Option<u32>,
    },

    /// Show the outline of one module
    Outline { project: String, module: String },

    /// Poll the workspace and report model changes
    Watch {
        /// Stop after this long, e.g. "30s" (default: run until killed)
        #[arg(long = "for")]
        duration: Option<String>,
    },

    /// Rename the variable at a position
    RenameVar {
        file: String,
        line: i64,
        column: i64,
        new_name: String,
        /// Report the changes without writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Rename the function at a position
    RenameFun {
        file: String,
        line: i64,
        column: i64,
        new_name: String,
        /// Report the changes without writing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Rename a module
    RenameMod {
        file: String,
        new_name: String,
        /// Report the changes without writing them
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Refactor(#[from] RefactorError),

    #[error("{0}")]
    Usage(String),
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::Model(e.into())
    }
}

impl CliError {
    fn envelope(&self) -> ErrorEnvelope {
        match self {
            Self::Model(e) => e.envelope(),
            Self::Refactor(e) => ErrorEnvelope::new(e.code(), e.to_string(), ""),
            Self::Usage(message) => ErrorEnvelope::new("usage", message.as_str(), "See erlmodel --help"),
        }
    }
}

type Result<T> = std::result::Result<T, CliError>;

fn main() {
    let cli = Cli::parse();

    let result = detect_root(cli.root.clone()).and_then(|root| {
        let config = match &cli.command {
            // init must work before a valid config exists
            Commands::Init => Config::default(),
            _ => Config::discover(&root)?,
        };
        init_tracing(&config);
        run(&cli, &root, config)
    });

    if let Err(e) = result {
        if cli.json {
            let envelope = e.envelope();
            match serde_json::to_string_pretty(&envelope) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("Error: {}", e),
            }
        } else {
            eprintln!("{}: {}", "Error".red(), e);
        }
        std::process::exit(1);
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_env("ERLMODEL_LOG")
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: &Cli, root: &Path, config: Config) -> Result<()> {
    let json = cli.json;
    match &cli.command {
        Commands::Init => cmd_init(root),
        Commands::Projects => cmd_projects(&open_model(root, config)?, json),
        Commands::NonMembers => cmd_non_members(&open_model(root, config)?, json),
        Commands::Modules { project, pattern } => {
            let pattern = pattern.as_deref().unwrap_or(UNKNOWN_MODULE);
            cmd_modules(&open_model(root, config)?, project, pattern, json)
        }
        Commands::Functions {
            project,
            module,
            function,
            arity,
        } => cmd_functions(&open_model(root, config)?, project, module, function, *arity, json),
        Commands::Outline { project, module } => {
            cmd_outline(&open_model(root, config)?, project, module, json)
        }
        Commands::Watch { duration } => cmd_watch(root, config, duration.as_deref(), json),
        Commands::RenameVar {
            file,
            line,
            column,
            new_name,
            dry_run,
        } => {
            let params = RefactoringParams::new(file.as_str(), new_name.as_str()).at(*line, *column);
            cmd_refactor(cli, root, config, Refactoring::RenameVariable, params, *dry_run)
        }
        Commands::RenameFun {
            file,
            line,
            column,
            new_name,
            dry_run,
        } => {
            let params = RefactoringParams::new(file.as_str(), new_name.as_str()).at(*line, *column);
            cmd_refactor(cli, root, config, Refactoring::RenameFunction, params, *dry_run)
        }
        Commands::RenameMod {
            file,
            new_name,
            dry_run,
        } => {
            let params = RefactoringParams::new(file.as_str(), new_name.as_str());
            cmd_refactor(cli, root, config, Refactoring::RenameModule, params, *dry_run)
        }
    }
}

fn open_model(root: &Path, config: Config) -> Result<Model> {
    let workspace: Arc<dyn Workspace> = Arc::new(FsWorkspace::open(root)?);
    Ok(Model::new(workspace, config))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(ModelError::from)?;
    println!("{}", json);
    Ok(())
}

fn cmd_init(root: &Path) -> Result<()> {
    Config::init(root)?;
    println!("{} erlmodel.toml", "Created".green());
    Ok(())
}

fn cmd_projects(model: &Model, json: bool) -> Result<()> {
    let projects = model.projects()?;
    if json {
        return print_json(&projects);
    }

    if projects.is_empty() {
        println!("{}", "No projects".dimmed());
    }
    for project in &projects {
        match &project.info {
            ElementInfo::Project { properties, .. } => println!(
                "{}  src: {}  include: {}  out: {}",
                project.name().cyan(),
                properties.source_dirs.join(","),
                properties.include_dirs.join(","),
                properties.output_dir
            ),
            _ => println!("{}", project.name().cyan()),
        }
    }
    Ok(())
}

fn cmd_non_members(model: &Model, json: bool) -> Result<()> {
    let resources = model.non_member_resources()?;
    if json {
        return print_json(&resources);
    }
    for resource in &resources {
        println!("{}", resource.name().yellow());
    }
    Ok(())
}

fn cmd_modules(model: &Model, project: &str, pattern: &str, json: bool) -> Result<()> {
    let modules = model.find_module(project, pattern)?;
    if json {
        return print_json(&modules);
    }
    for module in &modules {
        let path = module.resource().map(|r| r.to_string()).unwrap_or_default();
        println!(
            "{}  {}  {}",
            module.handle.id().to_string().dimmed(),
            module.name().cyan(),
            path.dimmed()
        );
    }
    println!("{} {} modules", "Found".green(), modules.len());
    Ok(())
}

fn cmd_functions(
    model: &Model,
    project: &str,
    module: &str,
    function: &str,
    arity: Option<u32>,
    json: bool,
) -> Result<()> {
    let functions = model.find_function(project, module, function, arity)?;
    if json {
        return print_json(&functions);
    }
    for function in &functions {
        let module = function
            .handle
            .parent()
            .map(|m| m.name().to_string())
            .unwrap_or_default();
        let exported = matches!(function.info, ElementInfo::Function { exported: true, .. });
        let line = function.info.line().unwrap_or(0);
        println!(
            "{}  {}:{}/{}  line {}{}",
            function.handle.id().to_string().dimmed(),
            module.cyan(),
            function.name().bold(),
            function.arity().unwrap_or(0),
            line,
            if exported { "  exported".green().to_string() } else { String::new() }
        );
    }
    println!("{} {} functions", "Found".green(), functions.len());
    Ok(())
}

#[derive(serde::Serialize)]
struct OutlineEntry {
    #[serde(flatten)]
    element: Element,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<OutlineEntry>,
}

fn outline_of(model: &Model, element: Element) -> Result<OutlineEntry> {
    let children = if element.kind() == erlmodel_core::ElementKind::Function {
        model
            .children(&element.handle)?
            .into_iter()
            .map(|child| outline_of(model, child))
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };
    Ok(OutlineEntry { element, children })
}

fn cmd_outline(model: &Model, project: &str, module: &str, json: bool) -> Result<()> {
    let Some(found) = model
        .find_module(project, module)?
        .into_iter()
        .find(|m| m.name() == module)
    else {
        return Err(CliError::Usage(format!("no module {} in project {}", module, project)));
    };

    let entries = model
        .children(&found.handle)?
        .into_iter()
        .map(|child| outline_of(model, child))
        .collect::<Result<Vec<_>>>()?;
    if json {
        return print_json(&entries);
    }

    println!("{} {}", "Module".green(), found.name().bold());
    for entry in &entries {
        print_entry(entry, 1);
    }
    Ok(())
}

fn print_entry(entry: &OutlineEntry, depth: usize) {
    let element = &entry.element;
    let label = match element.arity() {
        Some(arity) => format!("{}/{}", element.name(), arity),
        None => element.name().to_string(),
    };
    let detail = match &element.info {
        ElementInfo::Attribute { value: Some(value), .. } => format!("  {}", value),
        ElementInfo::Clause { head, .. } => format!("  {}", head),
        _ => String::new(),
    };
    let line = element.info.line().map(|l| format!(":{}", l)).unwrap_or_default();
    println!(
        "{}{} {}{}{}",
        "  ".repeat(depth),
        element.kind().as_str().dimmed(),
        label.cyan(),
        line.dimmed(),
        detail
    );
    for child in &entry.children {
        print_entry(child, depth + 1);
    }
}

/// Prints every change notification
struct PrintingListener {
    json: bool,
}

impl ElementChangeListener for PrintingListener {
    fn name(&self) -> String {
        "printer".to_string()
    }

    fn element_changed(&self, element: &Handle) -> std::result::Result<(), String> {
        if self.json {
            let line = serde_json::json!({ "changed": element });
            println!("{}", line);
        } else {
            let label = if element.is_root() { "<root>".to_string() } else { element.to_string() };
            println!("{} {}", "Changed".yellow(), label);
        }
        Ok(())
    }
}

fn cmd_watch(root: &Path, config: Config, duration: Option<&str>, json: bool) -> Result<()> {
    let limit = match duration {
        Some(text) => Some(
            erlmodel_core::config::parse_duration(text)
                .ok_or_else(|| CliError::Usage(format!("invalid duration {:?}", text)))?,
        ),
        None => None,
    };
    let poll = config.poll_interval();

    let workspace = Arc::new(FsWorkspace::open(root)?);
    let deltas = workspace.subscribe();
    let model = Arc::new(Model::new(workspace.clone() as Arc<dyn Workspace>, config));
    model.subscribe(Arc::new(PrintingListener { json }));

    // Build the project set up front so changes have something to invalidate
    let projects = model.projects()?;
    if !json {
        println!(
            "{} {} ({} projects, every {:?})",
            "Watching".green(),
            root.display(),
            projects.len(),
            poll
        );
    }

    let watcher = ModelWatcher::spawn(Arc::clone(&model), deltas)?;
    let started = Instant::now();
    loop {
        std::thread::sleep(poll);
        if let Err(e) = workspace.rescan() {
            tracing::warn!(error = %e, "workspace rescan failed");
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
    }

    let applied = watcher.stop();
    tracing::debug!(applied, "watch finished");
    Ok(())
}

fn cmd_refactor(
    cli: &Cli,
    root: &Path,
    config: Config,
    refactoring: Refactoring,
    params: RefactoringParams,
    dry_run: bool,
) -> Result<()> {
    let command = match &cli.runtime {
        Some(text) => text.split_whitespace().map(str::to_string).collect(),
        None => config.rpc.runtime_command.clone().unwrap_or_default(),
    };
    if command.is_empty() {
        return Err(CliError::Usage(
            "no runtime configured; set [rpc] runtime_command or pass --runtime".to_string(),
        ));
    }
    let timeout = config.rpc_timeout();

    let model = open_model(root, config)?;
    let params = params.with_search_path(search_path(&model, root)?);

    let channel = RpcChannel::new(StdioTransport::new(command)).map_err(RefactorError::from)?;
    let outcome = refactoring.run(&channel, &params, timeout)?;
    channel.shutdown();

    let mut report = RefactorReport {
        refactoring: refactoring.name(),
        dry_run,
        changed: &outcome.changed,
        written: Vec::new(),
        invalidated: Vec::new(),
    };
    if !dry_run {
        apply_outcome(&model, root, &outcome, &mut report)?;
    }

    if cli.json {
        return print_json(&report);
    }
    let verb = if dry_run { "would change" } else { "changed" };
    println!(
        "{}: {} files {}",
        refactoring.name().green(),
        outcome.changed.len(),
        verb
    );
    for file in &outcome.changed {
        let marker = if report.written.contains(&file.path) { "  written" } else { "" };
        println!("  {}{}", file.path.cyan(), marker.dimmed());
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct RefactorReport<'a> {
    refactoring: &'static str,
    dry_run: bool,
    changed: &'a [ChangedFile],
    /// Files whose new content was written
    written: Vec<String>,
    /// Model elements invalidated by the change
    invalidated: Vec<Handle>,
}

/// Write returned contents and bring the model up to date.
///
/// Relative paths are taken relative to the workspace root.
fn apply_outcome(
    model: &Model,
    root: &Path,
    outcome: &RefactoringOutcome,
    report: &mut RefactorReport<'_>,
) -> Result<()> {
    for file in &outcome.changed {
        let path = Path::new(&file.path);
        let location = if path.is_absolute() { path.to_path_buf() } else { root.join(path) };

        if let Some(content) = &file.content {
            std::fs::write(&location, content)?;
            report.written.push(file.path.clone());
        }

        let Ok(relative) = location.strip_prefix(root) else {
            tracing::debug!(path = %file.path, "changed file outside the workspace");
            continue;
        };
        if let Some(Target::Internal(resource)) = model.resolve_target(&ResourceId::root(), relative, false) {
            let delta = ResourceDelta::new(resource, DeltaKind::Modified);
            if let Some(handle) = model.apply_delta(&delta) {
                if !report.invalidated.contains(&handle) {
                    report.invalidated.push(handle);
                }
            }
        }
    }
    Ok(())
}

/// Absolute module directories of every project
fn search_path(model: &Model, root: &Path) -> Result<Vec<String>> {
    let mut dirs = Vec::new();
    for project in model.projects()? {
        if let ElementInfo::Project { properties, .. } = &project.info {
            for dir in properties.module_dirs() {
                let path = root.join(project.name()).join(dir);
                if path.is_dir() {
                    dirs.push(path.display().to_string());
                }
            }
        }
    }
    Ok(dirs)
}

fn detect_root(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }

    // Walk up from the current directory looking for erlmodel.toml
    let mut current = std::env::current_dir()?;
    loop {
        if current.join("erlmodel.toml").exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Ok(std::env::current_dir()?);
        }
    }
}
