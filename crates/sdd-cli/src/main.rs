use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use sdd_core::{
    CommitGuard, DirectoryFeatureCatalog, FeatureCatalog, FileChange, FileSystem, LocalFileSystem,
    ParityEngine, RunCoordinator, SddConfig, TraceQueryService, Workspace,
};
use sdd_ledger::{FileOpKind, LedgerStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("sdd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Spec-to-code traceability for an SDD workspace")
        .subcommand_required(true)
        .arg(
            Arg::new("workspace")
                .long("workspace")
                .short('w')
                .global(true)
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("Workspace root"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
        .subcommand(Command::new("status").about("Show the active run and parity"))
        .subcommand(Command::new("parity").about("Show tracked/untracked changes and stale docs"))
        .subcommand(Command::new("features").about("List features found in the workspace"))
        .subcommand(
            Command::new("trace-file")
                .about("List the runs that touched a file")
                .arg(Arg::new("path").required(true).help("Workspace-relative path")),
        )
        .subcommand(
            Command::new("trace-task")
                .about("List the files and runs of a feature task")
                .arg(Arg::new("feature").required(true))
                .arg(Arg::new("task").required(true)),
        )
        .subcommand(
            Command::new("start")
                .about("Start a run for a feature task")
                .arg(Arg::new("feature").required(true))
                .arg(Arg::new("task").required(true))
                .arg(
                    Arg::new("input")
                        .long("input")
                        .short('i')
                        .action(ArgAction::Append)
                        .help("Document the run is based on (repeatable)"),
                ),
        )
        .subcommand(Command::new("stop").about("Stop the active run"))
        .subcommand(
            Command::new("abort")
                .about("Abort the active run")
                .arg(Arg::new("reason").required(true)),
        )
        .subcommand(
            Command::new("record")
                .about("Record a file change reported by a watcher")
                .arg(Arg::new("path").required(true))
                .arg(
                    Arg::new("op")
                        .long("op")
                        .default_value("modify")
                        .help("create, modify, delete or rename"),
                ),
        )
        .subcommand(
            Command::new("check-commit").about("Decide whether a commit may proceed (exit 1 when blocked)"),
        )
        .subcommand(
            Command::new("override")
                .about("Accept the current untracked changes")
                .arg(Arg::new("reason").required(true)),
        )
        .subcommand(Command::new("verify").about("Verify ledger integrity"))
}

struct Session {
    root: PathBuf,
    config: SddConfig,
    workspace: Arc<Workspace>,
    fs: Arc<LocalFileSystem>,
    json: bool,
}

impl Session {
    fn open(matches: &ArgMatches) -> Result<Self> {
        let root = matches
            .get_one::<PathBuf>("workspace")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));
        let config = SddConfig::load(&root)?;
        let ledger_path = config.ledger_path_in(&root);
        let ledger = LedgerStore::open(&ledger_path)
            .with_context(|| format!("opening ledger {}", ledger_path.display()))?;
        if let Some(diagnostic) = ledger.safe_mode() {
            tracing::warn!(%diagnostic, "ledger is read-only until repaired");
        }

        Ok(Self {
            fs: Arc::new(LocalFileSystem::new(&root)),
            workspace: Arc::new(Workspace::new(Arc::new(ledger), config.actor.clone())),
            json: matches.get_flag("json"),
            config,
            root,
        })
    }

    fn coordinator(&self) -> RunCoordinator {
        RunCoordinator::new(Arc::clone(&self.workspace))
    }

    fn parity(&self) -> ParityEngine {
        ParityEngine::new(Arc::clone(&self.workspace)).with_file_system(self.fs.clone())
    }

    fn print<T: Serialize + std::fmt::Debug>(&self, value: &T) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{value:#?}");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let ctx = Session::open(&matches)?;

    match matches.subcommand() {
        Some(("status", _)) => {
            let status = sdd_core::Status {
                active_run: ctx.coordinator().active_run(),
                parity: ctx.parity().compute().await,
            };
            ctx.print(&status)?;
        }
        Some(("parity", _)) => ctx.print(&ctx.parity().compute().await)?,
        Some(("features", _)) => {
            let catalog = DirectoryFeatureCatalog::new(&ctx.root, &ctx.config.features_dir);
            ctx.print(&catalog.list_features().await?)?;
        }
        Some(("trace-file", args)) => {
            let path = required(args, "path")?;
            ctx.print(&TraceQueryService::new(Arc::clone(&ctx.workspace)).get_file_trace(path)?)?;
        }
        Some(("trace-task", args)) => {
            let traces = TraceQueryService::new(Arc::clone(&ctx.workspace));
            ctx.print(&traces.get_task_trace(required(args, "feature")?, required(args, "task")?)?)?;
        }
        Some(("start", args)) => {
            let inputs: Vec<String> = args.get_many::<String>("input").into_iter().flatten().cloned().collect();
            let run = ctx
                .coordinator()
                .start_run_citing(ctx.fs.as_ref(), required(args, "feature")?, required(args, "task")?, &inputs)
                .await?;
            ctx.print(&run)?;
        }
        Some(("stop", _)) => ctx.print(&ctx.coordinator().stop_run()?)?,
        Some(("abort", args)) => ctx.print(&ctx.coordinator().abort_run(required(args, "reason")?)?)?,
        Some(("record", args)) => {
            let op: FileOpKind = required(args, "op")?.parse()?;
            let path = required(args, "path")?;
            let hash_after = match op {
                FileOpKind::Delete => None,
                _ => ctx.fs.read_file(path).await.ok().map(|c| c.hash),
            };
            let event = ctx
                .coordinator()
                .on_file_change(FileChange::new(path, op).with_hashes(None, hash_after))?;
            ctx.print(&*event)?;
        }
        Some(("check-commit", _)) => {
            let settings = Arc::new(ctx.config.clone());
            let decision = CommitGuard::new(Arc::clone(&ctx.workspace), settings).check_commit()?;
            ctx.print(&decision)?;
            if !decision.allowed {
                std::process::exit(1);
            }
        }
        Some(("override", args)) => {
            let files = ctx.parity().override_untracked(required(args, "reason")?)?;
            ctx.print(&files)?;
        }
        Some(("verify", _)) => {
            let ledger = ctx.workspace.ledger();
            if let Some(diagnostic) = ledger.safe_mode() {
                bail!("ledger corrupt at {diagnostic}");
            }
            ledger.verify_integrity()?;
            tracing::info!(events = ledger.len(), "ledger chain verified");
            if ctx.json {
                println!("{}", serde_json::json!({ "valid": true, "events": ledger.len() }));
            } else {
                println!("Ledger integrity: VALID ({} events)", ledger.len());
            }
        }
        _ => unreachable!("subcommand is required"),
    }
    Ok(())
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("missing argument <{name}>"))
}
