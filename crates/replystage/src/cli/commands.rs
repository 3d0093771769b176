use super::render::{print_messages, render_result};
use super::setup::{Cli, Commands};
use anyhow::{bail, Context};
use clap::Parser;
use replystageapp::commands::CmdResult;
use replystageapp::config::StageConfig;
use replystageapp::StageApi;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = StageConfig::load(cli.root.as_deref()).context("loading configuration")?;
    let (api, report) = StageApi::open(config).context("opening the staging area")?;
    if !report.is_clean() {
        warn!(
            discarded = report.discarded.len(),
            orphans = report.orphans_removed.len(),
            "staging area had inconsistencies at startup"
        );
    }

    let result = match cli.command {
        None => api.list_files(),
        Some(Commands::List { target }) => match target {
            Some(target) => api.check_files(&target)?,
            None => api.list_files(),
        },
        Some(Commands::Add { paths, select }) => api.stage_files(&paths, select)?,
        Some(Commands::Select { ids }) => api.select_files(&ids, true)?,
        Some(Commands::Unselect { ids }) => api.select_files(&ids, false)?,
        Some(Commands::Spoiler { ids, off }) => api.spoiler_files(&ids, !off)?,
        Some(Commands::Rename { id, name }) => api.rename_file(&id, &name)?,
        Some(Commands::Delete { ids, selected, all }) => {
            if all {
                api.delete_all()
            } else if selected {
                api.delete_selected()
            } else {
                api.delete_files(&ids)?
            }
        }
        Some(Commands::Submit { to, target, fail }) => api.submit(&target, &to, fail)?,
        Some(Commands::Doctor) => api.doctor()?,
    };

    emit(&result, cli.json)?;
    if result.has_errors() {
        bail!("command finished with errors");
    }
    Ok(())
}

fn emit(result: &CmdResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    print!("{}", render_result(result));
    print_messages(&result.messages);
    Ok(())
}

/// Logs go to stderr so that stdout stays parseable with `--json`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
