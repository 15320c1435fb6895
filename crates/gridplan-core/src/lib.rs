pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod daterange;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod grid;
pub mod render;
pub mod selection;
pub mod stats;
pub mod store;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting gridplan"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.gridplanrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    datastore::FileStorage::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open task file in \
         {}",
        data_dir.display()
      )
    })?;
  let mut store = store::TaskStore::open(
    storage,
    datetime::SystemClock
  )
  .context("failed to load tasks")?;
  if store.dropped_on_load() > 0 {
    eprintln!(
      "warning: skipped {} unreadable \
       task record(s)",
      store.dropped_on_load()
    );
  }

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let command = match cli.command {
    | Some(command) => command,
    | None => {
      cli::Command::from_default(&cfg)?
    }
  };

  commands::dispatch(
    &mut store,
    &cfg,
    &mut renderer,
    command
  )?;

  info!("done");
  Ok(())
}
