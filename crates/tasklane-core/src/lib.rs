pub mod auth;
pub mod chat;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod render;
pub mod session;
pub mod store;

use std::ffi::OsString;
use std::sync::Arc;

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
    "starting tasklane CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rcfile.as_deref()
  )?;
  cfg.apply_overrides(
    pre
      .rc_overrides
      .into_iter()
      .chain(
        cli
          .rc_overrides
          .into_iter()
          .map(|setting| (setting.key, setting.value))
      )
      .chain(cli.api_url.map(|url| {
        ("api.url".to_string(), url)
      }))
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

  let token_store: Arc<
    dyn session::TokenStore
  > = Arc::new(
    session::FileTokenStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open token store \
         at {}",
        data_dir.display()
      )
    })?
  );
  let session =
    session::Session::restore(
      token_store
    )?;

  let api_url = cfg.api_url();
  debug!(api_url = %api_url, "using task backend");
  let transport = Arc::new(
    client::HttpTransport::new(
      &api_url,
      cfg.api_timeout()?
    )?
  );

  let app = commands::App::new(
    &cfg,
    session,
    transport,
    Arc::new(
      commands::TerminalNavigator
    )
  )?;
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async \
         runtime"
      )?;
  runtime.block_on(
    commands::dispatch(&app, inv)
  )?;

  info!("done");
  Ok(())
}
