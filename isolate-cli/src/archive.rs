// SPDX-License-Identifier: MIT

//! The `archive` command.

use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use futures::future::join_all;
use isolate_archiver::{Archiver, ArchiverConfig, Canceler};
use isolate_store::{ContentStore, LocalStore, MemoryStore};
use tokio::signal;
use tracing::{info, warn};

use crate::config::{Config, StoreTarget};
use crate::error::{CliError, ConfigError, Result};

/// Hash the given files and upload what the store does not hold yet
#[derive(Debug, clap::Args)]
pub(crate) struct ArchiveCommand {
    /// Store to use: a directory, or `fake` for an in-memory store.
    /// Defaults to $ISOLATE_SERVER
    #[arg(short = 'I', long = "isolate-server")]
    server: Option<String>,

    /// Namespace to store content under
    #[arg(long)]
    namespace: Option<String>,

    /// Only print digests
    #[arg(short, long)]
    quiet: bool,

    /// Files to archive
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

impl ArchiveCommand {
    /// Command line flags win over the config file.
    pub(crate) fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server = Some(server.clone());
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        config.quiet |= self.quiet;
    }

    pub(crate) async fn run(self, mut config: Config) -> Result<()> {
        self.apply(&mut config);
        let namespace = config.namespace()?;
        let mut stdout = std::io::stdout();
        let mut stderr = std::io::stderr();
        let quiet = config.quiet;
        let progress = || -> Option<Box<dyn Write + Send>> {
            (!quiet).then(|| Box::new(std::io::stderr()) as Box<dyn Write + Send>)
        };
        match config.store_target()? {
            StoreTarget::Fake => {
                archive(
                    MemoryStore::new(namespace),
                    config.archiver,
                    &self.files,
                    progress(),
                    quiet,
                    &mut stdout,
                    &mut stderr,
                )
                .await
            }
            StoreTarget::Local(root) => {
                archive(
                    LocalStore::open(root, namespace)?,
                    config.archiver,
                    &self.files,
                    progress(),
                    quiet,
                    &mut stdout,
                    &mut stderr,
                )
                .await
            }
        }
    }
}

/// Archives `files` into `store`, printing `<digest>  <name>` per file to
/// `out`, progress lines to `progress` and, unless `quiet`, totals to `err`.
pub(crate) async fn archive<S: ContentStore>(
    store: S,
    config: ArchiverConfig,
    files: &[PathBuf],
    progress: Option<Box<dyn Write + Send>>,
    quiet: bool,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<()> {
    let start = Instant::now();
    let archiver = Archiver::with_config(store, progress, config).map_err(ConfigError::from)?;
    let on_signal = tokio::spawn(cancel_on_signal(archiver.canceler()));

    let pushed: Vec<_> = files
        .iter()
        .map(|path| {
            let name = path.display().to_string();
            let future = archiver.push_file(name.clone(), path);
            (name, future)
        })
        .collect();
    join_all(
        pushed
            .iter()
            .filter_map(|(_, future)| future.as_ref())
            .map(|future| future.wait_for_hashed()),
    )
    .await;

    let mut failed = 0;
    for (name, future) in &pushed {
        match future {
            Some(future) => match (future.digest(), future.error()) {
                (Some(digest), None) => writeln!(out, "{digest}  {name}")?,
                (_, Some(error)) => {
                    failed += 1;
                    writeln!(out, "{name}  {error}")?;
                }
                (None, None) => {
                    failed += 1;
                    writeln!(out, "{name}  not hashed")?;
                }
            },
            None => {
                failed += 1;
                writeln!(out, "{name}  skipped: archiver stopped")?;
            }
        }
    }

    let closed = archiver.close().await;
    on_signal.abort();

    if !quiet {
        let stats = archiver.stats();
        writeln!(err, "Hits    : {:>5} ({})", stats.hits, stats.bytes_hits)?;
        writeln!(err, "Misses  : {:>5} ({})", stats.misses, stats.bytes_pushed)?;
        writeln!(err, "Duration: {:?}", round_to_millis(start.elapsed()))?;
    }

    if failed > 0 {
        return Err(CliError::Failed {
            count: failed,
            total: files.len(),
        });
    }
    closed.map_err(CliError::from)
}

fn round_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

async fn cancel_on_signal(canceler: Canceler) {
    shutdown_signal().await;
    info!("Received shutdown signal, canceling");
    canceler.cancel();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
