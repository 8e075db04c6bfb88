//! Both roles of a complete session.
//!
//! ```text
//!  client                                   server
//!  ──────                                   ──────
//!  pre-scan items
//!  send_items(Upload) ── chunks / END ──▶   receive_items(Upload)
//!                      ◀── acks / -2 ──     merge → artifact
//!  receive_items(Download) ◀── chunks ──    send_items(Download)
//!                      ── acks / -1 ──▶
//! ```
//!
//! Sequence numbers restart at zero for each phase.  Any error ends the
//! session; there is no resume.

use std::path::{Path, PathBuf};

use crate::connection::{Connection, SendReport};
use crate::error::{ExchangeError, Result};
use crate::lines::{FileSource, LineSource, SinkFactory};
use crate::reassembler::Artifact;
use crate::receiver::{ReceivedItem, Receiver};
use crate::scheduler::{Pick, Scheduler};
use crate::state::Phase;
use crate::transport::Transport;

/// Outcome of a client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientReport {
    pub upload: SendReport,
    /// Lines of the artifact the server sent back.
    pub artifact: Vec<String>,
}

/// Outcome of a server session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReport {
    /// Uploaded items in the order they were first seen.
    pub items: Vec<ReceivedItem>,
    pub artifact: Artifact,
    pub download: SendReport,
}

/// Server-side choices that do not affect the wire.
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Where to persist the artifact before sending it back.
    pub artifact_path: Option<PathBuf>,
    /// Item names the server expects; missing ones are reported in the log.
    pub expected_items: Vec<String>,
}

/// Open every path as a line source.  The first one that cannot be opened
/// fails the whole set.
pub fn open_sources<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<FileSource>> {
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            FileSource::open(path).map_err(|source| ExchangeError::MissingItem {
                name: path.display().to_string(),
                source,
            })
        })
        .collect()
}

/// Upload `sources`, then download the merged artifact into `sinks`.
pub async fn run_client<T, S, F>(
    conn: &mut Connection<T>,
    sources: Vec<S>,
    pick: &mut impl Pick,
    sinks: F,
) -> Result<ClientReport>
where
    T: Transport,
    S: LineSource,
    F: SinkFactory,
{
    let mut scheduler = Scheduler::new(sources)?;
    log::info!(
        "[session] uploading {} item(s), {} line(s)",
        scheduler.progress().len(),
        scheduler
            .progress()
            .iter()
            .map(|p| p.total_lines)
            .sum::<usize>()
    );

    let upload = conn
        .send_items(Phase::Upload, &mut scheduler, pick, None)
        .await?;

    let received = conn
        .receive_items(Receiver::new(Phase::Download, sinks))
        .await?;

    let expected = &conn.config().artifact_name;
    let mut artifact = Vec::new();
    for item in received {
        if &item.name != expected {
            log::warn!("[session] download carried {} instead of {expected}", item.name);
        }
        artifact.extend(item.lines);
    }
    log::info!("[session] artifact has {} line(s)", artifact.len());

    Ok(ClientReport { upload, artifact })
}

/// Receive the upload into `sinks`, merge it and send the artifact back.
pub async fn run_server<T, F>(
    conn: &mut Connection<T>,
    sinks: F,
    pick: &mut impl Pick,
    options: &ServerOptions,
) -> Result<ServerReport>
where
    T: Transport,
    F: SinkFactory,
{
    let items = conn
        .receive_items(Receiver::new(Phase::Upload, sinks))
        .await?;

    for name in &options.expected_items {
        if !items.iter().any(|i| &i.name == name) {
            log::warn!("[session] {name} never arrived");
        }
    }

    let artifact = Artifact::merge(&items);
    if let Some(path) = &options.artifact_path {
        if let Some(name) = shadowed_item(&items, path) {
            log::warn!(
                "[session] artifact {} has the same name as uploaded item {name}; \
                 a stored copy of it in that directory is overwritten",
                path.display()
            );
        }
        artifact
            .write_to(path)
            .map_err(|source| ExchangeError::Sink {
                name: path.display().to_string(),
                source,
            })?;
        log::info!("[session] artifact written to {}", path.display());
    }

    let source = artifact.to_source(&conn.config().artifact_name);
    let mut scheduler = Scheduler::new(vec![source])?;
    let download = conn
        .send_items(
            Phase::Download,
            &mut scheduler,
            pick,
            Some(Phase::Upload.end_sentinel()),
        )
        .await?;

    Ok(ServerReport {
        items,
        artifact,
        download,
    })
}

/// Uploaded item sharing its file name with the artifact at `path`.
fn shadowed_item<'a>(items: &'a [ReceivedItem], path: &Path) -> Option<&'a str> {
    let file_name = path.file_name()?;
    items
        .iter()
        .map(|i| i.name.as_str())
        .find(|name| std::ffi::OsStr::new(name) == file_name)
}
