mod cli;
mod database;
mod format;
mod import;
mod io;
mod logging;
mod normalize;
mod outside;
mod playlist;
mod result;
mod settings;
mod sync;
mod transcode;
mod types;

use clap::Parser;
use crossbeam_channel::Receiver;
use miette::IntoDiagnostic;
use tracing::{debug, info, warn};

use crate::{
    cli::{Args, Command},
    database::{ImportStore, Sqlite},
    format::format_selector,
    import::ImportOutcome,
    io::{find_unused_path, sanitize_title},
    outside::Ytdl,
    settings::Settings,
    sync::{ChannelJobQueue, JobGraph, SyncOptions},
};

fn main() -> miette::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    logging::init_logging(level)?;

    let settings = Settings::load(args.config.as_deref()).map_err(miette::Report::from)?;

    let ytdl = Ytdl::new(&settings.tool).map_err(miette::Report::from)?;
    if let Err(err) = ytdl.probe() {
        // Not fatal here: the problem resurfaces on the first real call
        warn!(
            "Extraction tool probe failed: {}",
            miette::Report::from(err)
        );
    }

    let store =
        Sqlite::read_or_create(&settings.database_path).map_err(miette::Report::from)?;

    let format = format_selector(
        &settings.import.enabled_resolutions,
        settings.import.use_best_format,
    );

    match args.command {
        Command::Import {
            url,
            channel,
            subtitles,
            resolution,
        } => {
            // A CLI resolution override narrows the chain to that target
            let format = match resolution {
                Some(resolution) => format_selector(&[resolution], false),
                None => format,
            };
            run_import(&ytdl, &store, &settings, &format, &url, &channel, subtitles)
        }
        Command::Sync {
            url,
            channel,
            limit,
            only_after,
        } => run_sync(
            &ytdl,
            &store,
            &settings,
            &format,
            &url,
            &channel,
            limit,
            only_after,
        ),
    }
}

fn run_import(
    ytdl: &Ytdl,
    store: &Sqlite,
    settings: &Settings,
    format: &str,
    url: &str,
    channel_name: &str,
    subtitles: bool,
) -> miette::Result<()> {
    let channel = store.ensure_channel(channel_name)?;

    if store.url_already_imported(channel.id, url)? {
        info!("'{url}' is already imported in channel '{}'", channel.name);
        return Ok(());
    }

    let outcome = import::download_and_inspect(ytdl, url, format, &settings.import)
        .map_err(miette::Report::from)?;

    if let Some(video) = &outcome.probe.video {
        info!(
            "Probed video stream: {}x{} at {:.0} fps",
            video.width, video.height, video.fps
        );
    }
    info!(
        "Quick copy: audio={}, video={}",
        outcome.verdict.quick_audio, outcome.verdict.quick_video
    );
    if let Some(bitrate) = outcome.verdict.target_bitrate {
        info!("Re-encoding would target {bitrate} bits/s");
    }

    let saved = persist_outcome(outcome, settings)?;
    info!("Saved media to '{}'", saved.display());

    if subtitles {
        import::fetch_subtitles(ytdl, url, &settings.import.download_dir)
            .map_err(miette::Report::from)?;
    }

    store.record_import(channel.id, url)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_sync(
    ytdl: &Ytdl,
    store: &Sqlite,
    settings: &Settings,
    format: &str,
    url: &str,
    channel_name: &str,
    limit: Option<u32>,
    only_after: Option<time::Date>,
) -> miette::Result<()> {
    let channel = store.ensure_channel(channel_name)?;
    let mut session = store.create_session(channel.id, url)?;

    let options = SyncOptions {
        format,
        videos_limit: limit.or(settings.import.videos_limit),
        only_after,
    };

    let (queue, receiver) = ChannelJobQueue::new();

    std::thread::scope(|scope| -> miette::Result<()> {
        let worker = std::thread::Builder::new()
            .name("queue".to_string())
            .spawn_scoped(scope, || queue_worker(receiver, ytdl, store, settings, format))
            .into_diagnostic()?;

        let outcome = sync::synchronize_channel(
            ytdl,
            store,
            &queue,
            &channel,
            url,
            &options,
            Some(&mut session),
        );

        // Close the channel so the worker stops once the batches drained
        drop(queue);
        let worker_outcome = worker.join().expect("Could not join thread");

        outcome.map_err(miette::Report::from)?;
        worker_outcome
    })?;

    info!("Channel '{}' synchronized", channel.name);
    Ok(())
}

/// Drain submitted job batches: children first, parent last, so the
/// session only resolves once every child settled.
fn queue_worker(
    receiver: Receiver<JobGraph>,
    ytdl: &Ytdl,
    store: &Sqlite,
    settings: &Settings,
    format: &str,
) -> miette::Result<()> {
    for JobGraph { parent, children } in receiver {
        for job in children {
            debug!(
                "Running import job: url='{}', user={}, privacy={:?}, published_at={:?}",
                job.target_url, job.user_id, job.privacy, job.published_at_override
            );

            // Children may fail individually, the parent still runs
            let outcome = import::download_and_inspect(ytdl, &job.target_url, format, &settings.import)
                .map_err(miette::Report::from)
                .and_then(|outcome| {
                    let saved = persist_outcome(outcome, settings)?;
                    store.record_import(job.channel_id, &job.target_url)?;
                    Ok(saved)
                });

            match outcome {
                Ok(saved) => info!("Imported '{}' to '{}'", job.target_url, saved.display()),
                Err(err) => warn!("Import of '{}' failed: {err}", job.target_url),
            }
        }

        if let Some(id) = parent.sync_session_id {
            let mut session = store.load_session(id)?;
            session.complete();
            store.save_session(&session)?;
        }

        info!("Channel {} import finalized", parent.channel_id);
    }

    Ok(())
}

/// Move the downloaded media into the configured download directory
fn persist_outcome(outcome: ImportOutcome, settings: &Settings) -> miette::Result<std::path::PathBuf> {
    std::fs::create_dir_all(&settings.import.download_dir).into_diagnostic()?;

    let title = sanitize_title(&outcome.metadata.name);
    let dot_ext = format!(".{}", outcome.metadata.ext.as_deref().unwrap_or("mp4"));
    let target = find_unused_path(&settings.import.download_dir, &title, &dot_ext)?;

    // First try a simple move; fall back to copying across filesystems
    if let Err(err) = outcome.file.persist(&target) {
        std::fs::copy(err.file.path(), &target).into_diagnostic()?;
    }

    Ok(target)
}
