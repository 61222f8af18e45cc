mod cli;
mod logging;
mod project;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use maolan_pool_engine::{ClipId, PoolConfig};
use project::Session;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = PoolConfig::load_or_default(&cli.project)
        .with_context(|| format!("loading config from {}", cli.project.display()))?;
    if let Some(rate) = cli.sample_rate {
        config.sample_rate = rate;
    }
    if cli.workers.is_some() {
        config.workers = cli.workers;
    }
    let mut session = Session::open(&cli.project, config)?;

    match cli.command {
        Command::Import { files, bpm } => {
            let bpm = bpm.unwrap_or(session.config.bpm);
            for file in &files {
                let id = session.import(file, bpm)?;
                println!("{id} {}", session.pool.get(id)?.name());
            }
            session.save()?;
        }
        Command::Record {
            track,
            lane,
            channels,
            seconds,
        } => {
            let id = session.record(&track, lane, channels, seconds)?;
            println!("{id} {}", session.pool.get(id)?.name());
            session.save_metadata()?;
        }
        Command::List => {
            print!("{}", session.pool);
            println!("regions: {:?}", session.usage.regions);
            println!("undo history: {:?}", session.usage.undo_history);
        }
        Command::Save { backup: None } => session.save()?,
        Command::Save { backup: Some(n) } => session.save_backup(n)?,
        Command::Gc => {
            let removed = session.gc();
            info!("Garbage collected {} clips", removed.len());
            for id in removed {
                println!("removed {id}");
            }
            session.save_metadata()?;
        }
        Command::Duplicate { id } => {
            let new_id = session.duplicate(ClipId(id))?;
            println!("{new_id} {}", session.pool.get(new_id)?.name());
            session.save_metadata()?;
        }
        Command::Remove { id, keep_file } => {
            session.remove(ClipId(id), !keep_file)?;
            session.save_metadata()?;
        }
        Command::Unref { id } => {
            session.usage.unreference(ClipId(id));
            session.save_metadata()?;
        }
        Command::ClearHistory => {
            session.usage.clear_history();
            session.save_metadata()?;
        }
    }
    Ok(())
}
