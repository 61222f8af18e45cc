use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "maolan-pool", about = "Manage the audio clip pool of a Maolan project")]
pub struct Cli {
    /// Project directory
    #[arg(short, long, default_value = ".")]
    pub project: PathBuf,
    /// Project sample rate, overrides the config file
    #[arg(long)]
    pub sample_rate: Option<u32>,
    /// Writeback threads, overrides the config file
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// More output, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Import audio files into the pool and place them in the project
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Tempo stored with the clips
        #[arg(long)]
        bpm: Option<f64>,
    },
    /// Record a test tone into a new clip, flushing it as it grows
    Record {
        /// Track the recording belongs to
        track: String,
        #[arg(long, default_value_t = 0)]
        lane: usize,
        #[arg(long, default_value_t = 2)]
        channels: usize,
        #[arg(long, default_value_t = 1.0)]
        seconds: f64,
    },
    /// Print the pool slots
    List,
    /// Write every clip and the project file
    Save {
        /// Write into backup number N instead of the project
        #[arg(long)]
        backup: Option<usize>,
    },
    /// Remove clips nothing references and delete stray pool files
    Gc,
    /// Copy a clip under a new name
    Duplicate { id: usize },
    /// Remove a clip from the pool
    Remove {
        id: usize,
        /// Leave the pool file on disk
        #[arg(long)]
        keep_file: bool,
    },
    /// Drop a clip's region; undo history still references it
    Unref { id: usize },
    /// Forget the undo history
    ClearHistory,
}
