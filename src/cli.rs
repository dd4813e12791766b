use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mediascrub")]
#[command(about = "De-identify recorded media: blur faces, redact transcripts")]
#[command(version)]
pub struct Cli {
    /// Path to config file (default: mediascrub.toml beside the executable,
    /// then the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline: download, transcribe, blur, redact, merge
    Run {
        /// URL of the source media
        url: String,
    },

    /// Blur faces in a local video file (no download, no transcription)
    Blur {
        /// Input video file
        input: PathBuf,

        /// Output path (default: <input stem>_blurred.mp4 beside the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Redact a local text file through the de-identification service
    Redact {
        /// Input text file
        input: PathBuf,

        /// Output path (default: <input stem>_redacted.txt beside the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Treat the input as a transcription result JSON document instead
        /// of plain text
        #[arg(long)]
        from_json: bool,
    },

    /// Write a commented default config file and exit
    InitConfig {
        /// Where to write the file (default: mediascrub.toml in the current
        /// directory)
        path: Option<PathBuf>,
    },
}
