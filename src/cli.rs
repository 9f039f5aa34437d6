use clap::Parser;
use std::num::NonZeroUsize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Parallel, resumable HTTP range downloader", long_about = None)]
pub struct Args {
    /// URL of the file to download
    #[arg(index = 1)]
    pub url: String,

    /// Number of concurrent range requests
    #[arg(short = 's', long, default_value = "4")]
    pub split: NonZeroUsize,

    /// Destination file (defaults to the last path segment of the URL)
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Directory to save the file in when --output is not given
    #[arg(short = 'd', long = "download-dir", default_value = ".")]
    pub download_dir: PathBuf,

    /// Do not draw the progress line
    #[arg(short = 'q', long)]
    pub quiet: bool,
}
