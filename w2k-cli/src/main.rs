//! wuxia2kindle CLI - offline access to a chapter library

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "w2k")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Library data directory
    #[arg(long, global = true, default_value = "./w2k_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest chapter payloads from JSON files
    Ingest {
        /// Files holding one payload or an array of payloads
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List books in the library
    Books {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the chapters of a book
    Chapters {
        /// Book id
        book_id: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set a book's cover image
    Cover {
        /// Book id
        book_id: u64,

        /// Image file (png, jpg, gif, webp)
        image: PathBuf,
    },

    /// Export a chapter range to EPUB
    Export {
        /// Book id
        book_id: u64,

        /// First chapter number
        #[arg(long, allow_negative_numbers = true)]
        from: i64,

        /// Last chapter number
        #[arg(long, allow_negative_numbers = true)]
        to: i64,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List export jobs
    Jobs {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "w2k_cli=debug,w2k_core=debug"
    } else {
        "w2k_cli=info,w2k_core=warn"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let library = commands::Library::open(&cli.data_dir).await?;

    match cli.command {
        Commands::Ingest { files } => commands::ingest(&library, &files).await,

        Commands::Books { json } => commands::books(&library, json).await,

        Commands::Chapters { book_id, json } => commands::chapters(&library, book_id, json).await,

        Commands::Cover { book_id, image } => commands::cover(&library, book_id, &image).await,

        Commands::Export {
            book_id,
            from,
            to,
            output,
        } => commands::export(&library, book_id, from, to, &output).await,

        Commands::Jobs { json } => commands::jobs(&library, json).await,
    }
}
