use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding config.yaml, vectors.bin and the model cache.
    #[clap(long, default_value = ".")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Embed a CSV product catalog and write the vector index.
    Index {
        /// CSV file with id,code,description columns (header row required)
        #[clap(short, long)]
        catalog: PathBuf,
    },

    /// Resolve a product description against the indexed catalog.
    Search {
        /// Free-text product description
        description: String,

        /// Override the configured number of candidates
        #[clap(long)]
        top_k: Option<usize>,

        /// Override the configured distance threshold
        #[clap(long)]
        max_distance: Option<f64>,
    },

    /// Print vector index statistics.
    Stats {},
}
