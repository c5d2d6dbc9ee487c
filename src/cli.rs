use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use log::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
#[command(group(ArgGroup::new("input").required(true).args(["bin_dirs", "contig2bin_tables"])))]
pub struct Args {
    #[arg(short = 'd', long, num_args(2..), help = "Directories with bins, one fasta file per bin")]
    pub bin_dirs: Option<Vec<PathBuf>>,

    #[arg(
        short = 'b',
        long,
        num_args(2..),
        help = "Contig to bin tables with two tab-separated columns: contig, bin"
    )]
    pub contig2bin_tables: Option<Vec<PathBuf>>,

    #[arg(short, long, required = true, help = "Contigs in fasta format. Can be .gz")]
    pub contigs: PathBuf,

    #[arg(
        short = 'k',
        long,
        required = true,
        help = "Marker gene hits on contigs, two tab-separated columns: contig, marker"
    )]
    pub markers: PathBuf,

    #[arg(long, help = "Number of markers expected in a complete genome. Defaults to the number of distinct markers in --markers")]
    pub marker_set_size: Option<usize>,

    #[arg(
        short,
        long,
        default_value_t = 40.0,
        help = "Minimum completeness required for final bin selections"
    )]
    pub min_completeness: f64,

    #[arg(
        short = 'w',
        long,
        default_value_t = 2.0,
        help = "Bins are scored as completeness - weight * contamination. A low weight favors complete bins over low contaminated bins"
    )]
    pub contamination_weight: f64,

    #[arg(
        long,
        default_value_t = 50.0,
        help = "Bins more contaminated than this are not used to build union bins"
    )]
    pub max_contamination: f64,

    #[arg(short, long, num_args(1..), default_values = vec![".fa", ".fna", ".fasta"], help = "Extensions to look for in bin directories. Can be .gz")]
    pub extensions: Vec<String>,

    #[arg(short, long, default_value_t = 1, help = "Num threads")]
    pub threads: usize,

    #[arg(short, long, default_value = "results", help = "Path to output directory")]
    pub outdir: PathBuf,

    #[arg(short, long, help = "Increase output verbosity")]
    pub verbose: bool,

    #[arg(long, help = "Activate debug mode: write every candidate bin and the contig index")]
    pub debug: bool,
}

impl Args {
    pub fn log_level(&self) -> LevelFilter {
        if self.debug {
            LevelFilter::Debug
        } else if self.verbose {
            LevelFilter::Info
        } else {
            LevelFilter::Warn
        }
    }
}

pub fn parse_args() -> Args {
    normalize(Args::parse())
}

fn normalize(mut args: Args) -> Args {
    args.extensions = args
        .extensions
        .into_iter()
        .map(|e| e.to_lowercase())
        .collect();
    args
}
