use anyhow::{bail, Context, Result};
use itertools::Itertools;
use log::{debug, info};

mod cli;
mod combine;
mod contig_index;
mod derep;
mod error;
mod fasta;
mod graph;
mod io;
mod output;
mod quality;
mod select;
mod types;

use crate::{
    cli::Args,
    combine::CombineOptions,
    contig_index::{contigs_in_bin_sets, ContigIndex},
    derep::dereplicate,
    graph::{group_by_origin, OverlapGraph},
    quality::MarkerGeneEstimator,
    types::{Bin, BinIdSequence},
};

// Only used to report how many selected bins are of high quality.
const HQ_MIN_COMPLETENESS: f64 = 90.0;
const HQ_MAX_CONTAMINATION: f64 = 5.0;

fn init_logging(args: &Args) {
    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    info!("Program started");
    info!("command line: {}", std::env::args().join(" "));
}

/// Number of bins passing the high quality thresholds.
fn count_high_quality(bins: &[Bin], min_completeness: f64, max_contamination: f64) -> Result<usize> {
    let mut count = 0;
    debug!("High quality bins:");
    for bin in bins {
        if bin.is_high_quality(min_completeness, max_contamination)? {
            debug!(
                "> {} completeness={}, contamination={}",
                bin,
                bin.completeness()?,
                bin.contamination()?
            );
            count += 1;
        }
    }
    Ok(count)
}

fn keep_complete_bins(bins: Vec<Bin>, min_completeness: f64) -> Result<Vec<Bin>> {
    let mut kept = Vec::with_capacity(bins.len());
    for bin in bins {
        if bin.is_complete_enough(min_completeness)? {
            kept.push(bin);
        }
    }
    Ok(kept)
}

fn run(args: &Args) -> Result<()> {
    std::fs::create_dir_all(&args.outdir)
        .with_context(|| format!("Could not create directory: {}", args.outdir.display()))?;

    let mut ids = BinIdSequence::new();
    let bin_sets = match (&args.bin_dirs, &args.contig2bin_tables) {
        (Some(dirs), _) => {
            info!("Parsing bin directories.");
            io::load_bin_dirs(dirs, &args.extensions, &mut ids)?
        }
        (None, Some(tables)) => {
            info!("Parsing contig2bin tables.");
            io::load_contig2bin_tables(tables, &mut ids)?
        }
        (None, None) => bail!("Either bin directories or contig2bin tables are required"),
    };
    io::log_bin_sets(&bin_sets);

    let contigs_in_bins = contigs_in_bin_sets(&bin_sets);
    info!("Parsing contig fasta file: {}", args.contigs.display());
    let contig_lengths = fasta::read_contig_lengths(&args.contigs)?;
    io::check_contig_universe(&contigs_in_bins, &contig_lengths, &args.contigs)?;

    // contig names are swapped for integer ids to save memory
    let index = ContigIndex::new(contigs_in_bins.iter());
    info!("{} contigs in input bins", index.len());
    let contig_lengths = index.apply(contig_lengths);
    let estimator = MarkerGeneEstimator::from_table(&args.markers, &index, args.marker_set_size)?;

    let mut originals = index.reindex_bins(dereplicate(bin_sets.into_values()))?;
    info!("{} unique input bins", originals.len());

    info!("Add size and assess quality of input bins");
    quality::add_bin_metrics(
        &mut originals,
        &contig_lengths,
        &estimator,
        args.contamination_weight,
    )?;

    let input_sets = group_by_origin(&originals);
    let input_report_dir = args.outdir.join("input_bins_quality_reports");
    info!("Writing original input bin metrics to directory: {}", input_report_dir.display());
    output::write_original_bin_metrics(&input_sets, &input_report_dir)?;

    info!("Create intermediate bins:");
    let graph = OverlapGraph::from_bin_sets(&input_sets);
    let options = CombineOptions {
        max_contamination: args.max_contamination,
        ..Default::default()
    };
    let new_bins = combine::create_intermediate_bins(&graph, &options, &mut ids)?;
    for (origin, count) in combine::count_by_origin(&new_bins) {
        debug!("{} intermediate bins tagged {}", count, origin);
    }

    info!("Dereplicating input bins and new bins");
    let mut all_bins = dereplicate([originals, new_bins]);

    info!("Assess quality for supplementary intermediate bins.");
    quality::add_bin_metrics(
        &mut all_bins,
        &contig_lengths,
        &estimator,
        args.contamination_weight,
    )?;

    if args.debug {
        let all_bins_report = args.outdir.join("all_bins_quality_reports.tsv");
        info!("Writing all bins in {}", all_bins_report.display());
        output::write_bin_info(&all_bins_report, &all_bins, Some(&index))?;
        output::write_index_to_contig(args.outdir.join("index_to_contig.tsv"), &index)?;
    }

    info!("Selecting best bins");
    let selected = select::select_best_bins(all_bins)?;
    info!("Bin Selection: {} selected bins", selected.len());

    info!(
        "Filtering bins: only bins with completeness >= {} are kept",
        args.min_completeness
    );
    let selected = keep_complete_bins(selected, args.min_completeness)?;
    info!("Filtering bins: {} selected bins", selected.len());

    let final_bin_report = args.outdir.join("final_bins_quality_reports.tsv");
    info!("Writing selected bins in {}", final_bin_report.display());
    output::write_bin_info(&final_bin_report, &selected, None)?;

    let final_bins_dir = args.outdir.join("final_bins");
    std::fs::create_dir_all(&final_bins_dir)
        .with_context(|| format!("Could not create directory: {}", final_bins_dir.display()))?;
    fasta::write_bins_fasta(&selected, &args.contigs, &index, &final_bins_dir)?;

    let hq = count_high_quality(&selected, HQ_MIN_COMPLETENESS, HQ_MAX_CONTAMINATION)?;
    info!(
        "{}/{} selected bins have a high quality (completeness >= {} and contamination <= {}).",
        hq,
        selected.len(),
        HQ_MIN_COMPLETENESS,
        HQ_MAX_CONTAMINATION
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = cli::parse_args();
    init_logging(&args);

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .context("Failed to start the thread pool")?;

    run(&args)
}
