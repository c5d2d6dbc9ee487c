use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
};

use anyhow::{anyhow, Context, Result};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{debug, info};
use rayon::prelude::*;
use serde::Deserialize;

use crate::{
    contig_index::ContigIndex,
    fasta::open_reader,
    types::{Bin, ContigId},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimate {
    pub completeness: f64,
    pub contamination: f64,
}

/// Predicts completeness and contamination of a set of contigs.
pub trait QualityEstimator: Sync {
    fn estimate(&self, contigs: &BTreeSet<ContigId>) -> Estimate;
}

/// Length L such that contigs of length >= L hold at least half of the total length.
pub fn compute_n50(lengths: &[u64]) -> u64 {
    let mut lengths = lengths.to_vec();
    lengths.sort_unstable();

    let total: u64 = lengths.iter().sum();
    let mut cumulative = 0;
    for &length in &lengths {
        if 2 * (cumulative + length) >= total {
            return length;
        }
        cumulative += length;
    }
    0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Deserialize)]
struct MarkerHit {
    contig: String,
    marker: String,
}

/// Single-copy marker gene estimate.
///
/// Completeness is the share of the marker set found in the bin. Contamination counts every
/// extra copy of a marker found more than once, relative to the marker set size.
#[derive(Debug, Default)]
pub struct MarkerGeneEstimator {
    contig_markers: HashMap<ContigId, Vec<u32>>,
    marker_set_size: usize,
}

impl MarkerGeneEstimator {
    /// `hits` are `(contig, marker)` pairs, one per gene hit.
    pub fn new<I>(hits: I, marker_set_size: Option<usize>) -> Self
    where
        I: IntoIterator<Item = (ContigId, String)>,
    {
        let mut marker_ids: HashMap<String, u32> = HashMap::new();
        let mut contig_markers: HashMap<ContigId, Vec<u32>> = HashMap::new();
        for (contig, marker) in hits {
            let next = marker_ids.len() as u32;
            let marker = *marker_ids.entry(marker).or_insert(next);
            contig_markers.entry(contig).or_default().push(marker);
        }
        let marker_set_size = marker_set_size.unwrap_or(marker_ids.len());
        debug!(
            "{} markers seen on {} contigs, marker set size {}",
            marker_ids.len(),
            contig_markers.len(),
            marker_set_size
        );
        Self {
            contig_markers,
            marker_set_size,
        }
    }

    /// Reads a tab-separated `contig<TAB>marker` table; `#` lines are comments. Hits on contigs
    /// outside the index are ignored.
    pub fn from_table<P: AsRef<Path>>(
        path: P,
        index: &ContigIndex,
        marker_set_size: Option<usize>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .quoting(false)
            .trim(csv::Trim::Fields)
            .from_reader(open_reader(path)?);

        let mut hits = Vec::new();
        for record in reader.deserialize() {
            let hit: MarkerHit =
                record.with_context(|| format!("Malformed marker table: {}", path.display()))?;
            if let Some(contig) = index.id(&hit.contig) {
                hits.push((contig, hit.marker));
            }
        }
        info!("{} marker hits on binned contigs in {}", hits.len(), path.display());
        Ok(Self::new(hits, marker_set_size))
    }
}

impl QualityEstimator for MarkerGeneEstimator {
    fn estimate(&self, contigs: &BTreeSet<ContigId>) -> Estimate {
        if self.marker_set_size == 0 {
            return Estimate {
                completeness: 0.0,
                contamination: 0.0,
            };
        }
        let mut copies: HashMap<u32, usize> = HashMap::new();
        for contig in contigs {
            for &marker in self.contig_markers.get(contig).into_iter().flatten() {
                *copies.entry(marker).or_default() += 1;
            }
        }
        let found = copies.len() as f64;
        let extra: usize = copies.values().map(|&n| n - 1).sum();
        let size = self.marker_set_size as f64;
        Estimate {
            completeness: round2((100.0 * found / size).min(100.0)),
            contamination: round2(100.0 * extra as f64 / size),
        }
    }
}

fn add_metrics<E: QualityEstimator>(
    bin: &mut Bin,
    contig_lengths: &HashMap<ContigId, u64>,
    estimator: &E,
    contamination_weight: f64,
) -> Result<()> {
    let lengths = bin
        .contigs()
        .iter()
        .map(|c| {
            contig_lengths
                .get(c)
                .copied()
                .ok_or_else(|| anyhow!("No length for contig {} of bin {}", c, bin.label()))
        })
        .collect::<Result<Vec<u64>>>()?;

    bin.add_length(lengths.iter().sum())?;
    bin.add_n50(compute_n50(&lengths))?;

    let estimate = estimator.estimate(bin.contigs());
    bin.add_quality(estimate.completeness, estimate.contamination, contamination_weight)?;
    Ok(())
}

/// Sets length, N50 and quality on every bin that has not been scored yet.
pub fn add_bin_metrics<E: QualityEstimator>(
    bins: &mut [Bin],
    contig_lengths: &HashMap<ContigId, u64>,
    estimator: &E,
    contamination_weight: f64,
) -> Result<()> {
    let style =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-");

    let mut pending: Vec<&mut Bin> = bins.iter_mut().filter(|b| !b.is_scored()).collect();
    info!("Assessing quality of {} bins", pending.len());

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(style);
    pb.set_message("Assessing bin quality...");

    pending
        .par_iter_mut()
        .progress_with(pb)
        .try_for_each(|bin| add_metrics(bin, contig_lengths, estimator, contamination_weight))
}
