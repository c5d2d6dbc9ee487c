use anyhow::{anyhow, bail, Context};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::{Path, PathBuf},
};

use crate::{
    derep::dereplicate,
    fasta::{open_reader, read_fasta},
    types::{Bin, BinIdSequence},
};

pub type BinSets = BTreeMap<String, Vec<Bin<String>>>;

fn common_prefix_len(strings: &[Vec<char>]) -> usize {
    let Some(first) = strings.first() else {
        return 0;
    };
    (0..first.len())
        .take_while(|&i| strings.iter().all(|s| s.get(i) == Some(&first[i])))
        .count()
}

/// Names each bin set after its input path with the common prefix and suffix of all paths
/// removed, so `out/metabat/bins` and `out/concoct/bins` become `metabat` and `concoct`. Falls
/// back to the full paths when stripping leaves empty or clashing names.
pub fn infer_bin_set_names(paths: &[PathBuf]) -> anyhow::Result<BTreeMap<String, PathBuf>> {
    let strings: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    let unique: BTreeSet<&String> = strings.iter().collect();
    if unique.len() != strings.len() {
        bail!("The same input was given several times: {:?}", strings);
    }

    let chars: Vec<Vec<char>> = strings.iter().map(|s| s.chars().collect()).collect();
    let reversed: Vec<Vec<char>> = chars.iter().map(|c| c.iter().rev().copied().collect()).collect();
    let prefix = common_prefix_len(&chars);
    let suffix = common_prefix_len(&reversed);
    debug!("input bins: {:?} (common prefix {}, suffix {})", strings, prefix, suffix);

    let stripped: Vec<String> = chars
        .iter()
        .map(|c| {
            let end = c.len().saturating_sub(suffix).max(prefix.min(c.len()));
            c[prefix.min(c.len())..end].iter().collect()
        })
        .collect();

    let names = if stripped.iter().any(String::is_empty)
        || stripped.iter().collect::<BTreeSet<_>>().len() != stripped.len()
    {
        strings
    } else {
        stripped
    };

    Ok(names.into_iter().zip(paths.iter().cloned()).collect())
}

fn has_extension(path: &Path, exts: &[String]) -> bool {
    let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let filename = filename.to_lowercase();
    let filename = filename.strip_suffix(".gz").unwrap_or(&filename);
    exts.iter().any(|ext| filename.ends_with(ext.as_str()))
}

/// Warning for bins of one set sharing the same contigs, if any.
fn duplicated_bins_message(set_name: &str, bins: &[Bin<String>]) -> Option<String> {
    let mut copies: HashMap<&Bin<String>, usize> = HashMap::new();
    for bin in bins {
        *copies.entry(bin).or_default() += 1;
    }
    let duplicated: usize = copies.values().filter(|&&n| n > 1).sum();
    (duplicated > 0).then(|| {
        format!(
            "{} bins with identical contig compositions detected in bin set \"{}\". \
             These bins were merged to ensure uniqueness.",
            duplicated, set_name
        )
    })
}

fn log_duplicates(set_name: &str, bins: &[Bin<String>]) {
    if let Some(message) = duplicated_bins_message(set_name, bins) {
        warn!("{}", message);
    }

    let mut bins_of_contig: HashMap<&String, usize> = HashMap::new();
    for bin in dereplicate_refs(bins) {
        for contig in bin.contigs() {
            *bins_of_contig.entry(contig).or_default() += 1;
        }
    }
    let shared = bins_of_contig.values().filter(|&&n| n > 1).count();
    if shared > 0 {
        warn!(
            "{} contigs are assigned to several bins in bin set \"{}\".",
            shared, set_name
        );
    }
}

fn dereplicate_refs(bins: &[Bin<String>]) -> Vec<&Bin<String>> {
    let mut seen = std::collections::HashSet::new();
    bins.iter().filter(|b| seen.insert(*b)).collect()
}

fn finish_bin_set(set_name: &str, bins: Vec<Bin<String>>) -> Vec<Bin<String>> {
    log_duplicates(set_name, &bins);
    dereplicate([bins])
}

/// Loads bin sets from directories holding one FASTA file per bin.
pub fn load_bin_dirs(
    bin_dirs: &[PathBuf],
    exts: &[String],
    ids: &mut BinIdSequence,
) -> anyhow::Result<BinSets> {
    let mut binner_inputs = BinSets::new();
    let style =
        ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-");

    for (label, dir) in infer_bin_set_names(bin_dirs)? {
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list dir: {}", dir.display()))?;

        let mut bin_paths = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_extension(path, exts))
            .collect::<Vec<_>>();
        bin_paths.sort();

        if bin_paths.is_empty() {
            return Err(anyhow!("No bins found in path: {}", dir.display()));
        }

        let pb = ProgressBar::new(bin_paths.len() as u64);
        pb.set_style(style.clone());
        pb.set_message(format!("{}: Loading bins...", &label));

        let contents = bin_paths
            .par_iter()
            .progress_with(pb)
            .map(|bp| {
                let name = bp
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow!("Invalid UTF-8 in filename: {:#?}", bp))?;
                let contigs = read_fasta(bp)?;
                if contigs.is_empty() {
                    warn!("Bin file {} holds no contig and is ignored", bp.display());
                }
                Ok((name.to_string(), contigs))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let bins = contents
            .into_iter()
            .filter(|(_, contigs)| !contigs.is_empty())
            .map(|(name, contigs)| Bin::new(ids, contigs.into_iter().map(|c| c.id), &label, &name))
            .collect();

        binner_inputs.insert(label.clone(), finish_bin_set(&label, bins));
    }
    Ok(binner_inputs)
}

/// Parses a two-column `contig<TAB>bin` table. Lines starting with `#` or `@` are headers.
pub fn read_contig2bin_table<P: AsRef<Path>>(
    path: P,
) -> anyhow::Result<BTreeMap<String, BTreeSet<String>>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .quoting(false)
        .flexible(true)
        .trim(csv::Trim::Fields)
        .from_reader(open_reader(path)?);

    let mut bin_to_contigs: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read {}", path.display()))?;
        let line = record.position().map_or(0, |p| p.line());
        match (record.get(0), record.get(1)) {
            (Some(first), None) if first.is_empty() => {}
            (Some(first), _) if first.starts_with('@') => {
                debug!("Ignoring line {} of {}: {}", line, path.display(), first);
            }
            (Some(contig), Some(bin)) if !contig.is_empty() && !bin.is_empty() => {
                bin_to_contigs
                    .entry(bin.to_string())
                    .or_default()
                    .insert(contig.to_string());
            }
            _ => bail!(
                "Line {} of {} does not have a contig and a bin column: {}",
                line,
                path.display(),
                record.iter().collect::<Vec<_>>().join("\t")
            ),
        }
    }
    Ok(bin_to_contigs)
}

/// Loads bin sets from contig2bin tables.
pub fn load_contig2bin_tables(
    tables: &[PathBuf],
    ids: &mut BinIdSequence,
) -> anyhow::Result<BinSets> {
    let mut binner_inputs = BinSets::new();

    for (label, table) in infer_bin_set_names(tables)? {
        let bins = read_contig2bin_table(&table)?
            .into_iter()
            .map(|(name, contigs)| Bin::new(ids, contigs, &label, &name))
            .collect();
        binner_inputs.insert(label.clone(), finish_bin_set(&label, bins));
    }
    Ok(binner_inputs)
}

pub fn log_bin_sets(bin_sets: &BinSets) {
    info!("Processing {} bin sets.", bin_sets.len());
    for (name, bins) in bin_sets {
        info!(" {} - {} bins", name, bins.len());
    }
}

/// Every binned contig must be part of the assembly.
pub fn check_contig_universe(
    contigs_in_bins: &BTreeSet<String>,
    contig_lengths: &HashMap<String, u64>,
    contigs_fasta: &Path,
) -> anyhow::Result<()> {
    let missing: Vec<&str> = contigs_in_bins
        .iter()
        .filter(|c| !contig_lengths.contains_key(*c))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        bail!(
            "{} contigs from the input bins were not found in the contigs file '{}'. \
             The missing contigs are: {}. Please ensure all contigs from input bins are present in contig file.",
            missing.len(),
            contigs_fasta.display(),
            missing.join(", ")
        );
    }
    Ok(())
}
