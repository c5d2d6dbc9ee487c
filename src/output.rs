use std::{
    collections::BTreeMap,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use log::info;

use crate::{contig_index::ContigIndex, types::Bin};

const HEADER: &str =
    "bin_id\torigin\tname\tcompleteness\tcontamination\tscore\tsize\tN50\tcontig_count";

fn create<P: AsRef<Path>>(path: P) -> Result<BufWriter<std::fs::File>> {
    let path = path.as_ref();
    let outfile = std::fs::File::create(path)
        .with_context(|| anyhow!("Could not create file: {:?}", path))?;
    Ok(BufWriter::new(outfile))
}

/// Quality report with one row per bin. When `index` is given, a last column lists the contig
/// names of each bin separated by `;`.
pub fn write_bin_info<'b, P, I>(path: P, bins: I, index: Option<&ContigIndex>) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = &'b Bin>,
{
    let mut writer = create(&path)?;

    match index {
        Some(_) => writeln!(writer, "{}\tcontigs", HEADER)?,
        None => writeln!(writer, "{}", HEADER)?,
    }

    for bin in bins {
        let quality = bin.quality()?;
        write!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            bin.id,
            bin.origin.iter().join(";"),
            bin.name,
            quality.completeness,
            quality.contamination,
            quality.score,
            bin.length()?,
            bin.n50()?,
            bin.len()
        )?;
        if let Some(index) = index {
            write!(writer, "\t{}", index.names_of(bin).join(";"))?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

/// One report per input bin set, `input_bins_<set>.tsv`, in `outdir`.
pub fn write_original_bin_metrics<P: AsRef<Path>>(
    bin_sets: &BTreeMap<String, Vec<&Bin>>,
    outdir: P,
) -> Result<()> {
    let outdir = outdir.as_ref();
    std::fs::create_dir_all(outdir)
        .with_context(|| format!("Could not create directory: {}", outdir.display()))?;

    for (set_name, bins) in bin_sets {
        let safe_name = set_name.replace(['/', '\\'], "_");
        let path = outdir.join(format!("input_bins_{}.tsv", safe_name));
        info!("Writing metrics of {} input bins of {} in {}", bins.len(), set_name, path.display());
        write_bin_info(&path, bins.iter().copied(), None)?;
    }
    Ok(())
}

pub fn write_index_to_contig<P: AsRef<Path>>(path: P, index: &ContigIndex) -> Result<()> {
    let mut writer = create(path)?;
    for (id, name) in index.iter() {
        writeln!(writer, "{}\t{}", id, name)?;
    }
    writer.flush()?;
    Ok(())
}
