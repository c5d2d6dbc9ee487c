use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{anyhow, Context};
use flate2::read::GzDecoder;
use log::debug;
use seq_io::fasta::{Reader, Record};

use crate::{contig_index::ContigIndex, types::{Bin, ContigStats}};

/// Opens a plain or gzip-compressed (`.gz`) file.
pub fn open_reader<P>(path: P) -> anyhow::Result<Box<dyn BufRead>>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let buf_reader: Box<dyn BufRead> = if path.extension().map_or(false, |ext| ext == "gz") {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(buf_reader)
}

pub fn read_fasta<P>(path: P) -> anyhow::Result<Vec<ContigStats>>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let mut reader = Reader::new(open_reader(path)?);
    let mut contigs = Vec::new();

    while let Some(record) = reader.next() {
        let record =
            record.with_context(|| format!("Failed to parse fasta: {}", path.display()))?;

        let id = record.id()?.to_string();
        let length = record.seq_lines().map(|line| line.len() as u64).sum();
        contigs.push(ContigStats { id, length });
    }

    Ok(contigs)
}

/// Contig lengths of an assembly, keyed by contig name.
pub fn read_contig_lengths<P>(path: P) -> anyhow::Result<HashMap<String, u64>>
where
    P: AsRef<Path>,
{
    Ok(read_fasta(path)?
        .into_iter()
        .map(|c| (c.id, c.length))
        .collect())
}

/// Writes one `bin_<id>.fa` per bin with the sequences of its contigs taken from the assembly.
pub fn write_bins_fasta<P, Q>(
    bins: &[Bin],
    contigs_fasta: P,
    index: &ContigIndex,
    outdir: Q,
) -> anyhow::Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let contigs_fasta = contigs_fasta.as_ref();
    let outdir = outdir.as_ref();

    let wanted: HashSet<&str> = bins.iter().flat_map(|b| index.names_of(b)).collect();
    let mut sequences: HashMap<String, Vec<u8>> = HashMap::with_capacity(wanted.len());

    let mut reader = Reader::new(open_reader(contigs_fasta)?);
    while let Some(record) = reader.next() {
        let record = record
            .with_context(|| format!("Failed to parse fasta: {}", contigs_fasta.display()))?;
        let id = record.id()?;
        if wanted.contains(id) {
            sequences.insert(id.to_string(), record.owned_seq());
        }
    }
    debug!("Loaded {} sequences for {} bins", sequences.len(), bins.len());

    for bin in bins {
        let outpath = outdir.join(format!("bin_{}.fa", bin.id));
        let outfile = File::create(&outpath)
            .with_context(|| anyhow!("Could not create file: {:?}", outpath))?;
        let mut writer = BufWriter::new(outfile);

        for name in index.names_of(bin) {
            let seq = sequences
                .get(name)
                .ok_or_else(|| anyhow!("Contig {} not found in {}", name, contigs_fasta.display()))?;
            writer.write_all(b">")?;
            writer.write_all(name.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.write_all(seq)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    Ok(())
}
