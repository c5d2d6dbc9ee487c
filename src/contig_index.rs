use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result};

use crate::types::{Bin, ContigId};

/// Interns contig names to compact integer ids. Bins are hashed and compared on their full
/// contig set, so working on `u32` instead of strings keeps the combination stage small.
#[derive(Debug, Default)]
pub struct ContigIndex {
    names: Vec<String>,
    ids: HashMap<String, ContigId>,
}

impl ContigIndex {
    /// Ids follow the sorted order of the names.
    pub fn new<'a, I>(contigs: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let names: Vec<String> = contigs
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect();
        let ids = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as ContigId))
            .collect();
        Self { names, ids }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn id(&self, name: &str) -> Option<ContigId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: ContigId) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    /// `(id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (ContigId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (i as ContigId, name.as_str()))
    }

    pub fn reindex_bins(&self, bins: Vec<Bin<String>>) -> Result<Vec<Bin>> {
        bins.into_iter()
            .map(|b| {
                b.reindex(|c| self.id(c))
                    .context("Failed to index bin contigs")
            })
            .collect()
    }

    /// Re-keys a per-contig table by contig id. Entries for contigs outside the index are
    /// dropped.
    pub fn apply<V>(&self, table: HashMap<String, V>) -> HashMap<ContigId, V> {
        table
            .into_iter()
            .filter_map(|(name, value)| self.id(&name).map(|id| (id, value)))
            .collect()
    }

    /// Contig names of a bin, in id order.
    pub fn names_of<'a>(&'a self, bin: &'a Bin) -> impl Iterator<Item = &'a str> + 'a {
        bin.contigs().iter().filter_map(|&c| self.name(c))
    }
}

/// Every contig that belongs to at least one bin of any set.
pub fn contigs_in_bin_sets(bin_sets: &BTreeMap<String, Vec<Bin<String>>>) -> BTreeSet<String> {
    bin_sets
        .values()
        .flatten()
        .flat_map(|b| b.contigs().iter().cloned())
        .collect()
}
