use std::{
    collections::{hash_map::DefaultHasher, BTreeSet},
    fmt,
    hash::{Hash, Hasher},
};

use itertools::Itertools;

use crate::error::BinError;

pub type BinId = u64;

/// Compact contig identifier used once names have been interned.
pub type ContigId = u32;

pub const INTERSECTION_ORIGIN: &str = "intersec";
pub const DIFFERENCE_ORIGIN: &str = "diff";
pub const UNION_ORIGIN: &str = "union";

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ContigStats {
    pub id: String,
    pub length: u64,
}

/// Hands out bin ids. One sequence is shared by every bin of a run so that ids grow with
/// creation order: original bins always get smaller ids than derived ones.
#[derive(Debug, Default)]
pub struct BinIdSequence {
    last: BinId,
}

impl BinIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> BinId {
        self.last += 1;
        self.last
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quality {
    pub completeness: f64,
    pub contamination: f64,
    pub score: f64,
}

/// A candidate cluster of contigs.
///
/// Equality and hashing only look at the contig set: two bins built by different binners or
/// different operations are the same bin when they hold the same contigs. `id`, `origin` and
/// `name` are bookkeeping.
#[derive(Clone, Debug)]
pub struct Bin<C = ContigId> {
    pub id: BinId,
    pub name: String,
    pub origin: BTreeSet<String>,
    contigs: BTreeSet<C>,
    content_hash: u64,
    length: Option<u64>,
    n50: Option<u64>,
    quality: Option<Quality>,
}

fn content_hash<C: Hash>(contigs: &BTreeSet<C>) -> u64 {
    let mut hasher = DefaultHasher::new();
    contigs.hash(&mut hasher);
    hasher.finish()
}

impl<C> Bin<C>
where
    C: Ord + Hash + Clone,
{
    pub fn new<I>(ids: &mut BinIdSequence, contigs: I, origin: &str, name: &str) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let contigs: BTreeSet<C> = contigs.into_iter().collect();
        let content_hash = content_hash(&contigs);
        Self {
            id: ids.next_id(),
            name: name.to_string(),
            origin: BTreeSet::from([origin.to_string()]),
            contigs,
            content_hash,
            length: None,
            n50: None,
            quality: None,
        }
    }

    pub fn contigs(&self) -> &BTreeSet<C> {
        &self.contigs
    }

    pub fn len(&self) -> usize {
        self.contigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    /// Deterministic hash of the sorted contig set.
    pub fn content_hash(&self) -> u64 {
        self.content_hash
    }

    /// Contigs shared with `other`; empty when the bins are disjoint.
    pub fn overlaps_with(&self, other: &Bin<C>) -> BTreeSet<C> {
        self.contigs.intersection(&other.contigs).cloned().collect()
    }

    /// Contigs present in this bin and in every one of `others`.
    pub fn intersection(&self, others: &[&Bin<C>], ids: &mut BinIdSequence) -> Bin<C> {
        let contigs = self
            .contigs
            .iter()
            .filter(|c| others.iter().all(|o| o.contigs.contains(*c)))
            .cloned();
        Bin::new(ids, contigs, INTERSECTION_ORIGIN, &self.parent_label(others, " & "))
    }

    /// Contigs of this bin found in none of `others`.
    pub fn difference(&self, others: &[&Bin<C>], ids: &mut BinIdSequence) -> Bin<C> {
        let contigs = self
            .contigs
            .iter()
            .filter(|c| !others.iter().any(|o| o.contigs.contains(*c)))
            .cloned();
        Bin::new(ids, contigs, DIFFERENCE_ORIGIN, &self.parent_label(others, " - "))
    }

    pub fn union(&self, others: &[&Bin<C>], ids: &mut BinIdSequence) -> Bin<C> {
        let contigs = self
            .contigs
            .iter()
            .chain(others.iter().flat_map(|o| o.contigs.iter()))
            .cloned();
        Bin::new(ids, contigs, UNION_ORIGIN, &self.parent_label(others, " | "))
    }

    fn parent_label(&self, others: &[&Bin<C>], sep: &str) -> String {
        std::iter::once(self.id)
            .chain(others.iter().map(|o| o.id))
            .join(sep)
    }

    pub fn merge_origin(&mut self, origin: &BTreeSet<String>) {
        self.origin.extend(origin.iter().cloned());
    }

    /// Swaps every contig for its index, keeping id, provenance and metrics. The content hash is
    /// recomputed for the new contig set.
    pub fn reindex<D, F>(self, mut lookup: F) -> Result<Bin<D>, BinError>
    where
        D: Ord + Hash + Clone,
        C: fmt::Display,
        F: FnMut(&C) -> Option<D>,
    {
        let mut contigs = BTreeSet::new();
        for contig in &self.contigs {
            let index = lookup(contig).ok_or_else(|| BinError::UnknownContig {
                bin: self.label(),
                contig: contig.to_string(),
            })?;
            contigs.insert(index);
        }
        let content_hash = content_hash(&contigs);

        Ok(Bin {
            id: self.id,
            name: self.name,
            origin: self.origin,
            contigs,
            content_hash,
            length: self.length,
            n50: self.n50,
            quality: self.quality,
        })
    }
}

impl<C> Bin<C> {
    /// `<origin>_<id>`, used in logs and error messages.
    pub fn label(&self) -> String {
        format!("{}_{}", self.origin.iter().join(","), self.id)
    }

    pub fn add_length(&mut self, length: u64) -> Result<(), BinError> {
        self.length = Some(self.checked_metric(self.length, "length", length)?);
        Ok(())
    }

    pub fn add_n50(&mut self, n50: u64) -> Result<(), BinError> {
        self.n50 = Some(self.checked_metric(self.n50, "N50", n50)?);
        Ok(())
    }

    fn checked_metric(
        &self,
        current: Option<u64>,
        metric: &'static str,
        value: u64,
    ) -> Result<u64, BinError> {
        if current.is_some() {
            return Err(BinError::AlreadySet {
                bin: self.label(),
                metric,
            });
        }
        if value == 0 {
            return Err(BinError::InvalidMetric {
                bin: self.label(),
                metric,
                value,
            });
        }
        Ok(value)
    }

    /// `score = completeness - weight * contamination`
    pub fn add_quality(
        &mut self,
        completeness: f64,
        contamination: f64,
        weight: f64,
    ) -> Result<(), BinError> {
        if self.quality.is_some() {
            return Err(BinError::AlreadySet {
                bin: self.label(),
                metric: "quality",
            });
        }
        if !(weight >= 0.0) {
            return Err(BinError::InvalidWeight(weight));
        }
        self.quality = Some(Quality {
            completeness,
            contamination,
            score: completeness - weight * contamination,
        });
        Ok(())
    }

    pub fn is_scored(&self) -> bool {
        self.quality.is_some()
    }

    pub fn quality(&self) -> Result<&Quality, BinError> {
        self.quality
            .as_ref()
            .ok_or_else(|| BinError::NotScored { bin: self.label() })
    }

    pub fn completeness(&self) -> Result<f64, BinError> {
        Ok(self.quality()?.completeness)
    }

    pub fn contamination(&self) -> Result<f64, BinError> {
        Ok(self.quality()?.contamination)
    }

    pub fn score(&self) -> Result<f64, BinError> {
        Ok(self.quality()?.score)
    }

    pub fn length(&self) -> Result<u64, BinError> {
        self.length.ok_or_else(|| BinError::MissingMetric {
            bin: self.label(),
            metric: "length",
        })
    }

    pub fn n50(&self) -> Result<u64, BinError> {
        self.n50.ok_or_else(|| BinError::MissingMetric {
            bin: self.label(),
            metric: "N50",
        })
    }

    pub fn is_complete_enough(&self, min_completeness: f64) -> Result<bool, BinError> {
        Ok(self.completeness()? >= min_completeness)
    }

    pub fn is_high_quality(
        &self,
        min_completeness: f64,
        max_contamination: f64,
    ) -> Result<bool, BinError> {
        let quality = self.quality()?;
        Ok(quality.completeness >= min_completeness && quality.contamination <= max_contamination)
    }
}

impl<C: PartialEq> PartialEq for Bin<C> {
    fn eq(&self, other: &Self) -> bool {
        self.content_hash == other.content_hash && self.contigs == other.contigs
    }
}

impl<C: Eq> Eq for Bin<C> {}

impl<C> Hash for Bin<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.content_hash);
    }
}

impl<C> fmt::Display for Bin<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} contigs)", self.label(), self.contigs.len())
    }
}
