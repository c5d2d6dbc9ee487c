use std::{collections::BTreeMap, hash::Hash};

use anyhow::Result;
use itertools::Itertools;
use log::{debug, info, warn};

use crate::{
    derep::dereplicate,
    graph::OverlapGraph,
    types::{Bin, BinIdSequence},
};

/// Intersections and differences are only built from bins at least this complete.
pub const MIN_COMPLETENESS_FOR_COMBINATION: f64 = 20.0;

/// Cliques above this size are reported: every sub-group of a clique is enumerated.
const LARGE_CLIQUE: usize = 15;

#[derive(Clone, Debug)]
pub struct CombineOptions {
    /// Sub-groups holding a bin more contaminated than this give no union bin.
    pub max_contamination: f64,
    pub min_completeness: f64,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            max_contamination: 50.0,
            min_completeness: MIN_COMPLETENESS_FOR_COMBINATION,
        }
    }
}

#[derive(Debug, Default)]
pub struct CombineStats {
    pub intersections: usize,
    pub differences: usize,
    pub unions: usize,
}

/// Every sub-group of two or more members of a clique.
pub fn sub_groups<'c, T>(clique: &'c [T]) -> impl Iterator<Item = Vec<&'c T>> + 'c {
    (2..=clique.len()).flat_map(move |size| clique.iter().combinations(size))
}

fn describe<C>(group: &[&Bin<C>]) -> String {
    group
        .iter()
        .map(|b| match b.quality() {
            Ok(q) => format!("{} ({}, {})", b.label(), q.completeness, q.contamination),
            Err(_) => b.label(),
        })
        .join(", ")
}

fn max_of<C, F>(group: &[&Bin<C>], metric: F) -> Result<f64>
where
    F: Fn(&Bin<C>) -> Result<f64, crate::error::BinError>,
{
    let mut max = f64::NEG_INFINITY;
    for &bin in group {
        max = max.max(metric(bin)?);
    }
    Ok(max)
}

/// Intersection of the sub-group, unless none of its bins is complete enough.
pub fn intersection_bin<C>(
    group: &[&Bin<C>],
    options: &CombineOptions,
    ids: &mut BinIdSequence,
) -> Result<Option<Bin<C>>>
where
    C: Ord + Hash + Clone,
{
    let Some((first, rest)) = group.split_first() else {
        return Ok(None);
    };
    if max_of(group, Bin::completeness)? < options.min_completeness {
        debug!(
            "Completeness is not good enough to create a new bin on intersection: {}",
            describe(group)
        );
        return Ok(None);
    }
    let bin = first.intersection(rest, ids);
    Ok((!bin.is_empty()).then_some(bin))
}

/// One bin per member holding the contigs no other member of the sub-group has.
pub fn difference_bins<C>(
    group: &[&Bin<C>],
    options: &CombineOptions,
    ids: &mut BinIdSequence,
) -> Result<Vec<Bin<C>>>
where
    C: Ord + Hash + Clone,
{
    let mut bins = Vec::new();
    for (i, &bin_a) in group.iter().enumerate() {
        if bin_a.completeness()? < options.min_completeness {
            debug!(
                "Completeness of {} is not good enough to do difference: {}",
                bin_a.label(),
                describe(group)
            );
            continue;
        }
        let others: Vec<&Bin<C>> = group
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, &b)| b)
            .collect();
        let diff = bin_a.difference(&others, ids);
        if !diff.is_empty() {
            bins.push(diff);
        }
    }
    Ok(bins)
}

/// Union of the sub-group, unless one of its bins is too contaminated.
pub fn union_bin<C>(
    group: &[&Bin<C>],
    options: &CombineOptions,
    ids: &mut BinIdSequence,
) -> Result<Option<Bin<C>>>
where
    C: Ord + Hash + Clone,
{
    let Some((first, rest)) = group.split_first() else {
        return Ok(None);
    };
    if max_of(group, Bin::contamination)? > options.max_contamination {
        debug!(
            "Some bins are too contaminated to make a useful union bin: {}",
            describe(group)
        );
        return Ok(None);
    }
    let bin = first.union(rest, ids);
    Ok((!bin.is_empty()).then_some(bin))
}

/// Builds intersection, difference and union bins over every sub-group of every maximal clique
/// of the overlap graph.
///
/// Clique members must already be scored: the quality gates read their completeness and
/// contamination. Bins with the same contigs produced from different cliques or operations are
/// collapsed as they are generated.
pub fn create_intermediate_bins<C>(
    graph: &OverlapGraph<'_, C>,
    options: &CombineOptions,
    ids: &mut BinIdSequence,
) -> Result<Vec<Bin<C>>>
where
    C: Ord + Hash + Clone + Sync,
{
    let cliques = graph.maximal_cliques();
    info!("{} maximal cliques in the bin graph", cliques.len());

    let mut stats = CombineStats::default();
    let mut created = Vec::new();

    for clique in &cliques {
        if clique.len() > LARGE_CLIQUE {
            warn!(
                "Clique of {} overlapping bins: {} sub-groups to combine",
                clique.len(),
                (1u128 << clique.len().min(127)) - clique.len() as u128 - 1
            );
        }

        for group in sub_groups(clique) {
            let group: Vec<&Bin<C>> = group.into_iter().copied().collect();

            if let Some(bin) = intersection_bin(&group, options, ids)? {
                stats.intersections += 1;
                created.push(bin);
            }

            let diffs = difference_bins(&group, options, ids)?;
            stats.differences += diffs.len();
            created.extend(diffs);

            if let Some(bin) = union_bin(&group, options, ids)? {
                stats.unions += 1;
                created.push(bin);
            }
        }
    }

    info!("{} bins created on intersections.", stats.intersections);
    info!("{} bins created on differences.", stats.differences);
    info!("{} bins created on unions.", stats.unions);

    let created = dereplicate([created]);
    info!("{} unique intermediate bins.", created.len());
    Ok(created)
}

/// Counts of derived bins per operation tag, for reporting.
pub fn count_by_origin<C>(bins: &[Bin<C>]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for bin in bins {
        for origin in &bin.origin {
            *counts.entry(origin.as_str()).or_default() += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{error::BinError, types::{DIFFERENCE_ORIGIN, INTERSECTION_ORIGIN, UNION_ORIGIN}};

    fn scored(
        ids: &mut BinIdSequence,
        contigs: &[u32],
        set: &str,
        completeness: f64,
        contamination: f64,
    ) -> Bin {
        let mut bin = Bin::new(ids, contigs.iter().copied(), set, set);
        bin.add_quality(completeness, contamination, 2.0).unwrap();
        bin
    }

    fn contig_sets(bins: &[Bin]) -> BTreeSet<Vec<u32>> {
        bins.iter()
            .map(|b| b.contigs().iter().copied().collect())
            .collect()
    }

    #[test]
    fn sub_groups_cover_every_combination() {
        let clique = [1, 2, 3];
        let groups: Vec<Vec<i32>> = sub_groups(&clique)
            .map(|g| g.into_iter().copied().collect())
            .collect();
        assert_eq!(
            groups,
            vec![vec![1, 2], vec![1, 3], vec![2, 3], vec![1, 2, 3]]
        );
        assert_eq!(sub_groups(&[1]).count(), 0);
    }

    #[test]
    fn no_intersection_from_incomplete_bins() {
        let mut ids = BinIdSequence::new();
        let a = scored(&mut ids, &[1, 2, 3], "A", 19.0, 0.0);
        let b = scored(&mut ids, &[2, 3, 4], "B", 10.0, 0.0);
        let options = CombineOptions::default();

        assert!(intersection_bin(&[&a, &b], &options, &mut ids)
            .unwrap()
            .is_none());
    }

    #[test]
    fn intersection_from_complete_enough_bins() {
        let mut ids = BinIdSequence::new();
        let a = scored(&mut ids, &[1, 2, 3], "A", 20.0, 0.0);
        let b = scored(&mut ids, &[2, 3, 4], "B", 10.0, 0.0);
        let options = CombineOptions::default();

        let bin = intersection_bin(&[&a, &b], &options, &mut ids)
            .unwrap()
            .unwrap();
        assert_eq!(bin.contigs(), &BTreeSet::from([2, 3]));
        assert_eq!(bin.origin, BTreeSet::from([INTERSECTION_ORIGIN.to_string()]));
    }

    #[test]
    fn empty_intersection_is_dropped() {
        let mut ids = BinIdSequence::new();
        let a = scored(&mut ids, &[1, 2], "A", 80.0, 0.0);
        let b = scored(&mut ids, &[2, 3], "B", 80.0, 0.0);
        let c = scored(&mut ids, &[1, 3], "C", 80.0, 0.0);
        let options = CombineOptions::default();

        assert!(intersection_bin(&[&a, &b, &c], &options, &mut ids)
            .unwrap()
            .is_none());
    }

    #[test]
    fn differences_are_one_versus_rest() {
        let mut ids = BinIdSequence::new();
        let a = scored(&mut ids, &[1, 2, 3], "A", 50.0, 0.0);
        let b = scored(&mut ids, &[3, 4], "B", 50.0, 0.0);
        let c = scored(&mut ids, &[2, 3, 5], "C", 10.0, 0.0);
        let options = CombineOptions::default();

        let diffs = difference_bins(&[&a, &b, &c], &options, &mut ids).unwrap();

        // c is not complete enough to give a difference bin
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].contigs(), &BTreeSet::from([1]));
        assert_eq!(diffs[1].contigs(), &BTreeSet::from([4]));
        assert!(diffs
            .iter()
            .all(|d| d.origin == BTreeSet::from([DIFFERENCE_ORIGIN.to_string()])));
    }

    #[test]
    fn union_skipped_when_a_member_is_too_contaminated() {
        let mut ids = BinIdSequence::new();
        let a = scored(&mut ids, &[1, 2], "A", 50.0, 10.0);
        let b = scored(&mut ids, &[2, 3], "B", 50.0, 60.0);
        let c = scored(&mut ids, &[3, 4], "C", 50.0, 50.0);
        let options = CombineOptions::default();

        assert!(union_bin(&[&a, &b], &options, &mut ids).unwrap().is_none());

        let bin = union_bin(&[&a, &c], &options, &mut ids).unwrap().unwrap();
        assert_eq!(bin.contigs(), &BTreeSet::from([1, 2, 3, 4]));
        assert_eq!(bin.origin, BTreeSet::from([UNION_ORIGIN.to_string()]));
    }

    #[test]
    fn unscored_members_are_a_precondition_error() {
        let mut ids = BinIdSequence::new();
        let a: Bin = Bin::new(&mut ids, [1u32, 2], "A", "a");
        let b: Bin = Bin::new(&mut ids, [2u32, 3], "B", "b");
        let options = CombineOptions::default();

        let err = intersection_bin(&[&a, &b], &options, &mut ids).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BinError>(),
            Some(BinError::NotScored { .. })
        ));
    }

    #[test]
    fn intermediate_bins_from_two_overlapping_bins() {
        let mut ids = BinIdSequence::new();
        let a = scored(&mut ids, &[1, 2, 3], "A", 60.0, 5.0);
        let b = scored(&mut ids, &[2, 3, 4], "B", 60.0, 5.0);
        let sets = BTreeMap::from([
            ("A".to_string(), vec![&a]),
            ("B".to_string(), vec![&b]),
        ]);
        let graph = OverlapGraph::from_bin_sets(&sets);

        let created =
            create_intermediate_bins(&graph, &CombineOptions::default(), &mut ids).unwrap();

        assert_eq!(
            contig_sets(&created),
            BTreeSet::from([vec![2, 3], vec![1], vec![4], vec![1, 2, 3, 4]])
        );
        assert!(created.iter().all(|bin| bin.id > b.id));
    }

    #[test]
    fn intermediate_bins_from_a_triangle() {
        let mut ids = BinIdSequence::new();
        let a = scored(&mut ids, &[1, 2, 3], "A", 60.0, 5.0);
        let b = scored(&mut ids, &[2, 3, 4], "B", 60.0, 5.0);
        let c = scored(&mut ids, &[3, 5, 6], "C", 60.0, 5.0);
        let sets = BTreeMap::from([
            ("A".to_string(), vec![&a]),
            ("B".to_string(), vec![&b]),
            ("C".to_string(), vec![&c]),
        ]);
        let graph = OverlapGraph::from_bin_sets(&sets);
        assert_eq!(graph.maximal_cliques().len(), 1);

        let created =
            create_intermediate_bins(&graph, &CombineOptions::default(), &mut ids).unwrap();

        assert_eq!(
            contig_sets(&created),
            BTreeSet::from([
                vec![2, 3],
                vec![1],
                vec![4],
                vec![1, 2, 3, 4],
                vec![3],
                vec![1, 2],
                vec![5, 6],
                vec![1, 2, 3, 5, 6],
                vec![2, 4],
                vec![2, 3, 4, 5, 6],
                vec![1, 2, 3, 4, 5, 6],
            ])
        );
        assert_eq!(created.len(), 11);

        // only the full sub-group reaches every contig
        let full = created.iter().find(|bin| bin.len() == 6).unwrap();
        assert_eq!(full.name, format!("{} | {} | {}", a.id, b.id, c.id));
        assert_eq!(full.origin, BTreeSet::from([UNION_ORIGIN.to_string()]));
    }

    #[test]
    fn identical_derived_bins_are_collapsed() {
        // a ∩ b and b - c are both {2, 3}
        let mut ids = BinIdSequence::new();
        let a = scored(&mut ids, &[2, 3], "A", 60.0, 0.0);
        let b = scored(&mut ids, &[2, 3, 5], "B", 60.0, 0.0);
        let c = scored(&mut ids, &[5, 6], "C", 60.0, 0.0);
        let sets = BTreeMap::from([
            ("A".to_string(), vec![&a]),
            ("B".to_string(), vec![&b]),
            ("C".to_string(), vec![&c]),
        ]);
        let graph = OverlapGraph::from_bin_sets(&sets);

        let created =
            create_intermediate_bins(&graph, &CombineOptions::default(), &mut ids).unwrap();

        let unique: BTreeSet<Vec<u32>> = contig_sets(&created);
        assert_eq!(unique.len(), created.len());
        let merged = created
            .iter()
            .find(|bin| bin.contigs() == &BTreeSet::from([2, 3]))
            .unwrap();
        assert_eq!(
            merged.origin,
            BTreeSet::from([DIFFERENCE_ORIGIN.to_string(), INTERSECTION_ORIGIN.to_string()])
        );
    }

    #[test]
    fn count_by_origin_tallies_tags() {
        let mut ids = BinIdSequence::new();
        let bins: Vec<Bin> = vec![
            Bin::new(&mut ids, [1u32], "union", "x"),
            Bin::new(&mut ids, [2u32], "union", "y"),
            Bin::new(&mut ids, [3u32], "diff", "z"),
        ];
        let counts = count_by_origin(&bins);
        assert_eq!(counts["union"], 2);
        assert_eq!(counts["diff"], 1);
    }
}
