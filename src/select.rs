use std::{cmp::Ordering, collections::HashMap, hash::Hash};

use anyhow::Result;
use log::info;

use crate::types::Bin;

/// Ranking used by the selection: best score first, then best N50, then the oldest bin.
///
/// Input bins are created before any derived bin, so on a full tie the unmodified binner result
/// wins over a synthetic combination.
pub fn compare_bins<C>(a: &Bin<C>, b: &Bin<C>) -> Result<Ordering> {
    Ok(b.score()?
        .total_cmp(&a.score()?)
        .then(b.n50()?.cmp(&a.n50()?))
        .then(a.id.cmp(&b.id)))
}

/// Greedy selection of a pairwise-disjoint subset of `bins`.
///
/// Bins are walked in ranking order; a bin is kept when none of its contigs belongs to a bin
/// already kept, and every bin sharing a contig with it is then discarded. The result is in
/// selection order. Every bin must carry a score and an N50.
pub fn select_best_bins<C>(mut bins: Vec<Bin<C>>) -> Result<Vec<Bin<C>>>
where
    C: Ord + Hash + Clone,
{
    info!("Sorting {} bins", bins.len());
    for bin in &bins {
        bin.score()?;
        bin.n50()?;
    }
    // both metrics were checked above
    bins.sort_by(|a, b| compare_bins(a, b).unwrap_or(Ordering::Equal));

    let mut bins_of_contig: HashMap<&C, Vec<usize>> = HashMap::new();
    for (i, bin) in bins.iter().enumerate() {
        for contig in bin.contigs() {
            bins_of_contig.entry(contig).or_default().push(i);
        }
    }

    info!("Selecting bins");
    let mut available = vec![true; bins.len()];
    let mut selected = vec![false; bins.len()];
    for (i, bin) in bins.iter().enumerate() {
        if !available[i] {
            continue;
        }
        selected[i] = true;
        available[i] = false;
        for contig in bin.contigs() {
            for &j in &bins_of_contig[contig] {
                available[j] = false;
            }
        }
    }
    drop(bins_of_contig);

    let selected: Vec<Bin<C>> = bins
        .into_iter()
        .zip(selected)
        .filter_map(|(bin, keep)| keep.then_some(bin))
        .collect();

    info!("Selected {} bins", selected.len());
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::BinError, types::BinIdSequence};

    fn scored(ids: &mut BinIdSequence, contigs: &[u32], score: f64, n50: u64) -> Bin {
        let mut bin = Bin::new(ids, contigs.iter().copied(), "set", "bin");
        bin.add_quality(score, 0.0, 2.0).unwrap();
        bin.add_n50(n50).unwrap();
        bin
    }

    fn ids_of(bins: &[Bin]) -> Vec<u64> {
        bins.iter().map(|b| b.id).collect()
    }

    #[test]
    fn best_bin_wins_and_overlaps_are_dropped() {
        let mut ids = BinIdSequence::new();
        let bin1 = scored(&mut ids, &[1, 2, 3], 90.0, 100);
        let bin2 = scored(&mut ids, &[1, 2], 80.0, 100);
        let bin3 = scored(&mut ids, &[4, 5], 70.0, 100);
        let expected = vec![bin1.id, bin3.id];

        let selected = select_best_bins(vec![bin3, bin2, bin1]).unwrap();
        assert_eq!(ids_of(&selected), expected);
    }

    #[test]
    fn n50_breaks_score_ties() {
        let mut ids = BinIdSequence::new();
        let bin1 = scored(&mut ids, &[1, 2], 90.0, 100);
        let bin2 = scored(&mut ids, &[2, 3], 90.0, 200);

        let expected = vec![bin2.id];
        let selected = select_best_bins(vec![bin1, bin2]).unwrap();
        assert_eq!(ids_of(&selected), expected);
    }

    #[test]
    fn smaller_id_breaks_full_ties() {
        let mut ids = BinIdSequence::new();
        let bin1 = scored(&mut ids, &[1, 2], 90.0, 100);
        let bin2 = scored(&mut ids, &[2, 3], 90.0, 100);
        let bin3 = scored(&mut ids, &[3, 4], 90.0, 100);

        let expected = vec![bin1.id, bin3.id];
        let selected = select_best_bins(vec![bin3, bin2, bin1]).unwrap();
        assert_eq!(ids_of(&selected), expected);
    }

    #[test]
    fn selection_is_pairwise_disjoint() {
        let mut ids = BinIdSequence::new();
        let pool = vec![
            scored(&mut ids, &[1, 2, 3, 4], 70.0, 10),
            scored(&mut ids, &[4, 5], 95.0, 10),
            scored(&mut ids, &[1, 6], 60.0, 10),
            scored(&mut ids, &[7], 10.0, 10),
            scored(&mut ids, &[2, 3], 65.0, 10),
            scored(&mut ids, &[6, 7, 8], 50.0, 10),
            scored(&mut ids, &[9], -20.0, 10),
        ];

        let selected = select_best_bins(pool).unwrap();

        for (i, a) in selected.iter().enumerate() {
            for b in &selected[i + 1..] {
                assert!(a.overlaps_with(b).is_empty(), "{} overlaps {}", a, b);
            }
        }
        let contigs: Vec<Vec<u32>> = selected
            .iter()
            .map(|b| b.contigs().iter().copied().collect())
            .collect();
        assert_eq!(
            contigs,
            vec![vec![4, 5], vec![2, 3], vec![1, 6], vec![7], vec![9]]
        );
    }

    #[test]
    fn negative_scores_keep_the_ranking() {
        let mut ids = BinIdSequence::new();
        let bin1 = scored(&mut ids, &[1], -5.0, 10);
        let bin2 = scored(&mut ids, &[1, 2], -1.0, 10);
        let expected = vec![bin2.id];
        assert_eq!(ids_of(&select_best_bins(vec![bin1, bin2]).unwrap()), expected);
    }

    #[test]
    fn unscored_bins_are_rejected() {
        let mut ids = BinIdSequence::new();
        let bin1 = scored(&mut ids, &[1], 50.0, 10);
        let bin2: Bin = Bin::new(&mut ids, [2u32], "set", "bin");

        let err = select_best_bins(vec![bin1, bin2]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BinError>(),
            Some(BinError::NotScored { .. })
        ));
    }

    #[test]
    fn empty_pool() {
        assert!(select_best_bins(Vec::<Bin>::new()).unwrap().is_empty());
    }
}
