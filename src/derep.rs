use std::{collections::HashMap, hash::Hash};

use log::debug;

use crate::types::Bin;

/// Collapses content-identical bins across any number of collections.
///
/// The first bin seen for a contig set is kept and receives the origins of every later copy,
/// so the output records which binners or operations produced the same composition. Output
/// order is first-seen order.
pub fn dereplicate<C, I, B>(collections: I) -> Vec<Bin<C>>
where
    C: Ord + Hash + Clone,
    I: IntoIterator<Item = B>,
    B: IntoIterator<Item = Bin<C>>,
{
    let mut kept: Vec<Bin<C>> = Vec::new();
    let mut by_hash: HashMap<u64, Vec<usize>> = HashMap::new();
    let mut merged = 0usize;

    for bin in collections.into_iter().flatten() {
        let bucket = by_hash.entry(bin.content_hash()).or_default();
        match bucket.iter().find(|&&i| kept[i] == bin) {
            Some(&i) => {
                kept[i].merge_origin(&bin.origin);
                merged += 1;
            }
            None => {
                bucket.push(kept.len());
                kept.push(bin);
            }
        }
    }

    debug!("Dereplication merged {} bins into {} unique bins", merged, kept.len());
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BinIdSequence;
    use std::collections::BTreeSet;

    #[test]
    fn identical_bins_merge_origins_into_first() {
        let mut ids = BinIdSequence::new();
        let a = Bin::new(&mut ids, [1u32, 2, 3], "set1", "a");
        let b = Bin::new(&mut ids, [4u32, 5], "set1", "b");
        let c = Bin::new(&mut ids, [3u32, 2, 1], "set2", "c");
        let d = Bin::new(&mut ids, [4u32, 5], "union", "d");
        let a_id = a.id;

        let derep = dereplicate([vec![a, b], vec![c, d]]);

        assert_eq!(derep.len(), 2);
        assert_eq!(derep[0].id, a_id);
        assert_eq!(derep[0].name, "a");
        assert_eq!(
            derep[0].origin,
            BTreeSet::from(["set1".to_string(), "set2".to_string()])
        );
        assert_eq!(
            derep[1].origin,
            BTreeSet::from(["set1".to_string(), "union".to_string()])
        );
    }

    #[test]
    fn dereplicating_unique_bins_is_a_no_op() {
        let mut ids = BinIdSequence::new();
        let bins = vec![
            Bin::new(&mut ids, [1u32], "set1", "a"),
            Bin::new(&mut ids, [1u32, 2], "set1", "b"),
            Bin::new(&mut ids, [3u32], "set2", "c"),
        ];

        let once = dereplicate([bins.clone()]);
        let twice = dereplicate([once.clone()]);

        let ids_of = |v: &[Bin]| v.iter().map(|b| b.id).collect::<Vec<_>>();
        assert_eq!(ids_of(&once[..]), ids_of(&bins[..]));
        assert_eq!(ids_of(&twice[..]), ids_of(&bins[..]));
        assert!(twice.iter().zip(&bins).all(|(x, y)| x.origin == y.origin));
    }

    #[test]
    fn empty_input() {
        let derep: Vec<Bin> = dereplicate(Vec::<Vec<Bin>>::new());
        assert!(derep.is_empty());
    }
}
