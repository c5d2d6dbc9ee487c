use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    hash::Hash,
};

use log::info;
use petgraph::graph::{NodeIndex, UnGraph};
use rayon::prelude::*;

use crate::types::Bin;

/// Unordered pairs of distinct bin-set labels.
fn label_pairs<K>(labels: &[K]) -> Vec<(&K, &K)> {
    labels
        .iter()
        .enumerate()
        .flat_map(|(i, label1)| labels.iter().skip(i + 1).map(move |label2| (label1, label2)))
        .collect()
}

/// Bins linked when they share at least one contig and come from different bin sets.
///
/// Nodes are bins identified by content: a composition found by two binners is one node. Bins
/// without any overlap are never added. Edge weights hold the number of shared contigs.
pub struct OverlapGraph<'a, C> {
    graph: UnGraph<&'a Bin<C>, usize>,
}

impl<'a, C> OverlapGraph<'a, C>
where
    C: Ord + Hash + Clone + Sync,
{
    pub fn from_bin_sets(bin_sets: &BTreeMap<String, Vec<&'a Bin<C>>>) -> Self {
        let labels: Vec<&String> = bin_sets.keys().collect();

        let overlaps: Vec<Vec<(&'a Bin<C>, &'a Bin<C>, usize)>> = label_pairs(&labels)
            .into_par_iter()
            .map(|(label1, label2)| {
                let mut local_vec = Vec::new();
                info!("Comparing: {} vs {}", label1, label2);

                if let (Some(bins1), Some(bins2)) = (bin_sets.get(*label1), bin_sets.get(*label2)) {
                    for &bin1 in bins1 {
                        for &bin2 in bins2 {
                            let shared = bin1.overlaps_with(bin2).len();
                            if shared > 0 {
                                local_vec.push((bin1, bin2, shared));
                            }
                        }
                    }
                }
                local_vec
            })
            .collect();

        let mut graph = UnGraph::new_undirected();
        let mut nodes: HashMap<&'a Bin<C>, NodeIndex> = HashMap::new();

        for (bin1, bin2, shared) in overlaps.into_iter().flatten() {
            if bin1 == bin2 {
                continue;
            }
            let n1 = *nodes.entry(bin1).or_insert_with(|| graph.add_node(bin1));
            let n2 = *nodes.entry(bin2).or_insert_with(|| graph.add_node(bin2));
            if graph.find_edge(n1, n2).is_none() {
                graph.add_edge(n1, n2, shared);
            }
        }

        let graph = Self { graph };
        info!(
            "Bin graph: {} overlapping bins, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[cfg(test)]
    pub fn contains(&self, bin: &Bin<C>) -> bool {
        self.graph.node_weights().any(|&b| b == bin)
    }

    /// Whether both bins are nodes joined by an edge.
    #[cfg(test)]
    pub fn are_linked(&self, bin1: &Bin<C>, bin2: &Bin<C>) -> bool {
        let (Some(n1), Some(n2)) = (self.node_of(bin1), self.node_of(bin2)) else {
            return false;
        };
        self.graph.find_edge(n1, n2).is_some()
    }

    #[cfg(test)]
    fn node_of(&self, bin: &Bin<C>) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&n| self.graph[n] == bin)
    }

    /// Every maximal clique, found with Bron–Kerbosch and Tomita pivoting.
    ///
    /// Members of a clique are ordered by bin id and cliques are ordered by their member ids, so
    /// that the bins derived from them are created in a reproducible order.
    pub fn maximal_cliques(&self) -> Vec<Vec<&'a Bin<C>>> {
        let adjacency: Vec<BTreeSet<NodeIndex>> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors(n).collect())
            .collect();

        let mut found = Vec::new();
        bron_kerbosch(
            &adjacency,
            &mut Vec::new(),
            self.graph.node_indices().collect(),
            BTreeSet::new(),
            &mut found,
        );

        let mut cliques: Vec<Vec<&'a Bin<C>>> = found
            .into_iter()
            .map(|clique| {
                let mut bins: Vec<&'a Bin<C>> = clique.into_iter().map(|n| self.graph[n]).collect();
                bins.sort_by_key(|b| b.id);
                bins
            })
            .collect();
        cliques.sort_by(|a, b| {
            a.iter()
                .map(|bin| bin.id)
                .cmp(b.iter().map(|bin| bin.id))
        });
        cliques
    }
}

fn bron_kerbosch(
    adjacency: &[BTreeSet<NodeIndex>],
    clique: &mut Vec<NodeIndex>,
    mut candidates: BTreeSet<NodeIndex>,
    mut excluded: BTreeSet<NodeIndex>,
    found: &mut Vec<Vec<NodeIndex>>,
) {
    if candidates.is_empty() {
        // an empty graph has no clique, not one empty clique
        if excluded.is_empty() && !clique.is_empty() {
            found.push(clique.clone());
        }
        return;
    }

    // pivot on the vertex covering most candidates
    let pivot = candidates
        .union(&excluded)
        .max_by_key(|u| adjacency[u.index()].intersection(&candidates).count())
        .copied();
    let branches: Vec<NodeIndex> = match pivot {
        Some(u) => candidates.difference(&adjacency[u.index()]).copied().collect(),
        None => candidates.iter().copied().collect(),
    };

    for v in branches {
        let neighbours = &adjacency[v.index()];
        clique.push(v);
        bron_kerbosch(
            adjacency,
            clique,
            candidates.intersection(neighbours).copied().collect(),
            excluded.intersection(neighbours).copied().collect(),
            found,
        );
        clique.pop();
        candidates.remove(&v);
        excluded.insert(v);
    }
}

/// Groups bins under every bin-set name in their origin. A bin merged from several sets is
/// listed under each of them.
pub fn group_by_origin<C>(bins: &[Bin<C>]) -> BTreeMap<String, Vec<&Bin<C>>> {
    let mut bin_sets: BTreeMap<String, Vec<&Bin<C>>> = BTreeMap::new();
    for bin in bins {
        for set_name in &bin.origin {
            bin_sets.entry(set_name.clone()).or_default().push(bin);
        }
    }
    bin_sets
}
