use std::collections::{BTreeMap, BTreeSet};

use crate::common::types::TxnId;

/// Wait-for graph built by the deadlock detector: an edge `a -> b` means
/// transaction `a` is waiting for a lock that `b` currently holds.
///
/// Both the vertex set and each adjacency set are ordered so that cycle
/// detection is deterministic: DFS starts from the smallest waiting txn id
/// and explores children in ascending order.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    edges: BTreeMap<TxnId, BTreeSet<TxnId>>,
}

impl WaitForGraph {
    pub fn add_edge(&mut self, waiter: TxnId, holder: TxnId) {
        self.edges.entry(waiter).or_default().insert(holder);
    }

    pub fn remove_edge(&mut self, waiter: TxnId, holder: TxnId) {
        if let Some(holders) = self.edges.get_mut(&waiter) {
            holders.remove(&holder);
            if holders.is_empty() {
                self.edges.remove(&waiter);
            }
        }
    }

    /// Remove a transaction and every edge touching it.
    pub fn remove_txn(&mut self, txn_id: TxnId) {
        self.edges.remove(&txn_id);
        self.edges.retain(|_, holders| {
            holders.remove(&txn_id);
            !holders.is_empty()
        });
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }

    /// All edges, mainly for inspection in tests.
    pub fn edge_list(&self) -> Vec<(TxnId, TxnId)> {
        self.edges
            .iter()
            .flat_map(|(&from, tos)| tos.iter().map(move |&to| (from, to)))
            .collect()
    }

    /// Find one cycle, returned as the transactions on it. Starting points
    /// and neighbour order are both ascending, so repeated calls on the same
    /// graph find the same cycle.
    pub fn find_cycle(&self) -> Option<Vec<TxnId>> {
        let mut finished = BTreeSet::new();
        for &start in self.edges.keys() {
            if finished.contains(&start) {
                continue;
            }
            let mut stack = Vec::new();
            let mut on_stack = BTreeSet::new();
            if let Some(cycle) = self.dfs(start, &mut stack, &mut on_stack, &mut finished) {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs(
        &self,
        node: TxnId,
        stack: &mut Vec<TxnId>,
        on_stack: &mut BTreeSet<TxnId>,
        finished: &mut BTreeSet<TxnId>,
    ) -> Option<Vec<TxnId>> {
        stack.push(node);
        on_stack.insert(node);

        if let Some(holders) = self.edges.get(&node) {
            for &next in holders {
                if on_stack.contains(&next) {
                    // Back edge: the cycle is the stack suffix starting at `next`.
                    let pos = stack.iter().position(|&t| t == next)?;
                    return Some(stack[pos..].to_vec());
                }
                if !finished.contains(&next) {
                    if let Some(cycle) = self.dfs(next, stack, on_stack, finished) {
                        return Some(cycle);
                    }
                }
            }
        }

        stack.pop();
        on_stack.remove(&node);
        finished.insert(node);
        None
    }
}
