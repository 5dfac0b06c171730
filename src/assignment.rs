//! Maximum-weight perfect matching on a square integer weight matrix.
//!
//! `solve_max` is the Hungarian method with row/column potentials (O(n^3)).
//! `k_best` ranks the next-best matchings with Murty's partitioning scheme,
//! re-solving each constrained subproblem with the same routine.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

const INF: i128 = i128::MAX / 4;
/// Weight that makes a cell unusable in any solution of a feasible subproblem.
const BLOCKED: i128 = -(1_i128 << 100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matching {
    /// `cols[row]` is the column assigned to `row`.
    pub cols: Vec<usize>,
    pub weight: i128,
}

/// Optimal assignment maximizing the total weight.
pub fn solve_max(weights: &[Vec<i128>]) -> Matching {
    let n = weights.len();
    if n == 0 {
        return Matching {
            cols: Vec::new(),
            weight: 0,
        };
    }
    debug_assert!(weights.iter().all(|row| row.len() == n));

    // 1-indexed potentials; column 0 is the virtual start.
    let mut u = vec![0_i128; n + 1];
    let mut v = vec![0_i128; n + 1];
    let mut p = vec![0_usize; n + 1];
    let mut way = vec![0_usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0;
        let mut minv = vec![INF; n + 1];
        let mut used = vec![false; n + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = INF;
            let mut j1 = 0;
            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let cur = -weights[i0 - 1][j - 1] - u[i0] - v[j];
                if cur < minv[j] {
                    minv[j] = cur;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut cols = vec![0; n];
    for j in 1..=n {
        cols[p[j] - 1] = j - 1;
    }
    let weight = total_weight(weights, &cols);
    Matching { cols, weight }
}

fn total_weight(weights: &[Vec<i128>], cols: &[usize]) -> i128 {
    cols.iter().enumerate().map(|(r, &c)| weights[r][c]).sum()
}

#[derive(Debug, Clone, Default)]
struct Constraints {
    forced: Vec<(usize, usize)>,
    forbidden: Vec<(usize, usize)>,
}

impl Constraints {
    fn allows(&self, row: usize, col: usize) -> bool {
        if self.forbidden.contains(&(row, col)) {
            return false;
        }
        self.forced
            .iter()
            .all(|&(r, c)| (r == row) == (c == col))
    }

    fn is_forced_row(&self, row: usize) -> bool {
        self.forced.iter().any(|&(r, _)| r == row)
    }
}

fn solve_constrained(weights: &[Vec<i128>], constraints: &Constraints) -> Option<Matching> {
    let masked: Vec<Vec<i128>> = weights
        .iter()
        .enumerate()
        .map(|(r, row)| {
            row.iter()
                .enumerate()
                .map(|(c, &w)| if constraints.allows(r, c) { w } else { BLOCKED })
                .collect()
        })
        .collect();
    let solved = solve_max(&masked);
    let feasible = solved
        .cols
        .iter()
        .enumerate()
        .all(|(r, &c)| constraints.allows(r, c));
    if !feasible {
        return None;
    }
    Some(Matching {
        weight: total_weight(weights, &solved.cols),
        cols: solved.cols,
    })
}

struct Node {
    matching: Matching,
    constraints: Constraints,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.matching
            .weight
            .cmp(&other.matching.weight)
            .then_with(|| other.matching.cols.cmp(&self.matching.cols))
    }
}

/// Up to `k` distinct matchings in non-increasing weight order; the first is optimal.
pub fn k_best(weights: &[Vec<i128>], k: usize) -> Vec<Matching> {
    let n = weights.len();
    if k == 0 {
        return Vec::new();
    }
    if n == 0 {
        return vec![solve_max(weights)];
    }

    let mut out: Vec<Matching> = Vec::with_capacity(k.min(64));
    let mut queue = BinaryHeap::new();
    queue.push(Node {
        matching: solve_max(weights),
        constraints: Constraints::default(),
    });

    while let Some(node) = queue.pop() {
        if out.iter().any(|m| m.cols == node.matching.cols) {
            continue;
        }
        out.push(node.matching.clone());
        if out.len() == k {
            break;
        }

        // Partition the remaining space: child t keeps the first t free legs
        // of this solution and forbids leg t.
        let mut inherited = node.constraints.clone();
        for row in 0..n {
            if node.constraints.is_forced_row(row) {
                continue;
            }
            let col = node.matching.cols[row];
            let mut child = inherited.clone();
            child.forbidden.push((row, col));
            if let Some(matching) = solve_constrained(weights, &child) {
                queue.push(Node {
                    matching,
                    constraints: child,
                });
            }
            inherited.forced.push((row, col));
        }
    }
    out
}
