//! Barrier-separated stage plan for the bottom-up merge.
//!
//! Solving level `L` means inverting every square of that level at once. For
//! `L > 0` the squares are split into their diagonal halves at `L - 1`, the
//! halves are inverted, partner couplings are formed from those inverses, the
//! halves are reseeded and shifted by their Schur corrections, inverted again,
//! and finally combined back into level `L`.

/// One barrier-separated step of the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Invert every leaf square at level 0.
    InvertLeaves,
    /// Copy the diagonal halves of every square at `level + 1` into `level`.
    Split(usize),
    /// Zero the partner blocks of `level`.
    ZeroPartners(usize),
    /// `right[k] = -inv(square[2k]) B_k` and `left[k] = -inv(square[2k + 1]) C_k`.
    ComputePartners(usize),
    /// `square[2k] += B_k left[k]` and `square[2k + 1] += C_k right[k]`.
    AccumulateSchur(usize),
    /// Assemble the inverses of `level` from the inverted halves at `level - 1`.
    Combine(usize),
}

/// Full plan that inverts the single square at `root_level`.
///
/// Its length is `7 * 2^root_level - 6`.
pub fn stage_plan(root_level: usize) -> Vec<Stage> {
    let mut plan = Vec::with_capacity(7 * (1 << root_level) - 6);
    push_solve(root_level, &mut plan);
    plan
}

fn push_solve(level: usize, plan: &mut Vec<Stage>) {
    if level == 0 {
        plan.push(Stage::InvertLeaves);
        return;
    }
    let below = level - 1;
    plan.push(Stage::Split(below));
    push_solve(below, plan);
    plan.extend([
        Stage::ZeroPartners(below),
        Stage::ComputePartners(below),
        Stage::Split(below),
        Stage::AccumulateSchur(below),
    ]);
    push_solve(below, plan);
    plan.push(Stage::Combine(level));
}
