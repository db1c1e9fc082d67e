//! Term traversal helpers.
//!
//! Worklist-based walks keyed by term identity; shared subterms are
//! visited once, so diamond-shaped DAGs stay linear.

use rustc_hash::FxHashSet;

use super::{TermId, TermManager};

/// Add `root` and every subterm of `root` to `marks`.
pub fn collect_subterms(tm: &TermManager, root: TermId, marks: &mut FxHashSet<TermId>) {
    let mut queue = vec![root];
    while let Some(t) = queue.pop() {
        if !marks.insert(t) {
            continue;
        }
        queue.extend(tm.kind(t).children());
    }
}

/// Collect the uninterpreted constants occurring in `root`.
pub fn collect_vars(tm: &TermManager, root: TermId) -> FxHashSet<TermId> {
    let mut vars = FxHashSet::default();
    let mut seen = FxHashSet::default();
    let mut queue = vec![root];
    while let Some(t) = queue.pop() {
        if !seen.insert(t) {
            continue;
        }
        if tm.is_var(t) {
            vars.insert(t);
        }
        queue.extend(tm.kind(t).children());
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_vars_through_shared_subterms() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let sum = tm.mk_add(vec![x, y]);
        // Diamond: the sum occurs twice.
        let prod = tm.mk_mul(vec![sum, sum]);

        let vars = collect_vars(&tm, prod);
        assert!(vars.contains(&x));
        assert!(vars.contains(&y));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn marks_include_root() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let zero = tm.mk_int(0);
        let le = tm.mk_le(x, zero);

        let mut marks = FxHashSet::default();
        collect_subterms(&tm, le, &mut marks);
        assert!(marks.contains(&le));
        assert!(marks.contains(&x));
        assert!(marks.contains(&zero));
    }
}
