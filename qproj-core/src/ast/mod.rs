//! Hash-consed terms.
//!
//! Terms are stored in an arena owned by [`TermManager`]; structurally
//! identical terms share one [`TermId`], so equality of ids is equality of
//! terms and per-call caches can be keyed by id.

use std::fmt;

use lasso::{Rodeo, Spur};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;
use rustc_hash::FxHashMap;

use crate::sort::{SortId, SortKind, Sorts};

pub mod traversal;

/// Term identifier: an index into the term arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(u32);

impl TermId {
    /// The arena index of this term.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The shape of a term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// Boolean constant `true`.
    True,
    /// Boolean constant `false`.
    False,
    /// Named uninterpreted constant.
    Var(Spur, SortId),
    /// Integer numeral.
    IntConst(BigInt),
    /// Real numeral.
    RealConst(BigRational),
    /// N-ary addition.
    Add(Vec<TermId>),
    /// Binary subtraction.
    Sub(TermId, TermId),
    /// Unary minus.
    Neg(TermId),
    /// N-ary multiplication.
    Mul(Vec<TermId>),
    /// Real division.
    Div(TermId, TermId),
    /// Integer (floor) division.
    IntDiv(TermId, TermId),
    /// Integer (floor) remainder.
    Mod(TermId, TermId),
    /// Less-or-equal.
    Le(TermId, TermId),
    /// Strictly-less.
    Lt(TermId, TermId),
    /// Greater-or-equal.
    Ge(TermId, TermId),
    /// Strictly-greater.
    Gt(TermId, TermId),
    /// Equality.
    Eq(TermId, TermId),
    /// Pairwise disequality.
    Distinct(Vec<TermId>),
    /// Negation.
    Not(TermId),
    /// N-ary conjunction.
    And(Vec<TermId>),
    /// N-ary disjunction.
    Or(Vec<TermId>),
    /// Implication.
    Implies(TermId, TermId),
    /// If-then-else.
    Ite(TermId, TermId, TermId),
}

impl TermKind {
    /// Immediate children of this term, in argument order.
    pub fn children(&self) -> Vec<TermId> {
        match self {
            TermKind::True
            | TermKind::False
            | TermKind::Var(..)
            | TermKind::IntConst(_)
            | TermKind::RealConst(_) => Vec::new(),
            TermKind::Neg(a) | TermKind::Not(a) => vec![*a],
            TermKind::Sub(a, b)
            | TermKind::Div(a, b)
            | TermKind::IntDiv(a, b)
            | TermKind::Mod(a, b)
            | TermKind::Le(a, b)
            | TermKind::Lt(a, b)
            | TermKind::Ge(a, b)
            | TermKind::Gt(a, b)
            | TermKind::Eq(a, b)
            | TermKind::Implies(a, b) => vec![*a, *b],
            TermKind::Ite(c, t, e) => vec![*c, *t, *e],
            TermKind::Add(args)
            | TermKind::Mul(args)
            | TermKind::Distinct(args)
            | TermKind::And(args)
            | TermKind::Or(args) => args.clone(),
        }
    }
}

/// A term: its kind plus its sort.
#[derive(Debug, Clone)]
pub struct Term {
    /// Shape of the term.
    pub kind: TermKind,
    /// Sort of the term.
    pub sort: SortId,
}

/// Arena and hash-cons table for terms.
pub struct TermManager {
    terms: Vec<Term>,
    cache: FxHashMap<TermKind, TermId>,
    names: Rodeo,
    /// Interned sorts.
    pub sorts: Sorts,
}

impl TermManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
            cache: FxHashMap::default(),
            names: Rodeo::default(),
            sorts: Sorts::new(),
        }
    }

    fn intern(&mut self, kind: TermKind, sort: SortId) -> TermId {
        if let Some(&id) = self.cache.get(&kind) {
            return id;
        }
        let id = TermId(self.terms.len() as u32);
        self.terms.push(Term {
            kind: kind.clone(),
            sort,
        });
        self.cache.insert(kind, id);
        id
    }

    /// Look up a term by id.
    pub fn get(&self, id: TermId) -> Option<&Term> {
        self.terms.get(id.index())
    }

    /// The kind of a term. Panics on a foreign id.
    pub fn kind(&self, id: TermId) -> &TermKind {
        &self.terms[id.index()].kind
    }

    /// The sort of a term. Panics on a foreign id.
    pub fn sort_of(&self, id: TermId) -> SortId {
        self.terms[id.index()].sort
    }

    /// Number of distinct terms created so far.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Resolve the name of a variable term.
    pub fn var_name(&self, id: TermId) -> Option<&str> {
        match self.kind(id) {
            TermKind::Var(name, _) => Some(self.names.resolve(name)),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    /// The constant `true`.
    pub fn mk_true(&mut self) -> TermId {
        let bool_sort = self.sorts.bool_sort;
        self.intern(TermKind::True, bool_sort)
    }

    /// The constant `false`.
    pub fn mk_false(&mut self) -> TermId {
        let bool_sort = self.sorts.bool_sort;
        self.intern(TermKind::False, bool_sort)
    }

    /// A Boolean constant.
    pub fn mk_bool(&mut self, b: bool) -> TermId {
        if b {
            self.mk_true()
        } else {
            self.mk_false()
        }
    }

    /// A named uninterpreted constant of the given sort.
    pub fn mk_var(&mut self, name: &str, sort: SortId) -> TermId {
        let spur = self.names.get_or_intern(name);
        self.intern(TermKind::Var(spur, sort), sort)
    }

    /// An integer numeral.
    pub fn mk_int(&mut self, value: impl Into<BigInt>) -> TermId {
        let int_sort = self.sorts.int_sort;
        self.intern(TermKind::IntConst(value.into()), int_sort)
    }

    /// A real numeral.
    pub fn mk_real(&mut self, value: BigRational) -> TermId {
        let real_sort = self.sorts.real_sort;
        self.intern(TermKind::RealConst(value), real_sort)
    }

    /// A numeral of the given type. A non-integral value is always built
    /// as a real numeral.
    pub fn mk_numeral(&mut self, value: &BigRational, is_int: bool) -> TermId {
        if is_int && value.is_integer() {
            self.mk_int(value.to_integer())
        } else {
            self.mk_real(value.clone())
        }
    }

    fn arith_result_sort(&self, args: &[TermId]) -> SortId {
        if args.iter().any(|&a| self.is_real(a)) {
            self.sorts.real_sort
        } else {
            self.sorts.int_sort
        }
    }

    /// N-ary sum. Empty sums collapse to `0`, singleton sums to the element.
    pub fn mk_add(&mut self, args: Vec<TermId>) -> TermId {
        match args.len() {
            0 => self.mk_int(BigInt::zero()),
            1 => args[0],
            _ => {
                let sort = self.arith_result_sort(&args);
                self.intern(TermKind::Add(args), sort)
            }
        }
    }

    /// Binary subtraction.
    pub fn mk_sub(&mut self, a: TermId, b: TermId) -> TermId {
        let sort = self.arith_result_sort(&[a, b]);
        self.intern(TermKind::Sub(a, b), sort)
    }

    /// Unary minus.
    pub fn mk_neg(&mut self, a: TermId) -> TermId {
        let sort = self.sort_of(a);
        self.intern(TermKind::Neg(a), sort)
    }

    /// N-ary product. Empty products collapse to `1`, singletons to the element.
    pub fn mk_mul(&mut self, args: Vec<TermId>) -> TermId {
        match args.len() {
            0 => self.mk_int(BigInt::from(1)),
            1 => args[0],
            _ => {
                let sort = self.arith_result_sort(&args);
                self.intern(TermKind::Mul(args), sort)
            }
        }
    }

    /// Real division.
    pub fn mk_div(&mut self, a: TermId, b: TermId) -> TermId {
        let real_sort = self.sorts.real_sort;
        self.intern(TermKind::Div(a, b), real_sort)
    }

    /// Integer (floor) division.
    pub fn mk_idiv(&mut self, a: TermId, b: TermId) -> TermId {
        let int_sort = self.sorts.int_sort;
        self.intern(TermKind::IntDiv(a, b), int_sort)
    }

    /// Integer (floor) remainder.
    pub fn mk_mod(&mut self, a: TermId, b: TermId) -> TermId {
        let int_sort = self.sorts.int_sort;
        self.intern(TermKind::Mod(a, b), int_sort)
    }

    /// `a <= b`.
    pub fn mk_le(&mut self, a: TermId, b: TermId) -> TermId {
        let bool_sort = self.sorts.bool_sort;
        self.intern(TermKind::Le(a, b), bool_sort)
    }

    /// `a < b`.
    pub fn mk_lt(&mut self, a: TermId, b: TermId) -> TermId {
        let bool_sort = self.sorts.bool_sort;
        self.intern(TermKind::Lt(a, b), bool_sort)
    }

    /// `a >= b`.
    pub fn mk_ge(&mut self, a: TermId, b: TermId) -> TermId {
        let bool_sort = self.sorts.bool_sort;
        self.intern(TermKind::Ge(a, b), bool_sort)
    }

    /// `a > b`.
    pub fn mk_gt(&mut self, a: TermId, b: TermId) -> TermId {
        let bool_sort = self.sorts.bool_sort;
        self.intern(TermKind::Gt(a, b), bool_sort)
    }

    /// `a = b`.
    pub fn mk_eq(&mut self, a: TermId, b: TermId) -> TermId {
        let bool_sort = self.sorts.bool_sort;
        self.intern(TermKind::Eq(a, b), bool_sort)
    }

    /// `distinct(args)`.
    pub fn mk_distinct(&mut self, args: Vec<TermId>) -> TermId {
        let bool_sort = self.sorts.bool_sort;
        self.intern(TermKind::Distinct(args), bool_sort)
    }

    /// Negation. Double negations are stripped and constants folded.
    pub fn mk_not(&mut self, a: TermId) -> TermId {
        match self.kind(a) {
            TermKind::Not(inner) => *inner,
            TermKind::True => self.mk_false(),
            TermKind::False => self.mk_true(),
            _ => {
                let bool_sort = self.sorts.bool_sort;
                self.intern(TermKind::Not(a), bool_sort)
            }
        }
    }

    /// N-ary conjunction. Empty conjunctions collapse to `true`.
    pub fn mk_and(&mut self, args: Vec<TermId>) -> TermId {
        match args.len() {
            0 => self.mk_true(),
            1 => args[0],
            _ => {
                let bool_sort = self.sorts.bool_sort;
                self.intern(TermKind::And(args), bool_sort)
            }
        }
    }

    /// N-ary disjunction. Empty disjunctions collapse to `false`.
    pub fn mk_or(&mut self, args: Vec<TermId>) -> TermId {
        match args.len() {
            0 => self.mk_false(),
            1 => args[0],
            _ => {
                let bool_sort = self.sorts.bool_sort;
                self.intern(TermKind::Or(args), bool_sort)
            }
        }
    }

    /// Implication.
    pub fn mk_implies(&mut self, a: TermId, b: TermId) -> TermId {
        let bool_sort = self.sorts.bool_sort;
        self.intern(TermKind::Implies(a, b), bool_sort)
    }

    /// If-then-else; the sort is the sort of the `then` branch.
    pub fn mk_ite(&mut self, cond: TermId, then_br: TermId, else_br: TermId) -> TermId {
        let sort = self.sort_of(then_br);
        self.intern(TermKind::Ite(cond, then_br, else_br), sort)
    }

    // ------------------------------------------------------------------
    // Recognizers
    // ------------------------------------------------------------------

    /// Whether the term has an arithmetic sort.
    pub fn is_arith(&self, id: TermId) -> bool {
        self.sorts.is_arith(self.sort_of(id))
    }

    /// Whether the term has integer sort.
    pub fn is_int(&self, id: TermId) -> bool {
        self.sorts.kind(self.sort_of(id)) == SortKind::Int
    }

    /// Whether the term has real sort.
    pub fn is_real(&self, id: TermId) -> bool {
        self.sorts.kind(self.sort_of(id)) == SortKind::Real
    }

    /// Whether the term is an uninterpreted constant.
    pub fn is_var(&self, id: TermId) -> bool {
        matches!(self.kind(id), TermKind::Var(..))
    }

    /// The value of an extended numeral: a plain numeral or a (nested)
    /// unary minus of one.
    pub fn numeral_value(&self, id: TermId) -> Option<BigRational> {
        match self.kind(id) {
            TermKind::IntConst(i) => Some(BigRational::from_integer(i.clone())),
            TermKind::RealConst(r) => Some(r.clone()),
            TermKind::Neg(inner) => self.numeral_value(*inner).map(|v| -v),
            _ => None,
        }
    }

    /// Whether the term is an extended numeral.
    pub fn is_numeral(&self, id: TermId) -> bool {
        self.numeral_value(id).is_some()
    }

    // ------------------------------------------------------------------
    // Substitution
    // ------------------------------------------------------------------

    /// Replace every occurrence of the map's keys in `root` by the mapped
    /// terms. Replacements are not re-visited.
    pub fn substitute(&mut self, root: TermId, map: &FxHashMap<TermId, TermId>) -> TermId {
        let mut cache = FxHashMap::default();
        self.substitute_rec(root, map, &mut cache)
    }

    fn substitute_rec(
        &mut self,
        root: TermId,
        map: &FxHashMap<TermId, TermId>,
        cache: &mut FxHashMap<TermId, TermId>,
    ) -> TermId {
        if let Some(&t) = map.get(&root) {
            return t;
        }
        if let Some(&t) = cache.get(&root) {
            return t;
        }
        let kind = self.kind(root).clone();
        let result = match kind {
            TermKind::True
            | TermKind::False
            | TermKind::Var(..)
            | TermKind::IntConst(_)
            | TermKind::RealConst(_) => root,
            TermKind::Add(args) => {
                let args = self.substitute_all(args, map, cache);
                self.mk_add(args)
            }
            TermKind::Mul(args) => {
                let args = self.substitute_all(args, map, cache);
                self.mk_mul(args)
            }
            TermKind::And(args) => {
                let args = self.substitute_all(args, map, cache);
                self.mk_and(args)
            }
            TermKind::Or(args) => {
                let args = self.substitute_all(args, map, cache);
                self.mk_or(args)
            }
            TermKind::Distinct(args) => {
                let args = self.substitute_all(args, map, cache);
                self.mk_distinct(args)
            }
            TermKind::Sub(a, b) => {
                let (a, b) = self.substitute_pair(a, b, map, cache);
                self.mk_sub(a, b)
            }
            TermKind::Div(a, b) => {
                let (a, b) = self.substitute_pair(a, b, map, cache);
                self.mk_div(a, b)
            }
            TermKind::IntDiv(a, b) => {
                let (a, b) = self.substitute_pair(a, b, map, cache);
                self.mk_idiv(a, b)
            }
            TermKind::Mod(a, b) => {
                let (a, b) = self.substitute_pair(a, b, map, cache);
                self.mk_mod(a, b)
            }
            TermKind::Le(a, b) => {
                let (a, b) = self.substitute_pair(a, b, map, cache);
                self.mk_le(a, b)
            }
            TermKind::Lt(a, b) => {
                let (a, b) = self.substitute_pair(a, b, map, cache);
                self.mk_lt(a, b)
            }
            TermKind::Ge(a, b) => {
                let (a, b) = self.substitute_pair(a, b, map, cache);
                self.mk_ge(a, b)
            }
            TermKind::Gt(a, b) => {
                let (a, b) = self.substitute_pair(a, b, map, cache);
                self.mk_gt(a, b)
            }
            TermKind::Eq(a, b) => {
                let (a, b) = self.substitute_pair(a, b, map, cache);
                self.mk_eq(a, b)
            }
            TermKind::Implies(a, b) => {
                let (a, b) = self.substitute_pair(a, b, map, cache);
                self.mk_implies(a, b)
            }
            TermKind::Neg(a) => {
                let a = self.substitute_rec(a, map, cache);
                self.mk_neg(a)
            }
            TermKind::Not(a) => {
                let a = self.substitute_rec(a, map, cache);
                self.mk_not(a)
            }
            TermKind::Ite(c, t, e) => {
                let c = self.substitute_rec(c, map, cache);
                let t = self.substitute_rec(t, map, cache);
                let e = self.substitute_rec(e, map, cache);
                self.mk_ite(c, t, e)
            }
        };
        cache.insert(root, result);
        result
    }

    fn substitute_all(
        &mut self,
        args: Vec<TermId>,
        map: &FxHashMap<TermId, TermId>,
        cache: &mut FxHashMap<TermId, TermId>,
    ) -> Vec<TermId> {
        args.into_iter()
            .map(|a| self.substitute_rec(a, map, cache))
            .collect()
    }

    fn substitute_pair(
        &mut self,
        a: TermId,
        b: TermId,
        map: &FxHashMap<TermId, TermId>,
        cache: &mut FxHashMap<TermId, TermId>,
    ) -> (TermId, TermId) {
        let a = self.substitute_rec(a, map, cache);
        let b = self.substitute_rec(b, map, cache);
        (a, b)
    }

    // ------------------------------------------------------------------
    // Printing
    // ------------------------------------------------------------------

    /// A `Display` adapter rendering the term as an s-expression.
    pub fn display(&self, id: TermId) -> TermDisplay<'_> {
        TermDisplay { tm: self, id }
    }

    fn fmt_term(&self, id: TermId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_args = |f: &mut fmt::Formatter<'_>, op: &str, args: &[TermId]| {
            write!(f, "({op}")?;
            for &a in args {
                write!(f, " ")?;
                self.fmt_term(a, f)?;
            }
            write!(f, ")")
        };
        match self.kind(id) {
            TermKind::True => write!(f, "true"),
            TermKind::False => write!(f, "false"),
            TermKind::Var(name, _) => write!(f, "{}", self.names.resolve(name)),
            TermKind::IntConst(i) => write!(f, "{i}"),
            TermKind::RealConst(r) => write!(f, "{r}"),
            TermKind::Add(args) => fmt_args(f, "+", args),
            TermKind::Mul(args) => fmt_args(f, "*", args),
            TermKind::Sub(a, b) => fmt_args(f, "-", &[*a, *b]),
            TermKind::Neg(a) => fmt_args(f, "-", &[*a]),
            TermKind::Div(a, b) => fmt_args(f, "/", &[*a, *b]),
            TermKind::IntDiv(a, b) => fmt_args(f, "div", &[*a, *b]),
            TermKind::Mod(a, b) => fmt_args(f, "mod", &[*a, *b]),
            TermKind::Le(a, b) => fmt_args(f, "<=", &[*a, *b]),
            TermKind::Lt(a, b) => fmt_args(f, "<", &[*a, *b]),
            TermKind::Ge(a, b) => fmt_args(f, ">=", &[*a, *b]),
            TermKind::Gt(a, b) => fmt_args(f, ">", &[*a, *b]),
            TermKind::Eq(a, b) => fmt_args(f, "=", &[*a, *b]),
            TermKind::Distinct(args) => fmt_args(f, "distinct", args),
            TermKind::Not(a) => fmt_args(f, "not", &[*a]),
            TermKind::And(args) => fmt_args(f, "and", args),
            TermKind::Or(args) => fmt_args(f, "or", args),
            TermKind::Implies(a, b) => fmt_args(f, "=>", &[*a, *b]),
            TermKind::Ite(c, t, e) => fmt_args(f, "ite", &[*c, *t, *e]),
        }
    }
}

impl Default for TermManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Display adapter returned by [`TermManager::display`].
pub struct TermDisplay<'a> {
    tm: &'a TermManager,
    id: TermId,
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.tm.fmt_term(self.id, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_consing_shares_ids() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let s1 = tm.mk_add(vec![x, y]);
        let s2 = tm.mk_add(vec![x, y]);
        assert_eq!(s1, s2);
        let s3 = tm.mk_add(vec![y, x]);
        assert_ne!(s1, s3);
    }

    #[test]
    fn var_sorts_distinguish() {
        let mut tm = TermManager::new();
        let xi = tm.mk_var("x", tm.sorts.int_sort);
        let xr = tm.mk_var("x", tm.sorts.real_sort);
        assert_ne!(xi, xr);
        assert!(tm.is_int(xi));
        assert!(tm.is_real(xr));
    }

    #[test]
    fn extended_numerals() {
        let mut tm = TermManager::new();
        let five = tm.mk_int(5);
        let neg_five = tm.mk_neg(five);
        assert_eq!(
            tm.numeral_value(neg_five),
            Some(BigRational::from_integer(BigInt::from(-5)))
        );
        let x = tm.mk_var("x", tm.sorts.int_sort);
        assert!(tm.numeral_value(x).is_none());
    }

    #[test]
    fn mk_not_strips_double_negation() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let zero = tm.mk_int(0);
        let le = tm.mk_le(x, zero);
        let not_le = tm.mk_not(le);
        assert_eq!(tm.mk_not(not_le), le);
    }

    #[test]
    fn substitute_replaces_everywhere() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let one = tm.mk_int(1);
        let sum = tm.mk_add(vec![x, y]);
        let fml = tm.mk_le(sum, x);

        let mut map = FxHashMap::default();
        map.insert(x, one);
        let replaced = tm.substitute(fml, &map);

        let expected_sum = tm.mk_add(vec![one, y]);
        let expected = tm.mk_le(expected_sum, one);
        assert_eq!(replaced, expected);
    }

    #[test]
    fn display_sexpr() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let two = tm.mk_int(2);
        let le = tm.mk_le(x, two);
        assert_eq!(tm.display(le).to_string(), "(<= x 2)");
    }
}
