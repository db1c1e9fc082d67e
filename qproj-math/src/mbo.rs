//! Model-Based Optimization over linear arithmetic rows.
//!
//! The kernel maintains a set of variables, each with a current model
//! value and an integrality flag, and a set of rows
//! `Σ cᵢ·vᵢ + k ⟨op⟩ 0` with `op ∈ {≤, <, =, divides}` plus mod/div
//! pseudo-rows that define fresh variables. Variables are eliminated one
//! at a time, guided by the model values: an equality row is solved
//! symbolically, otherwise the model-tightest bound on the sparser side
//! becomes the pivot and every other occurrence is resolved against it.
//! Maximization pushes objective variables to their blocking bounds and
//! substitutes the bounds into the objective.
//!
//! ## Invariants
//!
//! - every live row is satisfied by the current variable values;
//! - row coefficient vectors are sorted by variable id and never contain
//!   zeros;
//! - rows over integer variables carry integer coefficients, and strict
//!   inequalities over integers are tightened to non-strict ones.
//!
//! ## References
//!
//! - Z3's `math/simplex/model_based_opt.cpp`
//! - Bjorner & Janota, "Playing with Quantified Satisfaction", LPAR-20

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::inf_eps::InfEps;

/// Kernel variable identifier.
pub type VarId = u32;

/// Comparator tag of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneqType {
    /// `Σ + k ≤ 0`.
    Le,
    /// `Σ + k < 0`.
    Lt,
    /// `Σ + k = 0`.
    Eq,
    /// Pseudo-row: the row's variable equals `(Σ + k) mod m`.
    Mod,
    /// Pseudo-row: the row's variable equals `⌊(Σ + k) / m⌋`.
    Div,
    /// `m | Σ + k`.
    Divides,
}

/// One entry of a row's coefficient vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowVar {
    /// Variable.
    pub id: VarId,
    /// Coefficient, never zero.
    pub coeff: BigRational,
}

/// A linear row.
#[derive(Debug, Clone)]
pub struct Row {
    /// Coefficient vector, sorted by variable id.
    pub vars: SmallVec<[RowVar; 4]>,
    /// Constant term.
    pub coeff: BigRational,
    /// Comparator.
    pub ty: IneqType,
    /// Modulus of mod/div/divides rows; one otherwise.
    pub modulus: BigInt,
    /// The variable defined by a mod/div pseudo-row.
    pub def_var: Option<VarId>,
}

/// A symbolic definition of an eliminated variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Def {
    /// A constant.
    Const(BigRational),
    /// A variable scaled by a coefficient.
    Var(VarId, BigRational),
    /// Sum.
    Add(Box<Def>, Box<Def>),
    /// Product.
    Mul(Box<Def>, Box<Def>),
    /// Floor division by a positive integer (exact real division for
    /// real-typed definees).
    Div(Box<Def>, BigInt),
}

/// Kernel counters.
#[derive(Debug, Clone, Default)]
pub struct MboStats {
    /// Variables eliminated by `project`.
    pub vars_eliminated: usize,
    /// Rows produced by bound resolution.
    pub rows_resolved: usize,
    /// Definitions computed.
    pub defs_computed: usize,
    /// Variables eliminated by substituting their model value.
    pub model_substitutions: usize,
    /// Objective pivots performed by `maximize`.
    pub pivots: usize,
}

#[derive(Debug, Clone)]
struct VarInfo {
    value: BigRational,
    is_int: bool,
}

/// The model-based optimization kernel.
pub struct ModelBasedOpt {
    vars: Vec<VarInfo>,
    rows: Vec<Row>,
    alive: Vec<bool>,
    objective: Option<(FxHashMap<VarId, BigRational>, BigRational)>,
    stats: MboStats,
}

impl ModelBasedOpt {
    /// Create an empty kernel.
    pub fn new() -> Self {
        Self {
            vars: Vec::new(),
            rows: Vec::new(),
            alive: Vec::new(),
            objective: None,
            stats: MboStats::default(),
        }
    }

    /// Register a variable with its model value and integrality.
    pub fn add_var(&mut self, value: BigRational, is_int: bool) -> VarId {
        let id = self.vars.len() as VarId;
        self.vars.push(VarInfo { value, is_int });
        id
    }

    /// Number of registered variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// The current value of a variable.
    pub fn get_value(&self, id: VarId) -> BigRational {
        self.vars[id as usize].value.clone()
    }

    /// Whether a variable is integer-typed.
    pub fn is_int_var(&self, id: VarId) -> bool {
        self.vars[id as usize].is_int
    }

    /// Kernel counters.
    pub fn stats(&self) -> &MboStats {
        &self.stats
    }

    /// Submit a constraint row; `ty` must be `Le`, `Lt` or `Eq`.
    pub fn add_constraint(&mut self, coeffs: &[(VarId, BigRational)], k: BigRational, ty: IneqType) {
        debug_assert!(matches!(ty, IneqType::Le | IneqType::Lt | IneqType::Eq));
        let vars = self.normalize(coeffs);
        self.push_row(vars, k, ty, BigInt::one(), None);
    }

    /// Register `(Σ + k) mod m` as a fresh variable and return it.
    pub fn add_mod(&mut self, coeffs: &[(VarId, BigRational)], k: BigRational, m: BigInt) -> VarId {
        debug_assert!(m.is_positive());
        let vars = self.normalize(coeffs);
        let body = self.row_value(&vars, &k);
        debug_assert!(body.is_integer());
        let value = body.to_integer().mod_floor(&m);
        let v = self.add_var(BigRational::from_integer(value), true);
        self.push_row(vars, k, IneqType::Mod, m, Some(v));
        v
    }

    /// Register `⌊(Σ + k) / m⌋` as a fresh variable and return it.
    pub fn add_div(&mut self, coeffs: &[(VarId, BigRational)], k: BigRational, m: BigInt) -> VarId {
        debug_assert!(m.is_positive());
        let vars = self.normalize(coeffs);
        let body = self.row_value(&vars, &k);
        debug_assert!(body.is_integer());
        let value = body.to_integer().div_floor(&m);
        let v = self.add_var(BigRational::from_integer(value), true);
        self.push_row(vars, k, IneqType::Div, m, Some(v));
        v
    }

    /// Assert `m | Σ + k`.
    pub fn add_divides(&mut self, coeffs: &[(VarId, BigRational)], k: BigRational, m: BigInt) {
        debug_assert!(m.is_positive());
        let vars = self.normalize(coeffs);
        self.push_row(vars, k, IneqType::Divides, m, None);
    }

    /// Set the objective `Σ + k` for a later `maximize` call.
    pub fn set_objective(&mut self, coeffs: &[(VarId, BigRational)], k: BigRational) {
        let mut obj: FxHashMap<VarId, BigRational> = FxHashMap::default();
        for (id, c) in coeffs {
            let entry = obj.entry(*id).or_insert_with(BigRational::zero);
            *entry += c.clone();
        }
        obj.retain(|_, c| !c.is_zero());
        self.objective = Some((obj, k));
    }

    /// The live rows, in submission order.
    pub fn get_live_rows(&self) -> Vec<Row> {
        self.rows
            .iter()
            .zip(&self.alive)
            .filter(|(_, &alive)| alive)
            .map(|(r, _)| r.clone())
            .collect()
    }

    /// Eliminate the given variables in order. With `compute_def`, each
    /// eliminated variable gets a symbolic definition whose substitution
    /// preserves satisfaction of the surviving rows under the model.
    pub fn project(&mut self, ids: &[VarId], compute_def: bool) -> Vec<Option<Def>> {
        ids.iter()
            .map(|&x| self.project_var(x, compute_def))
            .collect()
    }

    // ------------------------------------------------------------------
    // Projection
    // ------------------------------------------------------------------

    fn project_var(&mut self, x: VarId, compute_def: bool) -> Option<Def> {
        self.stats.vars_eliminated += 1;
        let occurs = self.occurrences(x);
        if occurs.is_empty() {
            return self.mk_const_def(x, compute_def);
        }
        // Occurrences inside mod/div bodies or divides rows have no
        // general resolution; freeze the variable at its model value.
        let in_pseudo = occurs.iter().any(|&i| {
            matches!(
                self.rows[i].ty,
                IneqType::Mod | IneqType::Div | IneqType::Divides
            )
        });
        if in_pseudo {
            return self.substitute_value(x, &occurs, compute_def);
        }
        if let Some(&eq_idx) = occurs
            .iter()
            .find(|&&i| self.rows[i].ty == IneqType::Eq)
        {
            return self.solve_equality(x, eq_idx, &occurs, compute_def);
        }
        self.resolve_bounds(x, &occurs, compute_def)
    }

    fn mk_const_def(&mut self, x: VarId, compute_def: bool) -> Option<Def> {
        if !compute_def {
            return None;
        }
        self.stats.defs_computed += 1;
        Some(Def::Const(self.vars[x as usize].value.clone()))
    }

    /// Fold the variable's model value into every row that mentions it.
    fn substitute_value(&mut self, x: VarId, occurs: &[usize], compute_def: bool) -> Option<Def> {
        self.stats.model_substitutions += 1;
        let value = self.vars[x as usize].value.clone();
        for &i in occurs {
            let row = &mut self.rows[i];
            if let Some(pos) = row.vars.iter().position(|rv| rv.id == x) {
                let rv = row.vars.remove(pos);
                row.coeff += &rv.coeff * &value;
            }
        }
        self.mk_const_def(x, compute_def)
    }

    /// Solve an equality row for `x` and substitute into the other rows.
    fn solve_equality(
        &mut self,
        x: VarId,
        eq_idx: usize,
        occurs: &[usize],
        compute_def: bool,
    ) -> Option<Def> {
        let eq = self.rows[eq_idx].clone();
        let a = match coeff_of(&eq, x) {
            Some(c) => c,
            None => return self.mk_const_def(x, compute_def),
        };
        let rest: SmallVec<[RowVar; 4]> = eq
            .vars
            .iter()
            .filter(|rv| rv.id != x)
            .cloned()
            .collect();

        // An integer variable with coefficient |a| > 1 forces the rest of
        // the equality to be divisible by |a|.
        let int_div = self.vars[x as usize].is_int && a.is_integer() && a.abs() > BigRational::one();
        if int_div {
            self.push_row(
                rest.clone(),
                eq.coeff.clone(),
                IneqType::Divides,
                a.abs().to_integer(),
                None,
            );
        }

        self.substitute_equality(x, eq_idx, occurs);

        if !compute_def {
            return None;
        }
        self.stats.defs_computed += 1;
        let def = if int_div {
            // x = -(rest + k) / a, exactly; expressed as a floor division
            // after flipping the sign of a negative coefficient.
            let s = -a.signum();
            Some(Def::Div(
                Box::new(linear_def(&rest, &s, &eq.coeff * &s)),
                a.abs().to_integer(),
            ))
        } else {
            let s = -a.recip();
            Some(linear_def(&rest, &s, &eq.coeff * &s))
        };
        def
    }

    /// Eliminate `x` from every row in `occurs` using the equality row
    /// `eq_idx`. Inequalities are scaled by `|a|`, so directions are kept.
    fn substitute_equality(&mut self, x: VarId, eq_idx: usize, occurs: &[usize]) {
        let eq = self.rows[eq_idx].clone();
        let a = match coeff_of(&eq, x) {
            Some(c) => c,
            None => return,
        };
        let mut resolvents = Vec::new();
        for &i in occurs {
            if i == eq_idx {
                continue;
            }
            let row = self.rows[i].clone();
            let b = match coeff_of(&row, x) {
                Some(c) => c,
                None => continue,
            };
            let lam = a.abs();
            let mu = -&b * a.signum();
            let (vars, k) = combine(&lam, &row.vars, &row.coeff, &mu, &eq.vars, &eq.coeff);
            self.stats.rows_resolved += 1;
            resolvents.push((vars, k, row.ty, row.modulus.clone(), row.def_var));
        }
        for &i in occurs {
            self.alive[i] = false;
        }
        for (vars, k, ty, modulus, def_var) in resolvents {
            if vars.is_empty() && matches!(ty, IneqType::Le | IneqType::Lt | IneqType::Eq) {
                debug_assert!(self.row_satisfied(&vars, &k, ty, &modulus));
                continue;
            }
            self.push_row(vars, k, ty, modulus, def_var);
        }
    }

    /// Eliminate `x` by model-guided bound resolution.
    fn resolve_bounds(&mut self, x: VarId, occurs: &[usize], compute_def: bool) -> Option<Def> {
        let mut lowers = Vec::new();
        let mut uppers = Vec::new();
        for &i in occurs {
            match coeff_of(&self.rows[i], x) {
                Some(c) if c.is_negative() => lowers.push(i),
                Some(_) => uppers.push(i),
                None => {}
            }
        }

        if lowers.is_empty() || uppers.is_empty() {
            // One-sided: the variable is unconstrained in one direction,
            // so every row mentioning it can be dropped.
            let def = if compute_def {
                let side = if lowers.is_empty() { &uppers } else { &lowers };
                let pivot = self.tightest(x, side, lowers.is_empty());
                let d = self.bound_def(x, pivot, None);
                self.stats.defs_computed += 1;
                Some(d)
            } else {
                None
            };
            for &i in occurs {
                self.alive[i] = false;
            }
            return def;
        }

        // Pivot on the sparser side to keep the resolvent count low; the
        // pivot row is the model-tightest bound on that side.
        let pivot_upper = uppers.len() <= lowers.len();
        let side = if pivot_upper { &uppers } else { &lowers };
        let pivot = self.tightest(x, side, pivot_upper);

        let def = if compute_def {
            let opposite = if pivot_upper { &lowers } else { &uppers };
            let opp_pivot = self.tightest(x, opposite, !pivot_upper);
            let d = self.bound_def(x, pivot, Some(opp_pivot));
            self.stats.defs_computed += 1;
            Some(d)
        } else {
            None
        };

        self.eliminate_with_pivot(x, pivot, occurs);
        def
    }

    /// The model-tightest bound row for `x` on one side: the minimal
    /// bound among uppers, the maximal among lowers. Non-strict rows win
    /// ties.
    fn tightest(&self, x: VarId, side: &[usize], upper: bool) -> usize {
        let mut best = side[0];
        let mut best_bound = self.bound_value(best, x);
        let mut best_strict = self.rows[best].ty == IneqType::Lt;
        for &i in &side[1..] {
            let bound = self.bound_value(i, x);
            let strict = self.rows[i].ty == IneqType::Lt;
            let better = if upper {
                bound < best_bound
            } else {
                bound > best_bound
            };
            if better || (bound == best_bound && best_strict && !strict) {
                best = i;
                best_bound = bound;
                best_strict = strict;
            }
        }
        best
    }

    /// The bound `-(Σ_{v≠x} + k) / c` that row `i` places on `x`.
    fn bound_value(&self, i: usize, x: VarId) -> BigRational {
        self.bound_from_row(&self.rows[i], x)
    }

    fn bound_from_row(&self, row: &Row, x: VarId) -> BigRational {
        let c = match coeff_of(row, x) {
            Some(c) => c,
            None => return BigRational::zero(),
        };
        let rest = self.row_value(&row.vars, &row.coeff) - &c * &self.vars[x as usize].value;
        -rest / c
    }

    /// A definition for `x` from its pivot bound row. `opposite` is the
    /// tightest bound on the other side, used for strict real pivots.
    fn bound_def(&self, x: VarId, pivot: usize, opposite: Option<usize>) -> Def {
        let row = &self.rows[pivot];
        let c = match coeff_of(row, x) {
            Some(c) => c,
            None => return Def::Const(self.vars[x as usize].value.clone()),
        };
        let rest: SmallVec<[RowVar; 4]> = row
            .vars
            .iter()
            .filter(|rv| rv.id != x)
            .cloned()
            .collect();
        let is_upper = c.is_positive();
        let strict = row.ty == IneqType::Lt;
        let is_int_x = self.vars[x as usize].is_int;

        if is_int_x && self.all_int(&row.vars) {
            // Strict all-integer rows were tightened at submission.
            debug_assert!(!strict);
            let a = c.abs().to_integer();
            if a.is_one() {
                // x = ∓(rest + k)
                let s = -c.signum();
                return linear_def(&rest, &s, &row.coeff * &s);
            }
            return if is_upper {
                // x ≤ -(rest+k)/a: floor.
                Def::Div(
                    Box::new(linear_def(
                        &rest,
                        &-BigRational::one(),
                        -row.coeff.clone(),
                    )),
                    a,
                )
            } else {
                // x ≥ (rest+k)/a: ceiling.
                Def::Div(
                    Box::new(linear_def(
                        &rest,
                        &BigRational::one(),
                        &row.coeff + BigRational::from_integer(&a - BigInt::one()),
                    )),
                    a,
                )
            };
        }

        // Real-typed (or mixed) pivot: the bound expression itself, or the
        // midpoint of the two tightest bounds when the pivot is strict.
        let s = -c.recip();
        let base = linear_def(&rest, &s, &row.coeff * &s);
        if !strict {
            return base;
        }
        match opposite {
            Some(o) => {
                let orow = &self.rows[o];
                let oc = match coeff_of(orow, x) {
                    Some(c) => c,
                    None => return base,
                };
                let orest: SmallVec<[RowVar; 4]> = orow
                    .vars
                    .iter()
                    .filter(|rv| rv.id != x)
                    .cloned()
                    .collect();
                let os = -oc.recip();
                let obase = linear_def(&orest, &os, &orow.coeff * &os);
                Def::Div(
                    Box::new(Def::Add(Box::new(base), Box::new(obase))),
                    BigInt::from(2),
                )
            }
            None => {
                let shift = if is_upper {
                    -BigRational::one()
                } else {
                    BigRational::one()
                };
                Def::Add(Box::new(base), Box::new(Def::Const(shift)))
            }
        }
    }

    /// Resolve every row in `occurs` against the pivot bound row:
    /// opposite sides combine Fourier-Motzkin style, same-side rows turn
    /// into dominance constraints stating that the pivot bound is the
    /// tighter one.
    fn eliminate_with_pivot(&mut self, x: VarId, pivot: usize, occurs: &[usize]) {
        let prow = self.rows[pivot].clone();
        let p = match coeff_of(&prow, x) {
            Some(c) => c,
            None => return,
        };
        let mut resolvents = Vec::new();
        for &i in occurs {
            if i == pivot {
                continue;
            }
            let row = self.rows[i].clone();
            let b = match coeff_of(&row, x) {
                Some(c) => c,
                None => continue,
            };
            let (vars, k, ty) = if b.is_negative() != p.is_negative() {
                let (vars, k) =
                    combine(&b.abs(), &prow.vars, &prow.coeff, &p.abs(), &row.vars, &row.coeff);
                let ty = if prow.ty == IneqType::Lt || row.ty == IneqType::Lt {
                    IneqType::Lt
                } else {
                    IneqType::Le
                };
                (vars, k, ty)
            } else {
                let (vars, k) = combine(
                    &p.abs(),
                    &row.vars,
                    &row.coeff,
                    &-b.abs(),
                    &prow.vars,
                    &prow.coeff,
                );
                let ty = if row.ty == IneqType::Lt && prow.ty == IneqType::Le {
                    IneqType::Lt
                } else {
                    IneqType::Le
                };
                (vars, k, ty)
            };
            self.stats.rows_resolved += 1;
            resolvents.push((vars, k, ty));
        }
        for &i in occurs {
            self.alive[i] = false;
        }
        for (vars, k, ty) in resolvents {
            if vars.is_empty() {
                debug_assert!(self.row_satisfied(&vars, &k, ty, &BigInt::one()));
                continue;
            }
            self.push_row(vars, k, ty, BigInt::one(), None);
        }
    }

    // ------------------------------------------------------------------
    // Maximization
    // ------------------------------------------------------------------

    /// Maximize the objective set by `set_objective` subject to the
    /// current rows. Variable values are pushed to the bounds realizing
    /// the optimum, so `get_value` afterwards reads an optimal assignment.
    pub fn maximize(&mut self) -> InfEps {
        let (mut obj, mut constant) = match self.objective.take() {
            Some(o) => o,
            None => return InfEps::finite(BigRational::zero()),
        };
        let mut eps = BigRational::zero();
        // Pivot trail: replayed in reverse afterwards so that every
        // substituted-away variable ends up at its bound under the final
        // values of the variables it was substituted by.
        let mut trail: Vec<(VarId, Row)> = Vec::new();

        loop {
            let x = match obj.iter().find(|(_, c)| !c.is_zero()) {
                Some((&x, _)) => x,
                None => break,
            };
            let c = match obj.remove(&x) {
                Some(c) => c,
                None => break,
            };
            let occurs = self.occurrences(x);

            let mut blocking: Vec<usize> = Vec::new();
            let mut eq_block: Option<usize> = None;
            let mut congruent = false;
            for &i in &occurs {
                match self.rows[i].ty {
                    IneqType::Eq => {
                        eq_block.get_or_insert(i);
                    }
                    IneqType::Le | IneqType::Lt => {
                        if let Some(rc) = coeff_of(&self.rows[i], x) {
                            if rc.is_positive() == c.is_positive() {
                                blocking.push(i);
                            }
                        }
                    }
                    IneqType::Mod | IneqType::Div | IneqType::Divides => congruent = true,
                }
            }

            if congruent {
                // Congruence-constrained objective variables stay at
                // their model value.
                constant += &c * &self.vars[x as usize].value;
                continue;
            }

            let pivot = match eq_block {
                Some(i) => i,
                None => {
                    if blocking.is_empty() {
                        return InfEps::infinite();
                    }
                    self.tightest(x, &blocking, c.is_positive())
                }
            };
            self.stats.pivots += 1;

            let prow = self.rows[pivot].clone();
            let p = match coeff_of(&prow, x) {
                Some(c) => c,
                None => continue,
            };

            // Substitute x = -(rest + k)/p into the objective.
            let scale = -&c / &p;
            for rv in &prow.vars {
                if rv.id == x {
                    continue;
                }
                let entry = obj.entry(rv.id).or_insert_with(BigRational::zero);
                *entry += &scale * &rv.coeff;
            }
            constant += &scale * &prow.coeff;
            if prow.ty == IneqType::Lt {
                eps -= c.abs();
            }

            // Eliminate the variable; its value is set when the trail is
            // replayed below.
            trail.push((x, prow.clone()));
            if prow.ty == IneqType::Eq {
                self.substitute_equality(x, pivot, &occurs);
            } else {
                self.eliminate_with_pivot(x, pivot, &occurs);
            }
        }

        for (x, row) in trail.iter().rev() {
            let value = self.bound_from_row(row, *x);
            self.vars[*x as usize].value = value;
        }

        InfEps::finite_with_eps(constant, eps)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn occurrences(&self, x: VarId) -> Vec<usize> {
        (0..self.rows.len())
            .filter(|&i| self.alive[i] && coeff_of(&self.rows[i], x).is_some())
            .collect()
    }

    fn normalize(&self, coeffs: &[(VarId, BigRational)]) -> SmallVec<[RowVar; 4]> {
        let mut acc: FxHashMap<VarId, BigRational> = FxHashMap::default();
        for (id, c) in coeffs {
            let entry = acc.entry(*id).or_insert_with(BigRational::zero);
            *entry += c.clone();
        }
        let mut vars: SmallVec<[RowVar; 4]> = acc
            .into_iter()
            .filter(|(_, c)| !c.is_zero())
            .map(|(id, coeff)| RowVar { id, coeff })
            .collect();
        vars.sort_unstable_by_key(|rv| rv.id);
        vars
    }

    fn all_int(&self, vars: &[RowVar]) -> bool {
        vars.iter().all(|rv| self.vars[rv.id as usize].is_int)
    }

    fn row_value(&self, vars: &[RowVar], k: &BigRational) -> BigRational {
        let mut value = k.clone();
        for rv in vars {
            value += &rv.coeff * &self.vars[rv.id as usize].value;
        }
        value
    }

    fn row_satisfied(
        &self,
        vars: &[RowVar],
        k: &BigRational,
        ty: IneqType,
        modulus: &BigInt,
    ) -> bool {
        let value = self.row_value(vars, k);
        match ty {
            IneqType::Le => !value.is_positive(),
            IneqType::Lt => value.is_negative(),
            IneqType::Eq => value.is_zero(),
            IneqType::Divides => {
                value.is_integer() && value.to_integer().mod_floor(modulus).is_zero()
            }
            // Pseudo-rows define fresh variables and hold by construction.
            IneqType::Mod | IneqType::Div => true,
        }
    }

    fn push_row(
        &mut self,
        mut vars: SmallVec<[RowVar; 4]>,
        mut k: BigRational,
        mut ty: IneqType,
        modulus: BigInt,
        def_var: Option<VarId>,
    ) {
        if matches!(ty, IneqType::Le | IneqType::Lt | IneqType::Eq) && self.all_int(&vars) {
            let mut scale = BigInt::one();
            for rv in &vars {
                scale = scale.lcm(rv.coeff.denom());
            }
            scale = scale.lcm(k.denom());
            if !scale.is_one() {
                let scale = BigRational::from_integer(scale);
                for rv in &mut vars {
                    rv.coeff = &rv.coeff * &scale;
                }
                k = &k * &scale;
            }
            if ty == IneqType::Lt {
                // Over integers `Σ + k < 0` is `Σ + k + 1 ≤ 0`.
                k += BigRational::one();
                ty = IneqType::Le;
            }
        }
        debug_assert!(self.row_satisfied(&vars, &k, ty, &modulus));
        self.rows.push(Row {
            vars,
            coeff: k,
            ty,
            modulus,
            def_var,
        });
        self.alive.push(true);
    }
}

impl Default for ModelBasedOpt {
    fn default() -> Self {
        Self::new()
    }
}

fn coeff_of(row: &Row, x: VarId) -> Option<BigRational> {
    row.vars
        .iter()
        .find(|rv| rv.id == x)
        .map(|rv| rv.coeff.clone())
}

/// `λ·a + μ·b` over coefficient vectors and constants.
fn combine(
    lam: &BigRational,
    a_vars: &[RowVar],
    a_k: &BigRational,
    mu: &BigRational,
    b_vars: &[RowVar],
    b_k: &BigRational,
) -> (SmallVec<[RowVar; 4]>, BigRational) {
    let mut acc: FxHashMap<VarId, BigRational> = FxHashMap::default();
    for rv in a_vars {
        let entry = acc.entry(rv.id).or_insert_with(BigRational::zero);
        *entry += lam * &rv.coeff;
    }
    for rv in b_vars {
        let entry = acc.entry(rv.id).or_insert_with(BigRational::zero);
        *entry += mu * &rv.coeff;
    }
    let mut vars: SmallVec<[RowVar; 4]> = acc
        .into_iter()
        .filter(|(_, c)| !c.is_zero())
        .map(|(id, coeff)| RowVar { id, coeff })
        .collect();
    vars.sort_unstable_by_key(|rv| rv.id);
    (vars, lam * a_k + mu * b_k)
}

/// The linear combination `Σ scale·cᵢ·vᵢ + k` as a definition tree.
fn linear_def(vars: &[RowVar], scale: &BigRational, k: BigRational) -> Def {
    let mut acc: Option<Def> = None;
    for rv in vars {
        let c = scale * &rv.coeff;
        if c.is_zero() {
            continue;
        }
        let term = Def::Var(rv.id, c);
        acc = Some(match acc {
            Some(prev) => Def::Add(Box::new(prev), Box::new(term)),
            None => term,
        });
    }
    match acc {
        None => Def::Const(k),
        Some(d) if k.is_zero() => d,
        Some(d) => Def::Add(Box::new(d), Box::new(Def::Const(k))),
    }
}
