//! Arithmetic model-based projection.
//!
//! Extracts linear inequalities from literals into the model-based
//! optimization kernel, using the guiding model to choose values for
//! conditionals and to prime the kernel with the current interpretation
//! of subterms that are treated as variables. Non-linear subterms are
//! abstracted as fresh kernel variables; literals that cannot be reduced
//! to linear form stay in the residue verbatim and pin the variables they
//! mention.
//!
//! ## Algorithm
//!
//! 1. **Linearization**: each literal becomes a row `Σ cᵢ·vᵢ + k ⟨op⟩ 0`
//!    with `op ∈ {≤, <, =}`; conjunctions, disjunctions and conditionals
//!    are split with model-guided branch selection.
//! 2. **Purity analysis**: abstracted subterms that survive into the
//!    residue pin every variable occurring inside them.
//! 3. **Kernel projection**: the remaining variables are eliminated row
//!    by row; surviving rows are reified back into literals, mod/div
//!    pseudo-rows are expanded by reference.
//! 4. **Definitions**: optionally each eliminated variable receives a
//!    ground definition; substituting the definitions in reverse order
//!    must keep the residue true under the model.
//!
//! ## References
//!
//! - Z3's `qe/mbp/mbp_arith.cpp`
//! - Bjorner & Janota, "Playing with Quantified Satisfaction", LPAR-20

use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rustc_hash::{FxHashMap, FxHashSet};

use qproj_core::ast::{traversal, TermId, TermKind, TermManager};
use qproj_core::error::{QprojError, Result};
use qproj_core::model::{Model, Value};
use qproj_core::resource::CancelFlag;
use qproj_math::{Def, IneqType, InfEps, ModelBasedOpt, Row, VarId};

/// Configuration of the projection plugin.
#[derive(Debug, Clone)]
pub struct ArithMbpConfig {
    /// Pin every variable that occurs in a surviving residue literal or
    /// in an impure abstracted subterm (the conservative default).
    pub check_purified: bool,
    /// Substitute computed definitions back into the residue and verify
    /// that every formula stays true under the model.
    pub apply_projection: bool,
}

impl Default for ArithMbpConfig {
    fn default() -> Self {
        Self {
            check_purified: true,
            apply_projection: false,
        }
    }
}

/// Projection counters.
#[derive(Debug, Clone, Default)]
pub struct ArithMbpStats {
    /// Literals turned into kernel rows.
    pub lits_linearized: usize,
    /// Literals kept verbatim in the residue.
    pub lits_retained: usize,
    /// Variables eliminated.
    pub vars_eliminated: usize,
    /// Variables retained by purity analysis.
    pub vars_retained: usize,
    /// Kernel rows reified back into literals.
    pub rows_reified: usize,
    /// Definitions produced.
    pub defs_produced: usize,
}

/// A definition of an eliminated variable: a ground term whose
/// substitution for the variable preserves truth of the residue under
/// the guiding model.
#[derive(Debug, Clone)]
pub struct Definition {
    /// The eliminated variable.
    pub var: TermId,
    /// The defining term.
    pub term: TermId,
}

/// Coefficient accumulator: `Σ cᵢ·tᵢ` keyed by term identity.
type Coeffs = FxHashMap<TermId, BigRational>;

fn insert_mul(ts: &mut Coeffs, t: TermId, c: &BigRational) {
    let entry = ts.entry(t).or_insert_with(BigRational::zero);
    *entry += c.clone();
}

/// The arithmetic projection plugin.
pub struct ArithProjector {
    config: ArithMbpConfig,
    stats: ArithMbpStats,
    cancel: CancelFlag,
}

impl ArithProjector {
    /// Create a projector with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ArithMbpConfig::default())
    }

    /// Create a projector with an explicit configuration.
    pub fn with_config(config: ArithMbpConfig) -> Self {
        Self {
            config,
            stats: ArithMbpStats::default(),
            cancel: CancelFlag::new(),
        }
    }

    /// Toggle the purity check.
    pub fn set_check_purified(&mut self, on: bool) {
        self.config.check_purified = on;
    }

    /// Toggle definition substitution into the residue.
    pub fn set_apply_projection(&mut self, on: bool) {
        self.config.apply_projection = on;
    }

    /// Install a cancellation flag polled during projection.
    pub fn set_cancel_flag(&mut self, flag: CancelFlag) {
        self.cancel = flag;
    }

    /// Projection counters.
    pub fn stats(&self) -> &ArithMbpStats {
        &self.stats
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Eliminate the single variable `var` from `lits`. Fails (returns
    /// `Ok(false)`) when the variable cannot be eliminated.
    pub fn project1(
        &mut self,
        tm: &mut TermManager,
        model: &mut Model,
        var: TermId,
        lits: &mut Vec<TermId>,
    ) -> Result<bool> {
        let mut vars = vec![var];
        let ok = self.project_core(tm, model, &mut vars, lits, None)?;
        Ok(ok && vars.is_empty())
    }

    /// Eliminate every eligible arithmetic variable of `vars` from
    /// `lits`. `vars` is shrunk to the retained subset and `lits` is
    /// replaced by the residue.
    pub fn project(
        &mut self,
        tm: &mut TermManager,
        model: &mut Model,
        vars: &mut Vec<TermId>,
        lits: &mut Vec<TermId>,
    ) -> Result<bool> {
        self.project_core(tm, model, vars, lits, None)
    }

    /// As [`project`](Self::project), and additionally produce one
    /// definition per eliminated variable, in elimination order.
    pub fn project_with_defs(
        &mut self,
        tm: &mut TermManager,
        model: &mut Model,
        vars: &mut Vec<TermId>,
        lits: &mut Vec<TermId>,
        defs: &mut Vec<Definition>,
    ) -> Result<bool> {
        self.project_core(tm, model, vars, lits, Some(defs))
    }

    fn project_core(
        &mut self,
        tm: &mut TermManager,
        model: &mut Model,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        mut defs_out: Option<&mut Vec<Definition>>,
    ) -> Result<bool> {
        if !vars.iter().any(|&v| tm.is_arith(v)) {
            return Ok(true);
        }
        model.set_completion(true);
        let compute_def = defs_out.is_some() || self.config.apply_projection;

        let mut mbo = ModelBasedOpt::new();
        let mut tids: FxHashMap<TermId, VarId> = FxHashMap::default();

        // Linearize the input literals. Splitting pushes fresh literals
        // onto the end of the queue; literals that resist linearization
        // are compacted into the front as the residue.
        let mut kept = 0;
        let mut i = 0;
        while i < fmls.len() {
            if self.cancel.is_canceled() {
                return Ok(false);
            }
            let fml = fmls[i];
            if self.linearize_lit(tm, model, &mut mbo, fml, fmls, &mut tids)? {
                self.stats.lits_linearized += 1;
            } else {
                tracing::trace!(lit = %tm.display(fml), "could not linearize");
                fmls[kept] = fml;
                kept += 1;
                self.stats.lits_retained += 1;
            }
            i += 1;
        }
        fmls.truncate(kept);

        // Prime the kernel with the to-be-eliminated variables.
        for idx in 0..vars.len() {
            if self.cancel.is_canceled() {
                return Ok(false);
            }
            let v = vars[idx];
            if tm.is_arith(v) && !tids.contains_key(&v) {
                let value = model.eval_rational(tm, v)?;
                let id = mbo.add_var(value, tm.is_int(v));
                tids.insert(v, id);
            }
        }

        // Purity analysis: impure abstractions poison every variable they
        // contain; with the purity check enabled, so does the residue.
        let var_mark: FxHashSet<TermId> = vars.iter().copied().collect();
        let mut fmls_mark: FxHashSet<TermId> = FxHashSet::default();
        for &e in tids.keys() {
            if tm.is_arith(e) && !is_pure(tm, e) && !var_mark.contains(&e) {
                traversal::collect_subterms(tm, e, &mut fmls_mark);
            }
        }
        if self.config.check_purified {
            for &fml in fmls.iter() {
                traversal::collect_subterms(tm, fml, &mut fmls_mark);
            }
            for &e in tids.keys() {
                if !var_mark.contains(&e) && !is_pure(tm, e) {
                    traversal::collect_subterms(tm, e, &mut fmls_mark);
                }
            }
        }

        let mut index2expr: Vec<Option<TermId>> = vec![None; mbo.num_vars()];
        for (&e, &id) in &tids {
            index2expr[id as usize] = Some(e);
        }

        // Split vars into the eliminable and the retained.
        let mut real_vars: Vec<VarId> = Vec::new();
        let mut eliminated: Vec<TermId> = Vec::new();
        let mut kept = 0;
        for idx in 0..vars.len() {
            let v = vars[idx];
            match tids.get(&v) {
                Some(&id) if tm.is_arith(v) && !fmls_mark.contains(&v) => {
                    real_vars.push(id);
                    eliminated.push(v);
                }
                _ => {
                    vars[kept] = v;
                    kept += 1;
                }
            }
        }
        vars.truncate(kept);
        self.stats.vars_eliminated += real_vars.len();
        self.stats.vars_retained += vars.len();
        tracing::debug!(
            eliminated = real_vars.len(),
            retained = vars.len(),
            "arith mbp"
        );

        let defs = mbo.project(&real_vars, compute_def);

        // Read back the surviving rows; mod/div pseudo-rows are consumed
        // by reference only.
        let rows = mbo.get_live_rows();
        let mut def_rows: FxHashMap<VarId, Row> = FxHashMap::default();
        for r in &rows {
            if matches!(r.ty, IneqType::Mod | IneqType::Div) {
                if let Some(id) = r.def_var {
                    def_rows.insert(id, r.clone());
                }
            }
        }
        self.rows2fmls(tm, &def_rows, &rows, &index2expr, fmls)?;

        let mut result: Vec<Definition> = Vec::new();
        if compute_def {
            for (idx, d) in defs.iter().enumerate() {
                let d = match d {
                    Some(d) => d,
                    None => continue,
                };
                let var = eliminated[idx];
                let is_int = tm.is_int(var);
                let term = self.def2expr(tm, &def_rows, d, is_int, &index2expr)?;
                result.push(Definition { var, term });
            }
            self.stats.defs_produced += result.len();
        }
        if self.config.apply_projection && !self.apply_projection(tm, model, &result, fmls)? {
            return Ok(false);
        }
        if let Some(out) = defs_out.as_mut() {
            out.append(&mut result);
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Literal linearization
    // ------------------------------------------------------------------

    /// Extract linear constraints from `lit` into the kernel. Returns
    /// `Ok(false)` when the literal must stay in the residue verbatim.
    fn linearize_lit(
        &mut self,
        tm: &mut TermManager,
        model: &mut Model,
        mbo: &mut ModelBasedOpt,
        lit: TermId,
        fmls: &mut Vec<TermId>,
        tids: &mut FxHashMap<TermId, VarId>,
    ) -> Result<bool> {
        if self.cancel.is_canceled() {
            return Ok(false);
        }
        let mut ts: Coeffs = Coeffs::default();
        let mut c = BigRational::zero();
        let mut mul = BigRational::one();

        let (lit, is_not) = match tm.kind(lit) {
            TermKind::Not(inner) => (*inner, true),
            _ => (lit, false),
        };
        if is_not {
            mul = -mul;
        }

        let ty: IneqType;
        match tm.kind(lit).clone() {
            TermKind::Le(e1, e2) => {
                self.linearize_term(tm, model, mbo, &mul, e1, &mut c, fmls, &mut ts, tids)?;
                self.linearize_term(tm, model, mbo, &-&mul, e2, &mut c, fmls, &mut ts, tids)?;
                ty = if is_not { IneqType::Lt } else { IneqType::Le };
            }
            TermKind::Ge(e1, e2) => {
                self.linearize_term(tm, model, mbo, &mul, e2, &mut c, fmls, &mut ts, tids)?;
                self.linearize_term(tm, model, mbo, &-&mul, e1, &mut c, fmls, &mut ts, tids)?;
                ty = if is_not { IneqType::Lt } else { IneqType::Le };
            }
            TermKind::Lt(e1, e2) => {
                self.linearize_term(tm, model, mbo, &mul, e1, &mut c, fmls, &mut ts, tids)?;
                self.linearize_term(tm, model, mbo, &-&mul, e2, &mut c, fmls, &mut ts, tids)?;
                ty = if is_not { IneqType::Le } else { IneqType::Lt };
            }
            TermKind::Gt(e1, e2) => {
                self.linearize_term(tm, model, mbo, &mul, e2, &mut c, fmls, &mut ts, tids)?;
                self.linearize_term(tm, model, mbo, &-&mul, e1, &mut c, fmls, &mut ts, tids)?;
                ty = if is_not { IneqType::Le } else { IneqType::Lt };
            }
            TermKind::Eq(e1, e2) if !is_not && tm.is_arith(e1) => {
                self.linearize_term(tm, model, mbo, &mul, e1, &mut c, fmls, &mut ts, tids)?;
                self.linearize_term(tm, model, mbo, &-&mul, e2, &mut c, fmls, &mut ts, tids)?;
                ty = IneqType::Eq;
            }
            TermKind::Eq(e1, e2) if is_not && tm.is_arith(e1) => {
                let r1 = model.eval_rational(tm, e1)?;
                let r2 = model.eval_rational(tm, e2)?;
                if r1 == r2 {
                    return Err(QprojError::Internal(format!(
                        "model does not satisfy disequality `{}`",
                        tm.display(lit)
                    )));
                }
                // Orient so that the larger side comes first.
                let (e1, e2) = if r1 < r2 { (e2, e1) } else { (e1, e2) };
                ty = IneqType::Lt;
                self.linearize_term(tm, model, mbo, &mul, e1, &mut c, fmls, &mut ts, tids)?;
                self.linearize_term(tm, model, mbo, &-&mul, e2, &mut c, fmls, &mut ts, tids)?;
            }
            TermKind::Distinct(args)
                if !is_not && args.first().is_some_and(|&a| tm.is_arith(a)) =>
            {
                // Sort by model value and chain strict inequalities over
                // adjacent elements.
                let mut nums: Vec<(TermId, BigRational)> = Vec::with_capacity(args.len());
                for &arg in &args {
                    nums.push((arg, model.eval_rational(tm, arg)?));
                }
                nums.sort_by(|a, b| a.1.cmp(&b.1));
                for pair in nums.windows(2) {
                    if pair[0].1 == pair[1].1 {
                        return Err(QprojError::Internal(format!(
                            "model does not satisfy `{}`",
                            tm.display(lit)
                        )));
                    }
                    let fml = tm.mk_lt(pair[0].0, pair[1].0);
                    if !self.linearize_lit(tm, model, mbo, fml, fmls, tids)? {
                        return Ok(false);
                    }
                }
                return Ok(true);
            }
            TermKind::Distinct(args)
                if is_not && args.first().is_some_and(|&a| tm.is_arith(a)) =>
            {
                // Find two arguments with equal model value and linearize
                // their equality.
                let mut values: Vec<(BigRational, TermId)> = Vec::with_capacity(args.len());
                let mut found: Option<(TermId, TermId)> = None;
                for &arg in &args {
                    let r = model.eval_rational(tm, arg)?;
                    if let Some((_, prev)) = values.iter().find(|(v, _)| *v == r) {
                        found = Some((arg, *prev));
                        break;
                    }
                    values.push((r, arg));
                }
                let (a1, a2) = found.ok_or_else(|| {
                    QprojError::Internal(format!(
                        "model does not satisfy `{}`",
                        tm.display(lit)
                    ))
                })?;
                ty = IneqType::Eq;
                self.linearize_term(tm, model, mbo, &mul, a1, &mut c, fmls, &mut ts, tids)?;
                self.linearize_term(tm, model, mbo, &-&mul, a2, &mut c, fmls, &mut ts, tids)?;
            }
            TermKind::And(args) if !is_not => {
                fmls.extend(args);
                return Ok(true);
            }
            TermKind::Or(args) if is_not => {
                for a in args {
                    let na = tm.mk_not(a);
                    fmls.push(na);
                }
                return Ok(true);
            }
            TermKind::Or(args) if !is_not => {
                for a in args {
                    if model.is_true(tm, a)? {
                        fmls.push(a);
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            TermKind::And(args) if is_not => {
                for a in args {
                    if !model.eval_bool(tm, a)? {
                        let na = tm.mk_not(a);
                        fmls.push(na);
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            TermKind::Ite(g, f1, f2) if tm.sort_of(f1) == tm.sorts.bool_sort => {
                // Model-guided branch selection, like disjunctions.
                let branch = if model.eval_bool(tm, g)? {
                    fmls.push(g);
                    f1
                } else {
                    let ng = tm.mk_not(g);
                    fmls.push(ng);
                    f2
                };
                let branch = if is_not { tm.mk_not(branch) } else { branch };
                fmls.push(branch);
                return Ok(true);
            }
            _ => {
                return Ok(false);
            }
        }

        let coeffs = self.extract_coeffs(tm, model, mbo, &ts, tids)?;
        mbo.add_constraint(&coeffs, c, ty);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Term linearization
    // ------------------------------------------------------------------

    /// Accumulate `mul · t` into the coefficient map `ts` and the scalar
    /// `c`. Side literals (conditional guards) go to `fmls`.
    #[allow(clippy::too_many_arguments)]
    fn linearize_term(
        &mut self,
        tm: &mut TermManager,
        model: &mut Model,
        mbo: &mut ModelBasedOpt,
        mul: &BigRational,
        t: TermId,
        c: &mut BigRational,
        fmls: &mut Vec<TermId>,
        ts: &mut Coeffs,
        tids: &mut FxHashMap<TermId, VarId>,
    ) -> Result<()> {
        if tids.contains_key(&t) {
            insert_mul(ts, t, mul);
            return Ok(());
        }
        match tm.kind(t).clone() {
            TermKind::Mul(args) => {
                // Fold numeral factors; a single remaining factor keeps
                // the product linear, anything else is abstracted.
                let mut k = BigRational::one();
                let mut rest = Vec::new();
                for a in args {
                    match tm.numeral_value(a) {
                        Some(v) => k *= v,
                        None => rest.push(a),
                    }
                }
                match rest.len() {
                    0 => *c += mul * k,
                    1 => {
                        let mul = mul * k;
                        self.linearize_term(tm, model, mbo, &mul, rest[0], c, fmls, ts, tids)?;
                    }
                    _ => insert_mul(ts, t, mul),
                }
            }
            TermKind::Neg(u) => {
                self.linearize_term(tm, model, mbo, &-mul, u, c, fmls, ts, tids)?;
            }
            TermKind::IntConst(_) | TermKind::RealConst(_) => {
                // numeral_value is total for these kinds
                if let Some(v) = tm.numeral_value(t) {
                    *c += mul * v;
                }
            }
            TermKind::Add(args) => {
                for a in args {
                    self.linearize_term(tm, model, mbo, mul, a, c, fmls, ts, tids)?;
                }
            }
            TermKind::Sub(a, b) => {
                self.linearize_term(tm, model, mbo, mul, a, c, fmls, ts, tids)?;
                self.linearize_term(tm, model, mbo, &-mul, b, c, fmls, ts, tids)?;
            }
            TermKind::Ite(g, a, b) => match model.eval(tm, g)? {
                Value::Bool(true) => {
                    self.linearize_term(tm, model, mbo, mul, a, c, fmls, ts, tids)?;
                    fmls.push(g);
                }
                Value::Bool(false) => {
                    let ng = tm.mk_not(g);
                    fmls.push(ng);
                    self.linearize_term(tm, model, mbo, mul, b, c, fmls, ts, tids)?;
                }
                Value::Rational(_) => {
                    return Err(QprojError::Evaluation {
                        expected: "truth",
                        term: tm.display(g).to_string(),
                    });
                }
            },
            TermKind::Mod(u, m) if positive_int_numeral(tm, m).is_some() => {
                let m = match positive_int_numeral(tm, m) {
                    Some(m) => m,
                    None => unreachable!("guarded by the match arm"),
                };
                let (coeffs, c0) = self.linearize_body(tm, model, mbo, u, fmls, tids)?;
                let v = mbo.add_mod(&coeffs, c0, m);
                tids.insert(t, v);
                insert_mul(ts, t, mul);
            }
            TermKind::IntDiv(u, m) if positive_int_numeral(tm, m).is_some() => {
                let m = match positive_int_numeral(tm, m) {
                    Some(m) => m,
                    None => unreachable!("guarded by the match arm"),
                };
                let (coeffs, c0) = self.linearize_body(tm, model, mbo, u, fmls, tids)?;
                let v = mbo.add_div(&coeffs, c0, m);
                tids.insert(t, v);
                insert_mul(ts, t, mul);
            }
            _ => {
                // Opaque: abstract the whole subterm.
                insert_mul(ts, t, mul);
            }
        }
        Ok(())
    }

    /// Linearize the body of a mod/div term into a fresh accumulator and
    /// return its kernel coefficients.
    fn linearize_body(
        &mut self,
        tm: &mut TermManager,
        model: &mut Model,
        mbo: &mut ModelBasedOpt,
        u: TermId,
        fmls: &mut Vec<TermId>,
        tids: &mut FxHashMap<TermId, VarId>,
    ) -> Result<(Vec<(VarId, BigRational)>, BigRational)> {
        let mut ts0 = Coeffs::default();
        let mut c0 = BigRational::zero();
        let one = BigRational::one();
        self.linearize_term(tm, model, mbo, &one, u, &mut c0, fmls, &mut ts0, tids)?;
        let coeffs = self.extract_coeffs(tm, model, mbo, &ts0, tids)?;
        Ok((coeffs, c0))
    }

    /// Convert the accumulator into kernel coefficients, allocating
    /// kernel variables (primed with their model value) for unseen terms.
    fn extract_coeffs(
        &mut self,
        tm: &mut TermManager,
        model: &mut Model,
        mbo: &mut ModelBasedOpt,
        ts: &Coeffs,
        tids: &mut FxHashMap<TermId, VarId>,
    ) -> Result<Vec<(VarId, BigRational)>> {
        let mut coeffs = Vec::with_capacity(ts.len());
        for (&e, coeff) in ts {
            let id = match tids.get(&e) {
                Some(&id) => id,
                None => {
                    let value = model.eval_rational(tm, e)?;
                    let id = mbo.add_var(value, tm.is_int(e));
                    tids.insert(e, id);
                    id
                }
            };
            if !coeff.is_zero() {
                coeffs.push((id, coeff.clone()));
            }
        }
        Ok(coeffs)
    }

    // ------------------------------------------------------------------
    // Reification
    // ------------------------------------------------------------------

    /// Append the surviving rows to `fmls` as literals.
    fn rows2fmls(
        &mut self,
        tm: &mut TermManager,
        def_rows: &FxHashMap<VarId, Row>,
        rows: &[Row],
        index2expr: &[Option<TermId>],
        fmls: &mut Vec<TermId>,
    ) -> Result<()> {
        for r in rows {
            if r.vars.is_empty() {
                continue;
            }
            if matches!(r.ty, IneqType::Mod | IneqType::Div) {
                continue;
            }

            // A single variable with a negative coefficient flips to the
            // other side, so bounds read with a positive leading
            // coefficient.
            if r.vars.len() == 1
                && r.vars[0].coeff.is_negative()
                && matches!(r.ty, IneqType::Le | IneqType::Lt | IneqType::Eq)
            {
                let v = &r.vars[0];
                let mut t = self.id2expr(tm, def_rows, index2expr, v.id)?;
                let minus_one = -BigRational::one();
                if v.coeff != minus_one {
                    let is_int = tm.is_int(t);
                    let k = tm.mk_numeral(&-v.coeff.clone(), is_int);
                    t = tm.mk_mul(vec![k, t]);
                }
                let is_int = tm.is_int(t);
                let s = tm.mk_numeral(&r.coeff, is_int);
                let fml = match r.ty {
                    IneqType::Lt => tm.mk_gt(t, s),
                    IneqType::Le => tm.mk_ge(t, s),
                    _ => tm.mk_eq(t, s),
                };
                fmls.push(fml);
                self.stats.rows_reified += 1;
                continue;
            }

            let t = self.row2expr(tm, def_rows, index2expr, r)?;
            let fml = match r.ty {
                IneqType::Lt => {
                    let s = self.rhs_numeral(tm, r, t);
                    tm.mk_lt(t, s)
                }
                IneqType::Le => {
                    let s = self.rhs_numeral(tm, r, t);
                    tm.mk_le(t, s)
                }
                IneqType::Eq => {
                    let s = self.rhs_numeral(tm, r, t);
                    tm.mk_eq(t, s)
                }
                IneqType::Divides => {
                    let m = tm.mk_int(r.modulus.clone());
                    let md = tm.mk_mod(t, m);
                    let zero = tm.mk_int(0);
                    tm.mk_eq(md, zero)
                }
                IneqType::Mod | IneqType::Div => continue,
            };
            fmls.push(fml);
            self.stats.rows_reified += 1;
        }
        Ok(())
    }

    fn rhs_numeral(&self, tm: &mut TermManager, r: &Row, t: TermId) -> TermId {
        let is_int = r.coeff.is_integer() && tm.is_int(t);
        tm.mk_numeral(&-r.coeff.clone(), is_int)
    }

    /// The expression denoted by a kernel variable: a mod/div pseudo-row
    /// is expanded recursively, anything else maps through `index2expr`.
    fn id2expr(
        &mut self,
        tm: &mut TermManager,
        def_rows: &FxHashMap<VarId, Row>,
        index2expr: &[Option<TermId>],
        id: VarId,
    ) -> Result<TermId> {
        if let Some(r) = def_rows.get(&id) {
            let r = r.clone();
            return self.row2expr(tm, def_rows, index2expr, &r);
        }
        index2expr
            .get(id as usize)
            .copied()
            .flatten()
            .ok_or_else(|| {
                QprojError::Internal(format!("kernel variable v{id} has no host expression"))
            })
    }

    /// Reassemble a row body `Σ cᵢ·vᵢ (+ k)` as a host expression.
    /// Mod/div/divides rows fold the constant into the body; inequality
    /// rows leave it for the comparison's right-hand side.
    fn row2expr(
        &mut self,
        tm: &mut TermManager,
        def_rows: &FxHashMap<VarId, Row>,
        index2expr: &[Option<TermId>],
        r: &Row,
    ) -> Result<TermId> {
        use num_integer::Integer;

        let mut ts: Vec<TermId> = Vec::with_capacity(r.vars.len());
        for v in &r.vars {
            let t = self.id2expr(tm, def_rows, index2expr, v.id)?;
            if let Some(n) = tm.numeral_value(t) {
                if n.is_zero() {
                    continue;
                }
                let is_int = tm.is_int(t);
                ts.push(tm.mk_numeral(&(&v.coeff * n), is_int));
            } else if !v.coeff.is_one() {
                let is_int = tm.is_int(t);
                let k = tm.mk_numeral(&v.coeff, is_int);
                ts.push(tm.mk_mul(vec![k, t]));
            } else {
                ts.push(t);
            }
        }
        match r.ty {
            IneqType::Mod => {
                if ts.is_empty() {
                    return Ok(tm.mk_int(r.coeff.to_integer().mod_floor(&r.modulus)));
                }
                if !r.coeff.is_zero() {
                    let k = tm.mk_numeral(&r.coeff, true);
                    ts.push(k);
                }
                let sum = tm.mk_add(ts);
                let m = tm.mk_int(r.modulus.clone());
                Ok(tm.mk_mod(sum, m))
            }
            IneqType::Div => {
                if ts.is_empty() {
                    return Ok(tm.mk_int(r.coeff.to_integer().div_floor(&r.modulus)));
                }
                if !r.coeff.is_zero() {
                    let k = tm.mk_numeral(&r.coeff, true);
                    ts.push(k);
                }
                let sum = tm.mk_add(ts);
                let m = tm.mk_int(r.modulus.clone());
                Ok(tm.mk_idiv(sum, m))
            }
            IneqType::Divides => {
                if !r.coeff.is_zero() {
                    let k = tm.mk_numeral(&r.coeff, true);
                    ts.push(k);
                }
                Ok(tm.mk_add(ts))
            }
            _ => Ok(tm.mk_add(ts)),
        }
    }

    /// Reify a kernel definition as a host term of the definee's type.
    fn def2expr(
        &mut self,
        tm: &mut TermManager,
        def_rows: &FxHashMap<VarId, Row>,
        d: &Def,
        is_int: bool,
        index2expr: &[Option<TermId>],
    ) -> Result<TermId> {
        match d {
            Def::Const(c) => Ok(tm.mk_numeral(c, is_int)),
            Def::Var(v, coeff) => {
                let mut t = self.id2expr(tm, def_rows, index2expr, *v)?;
                if !coeff.is_one() {
                    let k = tm.mk_numeral(coeff, is_int);
                    t = tm.mk_mul(vec![k, t]);
                }
                Ok(t)
            }
            Def::Add(a, b) => {
                let x = self.def2expr(tm, def_rows, a, is_int, index2expr)?;
                let y = self.def2expr(tm, def_rows, b, is_int, index2expr)?;
                Ok(tm.mk_add(vec![x, y]))
            }
            Def::Mul(a, b) => {
                let x = self.def2expr(tm, def_rows, a, is_int, index2expr)?;
                let y = self.def2expr(tm, def_rows, b, is_int, index2expr)?;
                Ok(tm.mk_mul(vec![x, y]))
            }
            Def::Div(a, m) => {
                let x = self.def2expr(tm, def_rows, a, is_int, index2expr)?;
                let m = BigRational::from_integer(m.clone());
                let m = tm.mk_numeral(&m, is_int);
                Ok(if is_int {
                    tm.mk_idiv(x, m)
                } else {
                    tm.mk_div(x, m)
                })
            }
        }
    }

    /// Substitute the definitions into the residue, later definitions
    /// first so that earlier ones may reference later-eliminated
    /// variables. Every substituted formula must stay true.
    fn apply_projection(
        &mut self,
        tm: &mut TermManager,
        model: &mut Model,
        defs: &[Definition],
        fmls: &mut Vec<TermId>,
    ) -> Result<bool> {
        if fmls.is_empty() || defs.is_empty() {
            return Ok(true);
        }
        let mut subst: FxHashMap<TermId, TermId> = FxHashMap::default();
        for d in defs.iter().rev() {
            let term = tm.substitute(d.term, &subst);
            subst.insert(d.var, term);
        }
        for i in 0..fmls.len() {
            let fml = tm.substitute(fmls[i], &subst);
            if !model.is_true(tm, fml)? {
                tracing::debug!(lit = %tm.display(fml), "definition substitution falsified residue");
                return Ok(false);
            }
            fmls[i] = fml;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Maximization
    // ------------------------------------------------------------------

    /// Maximize the real-typed objective `t` subject to `fmls0` under the
    /// model. Writes the optimizing values back into the model for plain
    /// variables and returns the optimum together with its non-strict and
    /// strict witness bounds.
    pub fn maximize(
        &mut self,
        tm: &mut TermManager,
        model: &mut Model,
        fmls0: &[TermId],
        t: TermId,
    ) -> Result<(InfEps, TermId, TermId)> {
        debug_assert!(tm.is_real(t));
        model.set_completion(true);
        let mut fmls = fmls0.to_vec();
        let mut mbo = ModelBasedOpt::new();
        let mut tids: FxHashMap<TermId, VarId> = FxHashMap::default();

        // Objective.
        let mut ts = Coeffs::default();
        let mut c = BigRational::zero();
        let one = BigRational::one();
        self.linearize_term(tm, model, &mut mbo, &one, t, &mut c, &mut fmls, &mut ts, &mut tids)?;
        let coeffs = self.extract_coeffs(tm, model, &mut mbo, &ts, &mut tids)?;
        mbo.set_objective(&coeffs, c);

        // Constraints; non-linear literals simply do not constrain the
        // kernel.
        let mut i = 0;
        while i < fmls.len() {
            let fml = fmls[i];
            self.linearize_lit(tm, model, &mut mbo, fml, &mut fmls, &mut tids)?;
            i += 1;
        }

        let value = mbo.maximize();

        // Move the model to the optimizing assignment.
        for (&e, &id) in &tids {
            if tm.is_var(e) {
                model.set_value(e, Value::Rational(mbo.get_value(id)));
            } else {
                tracing::trace!(term = %tm.display(e), "omitting model update for compound term");
            }
        }

        let tval_r = model.eval_rational(tm, t)?;
        let tval = tm.mk_numeral(&tval_r, false);
        let val = tm.mk_numeral(value.rational(), false);

        let (ge, gt) = if !value.is_finite() {
            (tm.mk_ge(t, tval), tm.mk_false())
        } else if value.infinitesimal().is_negative() {
            (tm.mk_ge(t, tval), tm.mk_ge(t, val))
        } else {
            (tm.mk_ge(t, val), tm.mk_gt(t, val))
        };
        Ok((value, ge, gt))
    }
}

impl Default for ArithProjector {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure abstractions: mod by a numeral and floor division by a positive
/// numeral. They survive projection without pinning their arguments.
fn is_pure(tm: &TermManager, e: TermId) -> bool {
    match tm.kind(e) {
        TermKind::Mod(_, m) => tm.is_numeral(*m),
        TermKind::IntDiv(_, m) => tm
            .numeral_value(*m)
            .is_some_and(|r| r.is_positive()),
        _ => false,
    }
}

fn positive_int_numeral(tm: &TermManager, t: TermId) -> Option<num_bigint::BigInt> {
    let v = tm.numeral_value(t)?;
    if v.is_integer() && v.is_positive() {
        Some(v.to_integer())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn int_val(n: i64) -> Value {
        Value::Rational(BigRational::from_integer(BigInt::from(n)))
    }

    #[test]
    fn opaque_literal_stays_in_residue() {
        let mut tm = TermManager::new();
        let b = tm.mk_var("b", tm.sorts.bool_sort);
        let x = tm.mk_var("x", tm.sorts.int_sort);

        let mut model = Model::new();
        model.set_value(b, Value::Bool(true));
        model.set_value(x, int_val(0));

        let mut vars = vec![x];
        let mut lits = vec![b];
        let mut projector = ArithProjector::new();
        assert!(projector
            .project(&mut tm, &mut model, &mut vars, &mut lits)
            .unwrap());
        assert_eq!(lits, vec![b]);
        assert!(vars.is_empty());
        assert_eq!(projector.stats().lits_retained, 1);
    }

    #[test]
    fn nonlinear_subterm_pins_its_variables() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let one = tm.mk_int(1);
        let xy = tm.mk_mul(vec![x, y]);
        let le = tm.mk_le(xy, one);

        let mut model = Model::new();
        model.set_value(x, int_val(1));
        model.set_value(y, int_val(1));

        let mut vars = vec![x];
        let mut lits = vec![le];
        let mut projector = ArithProjector::new();
        assert!(projector
            .project(&mut tm, &mut model, &mut vars, &mut lits)
            .unwrap());
        // x occurs in the abstracted product that survives, so it must be
        // retained.
        assert_eq!(vars, vec![x]);
        for &lit in &lits {
            assert!(model.is_true(&tm, lit).unwrap());
        }
    }

    #[test]
    fn single_variable_bounds_are_sign_normalized() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let two = tm.mk_int(2);
        let three = tm.mk_int(3);

        // 2 <= y survives untouched; x <= 3 is dropped with x.
        let mut lits = vec![tm.mk_le(two, y), tm.mk_le(x, three)];
        let mut model = Model::new();
        model.set_value(x, int_val(0));
        model.set_value(y, int_val(5));

        let mut vars = vec![x];
        let mut projector = ArithProjector::new();
        assert!(projector
            .project(&mut tm, &mut model, &mut vars, &mut lits)
            .unwrap());

        let expected = tm.mk_ge(y, two);
        assert_eq!(lits, vec![expected]);
    }

    #[test]
    fn conditional_term_injects_its_guard() {
        let mut tm = TermManager::new();
        let b = tm.mk_var("b", tm.sorts.bool_sort);
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let two = tm.mk_int(2);
        let ite = tm.mk_ite(b, x, y);
        let le = tm.mk_le(ite, two);

        let mut model = Model::new();
        model.set_value(b, Value::Bool(true));
        model.set_value(x, int_val(1));
        model.set_value(y, int_val(9));

        let mut vars = vec![x];
        let mut lits = vec![le];
        let mut projector = ArithProjector::new();
        assert!(projector
            .project(&mut tm, &mut model, &mut vars, &mut lits)
            .unwrap());
        // x <= 2 is dropped as a one-sided bound; the guard remains.
        assert_eq!(lits, vec![b]);
        assert!(vars.is_empty());
    }

    #[test]
    fn mod_terms_register_one_kernel_variable() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let three = tm.mk_int(3);
        let m = tm.mk_mod(x, three);
        // y <= x mod 3 and x mod 3 <= y share the pseudo-variable.
        let le1 = tm.mk_le(y, m);
        let le2 = tm.mk_le(m, y);

        let mut model = Model::new();
        model.set_value(x, int_val(7));
        model.set_value(y, int_val(1));

        let mut vars = vec![y];
        let mut lits = vec![le1, le2];
        let mut projector = ArithProjector::new();
        assert!(projector
            .project(&mut tm, &mut model, &mut vars, &mut lits)
            .unwrap());
        assert!(vars.is_empty());
        // y = x mod 3 collapses to nothing stronger than the pseudo-term
        // bounds; the residue must still hold.
        for &lit in &lits {
            assert!(model.is_true(&tm, lit).unwrap(), "{}", tm.display(lit));
        }
    }
}
