use std::time::Duration;

use z3::ast::{Ast, Bool, BV};
use z3::{Config, Context, FuncDecl, Params, SatResult as Z3Result, Sort};

use fxhash::FxHashMap as HashMap;

use tracing::trace;

use crate::backend::{SatResult, Solver};
use crate::classify::Var;
use crate::expr::{BinOp, BinRel, BoolOp, Expr, SymExpr, UnOp};
use crate::solver::PropagatingSolver;

#[derive(Clone)]
enum Node<'ctx> {
    Bool(Bool<'ctx>),
    BV(BV<'ctx>),
}

impl<'ctx> Node<'ctx> {
    fn into_bool(self, context: &'ctx Context) -> Bool<'ctx> {
        match self {
            Node::Bool(b) => b,
            Node::BV(bv) => {
                let zero = BV::from_u64(context, 0, bv.get_size());
                bv._eq(&zero).not()
            }
        }
    }

    fn into_bv(self, context: &'ctx Context) -> BV<'ctx> {
        match self {
            Node::BV(bv) => bv,
            Node::Bool(b) => b.ite(&BV::from_u64(context, 1, 1), &BV::from_u64(context, 0, 1)),
        }
    }
}

/// Lowers [`SymExpr`] trees into one z3 context.
pub struct Translator<'ctx> {
    context: &'ctx Context,
    vars: HashMap<Var, BV<'ctx>>,
}

impl<'ctx> Translator<'ctx> {
    pub fn new(context: &'ctx Context) -> Self {
        Self {
            context,
            vars: HashMap::default(),
        }
    }

    fn var(&mut self, var: &Var) -> BV<'ctx> {
        if let Some(bv) = self.vars.get(var).cloned() {
            bv
        } else {
            let bv = BV::new_const(self.context, var.name(), var.bits());
            self.vars.insert(var.to_owned(), bv.clone());
            bv
        }
    }

    fn val(&self, value: u128, bits: u32) -> BV<'ctx> {
        if bits <= 64 {
            return BV::from_u64(self.context, value as u64, bits);
        }

        let hi = BV::from_u64(self.context, (value >> 64) as u64, 64);
        let lo = BV::from_u64(self.context, value as u64, 64);
        let wide = hi.concat(&lo);

        if bits > 128 {
            wide.zero_ext(bits - 128)
        } else {
            wide.extract(bits - 1, 0)
        }
    }

    pub fn bv(&mut self, expr: &SymExpr) -> BV<'ctx> {
        self.ast(expr).into_bv(self.context)
    }

    pub fn bool(&mut self, expr: &SymExpr) -> Bool<'ctx> {
        self.ast(expr).into_bool(self.context)
    }

    fn ast(&mut self, expr: &SymExpr) -> Node<'ctx> {
        let context = self.context;
        match &**expr {
            Expr::Val(value, bits) => Node::BV(self.val(*value, *bits)),
            Expr::Bool(b) => Node::Bool(Bool::from_bool(context, *b)),
            Expr::Var(var) => Node::BV(self.var(var)),
            Expr::UnOp(op, e) => {
                let v = self.bv(e);
                Node::BV(match op {
                    UnOp::NOT => v.bvnot(),
                    UnOp::NEG => v.bvneg(),
                })
            }
            Expr::BinOp(op, l, r) => {
                let lv = self.bv(l);
                let rv = self.bv(r);
                let zero = BV::from_u64(context, 0, rv.get_size());
                Node::BV(match op {
                    BinOp::ADD => lv.bvadd(&rv),
                    BinOp::SUB => lv.bvsub(&rv),
                    BinOp::MUL => lv.bvmul(&rv),
                    // division by zero yields zero, as in constant folding
                    BinOp::DIV => rv._eq(&zero).ite(&zero, &lv.bvudiv(&rv)),
                    BinOp::REM => rv._eq(&zero).ite(&zero, &lv.bvurem(&rv)),
                    BinOp::AND => lv.bvand(&rv),
                    BinOp::OR => lv.bvor(&rv),
                    BinOp::XOR => lv.bvxor(&rv),
                    BinOp::SHL => lv.bvshl(&rv),
                    BinOp::SHR => lv.bvlshr(&rv),
                })
            }
            Expr::BinRel(op, l, r) if l.is_bool() || r.is_bool() => {
                let lv = self.bool(l);
                let rv = self.bool(r);
                let eq = lv._eq(&rv);
                Node::Bool(match op {
                    BinRel::NEQ => eq.not(),
                    _ => eq,
                })
            }
            Expr::BinRel(op, l, r) => {
                let lv = self.bv(l);
                let rv = self.bv(r);
                Node::Bool(match op {
                    BinRel::EQ => lv._eq(&rv),
                    BinRel::NEQ => lv._eq(&rv).not(),
                    BinRel::LT => lv.bvult(&rv),
                    BinRel::LE => lv.bvule(&rv),
                    BinRel::SLT => lv.bvslt(&rv),
                    BinRel::SLE => lv.bvsle(&rv),
                })
            }
            Expr::BoolOp(op, l, r) => {
                let lv = self.bool(l);
                let rv = self.bool(r);
                Node::Bool(match op {
                    BoolOp::AND => Bool::and(context, &[&lv, &rv]),
                    BoolOp::OR => Bool::or(context, &[&lv, &rv]),
                })
            }
            Expr::BoolNot(e) => Node::Bool(self.bool(e).not()),
            Expr::IfElse(c, t, f) => {
                let cv = self.bool(c);
                match (self.ast(t), self.ast(f)) {
                    (Node::Bool(tv), Node::Bool(fv)) => Node::Bool(cv.ite(&tv, &fv)),
                    (tv, fv) => Node::BV(cv.ite(&tv.into_bv(context), &fv.into_bv(context))),
                }
            }
            Expr::Intrinsic(name, args, bits) => {
                let args = args.iter().map(|arg| self.bv(arg)).collect::<Vec<_>>();
                let domain = args
                    .iter()
                    .map(|arg| Sort::bitvector(context, arg.get_size()))
                    .collect::<Vec<_>>();
                let domain = domain.iter().collect::<Vec<_>>();
                let decl = FuncDecl::new(context, &**name, &domain, &Sort::bitvector(context, *bits));
                let args = args.iter().map(|arg| arg as &dyn Ast<'ctx>).collect::<Vec<_>>();
                Node::BV(
                    decl.apply(&args)
                        .as_bv()
                        .unwrap_or_else(|| BV::fresh_const(context, "intrinsic", *bits)),
                )
            }
        }
    }
}

/// Z3 backend; the default behind the analysis.
///
/// Each query runs in a fresh context, so the backend holds no z3 state
/// between calls. Queries that constant propagation already settles never
/// reach z3 unless the pre-filter is disabled.
#[derive(Debug, Clone, Copy)]
pub struct Z3Solver {
    prefilter: bool,
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Z3Solver {
    pub fn new() -> Self {
        Self { prefilter: true }
    }

    pub fn without_prefilter() -> Self {
        Self { prefilter: false }
    }

    pub fn has_prefilter(&self) -> bool {
        self.prefilter
    }

    fn solve(&self, constraints: &[SymExpr], timeout: Duration) -> SatResult {
        let config = Config::new();
        let context = Context::new(&config);
        let solver = z3::Solver::new(&context);

        let mut params = Params::new(&context);
        params.set_u32("timeout", u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        solver.set_params(&params);

        let mut translator = Translator::new(&context);
        for constraint in constraints.iter() {
            solver.assert(&translator.bool(constraint));
        }

        match solver.check() {
            Z3Result::Sat => SatResult::Sat,
            Z3Result::Unsat => SatResult::Unsat,
            Z3Result::Unknown => SatResult::Unknown,
        }
    }
}

impl Solver for Z3Solver {
    fn check(&mut self, constraints: &[SymExpr], timeout: Duration) -> SatResult {
        if self.prefilter {
            let result = PropagatingSolver.check(constraints, timeout);
            if result != SatResult::Unknown {
                trace!(?result, "decided by constant propagation");
                return result;
            }
        }
        self.solve(constraints, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::solver::SOLVER_TIMEOUT;

    fn var(name: &str) -> SymExpr {
        SymExpr::var(Var::new(name, 256))
    }

    #[test]
    fn decides_storage_inequalities() {
        let mut solver = Z3Solver::without_prefilter();

        let x = var("x");
        let s = var("storage,0,con");

        let constraints = [x.clone().eq(s.clone()), x.ne(s)];
        assert_eq!(solver.check(&constraints, SOLVER_TIMEOUT), SatResult::Unsat);

        let wide = SymExpr::val(u128::MAX, 256);
        assert_eq!(solver.check(&[var("y").lt(wide)], SOLVER_TIMEOUT), SatResult::Sat);
    }

    #[test]
    fn relates_symbols_propagation_cannot() {
        let origin = var("origin");
        let s = var("storage,1,con");
        let owner = var("owner");

        let constraints = [origin.eq(s.clone()), s.clone().eq(owner.clone())];
        assert_eq!(PropagatingSolver.check(&constraints, SOLVER_TIMEOUT), SatResult::Unknown);
        assert_eq!(Z3Solver::new().check(&constraints, SOLVER_TIMEOUT), SatResult::Sat);

        assert_eq!(Z3Solver::new().check(&[s.ne(owner)], SOLVER_TIMEOUT), SatResult::Sat);
    }

    #[test]
    fn wide_constants_keep_their_width() {
        let x = var("x");
        let all_ones = SymExpr::val(0, 256).not();
        let constraints = [x.clone().eq(all_ones), x.eq(SymExpr::val(u128::MAX, 256))];
        assert_eq!(Z3Solver::new().check(&constraints, SOLVER_TIMEOUT), SatResult::Unsat);
    }
}
