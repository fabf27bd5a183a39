use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use hashconsing::{consign, HConsed, HashConsign};

use fnv::FnvHashMap as HashMap;

use itertools::Itertools;

use smallvec::SmallVec;

use crate::classify::Var;

consign! {
    let EXPR = consign(100 * 1024 /* = capacity */) for Expr;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnOp {
    NOT,
    NEG,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinOp {
    ADD,
    SUB,
    MUL,
    DIV,
    REM,
    AND,
    OR,
    XOR,
    SHL,
    SHR,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinRel {
    EQ,
    NEQ,
    LT,
    LE,
    SLT,
    SLE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoolOp {
    AND,
    OR,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SymExpr(HConsed<Expr>);

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl Deref for SymExpr {
    type Target = Expr;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl From<Var> for SymExpr {
    fn from(v: Var) -> Self {
        SymExpr::var(v)
    }
}

impl From<bool> for SymExpr {
    fn from(b: bool) -> Self {
        SymExpr::bool(b)
    }
}

impl From<Expr> for SymExpr {
    fn from(e: Expr) -> Self {
        Self(EXPR.mk(e))
    }
}

impl From<HConsed<Expr>> for SymExpr {
    fn from(e: HConsed<Expr>) -> Self {
        Self(e)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expr {
    BinRel(BinRel, SymExpr, SymExpr), // T * T -> bool
    BoolOp(BoolOp, SymExpr, SymExpr), // bool * bool -> bool
    BoolNot(SymExpr),                 // bool -> bool

    UnOp(UnOp, SymExpr),            // T -> T
    BinOp(BinOp, SymExpr, SymExpr), // T * T -> T

    IfElse(SymExpr, SymExpr, SymExpr),

    Intrinsic(Arc<str>, SmallVec<[SymExpr; 4]>, u32),

    Val(u128, u32), // value, bits
    Bool(bool),
    Var(Var),
}

impl Expr {
    fn fmt_l1(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Val(v, _) => write!(f, "{:#x}", v),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Intrinsic(name, args, _) => write!(f, "{}({})", name, args.iter().join(", ")),
            Expr::UnOp(UnOp::NOT, expr) => { write!(f, "~")?; expr.fmt_l1(f) },
            Expr::UnOp(UnOp::NEG, expr) => { write!(f, "-")?; expr.fmt_l1(f) },
            Expr::BoolNot(expr) => { write!(f, "!")?; expr.fmt_l1(f) },
            expr => write!(f, "({})", expr),
        }
    }

    fn fmt_l2(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BinOp(BinOp::MUL, e1, e2) => { e1.fmt_l2(f)?; write!(f, " * ")?; e2.fmt_l1(f) },
            Expr::BinOp(BinOp::DIV, e1, e2) => { e1.fmt_l2(f)?; write!(f, " / ")?; e2.fmt_l1(f) },
            Expr::BinOp(BinOp::REM, e1, e2) => { e1.fmt_l2(f)?; write!(f, " % ")?; e2.fmt_l1(f) },
            expr => expr.fmt_l1(f),
        }
    }

    fn fmt_l3(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BinOp(BinOp::ADD, e1, e2) => { e1.fmt_l3(f)?; write!(f, " + ")?; e2.fmt_l2(f) },
            Expr::BinOp(BinOp::SUB, e1, e2) => { e1.fmt_l3(f)?; write!(f, " - ")?; e2.fmt_l2(f) },
            expr => expr.fmt_l2(f),
        }
    }

    fn fmt_l4(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BinOp(BinOp::SHL, e1, e2) => { e1.fmt_l4(f)?; write!(f, " << ")?; e2.fmt_l3(f) },
            Expr::BinOp(BinOp::SHR, e1, e2) => { e1.fmt_l4(f)?; write!(f, " >> ")?; e2.fmt_l3(f) },
            expr => expr.fmt_l3(f),
        }
    }

    fn fmt_l5(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BinRel(BinRel::LT, e1, e2) => { e1.fmt_l5(f)?; write!(f, " < ")?; e2.fmt_l4(f) },
            Expr::BinRel(BinRel::LE, e1, e2) => { e1.fmt_l5(f)?; write!(f, " <= ")?; e2.fmt_l4(f) },
            Expr::BinRel(BinRel::SLT, e1, e2) => { e1.fmt_l5(f)?; write!(f, " s< ")?; e2.fmt_l4(f) },
            Expr::BinRel(BinRel::SLE, e1, e2) => { e1.fmt_l5(f)?; write!(f, " s<= ")?; e2.fmt_l4(f) },
            expr => expr.fmt_l4(f),
        }
    }

    fn fmt_l6(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::BinRel(BinRel::EQ, e1, e2) => { e1.fmt_l6(f)?; write!(f, " == ")?; e2.fmt_l5(f) },
            Expr::BinRel(BinRel::NEQ, e1, e2) => { e1.fmt_l6(f)?; write!(f, " != ")?; e2.fmt_l5(f) },
            expr => expr.fmt_l5(f),
        }
    }

    fn fmt_l7(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Expr::BinOp(BinOp::AND, e1, e2) = self {
            e1.fmt_l7(f)?;
            write!(f, " & ")?;
            e2.fmt_l6(f)
        } else {
            self.fmt_l6(f)
        }
    }

    fn fmt_l8(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Expr::BinOp(BinOp::XOR, e1, e2) = self {
            e1.fmt_l8(f)?;
            write!(f, " ^ ")?;
            e2.fmt_l7(f)
        } else {
            self.fmt_l7(f)
        }
    }

    fn fmt_l9(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Expr::BinOp(BinOp::OR, e1, e2) = self {
            e1.fmt_l9(f)?;
            write!(f, " | ")?;
            e2.fmt_l8(f)
        } else {
            self.fmt_l8(f)
        }
    }

    fn fmt_l10(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Expr::BoolOp(BoolOp::AND, e1, e2) = self {
            e1.fmt_l10(f)?;
            write!(f, " && ")?;
            e2.fmt_l9(f)
        } else {
            self.fmt_l9(f)
        }
    }

    fn fmt_l11(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Expr::BoolOp(BoolOp::OR, e1, e2) = self {
            e1.fmt_l11(f)?;
            write!(f, " || ")?;
            e2.fmt_l10(f)
        } else {
            self.fmt_l10(f)
        }
    }

    fn fmt_l12(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Expr::IfElse(c, e1, e2) = self {
            write!(f, "if ")?;
            c.fmt_l12(f)?;
            write!(f, " then ")?;
            e1.fmt_l12(f)?;
            write!(f, " else ")?;
            e2.fmt_l12(f)
        } else {
            self.fmt_l11(f)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_l12(f)
    }
}

pub(crate) fn mask(bits: u32) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

// constants wider than 128 bits are zero-extended, so their sign bit is clear
fn signed(v: u128, bits: u32) -> i128 {
    if bits == 0 || bits > 128 {
        (v & (u128::MAX >> 1)) as i128
    } else {
        let shift = 128 - bits;
        ((v << shift) as i128) >> shift
    }
}

fn fold_binop(op: BinOp, l: u128, r: u128, bits: u32) -> Option<u128> {
    if bits > 128 {
        return None;
    }

    let v = match op {
        BinOp::ADD => l.wrapping_add(r),
        BinOp::SUB => l.wrapping_sub(r),
        BinOp::MUL => l.wrapping_mul(r),
        BinOp::DIV => l.checked_div(r).unwrap_or(0),
        BinOp::REM => l.checked_rem(r).unwrap_or(0),
        BinOp::AND => l & r,
        BinOp::OR => l | r,
        BinOp::XOR => l ^ r,
        BinOp::SHL => if r >= bits as u128 { 0 } else { l << r },
        BinOp::SHR => if r >= bits as u128 { 0 } else { l >> r },
    };

    Some(v & mask(bits))
}

fn fold_binrel(op: BinRel, l: u128, r: u128, bits: u32) -> bool {
    match op {
        BinRel::EQ => l == r,
        BinRel::NEQ => l != r,
        BinRel::LT => l < r,
        BinRel::LE => l <= r,
        BinRel::SLT => signed(l, bits) < signed(r, bits),
        BinRel::SLE => signed(l, bits) <= signed(r, bits),
    }
}

impl SymExpr {
    pub fn val(value: u128, bits: u32) -> SymExpr {
        EXPR.mk(Expr::Val(value & mask(bits), bits)).into()
    }

    pub fn bool(value: bool) -> SymExpr {
        EXPR.mk(Expr::Bool(value)).into()
    }

    pub fn var(var: Var) -> SymExpr {
        EXPR.mk(Expr::Var(var)).into()
    }

    pub fn lift_unop(op: UnOp, v: SymExpr) -> SymExpr {
        EXPR.mk(Expr::UnOp(op, v)).into()
    }

    pub fn lift_binop(op: BinOp, l: SymExpr, r: SymExpr) -> SymExpr {
        debug_assert_eq!(l.bits(), r.bits());

        EXPR.mk(Expr::BinOp(op, l, r)).into()
    }

    pub fn lift_binrel(op: BinRel, l: SymExpr, r: SymExpr) -> SymExpr {
        EXPR.mk(Expr::BinRel(op, l, r)).into()
    }

    pub fn lift_boolop(op: BoolOp, l: SymExpr, r: SymExpr) -> SymExpr {
        EXPR.mk(Expr::BoolOp(op, l, r)).into()
    }

    pub fn unop(op: UnOp, v: SymExpr) -> SymExpr {
        match (op, &*v) {
            (UnOp::NOT, Expr::Val(value, bits)) if *bits <= 128 => Self::val(!value, *bits),
            (UnOp::NEG, Expr::Val(value, bits)) if *bits <= 128 => {
                Self::val(value.wrapping_neg(), *bits)
            }
            (_, Expr::UnOp(inner, vv)) if *inner == op => vv.clone(),
            _ => Self::lift_unop(op, v),
        }
    }

    pub fn not(self) -> SymExpr {
        Self::unop(UnOp::NOT, self)
    }

    pub fn neg(self) -> SymExpr {
        Self::unop(UnOp::NEG, self)
    }

    pub fn binop(op: BinOp, l: SymExpr, r: SymExpr) -> SymExpr {
        if let (Expr::Val(lv, bits), Expr::Val(rv, _)) = (&*l, &*r) {
            if let Some(v) = fold_binop(op, *lv, *rv, *bits) {
                return Self::val(v, *bits);
            }
        }

        match op {
            BinOp::ADD | BinOp::OR | BinOp::XOR if l.is_zero() => r,
            BinOp::ADD | BinOp::SUB | BinOp::OR | BinOp::XOR | BinOp::SHL | BinOp::SHR
                if r.is_zero() =>
            {
                l
            }
            BinOp::MUL | BinOp::AND if l.is_zero() || r.is_zero() => Self::val(0, l.bits()),
            BinOp::MUL if l.is_one() => r,
            BinOp::MUL | BinOp::DIV if r.is_one() => l,
            BinOp::SUB | BinOp::XOR if l == r => Self::val(0, l.bits()),
            BinOp::AND | BinOp::OR if l == r => l,
            _ => Self::lift_binop(op, l, r),
        }
    }

    pub fn add(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::binop(BinOp::ADD, l, r)
    }

    pub fn sub(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::binop(BinOp::SUB, l, r)
    }

    pub fn mul(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::binop(BinOp::MUL, l, r)
    }

    pub fn div(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::binop(BinOp::DIV, l, r)
    }

    pub fn rem(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::binop(BinOp::REM, l, r)
    }

    pub fn and(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::binop(BinOp::AND, l, r)
    }

    pub fn or(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::binop(BinOp::OR, l, r)
    }

    pub fn xor(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::binop(BinOp::XOR, l, r)
    }

    pub fn shl(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::binop(BinOp::SHL, l, r)
    }

    pub fn shr(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::binop(BinOp::SHR, l, r)
    }

    pub fn binrel(op: BinRel, l: SymExpr, r: SymExpr) -> SymExpr {
        if l == r {
            // trivial
            return Self::bool(matches!(op, BinRel::EQ | BinRel::LE | BinRel::SLE));
        }

        match (&*l, &*r) {
            (Expr::Val(lv, bits), Expr::Val(rv, _)) => Self::bool(fold_binrel(op, *lv, *rv, *bits)),
            (Expr::Bool(lv), Expr::Bool(rv)) if matches!(op, BinRel::EQ | BinRel::NEQ) => {
                Self::bool((lv == rv) == (op == BinRel::EQ))
            }
            _ => Self::lift_binrel(op, l, r),
        }
    }

    pub fn eq(self, r: SymExpr) -> SymExpr {
        Self::binrel(BinRel::EQ, self, r)
    }

    pub fn ne(self, r: SymExpr) -> SymExpr {
        Self::binrel(BinRel::NEQ, self, r)
    }

    pub fn lt(self, r: SymExpr) -> SymExpr {
        Self::binrel(BinRel::LT, self, r)
    }

    pub fn le(self, r: SymExpr) -> SymExpr {
        Self::binrel(BinRel::LE, self, r)
    }

    pub fn slt(self, r: SymExpr) -> SymExpr {
        Self::binrel(BinRel::SLT, self, r)
    }

    pub fn sle(self, r: SymExpr) -> SymExpr {
        Self::binrel(BinRel::SLE, self, r)
    }

    pub fn boolop(op: BoolOp, l: SymExpr, r: SymExpr) -> SymExpr {
        match op {
            BoolOp::AND if l.is_false() || r.is_true() => l,
            BoolOp::AND if r.is_false() || l.is_true() => r,
            BoolOp::OR if l.is_true() || r.is_false() => l,
            BoolOp::OR if r.is_true() || l.is_false() => r,
            _ if l == r => l,
            _ => Self::lift_boolop(op, l, r),
        }
    }

    pub fn bool_and(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::boolop(BoolOp::AND, l, r)
    }

    pub fn bool_or(l: SymExpr, r: SymExpr) -> SymExpr {
        Self::boolop(BoolOp::OR, l, r)
    }

    pub fn bool_not(self) -> SymExpr {
        match &*self {
            Expr::Bool(b) => Self::bool(!b),
            Expr::BoolNot(v) => v.clone(),
            Expr::BinRel(BinRel::EQ, l, r) => l.clone().ne(r.clone()),
            Expr::BinRel(BinRel::NEQ, l, r) => l.clone().eq(r.clone()),
            _ => EXPR.mk(Expr::BoolNot(self)).into(),
        }
    }

    pub fn ite(self, texpr: SymExpr, fexpr: SymExpr) -> SymExpr {
        match &*self {
            Expr::Bool(true) => texpr,
            Expr::Bool(false) => fexpr,
            _ if texpr == fexpr => texpr,
            _ => EXPR.mk(Expr::IfElse(self, texpr, fexpr)).into(),
        }
    }

    pub fn intrinsic<S: AsRef<str>, I: IntoIterator<Item = SymExpr>>(
        name: S,
        args: I,
        bits: u32,
    ) -> SymExpr {
        EXPR.mk(Expr::Intrinsic(Arc::from(name.as_ref()), args.into_iter().collect(), bits)).into()
    }

    /// Coerce a bit-vector into a boolean by comparing against zero.
    pub fn truthy(self) -> SymExpr {
        if self.is_bool() {
            self
        } else {
            let zero = Self::val(0, self.bits());
            self.ne(zero)
        }
    }

    pub fn bits(&self) -> u32 {
        match &**self {
            Expr::Val(_, bits) => *bits,
            Expr::Var(v) => v.bits(),
            Expr::UnOp(_, v) | Expr::BinOp(_, v, _) => v.bits(),
            Expr::BinRel(..) | Expr::BoolOp(..) | Expr::BoolNot(_) | Expr::Bool(_) => 1,
            Expr::IfElse(_, v, _) => v.bits(),
            Expr::Intrinsic(_, _, bits) => *bits,
        }
    }

    pub fn is_bool(&self) -> bool {
        match &**self {
            Expr::BinRel(..) | Expr::BoolOp(..) | Expr::BoolNot(_) | Expr::Bool(_) => true,
            Expr::IfElse(_, v, _) => v.is_bool(),
            _ => false,
        }
    }

    /// Number of direct sub-operands.
    pub fn num_args(&self) -> usize {
        match &**self {
            Expr::Val(..) | Expr::Bool(_) | Expr::Var(_) => 0,
            Expr::UnOp(..) | Expr::BoolNot(_) => 1,
            Expr::BinOp(..) | Expr::BinRel(..) | Expr::BoolOp(..) => 2,
            Expr::IfElse(..) => 3,
            Expr::Intrinsic(_, args, _) => args.len(),
        }
    }

    /// A leaf has no sub-operands: it was loaded directly rather than computed.
    pub fn is_leaf(&self) -> bool {
        self.num_args() == 0
    }

    pub fn is_symbolic(&self) -> bool {
        !matches!(&**self, Expr::Val(..) | Expr::Bool(_))
    }

    pub fn is_concrete(&self) -> bool {
        !self.is_symbolic()
    }

    pub fn as_var(&self) -> Option<&Var> {
        if let Expr::Var(v) = &**self {
            Some(v)
        } else {
            None
        }
    }

    pub fn as_u128(&self) -> Option<u128> {
        if let Expr::Val(v, _) = &**self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn is_one(&self) -> bool {
        matches!(&**self, Expr::Val(1, _))
    }

    pub fn is_zero(&self) -> bool {
        matches!(&**self, Expr::Val(0, _))
    }

    pub fn is_true(&self) -> bool {
        matches!(&**self, Expr::Bool(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(&**self, Expr::Bool(false))
    }

    /// Distinct variables in first-occurrence order.
    pub fn free_vars(&self) -> Vec<Var> {
        #[derive(Default)]
        struct FreeVars<'expr>(Vec<&'expr Var>);

        impl<'expr> VisitRef<'expr> for FreeVars<'expr> {
            fn visit_var_ref(&mut self, var: &'expr Var) {
                self.0.push(var);
            }
        }

        let mut visitor = FreeVars::default();
        visitor.visit_expr_ref(self);
        visitor.0.into_iter().unique().cloned().collect()
    }

    pub fn simplify(self) -> SymExpr {
        // rebuild through the folding constructors
        struct Simplify;
        impl<'expr> VisitMap<'expr> for Simplify {}

        Simplify.visit_expr(&self)
    }

    pub fn substitute(&self, bindings: &HashMap<Var, SymExpr>) -> SymExpr {
        struct Substitute<'b>(&'b HashMap<Var, SymExpr>);

        impl<'b, 'expr> VisitMap<'expr> for Substitute<'b> {
            fn visit_var(&mut self, var: &'expr Var) -> SymExpr {
                self.0
                    .get(var)
                    .cloned()
                    .unwrap_or_else(|| SymExpr::var(var.clone()))
            }
        }

        if bindings.is_empty() {
            self.clone()
        } else {
            Substitute(bindings).visit_expr(self)
        }
    }
}

pub trait VisitRef<'expr> {
    #[allow(unused_variables)]
    fn visit_val_ref(&mut self, value: u128, bits: u32) {}

    #[allow(unused_variables)]
    fn visit_bool_ref(&mut self, value: bool) {}

    #[allow(unused_variables)]
    fn visit_var_ref(&mut self, var: &'expr Var) {}

    #[allow(unused_variables)]
    fn visit_unop_ref(&mut self, op: UnOp, expr: &'expr SymExpr) {
        self.visit_expr_ref(expr);
    }

    #[allow(unused_variables)]
    fn visit_binop_ref(&mut self, op: BinOp, lexpr: &'expr SymExpr, rexpr: &'expr SymExpr) {
        self.visit_expr_ref(lexpr);
        self.visit_expr_ref(rexpr);
    }

    #[allow(unused_variables)]
    fn visit_binrel_ref(&mut self, op: BinRel, lexpr: &'expr SymExpr, rexpr: &'expr SymExpr) {
        self.visit_expr_ref(lexpr);
        self.visit_expr_ref(rexpr);
    }

    #[allow(unused_variables)]
    fn visit_boolop_ref(&mut self, op: BoolOp, lexpr: &'expr SymExpr, rexpr: &'expr SymExpr) {
        self.visit_expr_ref(lexpr);
        self.visit_expr_ref(rexpr);
    }

    fn visit_bool_not_ref(&mut self, expr: &'expr SymExpr) {
        self.visit_expr_ref(expr);
    }

    fn visit_ite_ref(&mut self, cond: &'expr SymExpr, lexpr: &'expr SymExpr, rexpr: &'expr SymExpr) {
        self.visit_expr_ref(cond);
        self.visit_expr_ref(lexpr);
        self.visit_expr_ref(rexpr);
    }

    #[allow(unused_variables)]
    fn visit_intrinsic_ref(&mut self, name: &str, args: &'expr [SymExpr], bits: u32) {
        for arg in args {
            self.visit_expr_ref(arg);
        }
    }

    fn visit_expr_ref(&mut self, expr: &'expr SymExpr) {
        match **expr {
            Expr::Val(v, bits) => self.visit_val_ref(v, bits),
            Expr::Bool(b) => self.visit_bool_ref(b),
            Expr::Var(ref v) => self.visit_var_ref(v),
            Expr::UnOp(op, ref e) => self.visit_unop_ref(op, e),
            Expr::BinOp(op, ref l, ref r) => self.visit_binop_ref(op, l, r),
            Expr::BinRel(op, ref l, ref r) => self.visit_binrel_ref(op, l, r),
            Expr::BoolOp(op, ref l, ref r) => self.visit_boolop_ref(op, l, r),
            Expr::BoolNot(ref e) => self.visit_bool_not_ref(e),
            Expr::IfElse(ref c, ref l, ref r) => self.visit_ite_ref(c, l, r),
            Expr::Intrinsic(ref name, ref args, bits) => self.visit_intrinsic_ref(name, args, bits),
        }
    }
}

pub trait VisitMap<'expr> {
    fn visit_val(&mut self, value: u128, bits: u32) -> SymExpr {
        SymExpr::val(value, bits)
    }

    fn visit_bool(&mut self, value: bool) -> SymExpr {
        SymExpr::bool(value)
    }

    fn visit_var(&mut self, var: &'expr Var) -> SymExpr {
        SymExpr::var(var.clone())
    }

    fn visit_unop(&mut self, op: UnOp, expr: &'expr SymExpr) -> SymExpr {
        SymExpr::unop(op, self.visit_expr(expr))
    }

    fn visit_binop(&mut self, op: BinOp, lexpr: &'expr SymExpr, rexpr: &'expr SymExpr) -> SymExpr {
        SymExpr::binop(op, self.visit_expr(lexpr), self.visit_expr(rexpr))
    }

    fn visit_binrel(
        &mut self,
        op: BinRel,
        lexpr: &'expr SymExpr,
        rexpr: &'expr SymExpr,
    ) -> SymExpr {
        SymExpr::binrel(op, self.visit_expr(lexpr), self.visit_expr(rexpr))
    }

    fn visit_boolop(
        &mut self,
        op: BoolOp,
        lexpr: &'expr SymExpr,
        rexpr: &'expr SymExpr,
    ) -> SymExpr {
        SymExpr::boolop(op, self.visit_expr(lexpr), self.visit_expr(rexpr))
    }

    fn visit_bool_not(&mut self, expr: &'expr SymExpr) -> SymExpr {
        self.visit_expr(expr).bool_not()
    }

    fn visit_ite(&mut self, cond: &'expr SymExpr, lexpr: &'expr SymExpr, rexpr: &'expr SymExpr) -> SymExpr {
        let cond = self.visit_expr(cond);
        cond.ite(self.visit_expr(lexpr), self.visit_expr(rexpr))
    }

    fn visit_intrinsic(&mut self, name: Arc<str>, args: &'expr [SymExpr], bits: u32) -> SymExpr {
        let args = args.iter().map(|arg| self.visit_expr(arg)).collect::<SmallVec<[SymExpr; 4]>>();
        SymExpr::intrinsic(name, args, bits)
    }

    fn visit_expr(&mut self, expr: &'expr SymExpr) -> SymExpr {
        match &**expr {
            Expr::Val(v, bits) => self.visit_val(*v, *bits),
            Expr::Bool(b) => self.visit_bool(*b),
            Expr::Var(v) => self.visit_var(v),
            Expr::UnOp(op, e) => self.visit_unop(*op, e),
            Expr::BinOp(op, l, r) => self.visit_binop(*op, l, r),
            Expr::BinRel(op, l, r) => self.visit_binrel(*op, l, r),
            Expr::BoolOp(op, l, r) => self.visit_boolop(*op, l, r),
            Expr::BoolNot(e) => self.visit_bool_not(e),
            Expr::IfElse(c, l, r) => self.visit_ite(c, l, r),
            Expr::Intrinsic(name, args, bits) => self.visit_intrinsic(name.clone(), args, *bits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> SymExpr {
        SymExpr::var(Var::new("x", 256))
    }

    #[test]
    fn constants_fold_through_constructors() {
        let zero = SymExpr::val(0, 256);
        assert!(zero.clone().ne(zero.clone()).is_false());
        assert!(zero.clone().eq(SymExpr::val(0, 256)).is_true());

        let sum = SymExpr::add(SymExpr::val(u128::MAX, 8), SymExpr::val(1, 8));
        assert!(sum.is_zero());

        assert!(SymExpr::val(0xff, 8).slt(SymExpr::val(0, 8)).is_true());
        assert!(SymExpr::val(0xff, 8).lt(SymExpr::val(0, 8)).is_false());
    }

    #[test]
    fn wide_unary_ops_stay_symbolic() {
        let inverted = SymExpr::val(0, 256).not();
        assert!(!inverted.is_concrete());
        assert!(!inverted.clone().eq(SymExpr::val(u128::MAX, 256)).is_true());
        assert_eq!(inverted.not(), SymExpr::val(0, 256));

        assert_eq!(SymExpr::val(0, 128).not(), SymExpr::val(u128::MAX, 128));
        assert_eq!(SymExpr::val(0x0f, 8).not(), SymExpr::val(0xf0, 8));
    }

    #[test]
    fn trivial_relations_on_identical_operands() {
        assert!(x().eq(x()).is_true());
        assert!(x().ne(x()).is_false());
        assert!(SymExpr::sub(x(), x()).is_zero());
    }

    #[test]
    fn leaves_and_derived_values() {
        assert!(x().is_leaf());
        assert!(x().is_symbolic());

        let derived = SymExpr::add(x(), SymExpr::val(1, 256));
        assert!(!derived.is_leaf());
        assert_eq!(derived.num_args(), 2);
        assert!(derived.is_symbolic());

        let constant = SymExpr::val(7, 256);
        assert!(constant.is_leaf());
        assert!(!constant.is_symbolic());
    }

    #[test]
    fn free_vars_are_distinct_and_ordered() {
        let y = SymExpr::var(Var::new("y", 256));
        let e = SymExpr::add(x(), y.clone()).eq(SymExpr::mul(x(), y));
        let names = e.free_vars().iter().map(|v| v.name().to_owned()).collect::<Vec<_>>();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn simplify_folds_substituted_constants() {
        let mut bindings = HashMap::default();
        bindings.insert(Var::new("x", 256), SymExpr::val(3, 256));

        let e = SymExpr::add(x(), SymExpr::val(2, 256)).eq(SymExpr::val(5, 256));
        assert!(e.substitute(&bindings).is_true());
        assert!(!e.clone().simplify().is_true());
    }

    #[test]
    fn bool_connectives_short_circuit() {
        let c = x().eq(SymExpr::val(1, 256));
        assert!(SymExpr::bool_and(c.clone(), SymExpr::bool(false)).is_false());
        assert_eq!(SymExpr::bool_or(SymExpr::bool(false), c.clone()), c);
        assert_eq!(c.clone().bool_not(), x().ne(SymExpr::val(1, 256)));
    }

    #[test]
    fn display_uses_precedence() {
        let e = SymExpr::mul(SymExpr::add(x(), SymExpr::val(1, 256)), x());
        assert_eq!(e.to_string(), "(x + 0x1) * x");
    }
}
