use swc_core::common::{SyntaxContext, DUMMY_SP};
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

/// Replaces build-variant globals with literals: `__DEV__` becomes a boolean
/// and `process.env.NODE_ENV` becomes `"development"` or `"production"`. Only
/// unbound occurrences are rewritten; a local `__DEV__` or `process` binding
/// shadows the global.
pub struct InlineGlobals {
    dev: bool,
    unresolved_ctxt: SyntaxContext,
}

impl InlineGlobals {
    pub fn new(dev: bool, unresolved_ctxt: SyntaxContext) -> Self {
        Self {
            dev,
            unresolved_ctxt,
        }
    }

    fn dev_literal(&self) -> Expr {
        Expr::Lit(Lit::Bool(Bool {
            span: DUMMY_SP,
            value: self.dev,
        }))
    }

    fn node_env_literal(&self) -> Expr {
        Expr::Lit(Lit::Str(Str {
            span: DUMMY_SP,
            value: if self.dev { "development" } else { "production" }.into(),
            raw: None,
        }))
    }

    fn is_node_env_member(&self, member: &MemberExpr) -> bool {
        let MemberProp::Ident(prop) = &member.prop else {
            return false;
        };
        if prop.sym != *"NODE_ENV" {
            return false;
        }
        let Expr::Member(env) = &*member.obj else {
            return false;
        };
        let MemberProp::Ident(env_prop) = &env.prop else {
            return false;
        };
        if env_prop.sym != *"env" {
            return false;
        }
        match &*env.obj {
            Expr::Ident(id) => id.sym == *"process" && id.ctxt == self.unresolved_ctxt,
            _ => false,
        }
    }
}

impl VisitMut for InlineGlobals {
    fn visit_mut_expr(&mut self, n: &mut Expr) {
        match n {
            Expr::Ident(id) if id.sym == *"__DEV__" && id.ctxt == self.unresolved_ctxt => {
                *n = self.dev_literal();
            }
            Expr::Member(member) if self.is_node_env_member(member) => {
                *n = self.node_env_literal();
            }
            _ => n.visit_mut_children_with(self),
        }
    }

    fn visit_mut_prop(&mut self, n: &mut Prop) {
        if let Prop::Shorthand(id) = n {
            if id.sym == *"__DEV__" && id.ctxt == self.unresolved_ctxt {
                *n = Prop::KeyValue(KeyValueProp {
                    key: PropName::Ident(IdentName::new(id.sym.clone(), id.span)),
                    value: Box::new(self.dev_literal()),
                });
                return;
            }
        }
        n.visit_mut_children_with(self);
    }
}

/// Post-order literal folding: arithmetic, string concatenation, comparisons,
/// logical short-circuits, unary operators, conditional expressions, and `if`
/// statements whose test folded to a literal. Run after global inlining so
/// `if (__DEV__)` branches disappear entirely from prod output.
pub struct ConstantFolding;

impl ConstantFolding {
    fn fold_expr(&self, expr: &mut Expr) {
        let folded = match expr {
            Expr::Bin(bin) => self.fold_bin(bin),
            Expr::Unary(unary) => self.fold_unary(unary),
            Expr::Cond(cond) => match literal_truthiness(&cond.test) {
                Some(true) => Some((*cond.cons).clone()),
                Some(false) => Some((*cond.alt).clone()),
                None => None,
            },
            Expr::Paren(paren) => match &*paren.expr {
                Expr::Lit(_) => Some((*paren.expr).clone()),
                _ => None,
            },
            _ => None,
        };
        if let Some(folded) = folded {
            *expr = folded;
        }
    }

    fn fold_bin(&self, bin: &BinExpr) -> Option<Expr> {
        match bin.op {
            BinaryOp::LogicalAnd => match literal_truthiness(&bin.left) {
                Some(true) => Some((*bin.right).clone()),
                Some(false) => Some((*bin.left).clone()),
                None => None,
            },
            BinaryOp::LogicalOr => match literal_truthiness(&bin.left) {
                Some(true) => Some((*bin.left).clone()),
                Some(false) => Some((*bin.right).clone()),
                None => None,
            },
            BinaryOp::NullishCoalescing => match &*bin.left {
                Expr::Lit(Lit::Null(_)) => Some((*bin.right).clone()),
                Expr::Lit(_) => Some((*bin.left).clone()),
                _ => None,
            },
            _ => {
                let (left, right) = (as_lit(&bin.left)?, as_lit(&bin.right)?);
                self.fold_lit_bin(bin.op, left, right)
            }
        }
    }

    fn fold_lit_bin(&self, op: BinaryOp, left: &Lit, right: &Lit) -> Option<Expr> {
        if let (Lit::Num(l), Lit::Num(r)) = (left, right) {
            let value = match op {
                BinaryOp::Add => Some(l.value + r.value),
                BinaryOp::Sub => Some(l.value - r.value),
                BinaryOp::Mul => Some(l.value * r.value),
                BinaryOp::Div => Some(l.value / r.value),
                BinaryOp::Mod => Some(l.value % r.value),
                _ => None,
            };
            if let Some(value) = value {
                return value.is_finite().then(|| num(value));
            }
            let compared = match op {
                BinaryOp::Lt => Some(l.value < r.value),
                BinaryOp::LtEq => Some(l.value <= r.value),
                BinaryOp::Gt => Some(l.value > r.value),
                BinaryOp::GtEq => Some(l.value >= r.value),
                _ => None,
            };
            if let Some(compared) = compared {
                return Some(bool_lit(compared));
            }
        }
        if let (Lit::Str(l), Lit::Str(r)) = (left, right) {
            if op == BinaryOp::Add {
                return Some(Expr::Lit(Lit::Str(Str {
                    span: DUMMY_SP,
                    value: format!("{}{}", l.value, r.value).into(),
                    raw: None,
                })));
            }
        }
        // Equality folds only for same-type operands; coercing comparisons
        // stay in the output.
        let equal = match (left, right) {
            (Lit::Num(l), Lit::Num(r)) => Some(l.value == r.value),
            (Lit::Str(l), Lit::Str(r)) => Some(l.value == r.value),
            (Lit::Bool(l), Lit::Bool(r)) => Some(l.value == r.value),
            (Lit::Null(_), Lit::Null(_)) => Some(true),
            _ => None,
        }?;
        match op {
            BinaryOp::EqEq | BinaryOp::EqEqEq => Some(bool_lit(equal)),
            BinaryOp::NotEq | BinaryOp::NotEqEq => Some(bool_lit(!equal)),
            _ => None,
        }
    }

    fn fold_unary(&self, unary: &UnaryExpr) -> Option<Expr> {
        let lit = as_lit(&unary.arg)?;
        match unary.op {
            UnaryOp::Bang => literal_truthiness(&unary.arg).map(|t| bool_lit(!t)),
            UnaryOp::Minus => match lit {
                Lit::Num(n) => Some(num(-n.value)),
                _ => None,
            },
            UnaryOp::Plus => match lit {
                Lit::Num(n) => Some(num(n.value)),
                Lit::Bool(b) => Some(num(if b.value { 1.0 } else { 0.0 })),
                _ => None,
            },
            UnaryOp::TypeOf => {
                let name = match lit {
                    Lit::Num(_) => "number",
                    Lit::Str(_) => "string",
                    Lit::Bool(_) => "boolean",
                    Lit::Null(_) => "object",
                    _ => return None,
                };
                Some(Expr::Lit(Lit::Str(Str {
                    span: DUMMY_SP,
                    value: name.into(),
                    raw: None,
                })))
            }
            _ => None,
        }
    }
}

impl VisitMut for ConstantFolding {
    fn visit_mut_expr(&mut self, n: &mut Expr) {
        n.visit_mut_children_with(self);
        self.fold_expr(n);
    }

    fn visit_mut_stmt(&mut self, n: &mut Stmt) {
        n.visit_mut_children_with(self);
        if let Stmt::If(if_stmt) = n {
            match literal_truthiness(&if_stmt.test) {
                Some(true) => *n = (*if_stmt.cons).clone(),
                Some(false) => {
                    *n = match if_stmt.alt.take() {
                        Some(alt) => *alt,
                        None => Stmt::Empty(EmptyStmt { span: DUMMY_SP }),
                    };
                }
                None => {}
            }
        }
    }

    fn visit_mut_stmts(&mut self, n: &mut Vec<Stmt>) {
        n.visit_mut_children_with(self);
        n.retain(|stmt| !matches!(stmt, Stmt::Empty(_)));
    }

    fn visit_mut_module_items(&mut self, n: &mut Vec<ModuleItem>) {
        n.visit_mut_children_with(self);
        n.retain(|item| !matches!(item, ModuleItem::Stmt(Stmt::Empty(_))));
    }
}

fn as_lit(expr: &Expr) -> Option<&Lit> {
    match expr {
        Expr::Lit(lit) => Some(lit),
        _ => None,
    }
}

fn literal_truthiness(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Lit(Lit::Bool(b)) => Some(b.value),
        Expr::Lit(Lit::Num(n)) => Some(n.value != 0.0 && !n.value.is_nan()),
        Expr::Lit(Lit::Str(s)) => Some(!s.value.is_empty()),
        Expr::Lit(Lit::Null(_)) => Some(false),
        _ => None,
    }
}

fn num(value: f64) -> Expr {
    Expr::Lit(Lit::Num(Number {
        span: DUMMY_SP,
        value,
        raw: None,
    }))
}

fn bool_lit(value: bool) -> Expr {
    Expr::Lit(Lit::Bool(Bool {
        span: DUMMY_SP,
        value,
    }))
}
