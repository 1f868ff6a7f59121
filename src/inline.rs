use std::collections::{HashMap, HashSet};

use swc_core::ecma::atoms::Atom;
use swc_core::common::SyntaxContext;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use crate::collect::Dependency;
use crate::wrap::REQUIRE_PARAM;

type BindingId = (Atom, SyntaxContext);

/// Replaces top-level `var x = REQUIRE(depMap[i], ...)` bindings with the
/// require call at every use site, then drops the hoisted declaration. Runs
/// after dependency collection, so the initializers it recognizes are the
/// collector's rewritten calls.
///
/// Bindings that are ever reassigned, and specifiers listed in
/// `non_inlined`, keep their hoisted form.
pub fn inline_requires(program: &mut Program, deps: &[Dependency], non_inlined: &[String]) {
    let mut candidates: HashMap<BindingId, Expr> = HashMap::new();
    for stmt in top_level_stmts(program) {
        let Stmt::Decl(Decl::Var(var)) = stmt else {
            continue;
        };
        for declarator in &var.decls {
            let Some(name) = declarator.name.as_ident() else {
                continue;
            };
            let Some(init) = declarator.init.as_deref() else {
                continue;
            };
            if let Some(specifier) = require_specifier(init, deps) {
                if non_inlined.iter().any(|n| n == &specifier) {
                    continue;
                }
                candidates.insert((name.id.sym.clone(), name.id.ctxt), init.clone());
            }
        }
    }
    if candidates.is_empty() {
        return;
    }

    let mut reassigned = ReassignmentFinder::default();
    program.visit_with(&mut reassigned);
    for id in reassigned.ids {
        candidates.remove(&id);
    }
    if candidates.is_empty() {
        return;
    }

    let inlined: HashSet<BindingId> = candidates.keys().cloned().collect();
    let mut inliner = Inliner {
        candidates: &candidates,
    };
    program.visit_mut_with(&mut inliner);
    remove_inlined_decls(program, &inlined);
}

fn top_level_stmts(program: &Program) -> Vec<&Stmt> {
    match program {
        Program::Script(script) => script.body.iter().collect(),
        Program::Module(module) => module
            .body
            .iter()
            .filter_map(|item| match item {
                ModuleItem::Stmt(stmt) => Some(stmt),
                ModuleItem::ModuleDecl(_) => None,
            })
            .collect(),
    }
}

/// The dependency specifier behind an initializer, when the initializer is a
/// rewritten require call or a member read off one.
fn require_specifier(init: &Expr, deps: &[Dependency]) -> Option<String> {
    match init {
        Expr::Call(call) => call_specifier(call, deps),
        Expr::Member(member) => match &*member.obj {
            Expr::Call(call) => call_specifier(call, deps),
            _ => None,
        },
        _ => None,
    }
}

fn call_specifier(call: &CallExpr, deps: &[Dependency]) -> Option<String> {
    match &call.callee {
        Callee::Expr(callee) => match &**callee {
            Expr::Ident(id) if id.sym == REQUIRE_PARAM => {}
            _ => return None,
        },
        _ => return None,
    }
    // Prod output drops the trailing name literal; fall back to looking the
    // map index up in the dependency list.
    if let Some(ExprOrSpread { spread: None, expr }) = call.args.get(1) {
        if let Expr::Lit(Lit::Str(s)) = &**expr {
            return Some(s.value.to_string());
        }
    }
    let first = call.args.first()?;
    if let Expr::Member(member) = &*first.expr {
        if let MemberProp::Computed(computed) = &member.prop {
            if let Expr::Lit(Lit::Num(num)) = &*computed.expr {
                return deps.get(num.value as usize).map(|d| d.name.clone());
            }
        }
    }
    None
}

#[derive(Default)]
struct ReassignmentFinder {
    ids: Vec<BindingId>,
}

impl ReassignmentFinder {
    fn mark_pat(&mut self, pat: &Pat) {
        match pat {
            Pat::Ident(id) => self.ids.push((id.id.sym.clone(), id.id.ctxt)),
            Pat::Expr(expr) => {
                if let Expr::Ident(id) = &**expr {
                    self.ids.push((id.sym.clone(), id.ctxt));
                }
            }
            Pat::Array(arr) => {
                for elem in arr.elems.iter().flatten() {
                    self.mark_pat(elem);
                }
            }
            Pat::Object(obj) => {
                for prop in &obj.props {
                    match prop {
                        ObjectPatProp::KeyValue(kv) => self.mark_pat(&kv.value),
                        ObjectPatProp::Assign(assign) => self
                            .ids
                            .push((assign.key.id.sym.clone(), assign.key.id.ctxt)),
                        ObjectPatProp::Rest(rest) => self.mark_pat(&rest.arg),
                    }
                }
            }
            Pat::Rest(rest) => self.mark_pat(&rest.arg),
            Pat::Assign(assign) => self.mark_pat(&assign.left),
            Pat::Invalid(_) => {}
        }
    }

    fn mark_for_head(&mut self, head: &ForHead) {
        if let ForHead::Pat(pat) = head {
            self.mark_pat(pat);
        }
    }
}

impl Visit for ReassignmentFinder {
    fn visit_assign_expr(&mut self, n: &AssignExpr) {
        match &n.left {
            AssignTarget::Simple(SimpleAssignTarget::Ident(id)) => {
                self.ids.push((id.id.sym.clone(), id.id.ctxt));
            }
            AssignTarget::Pat(pat) => match pat {
                AssignTargetPat::Array(arr) => {
                    for elem in arr.elems.iter().flatten() {
                        self.mark_pat(elem);
                    }
                }
                AssignTargetPat::Object(obj) => {
                    for prop in &obj.props {
                        match prop {
                            ObjectPatProp::KeyValue(kv) => self.mark_pat(&kv.value),
                            ObjectPatProp::Assign(assign) => self
                                .ids
                                .push((assign.key.id.sym.clone(), assign.key.id.ctxt)),
                            ObjectPatProp::Rest(rest) => self.mark_pat(&rest.arg),
                        }
                    }
                }
                AssignTargetPat::Invalid(_) => {}
            },
            _ => {}
        }
        n.visit_children_with(self);
    }

    fn visit_update_expr(&mut self, n: &UpdateExpr) {
        if let Expr::Ident(id) = &*n.arg {
            self.ids.push((id.sym.clone(), id.ctxt));
        }
        n.visit_children_with(self);
    }

    fn visit_for_in_stmt(&mut self, n: &ForInStmt) {
        self.mark_for_head(&n.left);
        n.visit_children_with(self);
    }

    fn visit_for_of_stmt(&mut self, n: &ForOfStmt) {
        self.mark_for_head(&n.left);
        n.visit_children_with(self);
    }
}

struct Inliner<'a> {
    candidates: &'a HashMap<BindingId, Expr>,
}

impl<'a> VisitMut for Inliner<'a> {
    fn visit_mut_expr(&mut self, n: &mut Expr) {
        if let Expr::Ident(id) = n {
            if let Some(init) = self.candidates.get(&(id.sym.clone(), id.ctxt)) {
                *n = init.clone();
                return;
            }
        }
        n.visit_mut_children_with(self);
    }

    fn visit_mut_prop(&mut self, n: &mut Prop) {
        if let Prop::Shorthand(id) = n {
            if let Some(init) = self.candidates.get(&(id.sym.clone(), id.ctxt)) {
                *n = Prop::KeyValue(KeyValueProp {
                    key: PropName::Ident(IdentName::new(id.sym.clone(), id.span)),
                    value: Box::new(init.clone()),
                });
                return;
            }
        }
        n.visit_mut_children_with(self);
    }
}

fn remove_inlined_decls(program: &mut Program, inlined: &HashSet<BindingId>) {
    let retain_stmt = |stmt: &mut Stmt| -> bool {
        let Stmt::Decl(Decl::Var(var)) = stmt else {
            return true;
        };
        var.decls.retain(|declarator| {
            declarator
                .name
                .as_ident()
                .map(|name| !inlined.contains(&(name.id.sym.clone(), name.id.ctxt)))
                .unwrap_or(true)
        });
        !var.decls.is_empty()
    };
    match program {
        Program::Script(script) => script.body.retain_mut(retain_stmt),
        Program::Module(module) => module.body.retain_mut(|item| match item {
            ModuleItem::Stmt(stmt) => retain_stmt(stmt),
            ModuleItem::ModuleDecl(_) => true,
        }),
    }
}
