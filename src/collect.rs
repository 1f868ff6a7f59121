use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use swc_core::common::comments::Comments;
use swc_core::common::sync::Lrc;
use swc_core::common::{SourceMap, SourceMapper, Span, Spanned, SyntaxContext, DUMMY_SP};
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

use crate::config::DynamicDepsPolicy;
use crate::wrap::{ident, REQUIRE_PARAM};

/// Comment markers that opt a dynamic `import()` out of bundling. The webpack
/// spelling is honored because many libraries ship it.
const IGNORE_COMMENTS: [&str; 2] = ["@quickpack-ignore", "webpackIgnore: true"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceSpan {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// One collected module dependency, in call-site order. The position of an
/// entry in the dependency list is its dependency-map index; downstream
/// resolution depends on that ordering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dependency {
    /// Module specifier exactly as written. Dedup happens on this text, never
    /// on resolved paths: two spellings of one module are two entries.
    pub name: String,
    pub is_async: bool,
    /// True while every call site for this specifier is a prefetch; cleared
    /// as soon as a real `import()` site shows up.
    pub is_prefetch_only: bool,
    pub loc: Option<SourceSpan>,
}

#[derive(Debug)]
pub struct Collected {
    pub dependencies: Vec<Dependency>,
    pub dependency_map_name: String,
}

/// A dependency call whose shape matched but whose arguments did not.
#[derive(Debug)]
pub struct InvalidRequireCall {
    pub line: usize,
    pub snippet: String,
    pub detail: Option<&'static str>,
}

impl fmt::Display for InvalidRequireCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid call at line {}: {}", self.line, self.snippet)?;
        if let Some(detail) = self.detail {
            write!(f, "\n{detail}")?;
        }
        Ok(())
    }
}

pub struct CollectOptions<'a> {
    /// Keep the original specifier string as a trailing argument on rewritten
    /// calls (dev builds only; prod output drops them).
    pub keep_require_names: bool,
    pub dynamic_deps_policy: DynamicDepsPolicy,
    /// Whether this file lives under a vendored-dependency path, which is the
    /// only place `RejectUnlessInPackage` tolerates dynamic requires.
    pub in_vendored_path: bool,
    /// Specifier of the runtime helper backing `import()`/prefetch rewrites.
    pub async_require_module_path: &'a str,
    /// Dependency-map identifier to synthesize references to.
    pub dependency_map_name: String,
    /// Callee names besides `require` that register a sync dependency; the
    /// lowering pass's import helpers land here.
    pub inlineable_calls: Vec<String>,
    /// Syntax context the resolver gave unbound identifiers. A `require` that
    /// does not carry it is a local binding, not the runtime's.
    pub unresolved_ctxt: SyntaxContext,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum DepGroup {
    Sync,
    Async,
}

#[derive(Clone, Copy)]
enum AsyncKind {
    Import,
    Prefetch,
}

/// Walks a resolver-marked tree once, depth-first and left-to-right,
/// registering every import-like call at first visitation and replacing the
/// call site with a dependency-map reference. Index assignment is therefore a
/// pure function of the final tree traversal.
pub struct DependencyCollector<'a> {
    cm: &'a Lrc<SourceMap>,
    comments: Option<&'a dyn Comments>,
    opts: CollectOptions<'a>,
    dependencies: Vec<Dependency>,
    index_by_key: HashMap<(String, DepGroup), usize>,
    async_helper_index: Option<usize>,
    error: Option<InvalidRequireCall>,
}

impl<'a> DependencyCollector<'a> {
    pub fn new(
        cm: &'a Lrc<SourceMap>,
        comments: Option<&'a dyn Comments>,
        opts: CollectOptions<'a>,
    ) -> Self {
        Self {
            cm,
            comments,
            opts,
            dependencies: Vec::new(),
            index_by_key: HashMap::new(),
            async_helper_index: None,
            error: None,
        }
    }

    pub fn run(mut self, program: &mut Program) -> Result<Collected, InvalidRequireCall> {
        program.visit_mut_with(&mut self);
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(Collected {
            dependencies: self.dependencies,
            dependency_map_name: self.opts.dependency_map_name,
        })
    }

    fn source_span(&self, span: Span) -> Option<SourceSpan> {
        if span.is_dummy() {
            return None;
        }
        let lo = self.cm.lookup_char_pos(span.lo());
        let hi = self.cm.lookup_char_pos(span.hi());
        Some(SourceSpan {
            start_line: lo.line as u32,
            start_column: lo.col.0 as u32,
            end_line: hi.line as u32,
            end_column: hi.col.0 as u32,
        })
    }

    fn invalid_call(&self, span: Span, detail: Option<&'static str>) -> InvalidRequireCall {
        let line = if span.is_dummy() {
            0
        } else {
            self.cm.lookup_char_pos(span.lo()).line
        };
        let snippet = self
            .cm
            .span_to_snippet(span)
            .unwrap_or_else(|_| "<expression>".to_string());
        InvalidRequireCall {
            line,
            snippet,
            detail,
        }
    }

    /// Registers a dependency, reusing the index of an earlier entry with the
    /// same specifier text and sync/async group. Returns the dependency-map
    /// index.
    fn register(&mut self, name: &str, kind: Option<AsyncKind>, span: Span) -> usize {
        let group = match kind {
            None => DepGroup::Sync,
            Some(_) => DepGroup::Async,
        };
        let key = (name.to_string(), group);
        if let Some(&index) = self.index_by_key.get(&key) {
            if let Some(AsyncKind::Import) = kind {
                self.dependencies[index].is_prefetch_only = false;
            }
            return index;
        }
        let index = self.dependencies.len();
        self.dependencies.push(Dependency {
            name: name.to_string(),
            is_async: kind.is_some(),
            is_prefetch_only: matches!(kind, Some(AsyncKind::Prefetch)),
            loc: self.source_span(span),
        });
        self.index_by_key.insert(key, index);
        index
    }

    /// Index of the async-require helper module, registered as an ordinary
    /// sync dependency the first time it is needed.
    fn async_helper(&mut self) -> usize {
        match self.async_helper_index {
            Some(index) => index,
            None => {
                let index = self.register(
                    &self.opts.async_require_module_path.to_string(),
                    None,
                    DUMMY_SP,
                );
                self.async_helper_index = Some(index);
                index
            }
        }
    }

    fn is_unresolved(&self, id: &Ident) -> bool {
        id.ctxt == self.opts.unresolved_ctxt
    }

    /// The callee name, if this is a bare call to a global identifier.
    fn global_callee_name(&self, call: &CallExpr) -> Option<String> {
        match &call.callee {
            Callee::Expr(expr) => match &**expr {
                Expr::Ident(id) if self.is_unresolved(id) => Some(id.sym.to_string()),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_dependency_call_name(&self, name: &str) -> bool {
        name == "require" || self.opts.inlineable_calls.iter().any(|c| c == name)
    }

    /// Extracts the specifier from a call that already matched a dependency
    /// shape. `Ok(None)` means the argument exists but is not a literal (the
    /// dynamic case); a wrong arity is an immediate shape violation.
    fn literal_specifier(&self, call: &CallExpr) -> Result<Option<String>, InvalidRequireCall> {
        if call.args.len() != 1 || call.args[0].spread.is_some() {
            return Err(self.invalid_call(call.span, None));
        }
        Ok(match &*call.args[0].expr {
            Expr::Lit(Lit::Str(s)) => Some(s.value.to_string()),
            Expr::Tpl(tpl) if tpl.exprs.is_empty() && tpl.quasis.len() == 1 => tpl.quasis[0]
                .cooked
                .as_ref()
                .map(|cooked| cooked.to_string()),
            _ => None,
        })
    }

    fn has_ignore_comment(&self, call: &CallExpr) -> bool {
        let Some(comments) = self.comments else {
            return false;
        };
        let mut positions = vec![call.span.lo];
        if let Some(arg) = call.args.first() {
            positions.push(arg.expr.span_lo());
        }
        positions.into_iter().any(|pos| {
            comments
                .get_leading(pos)
                .map(|list| {
                    list.iter().any(|comment| {
                        IGNORE_COMMENTS
                            .iter()
                            .any(|marker| comment.text.contains(marker))
                    })
                })
                .unwrap_or(false)
        })
    }

    // ---------- synthesized call shapes ----------

    fn dep_map_index_expr(&self, index: usize) -> Expr {
        Expr::Member(MemberExpr {
            span: DUMMY_SP,
            obj: Box::new(Expr::Ident(ident(&self.opts.dependency_map_name))),
            prop: MemberProp::Computed(ComputedPropName {
                span: DUMMY_SP,
                expr: Box::new(Expr::Lit(Lit::Num(Number {
                    span: DUMMY_SP,
                    value: index as f64,
                    raw: None,
                }))),
            }),
        })
    }

    fn dep_map_paths_expr(&self) -> Expr {
        Expr::Member(MemberExpr {
            span: DUMMY_SP,
            obj: Box::new(Expr::Ident(ident(&self.opts.dependency_map_name))),
            prop: MemberProp::Ident(IdentName::new("paths".into(), DUMMY_SP)),
        })
    }

    fn name_literal(&self, name: &str) -> Expr {
        Expr::Lit(Lit::Str(Str {
            span: DUMMY_SP,
            value: name.into(),
            raw: None,
        }))
    }

    /// Builds `REQUIRE(depMap[helper], "asyncRequire")`, the loader the async
    /// and prefetch rewrites call into.
    fn async_require_expr(&mut self) -> Expr {
        let helper_index = self.async_helper();
        let mut args = vec![ExprOrSpread {
            spread: None,
            expr: Box::new(self.dep_map_index_expr(helper_index)),
        }];
        if self.opts.keep_require_names {
            args.push(ExprOrSpread {
                spread: None,
                expr: Box::new(self.name_literal(&self.opts.async_require_module_path.to_string())),
            });
        }
        Expr::Call(CallExpr {
            span: DUMMY_SP,
            ctxt: SyntaxContext::empty(),
            callee: Callee::Expr(Box::new(Expr::Ident(ident(REQUIRE_PARAM)))),
            args,
            type_args: None,
        })
    }

    fn async_call_args(&self, index: usize, name: &str) -> Vec<ExprOrSpread> {
        let mut args = vec![
            ExprOrSpread {
                spread: None,
                expr: Box::new(self.dep_map_index_expr(index)),
            },
            ExprOrSpread {
                spread: None,
                expr: Box::new(self.dep_map_paths_expr()),
            },
        ];
        if self.opts.keep_require_names {
            args.push(ExprOrSpread {
                spread: None,
                expr: Box::new(self.name_literal(name)),
            });
        }
        args
    }

    /// `(function (line) { throw new Error('Dynamic require defined at line '
    /// + line + '; not supported'); })(LINE)`, the runtime stand-in for a
    /// dynamic require tolerated inside a vendored path.
    fn dynamic_require_throw(&self, span: Span) -> Expr {
        let line = if span.is_dummy() {
            0
        } else {
            self.cm.lookup_char_pos(span.lo()).line
        };
        let message = Expr::Bin(BinExpr {
            span: DUMMY_SP,
            op: BinaryOp::Add,
            left: Box::new(Expr::Bin(BinExpr {
                span: DUMMY_SP,
                op: BinaryOp::Add,
                left: Box::new(self.name_literal("Dynamic require defined at line ")),
                right: Box::new(Expr::Ident(ident("line"))),
            })),
            right: Box::new(self.name_literal("; not supported")),
        });
        let throw_stmt = Stmt::Throw(ThrowStmt {
            span: DUMMY_SP,
            arg: Box::new(Expr::New(NewExpr {
                span: DUMMY_SP,
                ctxt: SyntaxContext::empty(),
                callee: Box::new(Expr::Ident(ident("Error"))),
                args: Some(vec![ExprOrSpread {
                    spread: None,
                    expr: Box::new(message),
                }]),
                type_args: None,
            })),
        });
        Expr::Call(CallExpr {
            span: DUMMY_SP,
            ctxt: SyntaxContext::empty(),
            callee: Callee::Expr(Box::new(Expr::Fn(FnExpr {
                ident: None,
                function: Box::new(Function {
                    params: vec![Param {
                        span: DUMMY_SP,
                        decorators: vec![],
                        pat: Pat::Ident(BindingIdent {
                            id: ident("line"),
                            type_ann: None,
                        }),
                    }],
                    decorators: vec![],
                    span: DUMMY_SP,
                    ctxt: SyntaxContext::empty(),
                    body: Some(BlockStmt {
                        span: DUMMY_SP,
                        ctxt: SyntaxContext::empty(),
                        stmts: vec![throw_stmt],
                    }),
                    is_generator: false,
                    is_async: false,
                    type_params: None,
                    return_type: None,
                }),
            }))),
            args: vec![ExprOrSpread {
                spread: None,
                expr: Box::new(Expr::Lit(Lit::Num(Number {
                    span: DUMMY_SP,
                    value: line as f64,
                    raw: None,
                }))),
            }],
            type_args: None,
        })
    }

    // ---------- per-shape handlers ----------

    /// Handles a dynamic (non-literal) argument per policy. Returns the
    /// replacement expression when the pattern is tolerated.
    fn handle_dynamic(&mut self, span: Span) -> Option<Expr> {
        let tolerated = matches!(
            self.opts.dynamic_deps_policy,
            DynamicDepsPolicy::RejectUnlessInPackage
        ) && self.opts.in_vendored_path;
        if tolerated {
            return Some(self.dynamic_require_throw(span));
        }
        if self.error.is_none() {
            self.error = Some(self.invalid_call(span, None));
        }
        None
    }

    /// Sync `require('x')` (or an inlineable helper call): rewrite the callee
    /// to the runtime require parameter and the argument to a dependency-map
    /// reference. The original callee span is kept so the mapping still points
    /// at the user's call.
    fn rewrite_sync_call(&mut self, call: &mut CallExpr, callee_name: &str) -> bool {
        let name = match self.literal_specifier(call) {
            Ok(Some(name)) => name,
            Ok(None) => {
                if let Some(replacement) = self.handle_dynamic(call.span) {
                    *call = match replacement {
                        Expr::Call(c) => c,
                        // handle_dynamic only builds calls
                        _ => return false,
                    };
                }
                return false;
            }
            Err(err) => {
                self.error.get_or_insert(err);
                return false;
            }
        };

        let index = self.register(&name, None, call.span);
        let callee_span = match &call.callee {
            Callee::Expr(e) => e.span(),
            _ => DUMMY_SP,
        };
        // Import helpers keep their own callee name; plain require is renamed
        // to the factory's require parameter.
        let new_callee = if callee_name == "require" {
            REQUIRE_PARAM
        } else {
            callee_name
        };
        call.callee = Callee::Expr(Box::new(Expr::Ident(Ident::new(
            new_callee.into(),
            callee_span,
            SyntaxContext::empty(),
        ))));
        let mut args = vec![ExprOrSpread {
            spread: None,
            expr: Box::new(self.dep_map_index_expr(index)),
        }];
        if self.opts.keep_require_names {
            args.push(ExprOrSpread {
                spread: None,
                expr: Box::new(self.name_literal(&name)),
            });
        }
        call.args = args;
        true
    }

    /// `import('x')` → `REQUIRE(depMap[k], ...)(depMap[i], depMap.paths, ...)`
    /// and `__prefetchImport('x')` → same with a `.prefetch` member call.
    fn rewrite_async_call(&mut self, expr: &mut Expr, kind: AsyncKind) {
        let Expr::Call(call) = expr else { return };
        let name = match self.literal_specifier(call) {
            Ok(Some(name)) => name,
            Ok(None) => {
                if let Some(replacement) = self.handle_dynamic(call.span) {
                    *expr = replacement;
                }
                return;
            }
            Err(err) => {
                self.error.get_or_insert(err);
                return;
            }
        };
        let span = call.span;
        let index = self.register(&name, Some(kind), span);
        let loader = self.async_require_expr();
        let callee: Expr = match kind {
            AsyncKind::Import => loader,
            AsyncKind::Prefetch => Expr::Member(MemberExpr {
                span: DUMMY_SP,
                obj: Box::new(loader),
                prop: MemberProp::Ident(IdentName::new("prefetch".into(), DUMMY_SP)),
            }),
        };
        *expr = Expr::Call(CallExpr {
            // Keep the original call span for the mapping.
            span,
            ctxt: SyntaxContext::empty(),
            callee: Callee::Expr(Box::new(callee)),
            args: self.async_call_args(index, &name),
            type_args: None,
        });
    }
}

impl<'a> VisitMut for DependencyCollector<'a> {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if self.error.is_some() {
            return;
        }
        if let Expr::Call(call) = expr {
            if matches!(call.callee, Callee::Import(_)) {
                if self.has_ignore_comment(call) {
                    tracing::debug!(
                        line = self.source_span(call.span).map(|s| s.start_line),
                        "skipping ignored dynamic import"
                    );
                    return;
                }
                self.rewrite_async_call(expr, AsyncKind::Import);
                return;
            }
            if let Some(name) = self.global_callee_name(call) {
                if name == "__prefetchImport" {
                    self.rewrite_async_call(expr, AsyncKind::Prefetch);
                    return;
                }
                if self.is_dependency_call_name(&name) {
                    self.rewrite_sync_call(call, &name);
                    return;
                }
            }
        }
        expr.visit_mut_children_with(self);
    }

    // Static import/export declarations register dependencies without a
    // rewrite. After ESM lowering none remain; these arms matter for callers
    // feeding pre-lowered trees straight into the collector.
    fn visit_mut_import_decl(&mut self, n: &mut ImportDecl) {
        self.register(&n.src.value.to_string(), None, n.span);
        n.visit_mut_children_with(self);
    }

    fn visit_mut_named_export(&mut self, n: &mut NamedExport) {
        if let Some(src) = &n.src {
            self.register(&src.value.to_string(), None, n.span);
        }
        n.visit_mut_children_with(self);
    }

    fn visit_mut_export_all(&mut self, n: &mut ExportAll) {
        self.register(&n.src.value.to_string(), None, n.span);
        n.visit_mut_children_with(self);
    }
}
