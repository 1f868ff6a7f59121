use swc_core::common::{SyntaxContext, DUMMY_SP};
use swc_core::ecma::ast::*;

use crate::wrap::{ident, EXPORTS_PARAM, IMPORT_ALL_PARAM, IMPORT_DEFAULT_PARAM};

/// What the lowering pass did to the tree. The caller uses `has_exports` to
/// decide whether to mark the module with an `__esModule` brand.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoweringOutcome {
    pub lowered: bool,
    pub has_exports: bool,
}

pub fn has_esm_syntax(program: &Program) -> bool {
    match program {
        Program::Module(module) => module
            .body
            .iter()
            .any(|item| matches!(item, ModuleItem::ModuleDecl(_))),
        Program::Script(_) => false,
    }
}

/// Rewrites top-level `import`/`export` declarations into require calls and
/// `exports` assignments, so the module body can live inside a factory
/// function. Local binding names are kept, which means references elsewhere in
/// the body need no rewriting.
///
/// With `import_helpers` set, default and namespace imports go through the
/// dedicated interop helpers; otherwise they read `.default` off (or take the
/// whole of) a plain require result.
pub struct ImportExportLowering {
    /// Context to stamp on synthesized `require` and helper callees, so the
    /// dependency collector sees them as unbound globals.
    unresolved_ctxt: SyntaxContext,
    import_helpers: bool,
}

impl ImportExportLowering {
    pub fn new(unresolved_ctxt: SyntaxContext, import_helpers: bool) -> Self {
        Self {
            unresolved_ctxt,
            import_helpers,
        }
    }

    pub fn lower(&self, program: &mut Program) -> LoweringOutcome {
        let Program::Module(module) = program else {
            return LoweringOutcome::default();
        };
        let mut outcome = LoweringOutcome::default();
        let body = std::mem::take(&mut module.body);
        let mut out: Vec<ModuleItem> = Vec::with_capacity(body.len());

        for item in body {
            match item {
                ModuleItem::Stmt(stmt) => out.push(ModuleItem::Stmt(stmt)),
                ModuleItem::ModuleDecl(decl) => {
                    outcome.lowered = true;
                    self.lower_decl(decl, &mut out, &mut outcome);
                }
            }
        }

        if outcome.has_exports {
            out.insert(0, ModuleItem::Stmt(es_module_brand()));
        }
        if outcome.lowered {
            out.insert(0, ModuleItem::Stmt(use_strict_directive()));
        }
        module.body = out;
        outcome
    }

    fn lower_decl(&self, decl: ModuleDecl, out: &mut Vec<ModuleItem>, outcome: &mut LoweringOutcome) {
        match decl {
            ModuleDecl::Import(import) => self.lower_import(import, out),
            ModuleDecl::ExportDecl(export) => {
                outcome.has_exports = true;
                let names = decl_bound_names(&export.decl);
                out.push(ModuleItem::Stmt(Stmt::Decl(export.decl)));
                for name in names {
                    out.push(ModuleItem::Stmt(export_assign(
                        &name,
                        Expr::Ident(ident(&name)),
                    )));
                }
            }
            ModuleDecl::ExportNamed(named) => {
                outcome.has_exports = true;
                self.lower_named_export(named, out);
            }
            ModuleDecl::ExportDefaultDecl(default_decl) => {
                outcome.has_exports = true;
                self.lower_default_decl(default_decl, out);
            }
            ModuleDecl::ExportDefaultExpr(default_expr) => {
                outcome.has_exports = true;
                out.push(ModuleItem::Stmt(export_assign("default", *default_expr.expr)));
            }
            ModuleDecl::ExportAll(export_all) => {
                outcome.has_exports = true;
                out.push(ModuleItem::Stmt(
                    self.export_star(&export_all.src.value),
                ));
            }
            // TypeScript-only surfaces never reach this pass.
            ModuleDecl::TsImportEquals(_)
            | ModuleDecl::TsExportAssignment(_)
            | ModuleDecl::TsNamespaceExport(_) => {}
        }
    }

    fn lower_import(&self, import: ImportDecl, out: &mut Vec<ModuleItem>) {
        let src = import.src.value.clone();
        if import.specifiers.is_empty() {
            out.push(ModuleItem::Stmt(Stmt::Expr(ExprStmt {
                span: DUMMY_SP,
                expr: Box::new(self.require_call(&src)),
            })));
            return;
        }
        for specifier in import.specifiers {
            let (name, init) = match specifier {
                ImportSpecifier::Default(default) => {
                    (default.local, self.import_default(&src))
                }
                ImportSpecifier::Namespace(ns) => (ns.local, self.import_all(&src)),
                ImportSpecifier::Named(named) => {
                    let imported = match &named.imported {
                        Some(ModuleExportName::Ident(id)) => id.sym.to_string(),
                        Some(ModuleExportName::Str(s)) => s.value.to_string(),
                        None => named.local.sym.to_string(),
                    };
                    (named.local, member_of(self.require_call(&src), &imported))
                }
            };
            out.push(ModuleItem::Stmt(var_stmt(name, init)));
        }
    }

    fn lower_named_export(&self, named: NamedExport, out: &mut Vec<ModuleItem>) {
        for specifier in named.specifiers {
            match specifier {
                ExportSpecifier::Named(spec) => {
                    let orig = export_name(&spec.orig);
                    let exported = spec
                        .exported
                        .as_ref()
                        .map(export_name)
                        .unwrap_or_else(|| orig.clone());
                    let value = match &named.src {
                        Some(src) => member_of(self.require_call(&src.value), &orig),
                        None => Expr::Ident(ident(&orig)),
                    };
                    out.push(ModuleItem::Stmt(export_assign(&exported, value)));
                }
                ExportSpecifier::Namespace(spec) => {
                    // `export * as ns from 's'`
                    if let Some(src) = &named.src {
                        out.push(ModuleItem::Stmt(export_assign(
                            &export_name(&spec.name),
                            self.import_all(&src.value),
                        )));
                    }
                }
                ExportSpecifier::Default(spec) => {
                    if let Some(src) = &named.src {
                        out.push(ModuleItem::Stmt(export_assign(
                            spec.exported.sym.as_ref(),
                            member_of(self.require_call(&src.value), "default"),
                        )));
                    }
                }
            }
        }
    }

    fn lower_default_decl(&self, decl: ExportDefaultDecl, out: &mut Vec<ModuleItem>) {
        match decl.decl {
            DefaultDecl::Fn(fn_expr) => match fn_expr.ident.clone() {
                Some(name) => {
                    out.push(ModuleItem::Stmt(Stmt::Decl(Decl::Fn(FnDecl {
                        ident: name.clone(),
                        declare: false,
                        function: fn_expr.function,
                    }))));
                    out.push(ModuleItem::Stmt(export_assign("default", Expr::Ident(name))));
                }
                None => out.push(ModuleItem::Stmt(export_assign("default", Expr::Fn(fn_expr)))),
            },
            DefaultDecl::Class(class_expr) => match class_expr.ident.clone() {
                Some(name) => {
                    out.push(ModuleItem::Stmt(Stmt::Decl(Decl::Class(ClassDecl {
                        ident: name.clone(),
                        declare: false,
                        class: class_expr.class,
                    }))));
                    out.push(ModuleItem::Stmt(export_assign("default", Expr::Ident(name))));
                }
                None => out.push(ModuleItem::Stmt(export_assign(
                    "default",
                    Expr::Class(class_expr),
                ))),
            },
            DefaultDecl::TsInterfaceDecl(_) => {}
        }
    }

    /// `(function(m) { for (var k in m) if (k !== "default" && k !== "__esModule")
    /// exports[k] = m[k]; })(require('s'));`, re-exporting everything except
    /// the default binding and the brand.
    fn export_star(&self, src: &str) -> Stmt {
        let key = ident("k");
        let source = ident("m");
        let excluded = |name: &str| {
            Expr::Bin(BinExpr {
                span: DUMMY_SP,
                op: BinaryOp::NotEqEq,
                left: Box::new(Expr::Ident(key.clone())),
                right: Box::new(str_lit(name)),
            })
        };
        let copy = Stmt::Expr(ExprStmt {
            span: DUMMY_SP,
            expr: Box::new(Expr::Assign(AssignExpr {
                span: DUMMY_SP,
                op: AssignOp::Assign,
                left: AssignTarget::Simple(SimpleAssignTarget::Member(MemberExpr {
                    span: DUMMY_SP,
                    obj: Box::new(Expr::Ident(ident(EXPORTS_PARAM))),
                    prop: MemberProp::Computed(ComputedPropName {
                        span: DUMMY_SP,
                        expr: Box::new(Expr::Ident(key.clone())),
                    }),
                })),
                right: Box::new(Expr::Member(MemberExpr {
                    span: DUMMY_SP,
                    obj: Box::new(Expr::Ident(source.clone())),
                    prop: MemberProp::Computed(ComputedPropName {
                        span: DUMMY_SP,
                        expr: Box::new(Expr::Ident(key.clone())),
                    }),
                })),
            })),
        });
        let guard = Stmt::If(IfStmt {
            span: DUMMY_SP,
            test: Box::new(Expr::Bin(BinExpr {
                span: DUMMY_SP,
                op: BinaryOp::LogicalAnd,
                left: Box::new(excluded("default")),
                right: Box::new(excluded("__esModule")),
            })),
            cons: Box::new(copy),
            alt: None,
        });
        let loop_stmt = Stmt::ForIn(ForInStmt {
            span: DUMMY_SP,
            left: ForHead::VarDecl(Box::new(VarDecl {
                span: DUMMY_SP,
                ctxt: SyntaxContext::empty(),
                kind: VarDeclKind::Var,
                declare: false,
                decls: vec![VarDeclarator {
                    span: DUMMY_SP,
                    name: Pat::Ident(BindingIdent {
                        id: key,
                        type_ann: None,
                    }),
                    init: None,
                    definite: false,
                }],
            })),
            right: Box::new(Expr::Ident(source.clone())),
            body: Box::new(guard),
        });
        Stmt::Expr(ExprStmt {
            span: DUMMY_SP,
            expr: Box::new(Expr::Call(CallExpr {
                span: DUMMY_SP,
                ctxt: SyntaxContext::empty(),
                callee: Callee::Expr(Box::new(Expr::Fn(FnExpr {
                    ident: None,
                    function: Box::new(Function {
                        params: vec![Param {
                            span: DUMMY_SP,
                            decorators: vec![],
                            pat: Pat::Ident(BindingIdent {
                                id: source,
                                type_ann: None,
                            }),
                        }],
                        decorators: vec![],
                        span: DUMMY_SP,
                        ctxt: SyntaxContext::empty(),
                        body: Some(BlockStmt {
                            span: DUMMY_SP,
                            ctxt: SyntaxContext::empty(),
                            stmts: vec![loop_stmt],
                        }),
                        is_generator: false,
                        is_async: false,
                        type_params: None,
                        return_type: None,
                    }),
                }))),
                args: vec![ExprOrSpread {
                    spread: None,
                    expr: Box::new(self.require_call(src)),
                }],
                type_args: None,
            })),
        })
    }

    // ---------- expression builders ----------

    fn unresolved_ident(&self, name: &str) -> Ident {
        Ident::new(name.into(), DUMMY_SP, self.unresolved_ctxt)
    }

    fn require_call(&self, src: &str) -> Expr {
        self.helper_call("require", src)
    }

    fn import_default(&self, src: &str) -> Expr {
        if self.import_helpers {
            self.helper_call(IMPORT_DEFAULT_PARAM, src)
        } else {
            member_of(self.require_call(src), "default")
        }
    }

    fn import_all(&self, src: &str) -> Expr {
        if self.import_helpers {
            self.helper_call(IMPORT_ALL_PARAM, src)
        } else {
            self.require_call(src)
        }
    }

    fn helper_call(&self, callee: &str, src: &str) -> Expr {
        Expr::Call(CallExpr {
            span: DUMMY_SP,
            ctxt: SyntaxContext::empty(),
            callee: Callee::Expr(Box::new(Expr::Ident(self.unresolved_ident(callee)))),
            args: vec![ExprOrSpread {
                spread: None,
                expr: Box::new(str_lit(src)),
            }],
            type_args: None,
        })
    }
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(id) => id.sym.to_string(),
        ModuleExportName::Str(s) => s.value.to_string(),
    }
}

fn str_lit(value: &str) -> Expr {
    Expr::Lit(Lit::Str(Str {
        span: DUMMY_SP,
        value: value.into(),
        raw: None,
    }))
}

fn member_of(obj: Expr, prop: &str) -> Expr {
    Expr::Member(MemberExpr {
        span: DUMMY_SP,
        obj: Box::new(obj),
        prop: MemberProp::Ident(IdentName::new(prop.into(), DUMMY_SP)),
    })
}

fn var_stmt(name: Ident, init: Expr) -> Stmt {
    Stmt::Decl(Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        kind: VarDeclKind::Var,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(BindingIdent {
                id: name,
                type_ann: None,
            }),
            init: Some(Box::new(init)),
            definite: false,
        }],
    })))
}

/// `exports.<name> = <value>;`
fn export_assign(name: &str, value: Expr) -> Stmt {
    Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(Expr::Assign(AssignExpr {
            span: DUMMY_SP,
            op: AssignOp::Assign,
            left: AssignTarget::Simple(SimpleAssignTarget::Member(MemberExpr {
                span: DUMMY_SP,
                obj: Box::new(Expr::Ident(ident(EXPORTS_PARAM))),
                prop: MemberProp::Ident(IdentName::new(name.into(), DUMMY_SP)),
            })),
            right: Box::new(value),
        })),
    })
}

/// `Object.defineProperty(exports, "__esModule", { value: true });`
fn es_module_brand() -> Stmt {
    Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(Expr::Call(CallExpr {
            span: DUMMY_SP,
            ctxt: SyntaxContext::empty(),
            callee: Callee::Expr(Box::new(member_of(Expr::Ident(ident("Object")), "defineProperty"))),
            args: vec![
                ExprOrSpread {
                    spread: None,
                    expr: Box::new(Expr::Ident(ident(EXPORTS_PARAM))),
                },
                ExprOrSpread {
                    spread: None,
                    expr: Box::new(str_lit("__esModule")),
                },
                ExprOrSpread {
                    spread: None,
                    expr: Box::new(Expr::Object(ObjectLit {
                        span: DUMMY_SP,
                        props: vec![PropOrSpread::Prop(Box::new(Prop::KeyValue(KeyValueProp {
                            key: PropName::Ident(IdentName::new("value".into(), DUMMY_SP)),
                            value: Box::new(Expr::Lit(Lit::Bool(Bool {
                                span: DUMMY_SP,
                                value: true,
                            }))),
                        })))],
                    })),
                },
            ],
            type_args: None,
        })),
    })
}

fn use_strict_directive() -> Stmt {
    Stmt::Expr(ExprStmt {
        span: DUMMY_SP,
        expr: Box::new(Expr::Lit(Lit::Str(Str {
            span: DUMMY_SP,
            value: "use strict".into(),
            raw: Some("\"use strict\"".into()),
        }))),
    })
}

/// All identifiers bound by an exported declaration, destructuring included.
fn decl_bound_names(decl: &Decl) -> Vec<String> {
    let mut names = Vec::new();
    match decl {
        Decl::Fn(f) => names.push(f.ident.sym.to_string()),
        Decl::Class(c) => names.push(c.ident.sym.to_string()),
        Decl::Var(var) => {
            for declarator in &var.decls {
                pat_names(&declarator.name, &mut names);
            }
        }
        _ => {}
    }
    names
}

fn pat_names(pat: &Pat, out: &mut Vec<String>) {
    match pat {
        Pat::Ident(id) => out.push(id.id.sym.to_string()),
        Pat::Array(arr) => {
            for elem in arr.elems.iter().flatten() {
                pat_names(elem, out);
            }
        }
        Pat::Object(obj) => {
            for prop in &obj.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => pat_names(&kv.value, out),
                    ObjectPatProp::Assign(assign) => out.push(assign.key.sym.to_string()),
                    ObjectPatProp::Rest(rest) => pat_names(&rest.arg, out),
                }
            }
        }
        Pat::Rest(rest) => pat_names(&rest.arg, out),
        Pat::Assign(assign) => pat_names(&assign.left, out),
        Pat::Invalid(_) | Pat::Expr(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use swc_core::common::sync::Lrc;
    use swc_core::common::SourceMap;

    use super::*;
    use crate::emit;

    fn lower(source: &str, helpers: bool) -> (String, LoweringOutcome) {
        let cm: Lrc<SourceMap> = Default::default();
        let mut program = emit::parse_js(
            &cm,
            std::path::Path::new("test.js"),
            source.to_string(),
            None,
        )
        .unwrap();
        let pass = ImportExportLowering::new(SyntaxContext::empty(), helpers);
        let outcome = pass.lower(&mut program);
        let code = emit::print(&cm, &program, None, false).unwrap().code;
        (code, outcome)
    }

    #[test]
    fn lowers_default_import_to_member_access() {
        let (code, outcome) = lower("import thing from './mod';\nthing();", false);
        assert!(code.contains("var thing = require(\"./mod\").default;"));
        assert!(code.starts_with("\"use strict\""));
        assert!(outcome.lowered);
        assert!(!outcome.has_exports);
    }

    #[test]
    fn lowers_default_import_through_the_helper() {
        let (code, _) = lower("import thing from './mod';", true);
        assert!(code.contains("var thing = _$$_IMPORT_DEFAULT(\"./mod\");"));
    }

    #[test]
    fn lowers_namespace_import_through_the_helper() {
        let (code, _) = lower("import * as everything from './mod';", true);
        assert!(code.contains("var everything = _$$_IMPORT_ALL(\"./mod\");"));
    }

    #[test]
    fn lowers_named_imports_keeping_local_names() {
        let (code, _) = lower("import { a, b as c } from './mod';", false);
        assert!(code.contains("var a = require(\"./mod\").a;"));
        assert!(code.contains("var c = require(\"./mod\").b;"));
    }

    #[test]
    fn side_effect_import_becomes_a_bare_require() {
        let (code, _) = lower("import './setup';", false);
        assert!(code.contains("require(\"./setup\");"));
    }

    #[test]
    fn export_decl_keeps_the_decl_and_assigns() {
        let (code, outcome) = lower("export const value = 1;", false);
        assert!(code.contains("const value = 1;"));
        assert!(code.contains("exports.value = value;"));
        assert!(code.contains("Object.defineProperty(exports, \"__esModule\""));
        assert!(outcome.has_exports);
    }

    #[test]
    fn export_default_function_keeps_its_name() {
        let (code, _) = lower("export default function main() {}", false);
        assert!(code.contains("function main() {}"));
        assert!(code.contains("exports.default = main;"));
    }

    #[test]
    fn export_from_reads_off_the_required_module() {
        let (code, _) = lower("export { orig as renamed } from './mod';", false);
        assert!(code.contains("exports.renamed = require(\"./mod\").orig;"));
    }

    #[test]
    fn export_star_copies_everything_but_default_and_brand() {
        let (code, _) = lower("export * from './mod';", false);
        assert!(code.contains("var k in m"));
        assert!(code.contains("k !== \"default\" && k !== \"__esModule\""));
        assert!(code.contains("exports[k] = m[k]"));
        assert!(code.contains("(require(\"./mod\"))"));
    }

    #[test]
    fn destructured_export_assigns_every_binding() {
        let (code, _) = lower("export const { a, b: c } = arbitrary;", false);
        assert!(code.contains("exports.a = a;"));
        assert!(code.contains("exports.c = c;"));
    }

    #[test]
    fn plain_scripts_are_untouched() {
        let (code, outcome) = lower("arbitrary(code);", false);
        assert_eq!(code, "arbitrary(code);");
        assert_eq!(outcome, LoweringOutcome::default());
    }
}
