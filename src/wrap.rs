use std::collections::{HashMap, HashSet};

use swc_core::common::{SyntaxContext, DUMMY_SP};
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitMut, VisitMutWith, VisitWith};

// Factory parameter surface. These names are a compatibility contract with the
// bundle runtime: the collector and the lowering pass emit references to them,
// and the runtime's `__d` define call binds them positionally.
pub const GLOBAL_PARAM: &str = "global";
pub const REQUIRE_PARAM: &str = "_$$_REQUIRE";
pub const IMPORT_DEFAULT_PARAM: &str = "_$$_IMPORT_DEFAULT";
pub const IMPORT_ALL_PARAM: &str = "_$$_IMPORT_ALL";
pub const MODULE_PARAM: &str = "module";
pub const EXPORTS_PARAM: &str = "exports";
pub const DEPENDENCY_MAP_NAME: &str = "_dependencyMap";
pub const DEFINE_NAME: &str = "__d";

pub fn ident(name: &str) -> Ident {
    Ident::new(name.into(), DUMMY_SP, SyntaxContext::empty())
}

fn param(name: &str) -> Param {
    Param {
        span: DUMMY_SP,
        decorators: vec![],
        pat: Pat::Ident(BindingIdent {
            id: ident(name),
            type_ann: None,
        }),
    }
}

/// Flattens a program into plain statements. After ESM lowering no module
/// declarations remain; any stragglers cannot survive inside a factory body
/// and are dropped.
pub fn program_stmts(program: Program) -> Vec<Stmt> {
    match program {
        Program::Script(script) => script.body,
        Program::Module(module) => module
            .body
            .into_iter()
            .filter_map(|item| match item {
                ModuleItem::Stmt(stmt) => Some(stmt),
                ModuleItem::ModuleDecl(_) => None,
            })
            .collect(),
    }
}

pub fn factory_param_names(dep_map_name: &str) -> Vec<String> {
    vec![
        GLOBAL_PARAM.to_string(),
        REQUIRE_PARAM.to_string(),
        IMPORT_DEFAULT_PARAM.to_string(),
        IMPORT_ALL_PARAM.to_string(),
        MODULE_PARAM.to_string(),
        EXPORTS_PARAM.to_string(),
        dep_map_name.to_string(),
    ]
}

fn factory_fn(body: Vec<Stmt>, dep_map_name: &str) -> Function {
    Function {
        params: factory_param_names(dep_map_name)
            .iter()
            .map(|name| param(name))
            .collect(),
        decorators: vec![],
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        body: Some(BlockStmt {
            span: DUMMY_SP,
            ctxt: SyntaxContext::empty(),
            stmts: body,
        }),
        is_generator: false,
        is_async: false,
        type_params: None,
        return_type: None,
    }
}

/// Wraps a module body in the runtime define call:
/// `{prefix}__d(function (global, REQUIRE, IMPORT_DEFAULT, IMPORT_ALL, module, exports, depMap) { ... });`
pub fn wrap_module(program: Program, define_name: &str, dep_map_name: &str) -> Program {
    let body = program_stmts(program);
    let call = Expr::Call(CallExpr {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        callee: Callee::Expr(Box::new(Expr::Ident(ident(define_name)))),
        args: vec![ExprOrSpread {
            spread: None,
            expr: Box::new(Expr::Fn(FnExpr {
                ident: None,
                function: Box::new(factory_fn(body, dep_map_name)),
            })),
        }],
        type_args: None,
    });
    Program::Script(Script {
        span: DUMMY_SP,
        body: vec![Stmt::Expr(ExprStmt {
            span: DUMMY_SP,
            expr: Box::new(call),
        })],
        shebang: None,
    })
}

fn typeof_guard(name: &str, fallback: Expr) -> Expr {
    Expr::Cond(CondExpr {
        span: DUMMY_SP,
        test: Box::new(Expr::Bin(BinExpr {
            span: DUMMY_SP,
            op: BinaryOp::NotEqEq,
            left: Box::new(Expr::Unary(UnaryExpr {
                span: DUMMY_SP,
                op: UnaryOp::TypeOf,
                arg: Box::new(Expr::Ident(ident(name))),
            })),
            right: Box::new(Expr::Lit(Lit::Str(Str {
                span: DUMMY_SP,
                value: "undefined".into(),
                raw: None,
            }))),
        })),
        cons: Box::new(Expr::Ident(ident(name))),
        alt: Box::new(fallback),
    })
}

/// Wraps a script as a top-level polyfill. No parameter surface beyond
/// `global`, no dependency map: scripts run in the bundle's top-level scope.
pub fn wrap_script(program: Program) -> Program {
    let body = program_stmts(program);
    let global_value = typeof_guard(
        "globalThis",
        typeof_guard(
            "global",
            typeof_guard("window", Expr::This(ThisExpr { span: DUMMY_SP })),
        ),
    );
    let call = Expr::Call(CallExpr {
        span: DUMMY_SP,
        ctxt: SyntaxContext::empty(),
        callee: Callee::Expr(Box::new(Expr::Fn(FnExpr {
            ident: None,
            function: Box::new(Function {
                params: vec![param(GLOBAL_PARAM)],
                decorators: vec![],
                span: DUMMY_SP,
                ctxt: SyntaxContext::empty(),
                body: Some(BlockStmt {
                    span: DUMMY_SP,
                    ctxt: SyntaxContext::empty(),
                    stmts: body,
                }),
                is_generator: false,
                is_async: false,
                type_params: None,
                return_type: None,
            }),
        }))),
        args: vec![ExprOrSpread {
            spread: None,
            expr: Box::new(global_value),
        }],
        type_args: None,
    });
    Program::Script(Script {
        span: DUMMY_SP,
        body: vec![Stmt::Expr(ExprStmt {
            span: DUMMY_SP,
            expr: Box::new(call),
        })],
        shebang: None,
    })
}

/// JSON bodies are wrapped textually; there is no tree to preserve mappings
/// for, and the inert parameter names make it obvious nothing in the factory
/// surface is used beyond `module`.
pub fn wrap_json(json: &str, define_name: &str, disable_wrapping: bool) -> String {
    if disable_wrapping {
        return format!("module.exports = {json};");
    }
    format!(
        "{define_name}(function(global, require, _importDefaultUnused, _importAllUnused, module, exports, _dependencyMapUnused) {{\n  module.exports = {json};\n}});"
    )
}

/// Renames the factory parameters (and every in-body reference to them) to the
/// single-letter aliases the runtime also accepts. Run only under prod minify;
/// returns the resulting factory parameter names so the minifier can reserve
/// them. When a reserved dependency-map name is configured that parameter is
/// left untouched.
///
/// The rename is scope-aware: only identifiers referring to the factory
/// parameters are touched, which means synthesized nodes and unbound
/// references, never a user binding that happens to share a name. Alias
/// letters already taken by any name in the module get underscore-prefixed
/// until free, so a vendored `var g = 1` cannot capture the renamed `global`.
pub fn normalize_pseudo_globals(
    program: &mut Program,
    dep_map_name: &str,
    skip_dependency_map: bool,
    unresolved_ctxt: SyntaxContext,
) -> Vec<String> {
    let mut targets: Vec<(String, char)> = vec![
        (GLOBAL_PARAM.to_string(), 'g'),
        (REQUIRE_PARAM.to_string(), 'r'),
        (IMPORT_DEFAULT_PARAM.to_string(), 'i'),
        (IMPORT_ALL_PARAM.to_string(), 'a'),
        (MODULE_PARAM.to_string(), 'm'),
        (EXPORTS_PARAM.to_string(), 'e'),
    ];
    if !skip_dependency_map {
        targets.push((dep_map_name.to_string(), 'd'));
    }
    let target_names: HashSet<String> = targets.iter().map(|(name, _)| name.clone()).collect();

    let mut used = UsedNameCollector {
        unresolved_ctxt,
        target_names: &target_names,
        used: HashSet::new(),
    };
    program.visit_with(&mut used);
    let mut used = used.used;

    let mut renames: HashMap<String, String> = HashMap::new();
    let mut params = Vec::with_capacity(targets.len() + 1);
    for (name, letter) in targets {
        let mut alias = letter.to_string();
        while used.contains(&alias) {
            alias.insert(0, '_');
        }
        used.insert(alias.clone());
        renames.insert(name, alias.clone());
        params.push(alias);
    }
    if skip_dependency_map {
        params.push(dep_map_name.to_string());
    }

    let mut renamer = PseudoGlobalRenamer {
        renames: &renames,
        unresolved_ctxt,
    };
    program.visit_mut_with(&mut renamer);
    params
}

/// Every identifier name in the module that is not itself a rename target,
/// including local bindings and references to other globals. Aliases must
/// avoid all of them.
struct UsedNameCollector<'a> {
    unresolved_ctxt: SyntaxContext,
    target_names: &'a HashSet<String>,
    used: HashSet<String>,
}

impl<'a> UsedNameCollector<'a> {
    fn is_renameable(&self, id: &Ident) -> bool {
        (id.ctxt == self.unresolved_ctxt || id.ctxt == SyntaxContext::empty())
            && self.target_names.contains(id.sym.as_ref())
    }
}

impl<'a> Visit for UsedNameCollector<'a> {
    fn visit_ident(&mut self, n: &Ident) {
        if !self.is_renameable(n) {
            self.used.insert(n.sym.to_string());
        }
    }
}

struct PseudoGlobalRenamer<'a> {
    renames: &'a HashMap<String, String>,
    unresolved_ctxt: SyntaxContext,
}

impl<'a> PseudoGlobalRenamer<'a> {
    /// Factory parameters carry an empty context (they are synthesized), and
    /// user references to them resolve as unbound. Anything else is a local
    /// binding and stays.
    fn alias_for(&self, id: &Ident) -> Option<&String> {
        if id.ctxt == self.unresolved_ctxt || id.ctxt == SyntaxContext::empty() {
            self.renames.get(id.sym.as_ref())
        } else {
            None
        }
    }
}

impl<'a> VisitMut for PseudoGlobalRenamer<'a> {
    fn visit_mut_prop(&mut self, n: &mut Prop) {
        // `{ exports }` must become `{ exports: e }`, keeping the key.
        if let Prop::Shorthand(id) = n {
            if let Some(new_name) = self.alias_for(id) {
                *n = Prop::KeyValue(KeyValueProp {
                    key: PropName::Ident(IdentName::new(id.sym.clone(), id.span)),
                    value: Box::new(Expr::Ident(Ident::new(
                        new_name.clone().into(),
                        id.span,
                        id.ctxt,
                    ))),
                });
                return;
            }
        }
        n.visit_mut_children_with(self);
    }

    fn visit_mut_ident(&mut self, n: &mut Ident) {
        if let Some(new_name) = self.alias_for(n) {
            n.sym = new_name.clone().into();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use swc_core::common::sync::Lrc;
    use swc_core::common::{Globals, Mark, SourceMap, GLOBALS};
    use swc_core::ecma::transforms::base::fixer::fixer;
    use swc_core::ecma::transforms::base::resolver;

    use super::*;
    use crate::emit;

    fn parse(source: &str) -> (Lrc<SourceMap>, Program) {
        let cm: Lrc<SourceMap> = Default::default();
        let program = emit::parse_js(
            &cm,
            std::path::Path::new("test.js"),
            source.to_string(),
            None,
        )
        .unwrap();
        (cm, program)
    }

    #[test]
    fn wraps_a_module_in_the_define_call() {
        let (cm, program) = parse("arbitrary(code);");
        let wrapped = wrap_module(program, DEFINE_NAME, DEPENDENCY_MAP_NAME);
        let printed = emit::print(&cm, &wrapped, None, false).unwrap();
        assert_eq!(
            printed.code,
            "__d(function(global, _$$_REQUIRE, _$$_IMPORT_DEFAULT, _$$_IMPORT_ALL, module, exports, _dependencyMap) {\n    arbitrary(code);\n});"
        );
    }

    #[test]
    fn wraps_a_script_as_a_polyfill() {
        let (cm, program) = parse("someReallyArbitrary(code);");
        let mut wrapped = wrap_script(program);
        wrapped.mutate(fixer(None));
        let printed = emit::print(&cm, &wrapped, None, false).unwrap();
        assert!(printed.code.starts_with("(function(global) {"));
        assert!(printed
            .code
            .contains("typeof globalThis !== \"undefined\" ? globalThis :"));
        assert!(printed.code.contains("typeof window !== \"undefined\" ? window : this"));
    }

    #[test]
    fn json_wrapping_can_be_disabled() {
        assert_eq!(
            wrap_json("{\"a\":1}", DEFINE_NAME, true),
            "module.exports = {\"a\":1};"
        );
        let wrapped = wrap_json("{\"a\":1}", DEFINE_NAME, false);
        assert!(wrapped.starts_with("__d(function(global, require,"));
        assert!(wrapped.contains("module.exports = {\"a\":1};"));
    }

    #[test]
    fn pseudo_global_normalization_renames_params_and_references() {
        let (cm, program) = parse("module.exports = _$$_REQUIRE(_dependencyMap[0]);");
        let mut wrapped = wrap_module(program, DEFINE_NAME, DEPENDENCY_MAP_NAME);
        let params = normalize_pseudo_globals(
            &mut wrapped,
            DEPENDENCY_MAP_NAME,
            false,
            SyntaxContext::empty(),
        );
        assert_eq!(params, vec!["g", "r", "i", "a", "m", "e", "d"]);
        let printed = emit::print(&cm, &wrapped, None, false).unwrap();
        assert!(printed.code.contains("function(g, r, i, a, m, e, d)"));
        assert!(printed.code.contains("m.exports = r(d[0]);"));
    }

    #[test]
    fn pseudo_global_normalization_keeps_a_reserved_dependency_map() {
        let (cm, program) = parse("module.exports = _$$_REQUIRE(THE_DEP_MAP[0]);");
        let mut wrapped = wrap_module(program, DEFINE_NAME, "THE_DEP_MAP");
        let params =
            normalize_pseudo_globals(&mut wrapped, "THE_DEP_MAP", true, SyntaxContext::empty());
        assert_eq!(params, vec!["g", "r", "i", "a", "m", "e", "THE_DEP_MAP"]);
        let printed = emit::print(&cm, &wrapped, None, false).unwrap();
        assert!(printed.code.contains("function(g, r, i, a, m, e, THE_DEP_MAP)"));
        assert!(printed.code.contains("m.exports = r(THE_DEP_MAP[0]);"));
    }

    #[test]
    fn pseudo_global_normalization_avoids_capturing_user_bindings() {
        let (cm, mut program) = parse("var g = 1;\nmodule.exports = global;");
        GLOBALS.set(&Globals::new(), || {
            let unresolved_mark = Mark::new();
            let top_level_mark = Mark::new();
            program.mutate(resolver(unresolved_mark, top_level_mark, false));
            let unresolved_ctxt = SyntaxContext::empty().apply_mark(unresolved_mark);
            let mut wrapped = wrap_module(program, DEFINE_NAME, DEPENDENCY_MAP_NAME);
            let params = normalize_pseudo_globals(
                &mut wrapped,
                DEPENDENCY_MAP_NAME,
                false,
                unresolved_ctxt,
            );
            assert_eq!(params, vec!["_g", "r", "i", "a", "m", "e", "d"]);
            let printed = emit::print(&cm, &wrapped, None, false).unwrap();
            assert!(printed.code.contains("function(_g, r, i, a, m, e, d)"));
            assert!(printed.code.contains("var g = 1;"));
            assert!(printed.code.contains("m.exports = _g;"));
        });
    }

    #[test]
    fn pseudo_global_normalization_leaves_shadowing_locals_alone() {
        let (cm, mut program) = parse("function f(exports) { return exports; }\nexports.a = 1;");
        GLOBALS.set(&Globals::new(), || {
            let unresolved_mark = Mark::new();
            let top_level_mark = Mark::new();
            program.mutate(resolver(unresolved_mark, top_level_mark, false));
            let unresolved_ctxt = SyntaxContext::empty().apply_mark(unresolved_mark);
            let mut wrapped = wrap_module(program, DEFINE_NAME, DEPENDENCY_MAP_NAME);
            normalize_pseudo_globals(&mut wrapped, DEPENDENCY_MAP_NAME, false, unresolved_ctxt);
            let printed = emit::print(&cm, &wrapped, None, false).unwrap();
            assert!(printed.code.contains("return exports;"));
            assert!(printed.code.contains("e.a = 1;"));
        });
    }
}
