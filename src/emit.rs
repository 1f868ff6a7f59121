use std::path::Path;

use regex::Regex;
use serde::Serialize;
use swc_core::common::comments::{Comments, SingleThreadedComments};
use swc_core::common::sync::Lrc;
use swc_core::common::{FileName, SourceMap, Spanned};
use swc_core::ecma::ast::*;
use swc_core::ecma::codegen::text_writer::JsWriter;
use swc_core::ecma::codegen::{Config as CodegenConfig, Emitter};
use swc_core::ecma::parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax};
use swc_core::ecma::visit::{Visit, VisitWith};

/// One decoded source-map segment: where a piece of generated code came from
/// in the original file. Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MappingSegment {
    pub generated_line: u32,
    pub generated_column: u32,
    pub original_line: u32,
    pub original_column: u32,
}

/// Location of a named function-like binding in the original source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionMapEntry {
    pub name: String,
    pub line: u32,
    pub column: u32,
}

/// A parse failure with its location resolved against the source map. The
/// caller decides whether this is a user-source error or a generated-code
/// error.
#[derive(Debug)]
pub struct ParseDiagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

pub struct Printed {
    pub code: String,
    pub mappings: Vec<MappingSegment>,
}

pub fn parse_js(
    cm: &Lrc<SourceMap>,
    filename: &Path,
    source: String,
    comments: Option<&SingleThreadedComments>,
) -> Result<Program, ParseDiagnostic> {
    let fm = cm.new_source_file(Lrc::new(FileName::Real(filename.to_path_buf())), source);
    let lexer = Lexer::new(
        Syntax::Es(EsSyntax {
            jsx: false,
            ..Default::default()
        }),
        EsVersion::Es2022,
        StringInput::from(&*fm),
        comments.map(|c| c as &dyn Comments),
    );
    let mut parser = Parser::new_from(lexer);
    let program = parser.parse_program();

    // Recoverable lexer/parser errors are still fatal for a transform: the
    // printer must never run over a tree the parser was unsure about.
    if let Some(err) = parser.take_errors().into_iter().next() {
        return Err(to_diagnostic(cm, err));
    }
    program.map_err(|err| to_diagnostic(cm, err))
}

fn to_diagnostic(cm: &Lrc<SourceMap>, err: swc_core::ecma::parser::error::Error) -> ParseDiagnostic {
    let loc = cm.lookup_char_pos(err.span().lo());
    ParseDiagnostic {
        line: loc.line,
        column: loc.col.0,
        message: err.kind().msg().to_string(),
    }
}

/// Regenerate source text plus raw line/column mappings from a rewritten tree.
///
/// Nodes that kept their original spans map back to the input file; wrapper
/// and plugin-synthesized nodes carry dummy spans and yield no segment, so the
/// map never claims fidelity it does not have. No pretty-printing beyond the
/// `compact` toggle; output compactness is otherwise the minifier's job.
pub fn print(
    cm: &Lrc<SourceMap>,
    program: &Program,
    comments: Option<&SingleThreadedComments>,
    compact: bool,
) -> Result<Printed, String> {
    let mut buf = Vec::new();
    let mut raw_srcmap = Vec::new();
    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, Some(&mut raw_srcmap));
        let mut emitter = Emitter {
            cfg: CodegenConfig::default().with_minify(compact),
            cm: cm.clone(),
            comments: comments.map(|c| c as &dyn Comments),
            wr: writer,
        };
        emitter.emit_program(program).map_err(|e| e.to_string())?;
    }
    let mut code = String::from_utf8(buf).map_err(|e| e.to_string())?;
    // The writer terminates the last statement with a newline; generated
    // module code carries none, and line counting depends on that.
    while code.ends_with('\n') {
        code.pop();
    }

    let mut mappings: Vec<MappingSegment> = raw_srcmap
        .iter()
        .filter(|(pos, _)| pos.0 != 0)
        .map(|(pos, line_col)| {
            let loc = cm.lookup_char_pos(*pos);
            MappingSegment {
                generated_line: line_col.line + 1,
                generated_column: line_col.col,
                original_line: loc.line as u32,
                original_column: loc.col.0 as u32,
            }
        })
        .collect();
    mappings.sort_by_key(|s| (s.generated_line, s.generated_column));
    mappings.dedup();

    Ok(Printed { code, mappings })
}

/// Counts lines the way downstream bundle accounting expects: `\r`, `\r\n`,
/// `\n`, U+2028 and U+2029 all terminate a line.
pub fn count_lines(code: &str, line_break: &Regex) -> usize {
    line_break.find_iter(code).count() + 1
}

/// Collects `{name, line, column}` for named function-like definitions, read
/// off the tree before any rewrite pass runs so names and locations are the
/// author's.
pub fn function_map(cm: &Lrc<SourceMap>, program: &Program) -> Vec<FunctionMapEntry> {
    let mut visitor = FunctionMapVisitor {
        cm,
        out: Vec::new(),
    };
    program.visit_with(&mut visitor);
    visitor.out
}

struct FunctionMapVisitor<'a> {
    cm: &'a Lrc<SourceMap>,
    out: Vec<FunctionMapEntry>,
}

impl<'a> FunctionMapVisitor<'a> {
    fn push(&mut self, name: &str, span: swc_core::common::Span) {
        if span.is_dummy() {
            return;
        }
        let loc = self.cm.lookup_char_pos(span.lo());
        self.out.push(FunctionMapEntry {
            name: name.to_string(),
            line: loc.line as u32,
            column: loc.col.0 as u32,
        });
    }
}

impl<'a> Visit for FunctionMapVisitor<'a> {
    fn visit_fn_decl(&mut self, n: &FnDecl) {
        self.push(n.ident.sym.as_ref(), n.ident.span);
        n.visit_children_with(self);
    }

    fn visit_class_decl(&mut self, n: &ClassDecl) {
        self.push(n.ident.sym.as_ref(), n.ident.span);
        n.visit_children_with(self);
    }

    fn visit_var_declarator(&mut self, n: &VarDeclarator) {
        if let (Some(name), Some(init)) = (n.name.as_ident(), n.init.as_deref()) {
            if matches!(init, Expr::Fn(_) | Expr::Arrow(_) | Expr::Class(_)) {
                self.push(name.id.sym.as_ref(), name.id.span);
            }
        }
        n.visit_children_with(self);
    }
}
