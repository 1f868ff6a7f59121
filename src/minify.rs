use std::path::Path;

use swc_core::common::comments::SingleThreadedComments;
use swc_core::common::sync::Lrc;
use swc_core::common::{Globals, Mark, SourceMap, GLOBALS};
use swc_core::ecma::minifier::optimize;
use swc_core::ecma::minifier::option::{
    CompressOptions, ExtraOptions, MangleOptions, MinifyOptions,
};
use swc_core::ecma::transforms::base::fixer::fixer;
use swc_core::ecma::transforms::base::resolver;

use crate::config::MinifierConfig;
use crate::emit::{self, MappingSegment};
use crate::error::{Result, TransformError};

/// Minifies already-generated module code, composing the resulting positions
/// through the input map so the final map still points at the author's source.
///
/// Output replacement is atomic: on any failure the caller keeps its
/// pre-minify code and map untouched, because nothing is returned.
pub fn minify(
    globals: &Globals,
    filename: &Path,
    code: &str,
    input_map: &[MappingSegment],
    reserved: &[String],
    cfg: &MinifierConfig,
) -> Result<(String, Vec<MappingSegment>)> {
    let cm: Lrc<SourceMap> = Default::default();
    let comments = SingleThreadedComments::default();

    // A parse failure here is over code this pipeline generated, so it is
    // reported as a pipeline defect rather than a source error.
    let program = emit::parse_js(&cm, filename, code.to_string(), Some(&comments)).map_err(
        |diag| TransformError::MinifierParse {
            filename: filename.display().to_string(),
            line: diag.line,
            column: diag.column,
            message: diag.message,
        },
    )?;

    let printed = GLOBALS.set(globals, || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();
        let mut program = program;
        program.mutate(resolver(unresolved_mark, top_level_mark, false));

        let mut program = optimize(
            program,
            cm.clone(),
            Some(&comments),
            None,
            &MinifyOptions {
                compress: cfg.compress.then(CompressOptions::default),
                mangle: cfg.mangle.then(|| MangleOptions {
                    reserved: reserved.iter().map(|name| name.as_str().into()).collect(),
                    // Factory parameters live at module top level; mangling
                    // them would break the runtime contract.
                    top_level: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            },
            &ExtraOptions {
                unresolved_mark,
                top_level_mark,
                mangle_name_cache: None,
            },
        );
        program.mutate(fixer(Some(&comments)));

        emit::print(
            &cm,
            &program,
            cfg.keep_comments.then_some(&comments),
            true,
        )
    });

    let printed = printed.map_err(|message| TransformError::Codegen {
        filename: filename.display().to_string(),
        message,
    })?;
    let mappings = compose(&printed.mappings, input_map);
    Ok((printed.code, mappings))
}

/// Chains minified-to-intermediate segments through intermediate-to-original
/// segments. For each minified segment, the input segment at or before its
/// intermediate position on the same line wins; positions with no input
/// coverage are dropped rather than guessed.
fn compose(minified: &[MappingSegment], input: &[MappingSegment]) -> Vec<MappingSegment> {
    let mut out = Vec::with_capacity(minified.len());
    for segment in minified {
        let target = (segment.original_line, segment.original_column);
        let idx = input.partition_point(|s| (s.generated_line, s.generated_column) <= target);
        if idx == 0 {
            continue;
        }
        let source = &input[idx - 1];
        if source.generated_line != segment.original_line {
            continue;
        }
        out.push(MappingSegment {
            generated_line: segment.generated_line,
            generated_column: segment.generated_column,
            original_line: source.original_line,
            original_column: source.original_column,
        });
    }
    out.dedup();
    out
}
