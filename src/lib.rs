//! Source-file transform pipeline for a JavaScript module bundler.
//!
//! Each input file goes through one [`TransformEngine::transform`] call and
//! comes out as a self-contained module artifact: rewritten code, the ordered
//! dependency list, raw source mappings and a function-name map. JSON and
//! asset files run through dedicated sub-pipelines that converge on the same
//! artifact shape.

use std::path::Path;

use swc_core::common::comments::SingleThreadedComments;
use swc_core::common::sync::Lrc;
use swc_core::common::{Globals, Mark, SourceMap, SyntaxContext, GLOBALS};
use swc_core::ecma::transforms::base::fixer::fixer;
use swc_core::ecma::transforms::base::resolver;
use swc_core::ecma::visit::VisitMutWith;

mod cache_key;
mod collect;
mod config;
mod emit;
mod error;
mod fold;
mod import_export;
mod inline;
mod minify;
mod wrap;

pub use cache_key::REWRITE_PASS_SET;
pub use collect::{Dependency, SourceSpan};
pub use config::{
    DynamicDepsPolicy, FileKind, FileType, MinifierConfig, TransformOptions, TransformerConfig,
};
pub use emit::{FunctionMapEntry, MappingSegment};
pub use error::{Result, TransformError};

use collect::{CollectOptions, DependencyCollector};
use fold::{ConstantFolding, InlineGlobals};
use import_export::{has_esm_syntax, ImportExportLowering};
use regex::Regex;
use sha2::{Digest, Sha256};

// -----------------------------------------------------------------------------
// Output artifacts
// -----------------------------------------------------------------------------

/// One transformed output artifact.
#[derive(Debug, Clone)]
pub struct OutputArtifact {
    pub kind: FileKind,
    pub code: String,
    /// Line count of `code` under uniform line-ending rules; bundle layout
    /// accounting depends on it matching the emitted text exactly.
    pub line_count: usize,
    pub map: Vec<MappingSegment>,
    pub function_map: Vec<FunctionMapEntry>,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    /// Collected dependencies in first-reference order. The position of each
    /// entry is its dependency-map index.
    pub dependencies: Vec<Dependency>,
    pub output: OutputArtifact,
}

// -----------------------------------------------------------------------------
// Asset sources
// -----------------------------------------------------------------------------

/// Produces the JavaScript module body standing in for a binary asset. The
/// produced source then runs through the ordinary module pipeline, so its
/// require calls are collected like any other module's.
pub trait AssetModuleSource {
    fn module_source(&self, project_root: &Path, filename: &Path, data: &[u8]) -> Result<String>;
}

/// Default asset source: registers the asset's metadata with the runtime
/// asset registry.
pub struct RegistryAssetSource {
    pub registry_module: String,
}

impl Default for RegistryAssetSource {
    fn default() -> Self {
        Self {
            registry_module: "@quickpack/asset-registry".to_string(),
        }
    }
}

impl AssetModuleSource for RegistryAssetSource {
    fn module_source(&self, project_root: &Path, filename: &Path, data: &[u8]) -> Result<String> {
        let relative = filename.strip_prefix(project_root).unwrap_or(filename);
        let dir = relative
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();
        let name = relative
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let asset_type = relative
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let hash = format!("{:x}", Sha256::digest(data));
        Ok(format!(
            "module.exports = require(\"{}\").registerAsset({{\n  __packager_asset: true,\n  httpServerLocation: \"/assets/{}\",\n  name: \"{}\",\n  type: \"{}\",\n  hash: \"{}\"\n}});",
            self.registry_module, dir, name, asset_type, hash,
        ))
    }
}

// -----------------------------------------------------------------------------
// Engine
// -----------------------------------------------------------------------------

/// Per-build transform engine. Construction compiles the configured regexes
/// and allocates the syntax-context table once; `transform` is then a pure
/// function of its arguments and may be called for any number of files.
pub struct TransformEngine {
    config: TransformerConfig,
    globals: Globals,
    vendored_path: Regex,
    line_break: Regex,
}

impl TransformEngine {
    pub fn new(config: TransformerConfig) -> Result<Self> {
        let vendored_path = Regex::new(&config.vendored_path_pattern)
            .map_err(|e| TransformError::Config(format!("vendored_path_pattern: {e}")))?;
        let line_break = Regex::new(r"\r\n?|\n|\u{2028}|\u{2029}")
            .map_err(|e| TransformError::Config(e.to_string()))?;
        Ok(Self {
            config,
            globals: Globals::new(),
            vendored_path,
            line_break,
        })
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Cache key covering everything that influences output for a fixed
    /// input. Two engines with equal keys produce byte-identical artifacts.
    pub fn cache_key(&self) -> String {
        cache_key::cache_key(&self.config)
    }

    pub fn transform(
        &self,
        project_root: &Path,
        filename: &Path,
        data: &[u8],
        options: &TransformOptions,
    ) -> Result<TransformResult> {
        self.transform_with_asset_source(
            project_root,
            filename,
            data,
            options,
            &RegistryAssetSource::default(),
        )
    }

    pub fn transform_with_asset_source(
        &self,
        project_root: &Path,
        filename: &Path,
        data: &[u8],
        options: &TransformOptions,
        asset_source: &dyn AssetModuleSource,
    ) -> Result<TransformResult> {
        let is_json = filename
            .extension()
            .map(|ext| ext == "json")
            .unwrap_or(false);
        let is_asset = options.file_type == FileType::Asset;

        let kind = match (is_json, is_asset, options.file_type) {
            (true, true, _) => FileKind::JsonAsset,
            (true, false, _) => FileKind::Json,
            (false, true, _) => FileKind::ModuleAsset,
            (false, false, FileType::Script) => FileKind::Script,
            (false, false, _) => FileKind::Module,
        };
        tracing::debug!(
            file = %filename.display(),
            kind = kind.as_str(),
            "transforming"
        );

        // The reserved-name scan covers the raw bytes of every input,
        // binary assets included, before any sub-pipeline runs.
        self.check_reserved_token(data)?;

        // Assets are binary; their source never parses as text, only the
        // generated registration module does.
        if kind == FileKind::ModuleAsset {
            let generated = asset_source.module_source(project_root, filename, data)?;
            return self.transform_js(project_root, filename, generated, kind, options);
        }

        let source = std::str::from_utf8(data).map_err(|_| TransformError::InvalidUtf8 {
            filename: filename.display().to_string(),
        })?;

        if kind.is_json() {
            return self.transform_json(filename, source, kind, options);
        }
        self.transform_js(project_root, filename, source.to_string(), kind, options)
    }

    /// The reserved-name scan runs over raw bytes before parsing or dispatch,
    /// so a match inside a comment, string literal, or binary asset also
    /// fails. Collisions would let user code observe or clobber the
    /// dependency map.
    fn check_reserved_token(&self, data: &[u8]) -> Result<()> {
        let Some(name) = &self.config.dependency_map_reserved_name else {
            return Ok(());
        };
        let needle = name.as_bytes();
        if needle.is_empty() {
            return Ok(());
        }
        if let Some(byte_offset) = data
            .windows(needle.len())
            .position(|window| window == needle)
        {
            return Err(TransformError::ReservedTokenCollision {
                name: name.clone(),
                offset: String::from_utf8_lossy(&data[..byte_offset]).chars().count(),
            });
        }
        Ok(())
    }

    fn define_name(&self) -> String {
        format!("{}{}", self.config.global_prefix, wrap::DEFINE_NAME)
    }

    fn minify_enabled(&self, options: &TransformOptions) -> bool {
        options.minify
            && !self
                .config
                .minification_excluded_profiles
                .contains(&options.transform_profile)
    }

    // -------------------------------------------------------------------------
    // JS pipeline
    // -------------------------------------------------------------------------

    fn transform_js(
        &self,
        project_root: &Path,
        filename: &Path,
        source: String,
        kind: FileKind,
        options: &TransformOptions,
    ) -> Result<TransformResult> {
        let cm: Lrc<SourceMap> = Default::default();
        let comments = SingleThreadedComments::default();
        let program =
            emit::parse_js(&cm, filename, source, Some(&comments)).map_err(|diag| {
                TransformError::Parse {
                    filename: filename.display().to_string(),
                    line: diag.line,
                    column: diag.column,
                    message: diag.message,
                }
            })?;

        // Names and positions are read off the tree before any rewrite runs,
        // so profilers see the author's names.
        let function_map = emit::function_map(&cm, &program);

        let dep_map_name = self
            .config
            .dependency_map_reserved_name
            .clone()
            .unwrap_or_else(|| wrap::DEPENDENCY_MAP_NAME.to_string());
        let minify_enabled = self.minify_enabled(options);
        let relative = filename.strip_prefix(project_root).unwrap_or(filename);
        let in_vendored_path = self.vendored_path.is_match(&relative.to_string_lossy());

        let (program, dependencies, reserved_params) =
            GLOBALS.set(&self.globals, || -> Result<_> {
                let mut program = program;
                let unresolved_mark = Mark::new();
                let top_level_mark = Mark::new();
                program.mutate(resolver(unresolved_mark, top_level_mark, false));
                let unresolved_ctxt = SyntaxContext::empty().apply_mark(unresolved_mark);

                // A factory body cannot contain `import`, so lowering is not
                // optional whenever ESM syntax is present.
                if has_esm_syntax(&program) {
                    let outcome = ImportExportLowering::new(
                        unresolved_ctxt,
                        options.experimental_import_support,
                    )
                    .lower(&mut program);
                    tracing::debug!(has_exports = outcome.has_exports, "lowered module syntax");
                }

                let mut dependencies = Vec::new();
                if !kind.is_script() {
                    let collector = DependencyCollector::new(
                        &cm,
                        Some(&comments),
                        CollectOptions {
                            keep_require_names: options.dev,
                            dynamic_deps_policy: self.config.dynamic_deps_policy,
                            in_vendored_path,
                            async_require_module_path: &self.config.async_require_module_path,
                            dependency_map_name: dep_map_name.clone(),
                            inlineable_calls: vec![
                                wrap::IMPORT_DEFAULT_PARAM.to_string(),
                                wrap::IMPORT_ALL_PARAM.to_string(),
                            ],
                            unresolved_ctxt,
                        },
                    );
                    let collected = collector.run(&mut program).map_err(|err| {
                        TransformError::InvalidDependencyCall {
                            filename: filename.display().to_string(),
                            message: err.to_string(),
                        }
                    })?;
                    dependencies = collected.dependencies;

                    if options.inline_requires {
                        inline::inline_requires(
                            &mut program,
                            &dependencies,
                            &options.non_inlined_requires,
                        );
                    }
                }

                if minify_enabled {
                    program.visit_mut_with(&mut InlineGlobals::new(options.dev, unresolved_ctxt));
                }
                if !options.dev {
                    program.visit_mut_with(&mut ConstantFolding);
                }

                let mut program = if kind.is_script() {
                    wrap::wrap_script(program)
                } else if self.config.disable_module_wrapping {
                    program
                } else {
                    wrap::wrap_module(program, &self.define_name(), &dep_map_name)
                };

                let mut reserved = wrap::factory_param_names(&dep_map_name);
                if minify_enabled
                    && self.config.normalize_pseudo_globals
                    && !kind.is_script()
                    && !self.config.disable_module_wrapping
                {
                    reserved = wrap::normalize_pseudo_globals(
                        &mut program,
                        &dep_map_name,
                        self.config.dependency_map_reserved_name.is_some(),
                        unresolved_ctxt,
                    );
                }
                program.mutate(fixer(Some(&comments)));
                Ok((program, dependencies, reserved))
            })?;

        let printed = emit::print(&cm, &program, Some(&comments), self.config.compact_output)
            .map_err(|message| TransformError::Codegen {
                filename: filename.display().to_string(),
                message,
            })?;
        let (mut code, mut map) = (printed.code, printed.mappings);

        if minify_enabled {
            // Replacement is atomic: on error the un-minified output is never
            // half-applied because nothing below this point ran.
            let (minified_code, minified_map) = minify::minify(
                &self.globals,
                filename,
                &code,
                &map,
                &reserved_params,
                &self.config.minifier,
            )?;
            code = minified_code;
            map = minified_map;
        }

        let line_count = emit::count_lines(&code, &self.line_break);
        Ok(TransformResult {
            dependencies,
            output: OutputArtifact {
                kind,
                code,
                line_count,
                map,
                function_map,
            },
        })
    }

    // -------------------------------------------------------------------------
    // JSON pipeline
    // -------------------------------------------------------------------------

    fn transform_json(
        &self,
        filename: &Path,
        source: &str,
        kind: FileKind,
        options: &TransformOptions,
    ) -> Result<TransformResult> {
        let value: serde_json::Value =
            serde_json::from_str(source).map_err(|e| TransformError::InvalidJson {
                filename: filename.display().to_string(),
                message: e.to_string(),
            })?;
        // Re-serialization normalizes whitespace and guarantees the embedded
        // text is a single expression.
        let json = serde_json::to_string(&value).map_err(|e| TransformError::InvalidJson {
            filename: filename.display().to_string(),
            message: e.to_string(),
        })?;

        let mut code = wrap::wrap_json(
            &json,
            &self.define_name(),
            self.config.disable_module_wrapping,
        );
        let mut map = Vec::new();
        if self.minify_enabled(options) {
            let (minified_code, minified_map) = minify::minify(
                &self.globals,
                filename,
                &code,
                &map,
                &[],
                &self.config.minifier,
            )?;
            code = minified_code;
            map = minified_map;
        }

        let line_count = emit::count_lines(&code, &self.line_break);
        Ok(TransformResult {
            dependencies: Vec::new(),
            output: OutputArtifact {
                kind,
                code,
                line_count,
                map,
                function_map: Vec::new(),
            },
        })
    }
}
