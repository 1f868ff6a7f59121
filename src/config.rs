use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a fully dynamic `require(expr)` (argument not a string literal) is
/// handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DynamicDepsPolicy {
    /// Always fail the transform.
    Reject,
    /// Fail, unless the file lives under a vendored-dependency path
    /// (`TransformerConfig::vendored_path_pattern`), in which case the call is
    /// replaced with an expression that throws at runtime.
    RejectUnlessInPackage,
}

/// Minifier knobs forwarded to the minifier adapter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MinifierConfig {
    /// Retain comments in minified output.
    pub keep_comments: bool,
    pub compress: bool,
    pub mangle: bool,
}

impl Default for MinifierConfig {
    fn default() -> Self {
        Self {
            keep_comments: false,
            compress: true,
            mangle: true,
        }
    }
}

/// Per-build configuration. Loaded once, read-only during transforms; the
/// engine compiles the regex fields a single time at construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformerConfig {
    /// Prefix applied to the `__d` define call emitted by the module wrapper,
    /// so bundles can avoid collisions with user globals.
    pub global_prefix: String,
    /// Module specifier of the runtime helper that loads async/prefetch
    /// dependencies. Registered as an ordinary sync dependency the first time
    /// an `import()` or prefetch call is rewritten.
    pub async_require_module_path: String,
    pub dynamic_deps_policy: DynamicDepsPolicy,
    /// Regex matched against the file path (project-root relative) to decide
    /// whether `RejectUnlessInPackage` tolerates a dynamic require.
    pub vendored_path_pattern: String,
    /// When set, the dependency map keeps this exact identifier name through
    /// minification, and source files containing the name anywhere are
    /// rejected before parsing.
    pub dependency_map_reserved_name: Option<String>,
    /// Emit module bodies unwrapped, in a shared scope. The wrapper becomes a
    /// passthrough.
    pub disable_module_wrapping: bool,
    /// Emit compact (newline-free) code even when not minifying.
    pub compact_output: bool,
    /// Rename the factory parameters to their single-letter runtime aliases
    /// when minifying.
    pub normalize_pseudo_globals: bool,
    /// Transform profiles for which minification and minification-oriented
    /// rewrites are skipped even when `minify` is requested. Configuration
    /// data, not a hardcoded allowlist: the bundler config decides which
    /// runtimes are incompatible with minified output.
    pub minification_excluded_profiles: Vec<String>,
    pub minifier: MinifierConfig,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            global_prefix: String::new(),
            async_require_module_path: "asyncRequire".to_string(),
            dynamic_deps_policy: DynamicDepsPolicy::Reject,
            vendored_path_pattern: "node_modules".to_string(),
            dependency_map_reserved_name: None,
            disable_module_wrapping: false,
            compact_output: false,
            normalize_pseudo_globals: true,
            minification_excluded_profiles: vec![
                "hermes-stable".to_string(),
                "hermes-canary".to_string(),
            ],
            minifier: MinifierConfig::default(),
        }
    }
}

/// Declared type of the input file, as requested by the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Script,
    #[default]
    Module,
    Asset,
}

/// Per-file transform options.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransformOptions {
    pub file_type: FileType,
    pub dev: bool,
    pub minify: bool,
    /// Replace hoisted dependency-map references with inline calls at each use
    /// site.
    pub inline_requires: bool,
    /// Specifiers exempt from require inlining.
    pub non_inlined_requires: Vec<String>,
    /// Lower default/namespace imports to the dedicated import helpers instead
    /// of plain require member access.
    pub experimental_import_support: bool,
    pub transform_profile: String,
    pub custom_transform_options: BTreeMap<String, String>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            file_type: FileType::Module,
            dev: true,
            minify: false,
            inline_requires: false,
            non_inlined_requires: Vec::new(),
            experimental_import_support: false,
            transform_profile: "default".to_string(),
            custom_transform_options: BTreeMap::new(),
        }
    }
}

/// Classified kind of a transform output artifact. Determined once per file
/// from the filename suffix and the declared [`FileType`]; drives which
/// sub-pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Script,
    Module,
    ModuleAsset,
    Json,
    JsonAsset,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FileKind::Script => "js/script",
            FileKind::Module => "js/module",
            FileKind::ModuleAsset => "js/module/asset",
            FileKind::Json => "json",
            FileKind::JsonAsset => "json/asset",
        }
    }

    /// Script outputs are never wrapped in a module factory and never carry
    /// dependencies.
    pub fn is_script(self) -> bool {
        matches!(self, FileKind::Script)
    }

    pub fn is_json(self) -> bool {
        matches!(self, FileKind::Json | FileKind::JsonAsset)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn file_kind_tags_are_stable() {
        assert_eq!(FileKind::Script.as_str(), "js/script");
        assert_eq!(FileKind::Module.as_str(), "js/module");
        assert_eq!(FileKind::ModuleAsset.as_str(), "js/module/asset");
        assert_eq!(FileKind::Json.as_str(), "json");
        assert_eq!(FileKind::JsonAsset.as_str(), "json/asset");
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = TransformerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TransformerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.async_require_module_path, "asyncRequire");
        assert_eq!(back.dynamic_deps_policy, DynamicDepsPolicy::Reject);
        assert_eq!(back.minification_excluded_profiles.len(), 2);
    }
}
