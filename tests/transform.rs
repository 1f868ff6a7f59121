use std::path::Path;

use pretty_assertions::assert_eq;

use quickpack_transform::{
    DynamicDepsPolicy, FileKind, FileType, MinifierConfig, TransformEngine, TransformError,
    TransformOptions, TransformResult, TransformerConfig,
};

fn engine() -> TransformEngine {
    TransformEngine::new(TransformerConfig::default()).unwrap()
}

fn transform_with(
    engine: &TransformEngine,
    filename: &str,
    source: &str,
    options: &TransformOptions,
) -> Result<TransformResult, TransformError> {
    engine.transform(
        Path::new("/project"),
        Path::new("/project").join(filename).as_path(),
        source.as_bytes(),
        options,
    )
}

fn transform(filename: &str, source: &str, options: &TransformOptions) -> TransformResult {
    transform_with(&engine(), filename, source, options).unwrap()
}

fn dep_names(result: &TransformResult) -> Vec<&str> {
    result
        .dependencies
        .iter()
        .map(|d| d.name.as_str())
        .collect()
}

#[test]
fn transforms_a_simple_script() {
    let result = transform(
        "local/script.js",
        "someReallyArbitrary(code)",
        &TransformOptions {
            file_type: FileType::Script,
            ..Default::default()
        },
    );
    assert_eq!(result.output.kind, FileKind::Script);
    assert!(result.dependencies.is_empty());
    assert!(result.output.code.starts_with("(function(global) {"));
    assert!(result.output.code.contains("someReallyArbitrary(code);"));
}

#[test]
fn scripts_never_collect_dependencies() {
    let result = transform(
        "local/script.js",
        "require('anything');",
        &TransformOptions {
            file_type: FileType::Script,
            ..Default::default()
        },
    );
    assert!(result.dependencies.is_empty());
    assert!(result.output.code.contains("require('anything');"));
    assert!(!result.output.code.contains("_dependencyMap"));
}

#[test]
fn transforms_a_simple_module() {
    let result = transform("local/file.js", "arbitrary(code);", &TransformOptions::default());
    assert_eq!(result.output.kind, FileKind::Module);
    assert_eq!(
        result.output.code,
        "__d(function(global, _$$_REQUIRE, _$$_IMPORT_DEFAULT, _$$_IMPORT_ALL, module, exports, _dependencyMap) {\n    arbitrary(code);\n});"
    );
    assert_eq!(result.output.line_count, 3);
}

#[test]
fn collects_and_rewrites_module_dependencies() {
    let result = transform(
        "local/file.js",
        "module.exports = require('./a') + require('./b');",
        &TransformOptions::default(),
    );
    assert_eq!(dep_names(&result), vec!["./a", "./b"]);
    assert!(result
        .output
        .code
        .contains("_$$_REQUIRE(_dependencyMap[0], \"./a\")"));
    assert!(result
        .output
        .code
        .contains("_$$_REQUIRE(_dependencyMap[1], \"./b\")"));
}

#[test]
fn repeated_requires_share_a_dependency_entry() {
    let result = transform(
        "local/file.js",
        "require('x'); require('x');",
        &TransformOptions::default(),
    );
    assert_eq!(dep_names(&result), vec!["x"]);
    assert_eq!(result.output.code.matches("_dependencyMap[0]").count(), 2);
}

#[test]
fn prod_output_drops_require_name_literals() {
    let result = transform(
        "local/file.js",
        "require('./a');",
        &TransformOptions {
            dev: false,
            ..Default::default()
        },
    );
    assert!(result.output.code.contains("_$$_REQUIRE(_dependencyMap[0])"));
    assert!(!result.output.code.contains("\"./a\""));
}

#[test]
fn lowers_esm_imports_before_collection() {
    let result = transform(
        "local/file.js",
        "import b from './b';\nb();",
        &TransformOptions::default(),
    );
    assert_eq!(dep_names(&result), vec!["./b"]);
    assert!(result.output.code.contains("\"use strict\""));
    assert!(result
        .output
        .code
        .contains("var b = _$$_REQUIRE(_dependencyMap[0], \"./b\").default;"));
}

#[test]
fn experimental_import_support_uses_the_helpers() {
    let result = transform(
        "local/file.js",
        "import b from './b';\nimport * as c from './c';",
        &TransformOptions {
            experimental_import_support: true,
            ..Default::default()
        },
    );
    assert_eq!(dep_names(&result), vec!["./b", "./c"]);
    assert!(result
        .output
        .code
        .contains("var b = _$$_IMPORT_DEFAULT(_dependencyMap[0], \"./b\");"));
    assert!(result
        .output
        .code
        .contains("var c = _$$_IMPORT_ALL(_dependencyMap[1], \"./c\");"));
}

#[test]
fn exports_get_the_es_module_brand() {
    let result = transform(
        "local/file.js",
        "export const value = 1;",
        &TransformOptions::default(),
    );
    assert!(result
        .output
        .code
        .contains("Object.defineProperty(exports, \"__esModule\""));
    assert!(result.output.code.contains("exports.value = value;"));
}

#[test]
fn dynamic_imports_go_through_the_async_helper() {
    let result = transform(
        "local/file.js",
        "import('./m').then(arbitrary);",
        &TransformOptions::default(),
    );
    assert_eq!(dep_names(&result), vec!["./m", "asyncRequire"]);
    assert!(result.dependencies[0].is_async);
    assert!(!result.dependencies[0].is_prefetch_only);
    assert!(!result.dependencies[1].is_async);
    assert!(result.output.code.contains(
        "_$$_REQUIRE(_dependencyMap[1], \"asyncRequire\")(_dependencyMap[0], _dependencyMap.paths, \"./m\")"
    ));
}

#[test]
fn prefetch_imports_stay_prefetch_only_without_a_real_import() {
    let result = transform(
        "local/file.js",
        "__prefetchImport('./m');",
        &TransformOptions::default(),
    );
    assert_eq!(dep_names(&result), vec!["./m", "asyncRequire"]);
    assert!(result.dependencies[0].is_async);
    assert!(result.dependencies[0].is_prefetch_only);
    assert!(result.output.code.contains(".prefetch(_dependencyMap[0]"));
}

#[test]
fn dynamic_requires_are_rejected() {
    let err = transform_with(
        &engine(),
        "local/file.js",
        "require(someVariable);",
        &TransformOptions::default(),
    )
    .unwrap_err();
    match err {
        TransformError::InvalidDependencyCall { filename, message } => {
            assert!(filename.ends_with("local/file.js"));
            assert!(message.contains("Invalid call at line 1: require(someVariable)"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn vendored_dynamic_requires_become_runtime_throws() {
    let engine = TransformEngine::new(TransformerConfig {
        dynamic_deps_policy: DynamicDepsPolicy::RejectUnlessInPackage,
        ..Default::default()
    })
    .unwrap();
    let result = transform_with(
        &engine,
        "node_modules/pkg/index.js",
        "require(someVariable);",
        &TransformOptions::default(),
    )
    .unwrap();
    assert!(result.dependencies.is_empty());
    assert!(result
        .output
        .code
        .contains("Dynamic require defined at line "));
    assert!(result.output.code.contains("throw new Error"));
}

#[test]
fn non_vendored_dynamic_requires_still_fail_under_the_package_policy() {
    let engine = TransformEngine::new(TransformerConfig {
        dynamic_deps_policy: DynamicDepsPolicy::RejectUnlessInPackage,
        ..Default::default()
    })
    .unwrap();
    let err = transform_with(
        &engine,
        "local/file.js",
        "require(someVariable);",
        &TransformOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TransformError::InvalidDependencyCall { .. }));
}

#[test]
fn reserved_dependency_map_names_are_rejected_anywhere_in_the_source() {
    let engine = TransformEngine::new(TransformerConfig {
        dependency_map_reserved_name: Some("THE_DEP_MAP".to_string()),
        ..Default::default()
    })
    .unwrap();
    let err = transform_with(
        &engine,
        "local/file.js",
        "// mentions THE_DEP_MAP in a comment\narbitrary(code);",
        &TransformOptions::default(),
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Source code contains the reserved string `THE_DEP_MAP` at character offset 12"
    );
}

#[test]
fn reserved_names_are_rejected_in_asset_bytes() {
    let engine = TransformEngine::new(TransformerConfig {
        dependency_map_reserved_name: Some("THE_DEP_MAP".to_string()),
        ..Default::default()
    })
    .unwrap();
    let err = engine
        .transform(
            Path::new("/project"),
            Path::new("/project/assets/logo.png"),
            b"\x89PNG THE_DEP_MAP trailing bytes",
            &TransformOptions {
                file_type: FileType::Asset,
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::ReservedTokenCollision { .. }
    ));
}

#[test]
fn inline_requires_replaces_hoisted_bindings() {
    let result = transform(
        "local/file.js",
        "const lib = require('lib');\nlib.go();",
        &TransformOptions {
            inline_requires: true,
            ..Default::default()
        },
    );
    assert!(!result.output.code.contains("const lib"));
    assert!(result
        .output
        .code
        .contains("_$$_REQUIRE(_dependencyMap[0], \"lib\").go();"));
}

#[test]
fn constant_folding_removes_dead_branches_in_prod() {
    let result = transform(
        "local/file.js",
        "const a = 2 + 2;\nif (false) { neverRuns(); }",
        &TransformOptions {
            dev: false,
            ..Default::default()
        },
    );
    assert!(result.output.code.contains("const a = 4;"));
    assert!(!result.output.code.contains("neverRuns"));
}

#[test]
fn minified_modules_use_the_single_letter_factory_params() {
    let result = transform(
        "local/file.js",
        "module.exports = require('./a');",
        &TransformOptions {
            dev: false,
            minify: true,
            ..Default::default()
        },
    );
    assert!(!result.output.code.contains('\n'));
    assert!(result.output.code.contains("function(g,r,i,a,m,e,d)"));
    assert!(result.output.code.contains("r(d[0])"));
}

#[test]
fn factory_param_aliases_avoid_user_bindings() {
    // Compression and mangling off so the normalization pass's own output is
    // what gets asserted.
    let engine = TransformEngine::new(TransformerConfig {
        minifier: MinifierConfig {
            keep_comments: false,
            compress: false,
            mangle: false,
        },
        ..Default::default()
    })
    .unwrap();
    let result = transform_with(
        &engine,
        "local/file.js",
        "var g = 1;\nmodule.exports = global;",
        &TransformOptions {
            dev: false,
            minify: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(result.output.code.contains("function(_g,r,i,a,m,e,d)"));
    assert!(result.output.code.contains("var g=1"));
    assert!(result.output.code.contains("m.exports=_g"));
}

#[test]
fn minification_inlines_dev_globals() {
    let result = transform(
        "local/file.js",
        "if (__DEV__) { devOnly(); } else { prodOnly(); }",
        &TransformOptions {
            dev: false,
            minify: true,
            ..Default::default()
        },
    );
    assert!(!result.output.code.contains("devOnly"));
    assert!(result.output.code.contains("prodOnly"));
}

#[test]
fn excluded_profiles_skip_minification() {
    let result = transform(
        "local/file.js",
        "module.exports = require('./a');",
        &TransformOptions {
            dev: false,
            minify: true,
            transform_profile: "hermes-stable".to_string(),
            ..Default::default()
        },
    );
    assert!(result.output.code.contains('\n'));
    assert!(result.output.code.contains("_$$_REQUIRE(_dependencyMap[0])"));
}

#[test]
fn module_wrapping_can_be_disabled() {
    let engine = TransformEngine::new(TransformerConfig {
        disable_module_wrapping: true,
        ..Default::default()
    })
    .unwrap();
    let result = transform_with(
        &engine,
        "local/file.js",
        "arbitrary(code);",
        &TransformOptions::default(),
    )
    .unwrap();
    assert_eq!(result.output.code, "arbitrary(code);");
}

#[test]
fn a_global_prefix_applies_to_the_define_call() {
    let engine = TransformEngine::new(TransformerConfig {
        global_prefix: "$custom_".to_string(),
        ..Default::default()
    })
    .unwrap();
    let result = transform_with(
        &engine,
        "local/file.js",
        "arbitrary(code);",
        &TransformOptions::default(),
    )
    .unwrap();
    assert!(result.output.code.starts_with("$custom___d(function"));
}

#[test]
fn transforms_json_files() {
    let result = transform(
        "local/data.json",
        "{\"a\": 1}",
        &TransformOptions::default(),
    );
    assert_eq!(result.output.kind, FileKind::Json);
    assert!(result.dependencies.is_empty());
    assert_eq!(
        result.output.code,
        "__d(function(global, require, _importDefaultUnused, _importAllUnused, module, exports, _dependencyMapUnused) {\n  module.exports = {\"a\":1};\n});"
    );
}

#[test]
fn json_assets_are_tagged_as_such() {
    let result = transform(
        "local/data.json",
        "{\"a\": 1}",
        &TransformOptions {
            file_type: FileType::Asset,
            ..Default::default()
        },
    );
    assert_eq!(result.output.kind, FileKind::JsonAsset);
}

#[test]
fn unwrapped_json_is_a_bare_assignment() {
    let engine = TransformEngine::new(TransformerConfig {
        disable_module_wrapping: true,
        ..Default::default()
    })
    .unwrap();
    let result = transform_with(
        &engine,
        "local/data.json",
        "{\"a\": 1}",
        &TransformOptions::default(),
    )
    .unwrap();
    assert_eq!(result.output.code, "module.exports = {\"a\":1};");
}

#[test]
fn invalid_json_fails() {
    let err = transform_with(
        &engine(),
        "local/data.json",
        "{not json}",
        &TransformOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TransformError::InvalidJson { .. }));
}

#[test]
fn assets_register_with_the_runtime_registry() {
    let result = transform(
        "assets/logo.png",
        "\u{89}PNG fake bytes",
        &TransformOptions {
            file_type: FileType::Asset,
            ..Default::default()
        },
    );
    assert_eq!(result.output.kind, FileKind::ModuleAsset);
    assert_eq!(dep_names(&result), vec!["@quickpack/asset-registry"]);
    assert!(result.output.code.contains("registerAsset"));
    assert!(result.output.code.contains("httpServerLocation: \"/assets/assets\""));
    assert!(result.output.code.contains("name: \"logo\""));
    assert!(result.output.code.contains("type: \"png\""));
}

#[test]
fn invalid_utf8_is_rejected() {
    let err = engine()
        .transform(
            Path::new("/project"),
            Path::new("/project/local/file.js"),
            &[0xff, 0xfe, 0x00],
            &TransformOptions::default(),
        )
        .unwrap_err();
    assert!(matches!(err, TransformError::InvalidUtf8 { .. }));
}

#[test]
fn parse_errors_carry_the_filename_and_location() {
    let err = transform_with(
        &engine(),
        "local/bad.js",
        "var = ;",
        &TransformOptions::default(),
    )
    .unwrap_err();
    match err {
        TransformError::Parse { filename, line, .. } => {
            assert!(filename.ends_with("local/bad.js"));
            assert_eq!(line, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn function_maps_record_original_names() {
    let result = transform(
        "local/file.js",
        "function named() {}\nconst arrow = () => {};",
        &TransformOptions::default(),
    );
    let names: Vec<&str> = result
        .output
        .function_map
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, vec!["named", "arrow"]);
}

#[test]
fn mappings_point_back_at_the_original_source() {
    let result = transform(
        "local/file.js",
        "first();\nsecond();",
        &TransformOptions::default(),
    );
    assert!(result
        .output
        .map
        .iter()
        .any(|s| s.original_line == 2));
}

#[test]
fn output_is_deterministic() {
    let options = TransformOptions {
        dev: false,
        minify: true,
        ..Default::default()
    };
    let source = "import a from './a';\nexport const b = a + 1;";
    let first = transform("local/file.js", source, &options);
    let second = transform("local/file.js", source, &options);
    assert_eq!(first.output.code, second.output.code);
    assert_eq!(dep_names(&first), dep_names(&second));
}

#[test]
fn cache_keys_track_the_configuration() {
    let a = engine();
    let b = engine();
    assert_eq!(a.cache_key(), b.cache_key());
    let c = TransformEngine::new(TransformerConfig {
        global_prefix: "$x_".to_string(),
        ..Default::default()
    })
    .unwrap();
    assert_ne!(a.cache_key(), c.cache_key());
}
