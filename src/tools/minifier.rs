// src/tools/minifier.rs

//! In-process JavaScript minification with oxc.
//!
//! When the bundle carries an inline source map (`--debug` bundles end with
//! a `//# sourceMappingURL=data:...` comment) the minified map is composed
//! with it, so `<name>.min.js.map` points at the original modules instead of
//! the bundle.

use std::path::PathBuf;

use base64::{engine::general_purpose, Engine as _};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier as OxcMinifierImpl, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;
use oxc_sourcemap::{SourceMap, SourceMapBuilder};
use tracing::warn;

use crate::errors::PipelineError;
use crate::tools::{Minified, Minifier};

/// Compresses and mangles a bundle, emitting a JSON source map.
#[derive(Debug, Clone, Copy, Default)]
pub struct OxcMinifier;

impl Minifier for OxcMinifier {
    fn minify(&self, code: &[u8], source_name: &str) -> Result<Minified, PipelineError> {
        let source = std::str::from_utf8(code)
            .map_err(|e| PipelineError::Minify(format!("bundle is not UTF-8: {e}")))?;

        let allocator = Allocator::default();
        // Bundles are UMD/CommonJS scripts, not ES modules.
        let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();
        if !ret.errors.is_empty() {
            let first = ret
                .errors
                .iter()
                .take(3)
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PipelineError::Minify(format!(
                "{} parse error(s) in {source_name}: {first}",
                ret.errors.len()
            )));
        }

        let mut program = ret.program;
        let options = MinifierOptions {
            mangle: Some(MangleOptions::default()),
            compress: Some(CompressOptions::smallest()),
        };
        let ret = OxcMinifierImpl::new(options).minify(&allocator, &mut program);

        let out = Codegen::new()
            .with_options(CodegenOptions {
                minify: true,
                comments: CommentOptions::disabled(),
                source_map_path: Some(PathBuf::from(source_name)),
                ..CodegenOptions::default()
            })
            .with_scoping(ret.scoping)
            .build(&program);

        let mut map = out
            .map
            .ok_or_else(|| PipelineError::Minify("codegen produced no source map".to_string()))?;
        if let Some(input) = inline_source_map(source, source_name) {
            map = compose(&input, &map);
        }

        Ok(Minified {
            code: out.code.into_bytes(),
            map: map.to_json_string().into_bytes(),
        })
    }
}

const MAPPING_URL: &str = "//# sourceMappingURL=";

/// The map embedded in the last `sourceMappingURL` comment, if it is a
/// base64 `data:` URL. External map files are not followed.
fn inline_source_map(code: &str, source_name: &str) -> Option<SourceMap> {
    let start = code.rfind(MAPPING_URL)? + MAPPING_URL.len();
    let url = code[start..].lines().next().unwrap_or_default().trim();
    let (meta, payload) = url.strip_prefix("data:")?.split_once(',')?;
    if !meta.starts_with("application/json") || !meta.ends_with(";base64") {
        return None;
    }

    let decoded = match general_purpose::STANDARD.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(source = source_name, error = %e, "inline source map is not valid base64; ignoring it");
            return None;
        }
    };
    let json = String::from_utf8_lossy(&decoded);
    match SourceMap::from_json_string(&json) {
        Ok(map) => Some(map),
        Err(e) => {
            warn!(source = source_name, error = %e, "inline source map does not parse; ignoring it");
            None
        }
    }
}

/// Chain `outer` (bundle -> minified) through `inner` (sources -> bundle).
///
/// Each minified token takes the original position of the closest inner
/// token at or before its bundle position on the same line. Tokens that land
/// outside every inner mapping are dropped.
fn compose(inner: &SourceMap, outer: &SourceMap) -> SourceMap {
    let lookup = inner.generate_lookup_table();
    let mut builder = SourceMapBuilder::default();
    if let Some(file) = outer.get_file() {
        builder.set_file(file);
    }
    // Inner source id of each source added to the builder, in builder order.
    let mut added: Vec<u32> = Vec::new();

    for token in outer.get_tokens() {
        if token.get_source_id().is_none() {
            continue;
        }
        let Some(original) = inner.lookup_token(&lookup, token.get_src_line(), token.get_src_col())
        else {
            continue;
        };

        let source_id = original.get_source_id().and_then(|id| {
            let source = inner.get_source(id)?;
            let builder_id = builder.add_source_and_content(source, "");
            if builder_id as usize == added.len() {
                added.push(id);
            }
            Some(builder_id)
        });
        let name_id = original
            .get_name_id()
            .and_then(|id| inner.get_name(id))
            .or_else(|| token.get_name_id().and_then(|id| outer.get_name(id)))
            .map(|name| builder.add_name(name));

        builder.add_token(
            token.get_dst_line(),
            token.get_dst_col(),
            original.get_src_line(),
            original.get_src_col(),
            source_id,
            name_id,
        );
    }

    let mut map = builder.into_sourcemap();
    map.set_source_contents(
        added
            .iter()
            .map(|&id| inner.get_source_content(id).map(|c| &**c))
            .collect(),
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
        (function (root) {
            function add(first, second) {
                // comment that should disappear
                return first + second;
            }
            root.vl = { add: add };
        })(this);
    "#;

    #[test]
    fn output_is_smaller_and_has_a_json_map() {
        let out = OxcMinifier.minify(SOURCE.as_bytes(), "vegalite.js").unwrap();
        assert!(out.code.len() < SOURCE.len());
        assert!(!String::from_utf8_lossy(&out.code).contains("comment"));

        let map: serde_json::Value = serde_json::from_slice(&out.map).unwrap();
        assert_eq!(map["version"], 3);
        assert!(map["sources"].as_array().is_some_and(|s| !s.is_empty()));
    }

    #[test]
    fn same_input_gives_same_output() {
        let a = OxcMinifier.minify(SOURCE.as_bytes(), "vegalite.js").unwrap();
        let b = OxcMinifier.minify(SOURCE.as_bytes(), "vegalite.js").unwrap();
        assert_eq!(a, b);
    }

    fn with_inline_map(code: &str, map: &str) -> String {
        format!(
            "{code}\n//# sourceMappingURL=data:application/json;charset=utf-8;base64,{}\n",
            general_purpose::STANDARD.encode(map)
        )
    }

    #[test]
    fn inline_bundle_map_is_followed_back_to_the_modules() {
        let bundle = with_inline_map(
            "var answer = 42;\nconsole.log(answer);",
            r#"{"version":3,"sources":["src/vl.js"],"sourcesContent":["var answer = 42;\nconsole.log(answer);"],"names":[],"mappings":"AAAA;AACA"}"#,
        );

        let out = OxcMinifier.minify(bundle.as_bytes(), "vegalite.js").unwrap();

        assert!(!String::from_utf8_lossy(&out.code).contains("sourceMappingURL"));
        let map: serde_json::Value = serde_json::from_slice(&out.map).unwrap();
        assert_eq!(map["sources"], serde_json::json!(["src/vl.js"]));
        assert_eq!(
            map["sourcesContent"][0],
            "var answer = 42;\nconsole.log(answer);"
        );
        assert!(!map["mappings"].as_str().unwrap_or_default().is_empty());
    }

    #[test]
    fn unreadable_inline_map_falls_back_to_the_bundle() {
        let bundle = "var a = 1;\n//# sourceMappingURL=data:application/json;base64,@@@\n";

        let out = OxcMinifier.minify(bundle.as_bytes(), "vegalite.js").unwrap();

        let map: serde_json::Value = serde_json::from_slice(&out.map).unwrap();
        assert_eq!(map["sources"], serde_json::json!(["vegalite.js"]));
    }

    #[test]
    fn syntax_error_is_a_minify_error() {
        assert!(matches!(
            OxcMinifier.minify(b"function (", "broken.js"),
            Err(PipelineError::Minify(_))
        ));
    }
}
