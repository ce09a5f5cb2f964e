//! CSS and JS minification.
//!
//! Minifier problems never fail a build. They come back as diagnostics next
//! to an optional output; callers keep the original text when there is none.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::sync::{Arc, RwLock};

use crate::diagnostics::{Diagnostic, DiagnosticSink, DIAG_CSS_MINIFY, DIAG_JS_MINIFY};

#[derive(Debug, Default)]
pub struct MinifyResults {
    pub output: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl MinifyResults {
    /// Replaces `text` with the output, if any, and reports the diagnostics.
    pub fn apply_to(self, text: &mut String, diagnostics: &DiagnosticSink) {
        diagnostics.extend(self.diagnostics);
        if let Some(output) = self.output {
            *text = output;
        }
    }
}

pub fn minify_css(css: &str) -> MinifyResults {
    let mut results = MinifyResults::default();
    let warnings = Arc::new(RwLock::new(Vec::new()));

    let options = ParserOptions {
        error_recovery: true,
        warnings: Some(warnings.clone()),
        ..ParserOptions::default()
    };

    let mut sheet = match StyleSheet::parse(css, options) {
        Ok(sheet) => sheet,
        Err(e) => {
            results
                .diagnostics
                .push(Diagnostic::error(DIAG_CSS_MINIFY, format!("CSS minify failed: {}", e)));
            return results;
        }
    };

    if let Err(e) = sheet.minify(MinifyOptions::default()) {
        results
            .diagnostics
            .push(Diagnostic::error(DIAG_CSS_MINIFY, format!("CSS minify failed: {}", e)));
        return results;
    }

    match sheet.to_css(PrinterOptions {
        minify: true,
        ..PrinterOptions::default()
    }) {
        Ok(printed) => results.output = Some(printed.code),
        Err(e) => results
            .diagnostics
            .push(Diagnostic::error(DIAG_CSS_MINIFY, format!("CSS minify failed: {}", e))),
    }

    if let Ok(recovered) = warnings.read() {
        results.diagnostics.extend(
            recovered
                .iter()
                .map(|w| Diagnostic::warning(DIAG_CSS_MINIFY, w.to_string())),
        );
    }

    results
}

pub fn minify_js(code: &str) -> MinifyResults {
    let mut results = MinifyResults::default();
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, SourceType::default()).parse();

    if ret.panicked || !ret.errors.is_empty() {
        results.diagnostics.extend(ret.errors.iter().map(|e| {
            Diagnostic::error(DIAG_JS_MINIFY, format!("JS minify failed: {}", e))
        }));
        if results.diagnostics.is_empty() {
            results
                .diagnostics
                .push(Diagnostic::error(DIAG_JS_MINIFY, "JS minify failed: parser aborted"));
        }
        return results;
    }

    let minified = Codegen::new()
        .with_options(CodegenOptions::minify())
        .build(&ret.program)
        .code;
    results.output = Some(minified);
    results
}
