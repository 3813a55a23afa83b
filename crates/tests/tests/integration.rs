//! Integration tests for end-to-end template rendering.
//!
//! These tests verify the full pipeline:
//! Compile (templates + partials) → Program → Render → Output

use std::fs;
use std::path::Path;

use serde_json::json;
use whisker_loader::{load_file, load_source};
use whisker_program::limits::MAX_NESTING;
use whisker_program::{Error, Instruction};
use whisker_tests::{JsonScribe, TestHarness};

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).expect("fixture write");
    path.to_str().expect("utf-8 tempdir").to_owned()
}

/// Plain variable interpolation against a one-entry map.
#[test]
fn test_hello_world() {
    let harness = TestHarness::from_source("hello", "Hello {{name}}!");
    assert_eq!(harness.render(json!({"name": "world"})), "Hello world!");
}

/// Array sections iterate once per element, with `.` bound to the element.
#[test]
fn test_array_section_iteration() {
    let harness = TestHarness::from_source("items", "{{#items}}[{{.}}]{{/items}}");
    assert_eq!(harness.render(json!({"items": [1, 2, 3]})), "[1][2][3]");
}

/// A delimiter tag switches the scanner for the rest of the template.
#[test]
fn test_delimiter_change() {
    let harness = TestHarness::from_source("delims", "{{=<% %>=}}<%x%>");
    assert_eq!(harness.render(json!({"x": "Y"})), "Y");
}

/// Partials render in place, and repeated references share one directory
/// entry and one copy of the source bytes.
#[test]
fn test_partial_render_and_cache() {
    let dir = tempfile::tempdir().unwrap();
    let root = write(dir.path(), "root.mustache", "A{{>p}}B");
    write(dir.path(), "p.mustache", "{{n}}");

    let harness = TestHarness::from_file(&root);
    assert_eq!(harness.render(json!({"n": "-"})), "A-B");
    assert_eq!(harness.program().template_count(), 2);

    // a second reference to the same resolved file hits the cache
    let root2 = write(dir.path(), "root2.mustache", "A{{>p}}{{>p}}B");
    let harness2 = TestHarness::from_file(&root2);
    assert_eq!(harness2.program().template_count(), 2);
    assert_eq!(harness2.render(json!({"n": "-"})), "A--B");
}

/// Inverted sections render exactly when the name is falsy or missing.
#[test]
fn test_inverted_section_on_missing_name() {
    let harness = TestHarness::from_source("inv", "{{^missing}}none{{/missing}}");
    assert_eq!(harness.render(json!({})), "none");
}

/// 96 levels of section nesting compile and render; 97 fail to compile.
#[test]
fn test_nesting_depth_boundary() {
    let deep = |n: usize| {
        let mut src = String::new();
        for _ in 0..n {
            src.push_str("{{#a}}");
        }
        src.push('x');
        for _ in 0..n {
            src.push_str("{{/a}}");
        }
        src
    };

    let harness = TestHarness::from_source("deep", &deep(MAX_NESTING));
    assert_eq!(harness.render(json!({"a": true})), "x");

    assert!(matches!(
        load_source("deep", deep(MAX_NESTING + 1).as_bytes()),
        Err(Error::TooDeep)
    ));
}

/// A template of plain text emits the same bytes regardless of data.
#[test]
fn test_text_only_is_data_independent() {
    let harness = TestHarness::from_source("static", "no tags here\njust text");
    let a = harness.render(json!({"x": 1}));
    let b = harness.render(json!(["totally", "different"]));
    assert_eq!(a, "no tags here\njust text");
    assert_eq!(a, b);
}

/// `{{#x}}A{{/x}}{{^x}}B{{/x}}` emits A per iteration or B exactly once.
#[test]
fn test_inversion_duality() {
    let harness = TestHarness::from_source("dual", "{{#x}}A{{/x}}{{^x}}B{{/x}}");
    assert_eq!(harness.render(json!({"x": [0, 0]})), "AA");
    assert_eq!(harness.render(json!({"x": true})), "A");
    assert_eq!(harness.render(json!({})), "B");
    assert_eq!(harness.render(json!({"x": false})), "B");
}

/// A delimiter change is local to the template it appears in: a partial
/// loaded afterwards still parses with `{{` / `}}`.
#[test]
fn test_delimiter_locality_across_partials() {
    let dir = tempfile::tempdir().unwrap();
    let root = write(dir.path(), "root.mustache", "{{=<% %>=}}<%>p%><%n%>");
    write(dir.path(), "p.mustache", "[{{n}}]");

    let harness = TestHarness::from_file(&root);
    assert_eq!(harness.render(json!({"n": "x"})), "[x]x");
}

/// HTML escaping applies to `{{name}}` but not `{{{name}}}` / `{{&name}}`.
#[test]
fn test_escaping_modes() {
    let harness = TestHarness::from_source("esc", "{{v}}|{{{v}}}|{{&v}}");
    assert_eq!(
        harness.render(json!({"v": "<b>&\"'</b>"})),
        "&lt;b&gt;&amp;&quot;&#39;&lt;/b&gt;|<b>&\"'</b>|<b>&\"'</b>"
    );
}

/// Name lookup walks outward through enclosing section scopes.
#[test]
fn test_scope_fallback_to_ancestors() {
    let harness = TestHarness::from_source(
        "scopes",
        "{{#user}}{{name}} ({{site}}){{/user}}",
    );
    let out = harness.render(json!({
        "site": "example.org",
        "user": {"name": "ada"},
    }));
    assert_eq!(out, "ada (example.org)");
}

/// Dotted names descend through nested objects.
#[test]
fn test_dotted_name_resolution() {
    let harness = TestHarness::from_source("dots", "{{a.b.c}}");
    assert_eq!(harness.render(json!({"a": {"b": {"c": 42}}})), "42");
}

/// Section tags keep the trailing newline of their line: standalone-line
/// stripping is deliberately not performed.
#[test]
fn test_no_standalone_line_stripping() {
    let harness = TestHarness::from_source("ws", "{{#s}}\nx\n{{/s}}\n");
    assert_eq!(harness.render(json!({"s": true})), "\nx\n\n");
}

/// Two compilations of identical bytes render identically.
#[test]
fn test_compilation_is_deterministic() {
    let src = "{{#items}}{{.}};{{/items}}{{^items}}empty{{/items}}";
    let a = TestHarness::from_source("t", src);
    let b = TestHarness::from_source("t", src);
    let data = json!({"items": ["p", "q"]});
    assert_eq!(a.render(data.clone()), b.render(data));
}

/// Every section start is closed by the section end its `end` field names.
#[test]
fn test_section_pairing_invariant() {
    let dir = tempfile::tempdir().unwrap();
    let root = write(
        dir.path(),
        "root.mustache",
        "{{#a}}{{#b}}x{{/b}}{{^c}}y{{/c}}{{/a}}{{>p}}",
    );
    write(dir.path(), "p.mustache", "{{#d}}z{{/d}}");
    let harness = TestHarness::from_file(&root);

    let insts = harness.program().instructions();
    for (idx, inst) in insts.iter().enumerate() {
        match inst {
            Instruction::SectionStart(d) | Instruction::SectionStartInv(d) => {
                assert!(d.end as usize > idx, "section at {idx} closes after itself");
                assert!(
                    matches!(insts[d.end as usize], Instruction::SectionEnd(_)),
                    "section at {idx} must point at its end"
                );
            }
            Instruction::SectionGoto { target, .. } => {
                assert!(matches!(
                    insts[*target as usize],
                    Instruction::SectionStart(_) | Instruction::SectionGoto { .. }
                ));
            }
            _ => {}
        }
    }

    // the directory chain covers the blob without gaps
    let mut at = 0u32;
    for seg in harness.program().templates() {
        assert!(seg.next > at);
        at = seg.next;
    }
    assert_eq!(at as usize, harness.program().blob().len());
}

/// Parallel renders of one shared program equal serial renders.
#[test]
fn test_parallel_rendering_matches_serial() {
    let harness = TestHarness::from_source(
        "par",
        "{{#rows}}{{label}}: {{#cells}}{{.}} {{/cells}}|{{/rows}}",
    );
    let datasets: Vec<serde_json::Value> = (0..8)
        .map(|i| {
            json!({
                "rows": [
                    {"label": format!("r{i}"), "cells": [i, i + 1]},
                    {"label": "end", "cells": [0]},
                ]
            })
        })
        .collect();

    let serial: Vec<String> = datasets.iter().map(|d| harness.render(d.clone())).collect();

    let program = harness.program();
    let parallel: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = datasets
            .iter()
            .map(|data| {
                scope.spawn(move || {
                    let mut scribe = JsonScribe::default();
                    whisker_vm::render(program, &mut scribe, data.clone()).unwrap();
                    scribe
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().into_output())
            .collect()
    });

    assert_eq!(serial, parallel);
}

/// Compile errors surface as typed errors, not panics.
#[test]
fn test_error_taxonomy_round_trip() {
    assert!(matches!(
        load_source("t", b"{{#a}}unclosed"),
        Err(Error::ClosureMismatch)
    ));
    assert!(matches!(
        load_source("t", b"{{>missing-partial}}"),
        Err(Error::FileNotFound)
    ));
    assert!(matches!(load_file("/no/such/file"), Err(Error::FileNotFound)));
}
