//! Single-bundle scenarios: the downlevel and original outputs, the keys they
//! are persisted under, and source map chaining.

use duet_cache::{build_keys, CacheStore, KeyFlags};
use duet_common::TargetNaming;
use duet_conformance::{Workspace, TOOL_VERSION};
use duet_sourcemap::{
    compose, ComposeStrategy, OriginalLocation, SourceMap, SourceMapBuilder,
};
use duet_transform::{lower, transform, LowerOptions, ProcessingAction};

const ARROW: &str = "const x = () => 1;";

fn action(code: &str) -> ProcessingAction {
    ProcessingAction {
        source_path: "main-es2015.js".into(),
        downlevel_path: "main-es5.js".into(),
        code: code.to_string(),
        source_map: None,
        optimize: false,
        optimize_only: false,
        generate_source_maps: false,
        hidden_source_maps: false,
        vendor_source_maps: false,
        is_runtime_chunk: false,
        ignore_original: false,
    }
}

// ===========================================================================
// Downlevel and original outputs through the processor
// ===========================================================================

#[test]
fn arrow_bundle_without_optimization() {
    let ws = Workspace::new();
    let main = ws.emit("main-es2015.js", ARROW);
    ws.process(ws.options(), &[main]).unwrap();

    let downlevel = ws.read("main-es5.js");
    assert!(downlevel.starts_with("var x"));
    assert!(downlevel.contains("function"));
    assert!(!downlevel.contains("=>"));
    assert_eq!(ws.read("main-es2015.js"), ARROW);
    assert!(!ws.exists("main-es5.js.map"));
    assert!(!ws.exists("main-es2015.js.map"));

    let keys = build_keys(ARROW, TOOL_VERSION, KeyFlags::default());
    assert!(keys.original_code.is_none());
    assert!(keys.original_map.is_none());
    let downlevel_key = keys.downlevel_code.clone().unwrap();
    assert!(downlevel_key.starts_with("v1|18|"));
    assert!(downlevel_key.ends_with("|dl"));
    assert_eq!(ws.store.put_keys(), vec![downlevel_key.clone()]);

    let entry = ws.store.disk().get(&downlevel_key).unwrap().unwrap();
    assert_eq!(ws.store.disk().read(&entry).unwrap(), downlevel.as_bytes());
}

#[test]
fn arrow_bundle_with_optimization() {
    let ws = Workspace::new();
    let mut options = ws.options();
    options.optimize = true;
    let main = ws.emit("main-es2015.js", ARROW);
    ws.process(options, &[main]).unwrap();

    let downlevel = ws.read("main-es5.js");
    let original = ws.read("main-es2015.js");
    assert!(downlevel.starts_with("var "));
    assert!(!downlevel.contains("=>"));
    assert!(!downlevel.contains("var x"));
    assert!(original.starts_with("const x"));
    assert!(original.contains("=>"));
    assert!(original.len() < ARROW.len());

    let mut keys = ws.store.put_keys();
    keys.sort();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().any(|k| k.ends_with("|orig")));
    assert!(keys.iter().any(|k| k.ends_with("|dl")));
}

#[test]
fn optimize_only_never_downlevels() {
    let mut a = action("let value = () => 1;");
    a.optimize = true;
    a.optimize_only = true;
    let out = transform(&a, &TargetNaming::default()).unwrap();
    assert!(out.downlevel.is_none());
    let original = out.original.unwrap().code;
    assert!(original.starts_with("let value"));
    assert!(original.contains("=>"));
}

#[test]
fn runtime_chunk_reference_rewritten_in_downlevel_only() {
    let ws = Workspace::new();
    let mut options = ws.options();
    options.optimize = true;
    let code = r#"function url(id) { return "" + id + "-es2015." + hashes[id] + ".js"; }"#;
    let runtime = ws.emit("runtime-es2015.js", code);
    ws.process(options, &[runtime]).unwrap();

    let downlevel = ws.read("runtime-es5.js");
    let original = ws.read("runtime-es2015.js");
    assert!(downlevel.contains(r#""-es5.""#));
    assert!(!downlevel.contains("es2015"));
    assert!(original.contains(r#""-es2015.""#));
    assert!(!original.contains(r#""-es5.""#));
}

#[test]
fn lowering_covers_declarations_templates_and_this() {
    let code = "class Counter { start() { let tick = () => this.count++; return `n=${tick()}`; } }";
    let out = transform(&action(code), &TargetNaming::default()).unwrap();
    let downlevel = out.downlevel.unwrap().code;
    assert!(!downlevel.contains("=>"));
    assert!(!downlevel.contains('`'));
    assert!(downlevel.contains(".bind(this)"));
    assert!(downlevel.contains("var tick"));
}

#[test]
fn arguments_inside_arrow_fails_with_position() {
    let err = transform(&action("let f = () => arguments[0];"), &TargetNaming::default())
        .unwrap_err();
    assert_eq!(
        err.to_string().split(':').next(),
        Some("downlevel failed at 1")
    );
}

// ===========================================================================
// Scoping through lowering and mangling
// ===========================================================================

fn lowered(code: &str) -> String {
    lower(code, "main-es2015.js", LowerOptions::default())
        .unwrap()
        .code
}

#[test]
fn bare_parameter_arrows_passed_to_calls() {
    assert_eq!(
        lowered("f(x => x); xs.map(x => x);"),
        "f(function (x) { return x }); xs.map(function (x) { return x });"
    );
    let out = transform(&action("xs.map(x => x);"), &TargetNaming::default()).unwrap();
    assert!(!out.downlevel.unwrap().code.contains("=>"));
}

#[test]
fn block_shadowing_keeps_the_outer_binding() {
    assert_eq!(
        lowered("let x = 1; { let x = 2; } console.log(x);"),
        "var x = 1; { var _x = 2; } console.log(x);"
    );
    let code = transform(
        &action("let x = 1; { let x = 2; } console.log(x);"),
        &TargetNaming::default(),
    )
    .unwrap()
    .downlevel
    .unwrap()
    .code;
    assert!(code.contains("_x"));
    assert!(code.contains("console.log(x)"));
}

#[test]
fn loop_closures_see_their_own_iteration() {
    assert_eq!(
        lowered("for (let i = 0; i < 3; i++) { fns.push(() => i); }"),
        "for (var i = 0; i < 3; i++) { (function (i) { fns.push(function () { return i }); })(i); }"
    );
}

#[test]
fn hoisted_var_in_catch_and_block_keeps_its_own_mangled_name() {
    let source = "function read() { try { return load(); } catch (err) { var fallback = err; } { let tmp = 1; var total = tmp; } return [fallback, total]; }";
    let mut a = action(source);
    a.optimize = true;
    let out = transform(&a, &TargetNaming::default()).unwrap();
    for code in [out.downlevel.unwrap().code, out.original.unwrap().code] {
        let param = code
            .split("catch(")
            .nth(1)
            .and_then(|rest| rest.split(')').next())
            .unwrap();
        assert!(!code.contains(&format!("var {param}=")), "{code}");
        assert!(!code.contains(&format!(",{param}=")), "{code}");
        assert!(!code.contains("fallback"));
    }
}

#[test]
fn syntax_above_the_baseline_fails_instead_of_leaking() {
    for source in ["let a = b ?? c;", "let a = b?.c;", "async function f() {}", "class A { x = 1 }"] {
        let err = transform(&action(source), &TargetNaming::default()).unwrap_err();
        assert!(err.to_string().starts_with("downlevel failed at 1:"), "{source}: {err}");
    }
}

// ===========================================================================
// Source maps
// ===========================================================================

/// Map of a two-line bundle whose lines come from lines 10 and 20 of `src/app.ts`.
fn bundle_map() -> String {
    let mut b = SourceMapBuilder::new(Some("main-es2015.js"));
    b.set_source_root(Some("webpack:///"));
    let src = b.add_source("src/app.ts");
    b.set_source_content(src, Some("// app"));
    for (line, original) in [(0, 10), (1, 20)] {
        b.add(
            line,
            0,
            Some(OriginalLocation {
                source: src,
                line: original,
                column: 0,
                name: None,
            }),
        );
    }
    b.build().to_json()
}

#[test]
fn outputs_map_back_to_original_sources() {
    let ws = Workspace::new();
    let mut options = ws.options();
    options.source_maps.scripts = true;
    let main = ws.emit("main-es2015.js", "let answer = 42;\nlet other = answer;\n");
    std::fs::write(ws.output.join("main-es2015.js.map"), bundle_map()).unwrap();
    ws.process(options, &[main]).unwrap();

    let code = ws.read("main-es5.js");
    assert!(code.starts_with("var answer"));
    assert!(code.ends_with("\n//# sourceMappingURL=main-es5.js.map"));
    let map = SourceMap::from_json(&ws.read("main-es5.js.map")).unwrap();
    assert_eq!(map.file(), Some("main-es5.js"));
    assert_eq!(map.source_root(), Some("webpack:///"));
    assert_eq!(map.sources(), ["src/app.ts"]);
    assert_eq!(map.sources_content(), [Some("// app".to_string())]);

    let first = map.original_position_for(0, 0).unwrap();
    assert_eq!((first.source, first.line), ("src/app.ts", 10));
    let other = code.find("var other").unwrap() as u32;
    let second = map.original_position_for(0, other).unwrap();
    assert_eq!((second.source, second.line), ("src/app.ts", 20));
}

#[test]
fn hidden_maps_are_written_but_not_referenced() {
    let ws = Workspace::new();
    let mut options = ws.options();
    options.source_maps.scripts = true;
    options.source_maps.hidden = true;
    let main = ws.emit("main-es2015.js", "let a = 1;");
    ws.process(options, &[main]).unwrap();
    let code = ws.read("main-es5.js");
    assert!(code.starts_with("var a"));
    assert!(!code.contains("sourceMappingURL"));
    assert!(ws.exists("main-es5.js.map"));
}

#[test]
fn vendor_maps_use_separate_map_keys() {
    let plain = build_keys(
        ARROW,
        TOOL_VERSION,
        KeyFlags {
            generate_source_maps: true,
            ..KeyFlags::default()
        },
    );
    let vendor = build_keys(
        ARROW,
        TOOL_VERSION,
        KeyFlags {
            generate_source_maps: true,
            vendor_source_maps: true,
            ..KeyFlags::default()
        },
    );
    assert_eq!(plain.downlevel_code, vendor.downlevel_code);
    assert_ne!(plain.downlevel_map, vendor.downlevel_map);
    assert!(vendor.downlevel_map.unwrap().ends_with("|vendor|dl-map"));
}

#[test]
fn composition_drops_unresolved_and_strategies_agree() {
    // inner: intermediate -> original, only line 0 is mapped
    let mut inner = SourceMapBuilder::new(Some("intermediate.js"));
    let src = inner.add_source("original.ts");
    inner.add(
        0,
        0,
        Some(OriginalLocation {
            source: src,
            line: 3,
            column: 0,
            name: None,
        }),
    );
    let inner = inner.build();

    // outer: output -> intermediate, one segment per line for 2000 lines
    let mut outer = SourceMapBuilder::new(Some("out.js"));
    let id = outer.add_source("intermediate.js");
    for line in 0..2000 {
        outer.add(
            line,
            0,
            Some(OriginalLocation {
                source: id,
                line: line % 2,
                column: 0,
                name: None,
            }),
        );
    }
    let outer = outer.build();

    let (inline, inline_stats) = compose(&outer, &inner, ComposeStrategy::Inline);
    let (parallel, parallel_stats) = compose(&outer, &inner, ComposeStrategy::Parallel);
    assert_eq!(inline_stats, parallel_stats);
    assert_eq!(inline_stats.kept, 1000);
    assert_eq!(inline_stats.dropped, 1000);
    assert_eq!(inline.to_json(), parallel.to_json());
    assert_eq!(inline.original_position_for(2, 0).unwrap().line, 3);
    assert!(inline.original_position_for(1, 0).is_none());
}

#[test]
fn large_bundles_compose_in_parallel() {
    assert_eq!(ComposeStrategy::for_code_size(1024), ComposeStrategy::Inline);
    assert_eq!(
        ComposeStrategy::for_code_size(500 * 1024),
        ComposeStrategy::Parallel
    );
}
