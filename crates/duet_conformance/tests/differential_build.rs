//! A whole application build: modules, polyfills, the runtime chunk,
//! stylesheets and script entry points processed together.

use duet_bundle::{BundleError, BundleFile};
use duet_conformance::Workspace;
use duet_sourcemap::SourceMap;

const RUNTIME: &str =
    r#"function chunkUrl(id) { return "" + id + "-es2015." + { 1: "a1b2" }[id] + ".js"; }"#;
const MAIN: &str = "const greet = (name) => `Hello ${name}!`;\nconsole.log(greet('world'));\n";

fn emit_app(ws: &Workspace) -> Vec<BundleFile> {
    let mut runtime = ws.emit("runtime-es2015.js", RUNTIME);
    runtime.is_entry_runtime = true;
    vec![
        runtime,
        ws.emit("polyfills-es5-es2015.js", "var legacy = [].includes;"),
        ws.emit("polyfills-es2015.js", "let modern = Symbol.iterator;"),
        ws.emit("main-es2015.js", MAIN),
        ws.emit("lazy/1-es2015.js", "let lazy = () => 1;"),
        ws.emit("styles.css", "body { margin: 0 }"),
        ws.emit("scripts.js", "window.legacyGlobal = true;"),
    ]
}

fn paths(files: &[BundleFile]) -> Vec<&str> {
    files.iter().map(|f| f.path.as_str()).collect()
}

#[test]
fn optimized_build_partitions_outputs() {
    let ws = Workspace::new();
    let mut options = ws.options();
    options.optimize = true;
    options.script_entry_points = vec!["scripts".to_string()];
    let files = emit_app(&ws);

    let manifest = ws.process(options, &files).unwrap();
    assert_eq!(
        paths(&manifest.module_files),
        [
            "runtime-es2015.js",
            "polyfills-es2015.js",
            "main-es2015.js",
            "lazy/1-es2015.js"
        ]
    );
    assert_eq!(
        paths(&manifest.no_module_files),
        [
            "runtime-es5.js",
            "polyfills-es5.js",
            "main-es5.js",
            "lazy/1-es5.js"
        ]
    );
    assert_eq!(
        paths(&manifest.passthrough_files),
        ["styles.css", "scripts.js"]
    );

    // The legacy polyfills exist only in their downlevel form, and the
    // modern polyfills are minified in place without a legacy twin.
    assert!(!ws.exists("polyfills-es5-es2015.js"));
    let legacy_polyfills = ws.read("polyfills-es5.js");
    assert!(legacy_polyfills.starts_with("var "));
    assert!(legacy_polyfills.contains("[].includes"));
    let modern_polyfills = ws.read("polyfills-es2015.js");
    assert!(modern_polyfills.starts_with("let modern"));
    assert!(modern_polyfills.len() < "let modern = Symbol.iterator;".len());

    let main_legacy = ws.read("main-es5.js");
    assert!(!main_legacy.contains("=>"));
    assert!(!main_legacy.contains('`'));
    assert!(ws.read("main-es2015.js").contains("=>"));
    assert!(!ws.read("lazy/1-es5.js").contains("=>"));

    let runtime_legacy = ws.read("runtime-es5.js");
    assert!(runtime_legacy.contains(r#""-es5.""#));
    assert!(ws.read("runtime-es2015.js").contains(r#""-es2015.""#));

    // Passthrough files are left as emitted.
    assert_eq!(ws.read("styles.css"), "body { margin: 0 }");
    assert_eq!(ws.read("scripts.js"), "window.legacyGlobal = true;");
}

#[test]
fn unoptimized_build_skips_modern_polyfills() {
    let ws = Workspace::new();
    let files = emit_app(&ws);
    let manifest = ws.process(ws.options(), &files).unwrap();

    assert!(paths(&manifest.module_files).contains(&"polyfills-es2015.js"));
    assert_eq!(ws.read("polyfills-es2015.js"), "let modern = Symbol.iterator;");
    assert!(ws.read("polyfills-es5.js").starts_with("var legacy"));
    // Script entries are only passed through when configured.
    assert!(paths(&manifest.no_module_files).contains(&"scripts-es5.js"));
    assert!(manifest.passthrough_files.iter().all(|f| f.extension == ".css"));
}

#[test]
fn uncached_and_cached_builds_agree() {
    let cached = Workspace::new();
    let uncached = Workspace::new();
    let mut options = cached.options();
    options.optimize = true;
    options.source_maps.scripts = true;

    let files = emit_app(&cached);
    emit_app(&uncached);
    let a = cached.process(options.clone(), &files).unwrap();
    let mut uncached_options = options;
    uncached_options.output_path = uncached.output.clone();
    let b = uncached.process_uncached(uncached_options, &files).unwrap();

    assert_eq!(a, b);
    for path in ["main-es5.js", "main-es5.js.map", "runtime-es5.js", "polyfills-es5.js"] {
        assert_eq!(cached.read(path), uncached.read(path), "{path}");
    }
    assert_eq!(uncached.store.put_count(), 0);
    assert!(cached.store.put_count() > 0);
}

#[test]
fn maps_chain_back_to_emitted_sources() {
    let ws = Workspace::new();
    let mut options = ws.options();
    options.optimize = true;
    options.source_maps.scripts = true;
    let main = ws.emit("main-es2015.js", MAIN);
    ws.process(options, &[main]).unwrap();

    for (code, map) in [
        ("main-es5.js", "main-es5.js.map"),
        ("main-es2015.js", "main-es2015.js.map"),
    ] {
        assert!(ws.read(code).ends_with(&format!("//# sourceMappingURL={map}")));
        let parsed = SourceMap::from_json(&ws.read(map)).unwrap();
        assert_eq!(parsed.file(), Some(code));
        assert_eq!(parsed.sources(), ["main-es2015.js"]);
        assert_eq!(parsed.sources_content(), [Some(MAIN.to_string())]);
        assert!(parsed.mapping_count() > 0);
        // `console` starts line two of the bundle.
        let console = ws.read(code).find("console").unwrap() as u32;
        let origin = parsed.original_position_for(0, console).unwrap();
        assert_eq!((origin.line, origin.column), (1, 0));
    }
}

#[test]
fn one_broken_bundle_fails_the_build() {
    let ws = Workspace::new();
    let files = vec![
        ws.emit("main-es2015.js", MAIN),
        ws.emit("broken-es2015.js", "let s = 'unterminated;"),
    ];
    let err = ws.process(ws.options(), &files).unwrap_err();
    match err {
        BundleError::Transform { file, .. } => assert!(file.ends_with("broken-es2015.js")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn sequential_and_parallel_builds_agree() {
    let one = Workspace::new();
    let many = Workspace::new();
    let files = emit_app(&one);
    emit_app(&many);

    let mut sequential = one.options();
    sequential.optimize = true;
    sequential.workers = 1;
    let mut parallel = many.options();
    parallel.optimize = true;
    parallel.workers = 4;

    let a = one.process_uncached(sequential, &files).unwrap();
    let b = many.process_uncached(parallel, &files).unwrap();
    assert_eq!(a, b);
    assert_eq!(one.read("main-es5.js"), many.read("main-es5.js"));
    assert_eq!(one.read("lazy/1-es5.js"), many.read("lazy/1-es5.js"));
}
