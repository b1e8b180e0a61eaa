//! `duet process`: generates downlevel bundles for a build's output.
//!
//! 1. Resolve the project and its `duet.toml`
//! 2. Merge CLI flags over the configuration
//! 3. Read the emitted-files manifest, or discover bundles in the output path
//! 4. Run the bundle processor, with the disk cache unless disabled
//! 5. Print the module / no-module / passthrough lists

use std::path::{Path, PathBuf};
use std::sync::Arc;

use duet_bundle::{
    BundleFile, BundleManifest, BundleProcessor, ProcessorOptions, SourceMapOptions,
};
use duet_cache::{CacheStore, DiskStore};
use duet_config::ProjectConfig;

use crate::project::{resolve_project, Project};
use crate::{GlobalArgs, ProcessArgs};

/// Runs the `duet process` command.
///
/// Returns exit code 0 on success; failures are returned as errors.
pub fn run(args: &ProcessArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = resolve_project(global)?;
    let options = build_options(args, &project)?;

    let files = match args.manifest {
        Some(ref manifest) => read_manifest(Path::new(manifest))?,
        None => discover_bundles(&options.output_path, options.naming.modern_tag())?,
    };

    let store = open_store(args, &project);
    if !global.quiet {
        eprintln!(
            "  Processing {} files in {}",
            files.len(),
            options.output_path.display()
        );
    }

    let processor = BundleProcessor::new(options, store);
    let manifest = processor.process_bundles(&files)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else if !global.quiet {
        print!("{}", render_manifest(&manifest));
    }
    Ok(0)
}

/// Builds processor options from the configuration, with CLI flags taking
/// precedence.
pub fn build_options(
    args: &ProcessArgs,
    project: &Project,
) -> Result<ProcessorOptions, Box<dyn std::error::Error>> {
    let config: &ProjectConfig = &project.config;
    let build = &config.build;

    let output_path = match args.output_path {
        Some(ref p) => PathBuf::from(p),
        None => project.path(&build.output_path),
    };
    let mut options = ProcessorOptions::new(output_path);

    options.optimize = if args.optimize {
        true
    } else if args.no_optimize {
        false
    } else {
        build.optimize
    };
    options.source_maps = SourceMapOptions {
        scripts: args.source_maps || args.hidden_source_maps || build.source_maps.scripts,
        hidden: args.hidden_source_maps || build.source_maps.hidden,
        vendor: args.vendor_source_maps || build.source_maps.vendor,
    };
    options.script_entry_points = build.script_entry_points.clone();
    if let Some(workers) = args.workers.or(build.workers) {
        if workers == 0 {
            return Err("--workers must be at least 1".into());
        }
        options.workers = workers;
    }
    options.naming = config.naming.target_naming()?;
    Ok(options)
}

fn open_store(args: &ProcessArgs, project: &Project) -> Option<Arc<dyn CacheStore>> {
    let cache = &project.config.cache;
    if args.no_cache || !cache.enabled {
        return None;
    }
    Some(Arc::new(DiskStore::new(project.path(&cache.path))))
}

/// Reads a JSON list of emitted files.
pub fn read_manifest(path: &Path) -> Result<Vec<BundleFile>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read manifest {}: {e}", path.display()))?;
    let files = serde_json::from_str(&content)
        .map_err(|e| format!("invalid manifest {}: {e}", path.display()))?;
    Ok(files)
}

/// Discovers `.js` and `.css` files under `output_path` (recursive), sorted
/// by path. The identifier is the file stem without the modern tag suffix.
pub fn discover_bundles(
    output_path: &Path,
    modern_tag: &str,
) -> Result<Vec<BundleFile>, Box<dyn std::error::Error>> {
    let mut paths = Vec::new();
    walk_dir(output_path, &mut paths)?;
    paths.sort();

    let suffix = format!("-{modern_tag}");
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let relative = path
            .strip_prefix(output_path)
            .unwrap_or(path.as_path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let mut file = BundleFile::new("", relative);
        let stem = file.file_name().split('.').next().unwrap_or_default();
        let identifier = stem.strip_suffix(&suffix).unwrap_or(stem).to_string();
        file.identifier = identifier;
        files.push(file);
    }
    Ok(files)
}

/// Recursively walks a directory collecting bundle files.
fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, files)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("js") | Some("css")
        ) {
            files.push(path);
        }
    }
    Ok(())
}

/// Renders the file lists as indented text.
pub fn render_manifest(manifest: &BundleManifest) -> String {
    let mut out = String::new();
    for (title, files) in [
        ("module", &manifest.module_files),
        ("nomodule", &manifest.no_module_files),
        ("passthrough", &manifest.passthrough_files),
    ] {
        out.push_str(&format!("{title} ({}):\n", files.len()));
        for file in files {
            out.push_str(&format!("  {}\n", file.path));
        }
    }
    out
}
