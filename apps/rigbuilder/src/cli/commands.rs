//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::Settings;
use crate::reporter::ConsoleReporter;
use rigbuilder_core::{
    ConnectionPolicy, Context, ModuleId, ModuleLibrary, ModuleTree, RigError, Runtime,
    load_from_file, module_to_xml, save_to_file, validate,
};
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// SHARED HELPERS
// =============================================================================

/// Library over the configured roots with freshly scanned UID caches.
pub fn open_library(settings: &Settings) -> ModuleLibrary {
    let mut library = ModuleLibrary::new(&settings.server_modules, &settings.local_modules)
        .with_update_source(settings.update_source);
    library.refresh();
    library
}

/// Plain-data bindings of a run context; host objects are left out.
pub fn bindings_json(context: &Context) -> Value {
    let map: Map<String, Value> = context
        .iter()
        .filter_map(|(name, binding)| binding.as_value().map(|v| (name.clone(), v.clone())))
        .collect();
    Value::Object(map)
}

/// Nested description of module `id`: attributes, connections, children.
pub fn tree_json(tree: &ModuleTree, id: ModuleId) -> Result<Value, RigError> {
    let module = tree.module(id)?;
    let attributes = module
        .attributes()
        .iter()
        .map(|a| {
            json!({
                "name": a.name(),
                "template": a.template(),
                "category": a.category(),
                "value": a.default_value(),
                "connect": a.connect(),
                "expression": a.expression(),
            })
        })
        .collect::<Vec<_>>();
    let children = module
        .children()
        .iter()
        .map(|child| tree_json(tree, *child))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({
        "name": module.name(),
        "uid": module.uid(),
        "muted": module.muted(),
        "file": module.file_path().map(|p| p.to_string_lossy().into_owned()),
        "attributes": attributes,
        "children": children,
    }))
}

fn print_json(output: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(output).unwrap_or_default()
    );
}

fn print_tree(tree: &ModuleTree, id: ModuleId, depth: usize) -> Result<(), RigError> {
    let module = tree.module(id)?;
    let indent = "  ".repeat(depth);
    let mut header = format!("{}{}", indent, module.name());
    if module.muted() {
        header.push_str(" (muted)");
    }
    if !module.uid().is_empty() {
        header.push_str(&format!(" [{}]", module.uid()));
    }
    println!("{}", header);

    for attribute in module.attributes() {
        let mut line = format!("{}  .{} = {}", indent, attribute.name(), attribute.default_value());
        if !attribute.connect().is_empty() {
            line.push_str(&format!(" <- {}", attribute.connect()));
        }
        if !attribute.expression().is_empty() {
            line.push_str(" (expression)");
        }
        println!("{}", line);
    }
    for child in module.children() {
        print_tree(tree, *child, depth + 1)?;
    }
    Ok(())
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Load, update and run a module.
pub fn cmd_run(
    settings: &Settings,
    spec: &str,
    json_mode: bool,
    quiet: bool,
) -> Result<(), RigError> {
    let library = open_library(settings);
    let mut tree = ModuleTree::new();
    let root = library.load_module(&mut tree, spec)?;

    let total = tree.descendants(root)?.len();
    let runtime = Runtime::with_reporter(Arc::new(ConsoleReporter::new(quiet)));
    let mut step = 0usize;
    let context = runtime.run_with(&mut tree, root, &mut |tree, id| {
        step += 1;
        let path = tree.path(id).unwrap_or_default();
        tracing::info!("[{}/{}] {}", step, total, path);
    })?;

    let bindings = bindings_json(&context);
    if json_mode {
        print_json(&json!({
            "module": tree.module(root)?.name(),
            "modules_run": step,
            "bindings": bindings,
        }));
        return Ok(());
    }

    if let Value::Object(map) = bindings {
        for (name, value) in map {
            println!("{} = {}", name, value);
        }
    }
    Ok(())
}

// =============================================================================
// TREE COMMAND
// =============================================================================

/// Print a module's hierarchy.
pub fn cmd_tree(settings: &Settings, spec: &str, json_mode: bool) -> Result<(), RigError> {
    let library = open_library(settings);
    let mut tree = ModuleTree::new();
    let root = library.load_module(&mut tree, spec)?;

    if json_mode {
        print_json(&tree_json(&tree, root)?);
        return Ok(());
    }
    print_tree(&tree, root, 0)
}

// =============================================================================
// UIDS COMMAND
// =============================================================================

/// Print both UID caches.
pub fn cmd_uids(settings: &Settings, json_mode: bool) -> Result<(), RigError> {
    let library = open_library(settings);
    let cache = library.cache();

    if json_mode {
        let section = |entries: &std::collections::BTreeMap<String, std::path::PathBuf>| {
            entries
                .iter()
                .map(|(uid, path)| (uid.clone(), json!(path.to_string_lossy())))
                .collect::<Map<String, Value>>()
        };
        print_json(&json!({
            "server_root": settings.server_modules.to_string_lossy(),
            "local_root": settings.local_modules.to_string_lossy(),
            "update_source": settings.update_source,
            "server": section(cache.server()),
            "local": section(cache.local()),
        }));
        return Ok(());
    }

    println!("RigBuilder Modules");
    println!("==================");
    println!("Server: {}", settings.server_modules.display());
    println!("Local:  {}", settings.local_modules.display());
    println!("Source: {:?}", settings.update_source);
    println!();
    println!("Server UIDs ({}):", cache.server().len());
    for (uid, path) in cache.server() {
        println!("  {}  {}", uid, path.display());
    }
    println!("Local UIDs ({}):", cache.local().len());
    for (uid, path) in cache.local() {
        println!("  {}  {}", uid, path.display());
    }
    Ok(())
}

// =============================================================================
// UPDATE COMMAND
// =============================================================================

/// Update the module in `file` and its children from their reference files,
/// saving the result when `write` is set.
///
/// Returns the module name and whether the update altered its saved form.
pub fn update_module_file(
    library: &ModuleLibrary,
    file: &Path,
    write: bool,
) -> Result<(String, bool), RigError> {
    let mut tree = ModuleTree::new();
    let root = load_from_file(&mut tree, file)?;
    let before = module_to_xml(&tree, root, ConnectionPolicy::KeepAll)?;
    library.update(&mut tree, root)?;
    let changed = module_to_xml(&tree, root, ConnectionPolicy::KeepAll)? != before;

    if write {
        save_to_file(&mut tree, root, file, false)?;
    }
    Ok((tree.module(root)?.name().to_string(), changed))
}

/// Update a module file and its children from their reference files.
pub fn cmd_update(
    settings: &Settings,
    file: &Path,
    write: bool,
    json_mode: bool,
) -> Result<(), RigError> {
    let library = open_library(settings);
    let (name, changed) = update_module_file(&library, file, write)?;

    if json_mode {
        print_json(&json!({
            "file": file.to_string_lossy(),
            "module": name,
            "changed": changed,
            "written": write,
        }));
        return Ok(());
    }

    if changed {
        println!("Updated {}", file.display());
    } else {
        println!("{} is up to date", file.display());
    }
    if write {
        println!("Saved.");
    } else {
        println!("Not saved (use --write to save).");
    }
    Ok(())
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Report problems in a module's subtree.
pub fn cmd_validate(settings: &Settings, spec: &str, json_mode: bool) -> Result<(), RigError> {
    let library = open_library(settings);
    let mut tree = ModuleTree::new();
    let root = library.load_module(&mut tree, spec)?;
    let issues = validate(&tree, root)?;

    if json_mode {
        print_json(&json!({
            "module": tree.module(root)?.name(),
            "issues": issues,
        }));
        return Ok(());
    }

    if issues.is_empty() {
        println!("No issues found.");
    } else {
        for issue in &issues {
            println!("{}", issue);
        }
        println!();
        println!("{} issue(s) found.", issues.len());
    }
    Ok(())
}
