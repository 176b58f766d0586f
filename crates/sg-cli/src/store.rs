use std::fs;
use std::path::Path;
use std::time::Instant;

use sg_compiler::Ruleset;

/// Load a ruleset from rule text or from its serialized JSON form.
pub fn load_ruleset(path: &Path) -> Result<Ruleset, String> {
    let content = read_text(path)?;
    let start = Instant::now();

    let ruleset = if is_serialized(path, &content) {
        Ruleset::from_json(&content).map_err(|e| format!("'{}': {}", path.display(), e))?
    } else {
        Ruleset::new(&content)
    };

    log::debug!(
        "loaded '{}' ({} lines, {} rules) in {:.1}ms",
        path.display(),
        ruleset.line_count(),
        ruleset.index().rule_count(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(ruleset)
}

fn is_serialized(path: &Path, content: &str) -> bool {
    path.extension().is_some_and(|ext| ext == "json") || content.trim_start().starts_with('{')
}

pub fn read_text(path: &Path) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))
}

pub fn write_text(path: &Path, content: &str) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
    }
    fs::write(path, content).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))
}
