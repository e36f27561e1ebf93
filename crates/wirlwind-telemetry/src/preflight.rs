//! Preflight: resolve every template of every collection without touching
//! the device.
//!
//! Prints one line per template with the tier that satisfied it, warns on
//! missing optional `_schema.yaml` sidecars, and reports failure when any
//! template cannot be resolved.

use std::path::Path;
use wirlwind_collections::CollectionRegistry;
use wirlwind_parse::ParserChain;

/// Returns `true` when every template of every collection resolves.
/// Missing schemas only warn.
pub fn run(collections: &CollectionRegistry, chain: &ParserChain, collections_dir: &Path) -> bool {
    let mut ok = true;

    for config in collections.iter() {
        println!(
            "collection {} (vendor file: {}, command: {:?}, interval: {}s)",
            config.name, config.vendor, config.command, config.interval_seconds
        );

        for spec in &config.parsers {
            for template in spec.template_names() {
                match chain.resolver().resolve(template) {
                    Ok(resolved) => {
                        println!(
                            "  {template} -> {} ({})",
                            resolved.path.display(),
                            resolved.tier
                        );
                    }
                    Err(e) => {
                        println!("  {template} -> NOT FOUND");
                        tracing::error!(collection = %config.name, template, error = %e, "Template unresolvable");
                        ok = false;
                    }
                }
            }
        }

        if config.schema.is_none() {
            let path = collections_dir.join(&config.name).join("_schema.yaml");
            tracing::warn!(
                collection = %config.name,
                path = %path.display(),
                "No _schema.yaml, type coercion disabled"
            );
        }
    }

    if ok {
        println!("preflight ok: {} collections", collections.len());
    } else {
        println!("preflight failed: unresolved templates");
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirlwind_parse::{EngineSet, ParserChain, TemplateResolver};

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    const CPU_YAML: &str = "\
command: show processes cpu sorted
parsers:
  - type: textfsm
    templates:
      - cpu.textfsm
";

    #[test]
    fn passes_when_all_templates_resolve() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "collections/cpu/cisco_ios.yaml", CPU_YAML);
        write(dir.path(), "templates/textfsm/cpu.textfsm", "Value X (.*)");

        let collections =
            CollectionRegistry::load(&dir.path().join("collections"), "cisco_ios").unwrap();
        let chain = ParserChain::new(
            TemplateResolver::new(vec![dir.path().join("templates/textfsm")], vec![]),
            EngineSet::new(),
        );
        assert!(run(&collections, &chain, &dir.path().join("collections")));
    }

    #[test]
    fn fails_on_unresolved_template() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "collections/cpu/cisco_ios.yaml", CPU_YAML);

        let collections =
            CollectionRegistry::load(&dir.path().join("collections"), "cisco_ios").unwrap();
        let chain = ParserChain::new(
            TemplateResolver::new(vec![dir.path().join("templates/textfsm")], vec![]),
            EngineSet::new(),
        );
        assert!(!run(&collections, &chain, &dir.path().join("collections")));
    }
}
