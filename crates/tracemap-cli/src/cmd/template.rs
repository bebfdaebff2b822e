use crate::output::{print_json, print_table};
use crate::render::template_tree;
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use tracemap_core::config::Config;
use tracemap_core::registry::{DirScan, TemplateRegistry};

#[derive(Subcommand)]
pub enum TemplateSubcommand {
    /// List loaded templates
    List,
    /// Print a template's decision tree
    Show { trigger: String },
    /// Load every template file and report problems
    Validate,
}

pub fn run(root: &Path, subcmd: TemplateSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TemplateSubcommand::List => list(root, json),
        TemplateSubcommand::Show { trigger } => show(root, &trigger, json),
        TemplateSubcommand::Validate => validate(root, json),
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, resolver) = super::load_resolver(root)?;
    let registry = resolver.registry();

    if json {
        let summaries: Vec<_> = registry
            .iter()
            .map(|t| {
                serde_json::json!({
                    "trigger_key": t.trigger_key(),
                    "id": t.id(),
                    "name": t.name(),
                    "description": t.description(),
                    "nodes": t.node_count(),
                })
            })
            .collect();
        print_json(&summaries)?;
        return Ok(());
    }

    if registry.is_empty() {
        println!("No templates.");
        return Ok(());
    }
    let rows = registry
        .iter()
        .map(|t| {
            vec![
                t.trigger_key().to_string(),
                t.id().to_string(),
                t.name().to_string(),
                t.node_count().to_string(),
            ]
        })
        .collect();
    print_table(&["TRIGGER", "ID", "NAME", "NODES"], rows);
    Ok(())
}

fn show(root: &Path, trigger: &str, json: bool) -> anyhow::Result<()> {
    let (_, resolver) = super::load_resolver(root)?;
    let template = resolver.registry().require(trigger)?;

    if json {
        print_json(&*template)?;
    } else {
        println!("{} ({})  trigger: {}", template.name(), template.id(), template.trigger_key());
        if let Some(description) = template.description() {
            println!("{description}");
        }
        println!();
        print!("{}", template_tree(template.root()));
    }
    Ok(())
}

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let dir = config.templates_dir(root);
    let scan = DirScan::scan(&dir).with_context(|| format!("failed to read {}", dir.display()))?;

    let mut errors: Vec<(String, String)> = scan
        .failed
        .iter()
        .map(|(path, e)| (path.display().to_string(), e.to_string()))
        .collect();
    let valid: Vec<String> = scan
        .loaded
        .iter()
        .map(|(path, _)| path.display().to_string())
        .collect();
    if let Err(e) = TemplateRegistry::from_templates(scan.loaded.into_iter().map(|(_, t)| t)) {
        errors.push((dir.display().to_string(), e.to_string()));
    }

    if json {
        let errors: Vec<_> = errors
            .iter()
            .map(|(file, error)| serde_json::json!({ "file": file, "error": error }))
            .collect();
        print_json(&serde_json::json!({ "valid": valid, "errors": errors }))?;
    } else {
        for file in &valid {
            println!("ok     {file}");
        }
        for (file, error) in &errors {
            println!("error  {file}: {error}");
        }
        if valid.is_empty() && errors.is_empty() {
            println!("No templates in {}", dir.display());
        }
    }

    if !errors.is_empty() {
        anyhow::bail!("{} template problem(s) found", errors.len());
    }
    Ok(())
}
