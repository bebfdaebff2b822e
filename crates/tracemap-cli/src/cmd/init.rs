use anyhow::Context;
use std::path::Path;
use tracemap_core::{config::Config, io, paths};

pub fn run(root: &Path) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing tracemap in: {}", root.display());

    for dir in [paths::tracemap_dir(root), paths::default_templates_dir(root)] {
        io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    println!("\nNext: add workflow templates under {}/", paths::TEMPLATES_DIR);
    Ok(())
}
