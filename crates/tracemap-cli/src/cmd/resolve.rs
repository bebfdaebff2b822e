use crate::output::print_json;
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, endpoint: &str, payload: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let (_, resolver) = super::load_resolver(root)?;

    let payload = payload
        .map(|path| -> anyhow::Result<serde_json::Value> {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON payload in {}", path.display()))
        })
        .transpose()?;

    let template = resolver.resolve(endpoint, payload.as_ref())?;

    if json {
        print_json(&serde_json::json!({
            "identifier": endpoint,
            "trigger_key": template.trigger_key(),
            "template_id": template.id(),
            "name": template.name(),
        }))?;
    } else {
        println!("{endpoint} -> {} ({})", template.trigger_key(), template.id());
    }
    Ok(())
}
