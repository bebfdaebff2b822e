use crate::output::print_json;
use crate::render::annotated_tree;
use anyhow::Context;
use std::path::Path;
use tracemap_core::observer::TracingObserver;
use tracemap_core::reconcile::Reconciler;
use tracemap_core::trace::TraceBundle;

pub fn run(
    root: &Path,
    bundle_path: &Path,
    trigger: Option<&str>,
    provider: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let (config, resolver) = super::load_resolver(root)?;
    let mut bundle = TraceBundle::load(bundle_path)
        .with_context(|| format!("failed to read trace bundle {}", bundle_path.display()))?;
    if let Some(provider) = provider {
        bundle.trace.provider = Some(provider.to_string());
    }

    let template = match trigger {
        Some(key) => resolver.registry().require(key)?,
        None => {
            let identifier = bundle
                .trace
                .trigger_identifier()
                .context("trace has no trigger_key or endpoint; pass --trigger")?;
            resolver.resolve(identifier, bundle.payload.as_ref())?
        }
    };

    let classifiers = config.classifier_set();
    let classifier = classifiers.for_trace(&bundle.trace);
    let observer = TracingObserver;
    let result = Reconciler::new(&observer).reconcile_trace(
        &template,
        &bundle.steps,
        &bundle.trace,
        classifier,
    );

    if json {
        return print_json(&result);
    }

    println!("template: {} ({})", template.name(), result.trigger_key);
    println!(
        "result:   {}",
        if result.result_action.is_empty() {
            "-"
        } else {
            result.result_action.as_str()
        }
    );
    println!("current:  {}", result.current.as_deref().unwrap_or("-"));
    for c in &result.alias_collisions {
        println!(
            "note:     '{}' matched both {} and {}; using {}",
            c.alias, c.replaced, c.kept, c.kept
        );
    }
    println!();
    print!("{}", annotated_tree(&result.root));
    Ok(())
}
