use crate::error::{Result, TracemapError};
use crate::io::list_files;
use crate::paths::is_template_file;
use crate::template::WorkflowTemplate;
use crate::trace::lookup_path;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// TemplateRegistry
// ---------------------------------------------------------------------------

/// Templates keyed by trigger. Populated once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Arc<WorkflowTemplate>>,
}

/// Outcome of loading every template file in a directory.
#[derive(Debug, Default)]
pub struct DirScan {
    pub loaded: Vec<(PathBuf, WorkflowTemplate)>,
    pub failed: Vec<(PathBuf, TracemapError)>,
}

impl DirScan {
    /// Load each template file in `dir` (sorted by name), collecting failures
    /// instead of stopping at the first one.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut scan = DirScan::default();
        for path in list_files(dir, is_template_file)? {
            match WorkflowTemplate::load(&path) {
                Ok(template) => scan.loaded.push((path, template)),
                Err(e) => scan.failed.push((path, e)),
            }
        }
        Ok(scan)
    }
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_templates(templates: impl IntoIterator<Item = WorkflowTemplate>) -> Result<Self> {
        let mut registry = TemplateRegistry::new();
        for template in templates {
            registry.register(template)?;
        }
        Ok(registry)
    }

    /// Load every template in `dir`. Any invalid file fails the whole load.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let scan = DirScan::scan(dir)?;
        if let Some((_, err)) = scan.failed.into_iter().next() {
            return Err(err);
        }
        TemplateRegistry::from_templates(scan.loaded.into_iter().map(|(_, t)| t))
    }

    fn register(&mut self, template: WorkflowTemplate) -> Result<()> {
        let key = template.trigger_key().to_string();
        if self.templates.contains_key(&key) {
            return Err(TracemapError::DuplicateTemplate(key));
        }
        self.templates.insert(key, Arc::new(template));
        Ok(())
    }

    pub fn get(&self, trigger_key: &str) -> Option<Arc<WorkflowTemplate>> {
        self.templates.get(trigger_key).cloned()
    }

    pub fn require(&self, trigger_key: &str) -> Result<Arc<WorkflowTemplate>> {
        self.get(trigger_key)
            .ok_or_else(|| TracemapError::UnknownTrigger(trigger_key.to_string()))
    }

    pub fn contains(&self, trigger_key: &str) -> bool {
        self.templates.contains_key(trigger_key)
    }

    /// Templates sorted by trigger key.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<WorkflowTemplate>> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Trigger aliasing
// ---------------------------------------------------------------------------

/// Remaps a generic endpoint to a specific trigger when the inbound
/// payload's discriminator has a known value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasRule {
    /// Regex over the endpoint path or trigger identifier.
    pub endpoint: String,
    /// Dotted path into the inbound payload.
    pub discriminator: String,
    /// Compared case-insensitively.
    pub equals: String,
    pub trigger: String,
}

#[derive(Debug, Clone)]
struct CompiledAlias {
    endpoint: Regex,
    discriminator: String,
    equals: String,
    trigger: String,
}

impl CompiledAlias {
    fn applies(&self, identifier: &str, payload: Option<&Value>) -> bool {
        if !self.endpoint.is_match(identifier) {
            return false;
        }
        let Some(value) = payload.and_then(|p| lookup_path(p, &self.discriminator)) else {
            return false;
        };
        match value {
            Value::String(s) => s.eq_ignore_ascii_case(&self.equals),
            Value::Null => false,
            other => other.to_string().eq_ignore_ascii_case(&self.equals),
        }
    }
}

/// Trigger key implied by an endpoint path or trigger name: the last
/// non-empty path segment, query string dropped, lowercased, `-` → `_`.
pub fn derive_trigger_key(identifier: &str) -> String {
    let path = identifier.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/')
        .find(|segment| !segment.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_lowercase()
        .replace('-', "_")
}

// ---------------------------------------------------------------------------
// TriggerResolver
// ---------------------------------------------------------------------------

/// Maps inbound identifiers to templates.
#[derive(Debug, Clone)]
pub struct TriggerResolver {
    registry: Arc<TemplateRegistry>,
    aliases: Vec<CompiledAlias>,
}

impl TriggerResolver {
    pub fn new(registry: Arc<TemplateRegistry>, aliases: &[AliasRule]) -> Result<Self> {
        let aliases = aliases
            .iter()
            .map(|rule| -> Result<CompiledAlias> {
                Ok(CompiledAlias {
                    endpoint: Regex::new(&rule.endpoint)?,
                    discriminator: rule.discriminator.clone(),
                    equals: rule.equals.clone(),
                    trigger: rule.trigger.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { registry, aliases })
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// The trigger key `identifier` maps to, without checking the registry.
    /// Alias rules are tried in order before the path-derived key.
    pub fn trigger_key(&self, identifier: &str, payload: Option<&Value>) -> String {
        self.aliases
            .iter()
            .find(|alias| alias.applies(identifier, payload))
            .map(|alias| alias.trigger.clone())
            .unwrap_or_else(|| derive_trigger_key(identifier))
    }

    pub fn resolve(&self, identifier: &str, payload: Option<&Value>) -> Result<Arc<WorkflowTemplate>> {
        let key = self.trigger_key(identifier, payload);
        tracing::debug!(identifier, trigger = %key, "resolving trigger");
        self.registry
            .get(&key)
            .ok_or_else(|| TracemapError::UnknownTrigger(identifier.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
