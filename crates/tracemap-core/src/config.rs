use crate::classify::{ClassifierRules, ClassifierSet};
use crate::error::{Result, TracemapError};
use crate::paths;
use crate::registry::{AliasRule, TemplateRegistry};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: String) -> Self {
        Self {
            level: WarnLevel::Warning,
            message,
        }
    }

    fn error(message: String) -> Self {
        Self {
            level: WarnLevel::Error,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    /// Relative to the project root. Defaults to `.tracemap/templates`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<AliasRule>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub classifiers: HashMap<String, ClassifierRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            templates_dir: None,
            aliases: Vec::new(),
            classifiers: HashMap::new(),
            default_provider: None,
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(TracemapError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn templates_dir(&self, root: &Path) -> PathBuf {
        match &self.templates_dir {
            Some(dir) => root.join(dir),
            None => paths::default_templates_dir(root),
        }
    }

    pub fn load_registry(&self, root: &Path) -> Result<TemplateRegistry> {
        TemplateRegistry::load_dir(&self.templates_dir(root))
    }

    pub fn classifier_set(&self) -> ClassifierSet {
        ClassifierSet::from_rules(&self.classifiers, self.default_provider.as_deref())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Alias targets can only be checked when a registry is supplied.
    pub fn validate(&self, registry: Option<&TemplateRegistry>) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for (i, alias) in self.aliases.iter().enumerate() {
            if let Err(e) = Regex::new(&alias.endpoint) {
                warnings.push(ConfigWarning::error(format!(
                    "aliases[{i}]: invalid endpoint pattern '{}': {e}",
                    alias.endpoint
                )));
            }
            if alias.discriminator.trim().is_empty() {
                warnings.push(ConfigWarning::error(format!(
                    "aliases[{i}]: empty discriminator"
                )));
            }
            if let Some(registry) = registry {
                if !registry.contains(&alias.trigger) {
                    warnings.push(ConfigWarning::warning(format!(
                        "aliases[{i}]: trigger '{}' has no template",
                        alias.trigger
                    )));
                }
            }
        }

        let mut providers: Vec<_> = self.classifiers.iter().collect();
        providers.sort_by(|a, b| a.0.cmp(b.0));
        for (provider, table) in providers {
            for (i, rule) in table.rules.iter().enumerate() {
                if rule.field.trim().is_empty() {
                    warnings.push(ConfigWarning::error(format!(
                        "classifiers.{provider}.rules[{i}]: empty field"
                    )));
                }
                if rule.action.trim().is_empty() {
                    warnings.push(ConfigWarning::error(format!(
                        "classifiers.{provider}.rules[{i}]: empty action"
                    )));
                }
            }
        }

        if let Some(provider) = &self.default_provider {
            if !self.classifiers.contains_key(provider) {
                warnings.push(ConfigWarning::warning(format!(
                    "default_provider '{provider}' has no classifier rules"
                )));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
