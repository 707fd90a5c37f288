use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Whether substitution also swaps materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaterialPolicy {
    /// Apply custom materials whenever the archive provides them.
    #[default]
    Always,
    /// Apply custom materials only when `use_custom_materials` is set.
    WhenEnabled,
}

impl MaterialPolicy {
    pub fn label(self) -> &'static str {
        match self {
            MaterialPolicy::Always => "Always",
            MaterialPolicy::WhenEnabled => "When enabled",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "ArchiveConfig::default_well_known_entry")]
    pub well_known_entry: String,
    #[serde(default = "ArchiveConfig::default_candidate_mesh_names")]
    pub candidate_mesh_names: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "MatcherConfig::default_exclusion_tokens")]
    pub exclusion_tokens: Vec<String>,
    #[serde(default = "MatcherConfig::default_ancestor_tokens")]
    pub ancestor_tokens: Vec<String>,
    #[serde(default = "MatcherConfig::default_mesh_tokens")]
    pub mesh_tokens: Vec<String>,
    #[serde(default = "MatcherConfig::default_mesh_token_pairs")]
    pub mesh_token_pairs: Vec<[String; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplacerConfig {
    #[serde(default)]
    pub archive_path: Option<PathBuf>,
    #[serde(default)]
    pub archive_search_dir: Option<PathBuf>,
    #[serde(default = "ReplacerConfig::default_archive_file_names")]
    pub archive_file_names: Vec<String>,
    #[serde(default)]
    pub material_policy: MaterialPolicy,
    #[serde(default)]
    pub use_custom_materials: bool,
    #[serde(default = "ReplacerConfig::default_search_radius")]
    pub search_radius: f32,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default)]
    pub debug_structure_dump: bool,
    #[serde(default = "ReplacerConfig::default_broken_shader_name")]
    pub broken_shader_name: String,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub archive_path: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub material_policy: Option<MaterialPolicy>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl ArchiveConfig {
    fn default_well_known_entry() -> String {
        "assets/switch_sign.obj".to_string()
    }

    fn default_candidate_mesh_names() -> Vec<String> {
        strings(&["switchmodel", "switch_sign", "switch_setter", "pole", "sign", "model"])
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            well_known_entry: Self::default_well_known_entry(),
            candidate_mesh_names: Self::default_candidate_mesh_names(),
        }
    }
}

impl MatcherConfig {
    fn default_exclusion_tokens() -> Vec<String> {
        strings(&["lever", "handle", "arm", "actuator", "moving"])
    }

    fn default_ancestor_tokens() -> Vec<String> {
        strings(&["switch_sign"])
    }

    fn default_mesh_tokens() -> Vec<String> {
        strings(&["switch_sign", "switchsign"])
    }

    fn default_mesh_token_pairs() -> Vec<[String; 2]> {
        vec![
            ["switch".to_string(), "sign".to_string()],
            ["switch".to_string(), "pole".to_string()],
        ]
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            exclusion_tokens: Self::default_exclusion_tokens(),
            ancestor_tokens: Self::default_ancestor_tokens(),
            mesh_tokens: Self::default_mesh_tokens(),
            mesh_token_pairs: Self::default_mesh_token_pairs(),
        }
    }
}

impl ReplacerConfig {
    fn default_archive_file_names() -> Vec<String> {
        strings(&["switchmodel", "switch_sign", "custom_switch"])
    }

    const fn default_search_radius() -> f32 {
        5.0
    }

    fn default_broken_shader_name() -> String {
        "Hidden/InternalErrorShader".to_string()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(path) = &overrides.archive_path {
            self.archive_path = Some(path.clone());
        }
        if let Some(verbose) = overrides.verbose {
            self.debug_logging = verbose;
        }
        if let Some(policy) = overrides.material_policy {
            self.material_policy = policy;
        }
    }

    /// Whether substituted renderers should also receive custom materials.
    pub fn applies_materials(&self) -> bool {
        match self.material_policy {
            MaterialPolicy::Always => true,
            MaterialPolicy::WhenEnabled => self.use_custom_materials,
        }
    }

    /// The explicit archive path if set, else the first known archive file
    /// name present in `archive_search_dir`.
    pub fn locate_archive(&self) -> Option<PathBuf> {
        if let Some(path) = &self.archive_path {
            return Some(path.clone());
        }
        let dir = self.archive_search_dir.as_ref()?;
        self.archive_file_names.iter().map(|name| dir.join(name)).find(|candidate| candidate.is_file())
    }
}

impl Default for ReplacerConfig {
    fn default() -> Self {
        Self {
            archive_path: None,
            archive_search_dir: None,
            archive_file_names: Self::default_archive_file_names(),
            material_policy: MaterialPolicy::default(),
            use_custom_materials: false,
            search_radius: Self::default_search_radius(),
            debug_logging: false,
            debug_structure_dump: false,
            broken_shader_name: Self::default_broken_shader_name(),
            archive: ArchiveConfig::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.archive_path.is_none() && self.verbose.is_none() && self.material_policy.is_none()
    }
}
