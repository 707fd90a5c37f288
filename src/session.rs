use log::{debug, info, warn};
use std::time::{Duration, Instant};

use crate::cache::ReplacementCache;
use crate::config::ReplacerConfig;
use crate::error::ReplacerError;
use crate::host::{Host, ObjectId};
use crate::matcher::{NameHeuristic, SpatialMatcher};
use crate::substitution::{ApplySummary, SubstitutionEngine};

const TRIGGER_COUNT_INTERVAL: Duration = Duration::from_secs(1);

struct TriggerCount {
    value: usize,
    sampled_at: Instant,
}

/// Per-mod-session state: the replacement cache, the substitution engine and
/// the toggles the host integration flips. Constructed by the caller, reset by
/// [`ReplacerSession::reload`] and torn down by [`ReplacerSession::shutdown`].
pub struct ReplacerSession {
    config: ReplacerConfig,
    cache: ReplacementCache,
    engine: SubstitutionEngine,
    enabled: bool,
    trigger_count: Option<TriggerCount>,
}

impl ReplacerSession {
    pub fn new(config: ReplacerConfig) -> Self {
        let matcher =
            SpatialMatcher::new(Box::new(NameHeuristic::from_config(&config.matcher)), config.search_radius);
        Self::with_matcher(config, matcher)
    }

    /// Like [`ReplacerSession::new`] but with a caller-supplied matcher.
    pub fn with_matcher(config: ReplacerConfig, matcher: SpatialMatcher) -> Self {
        let archive_path = config.locate_archive();
        match &archive_path {
            Some(path) => info!("Custom switch archive: {}", path.display()),
            None => warn!("No custom switch archive found"),
        }
        let cache = ReplacementCache::new(config.archive.clone(), archive_path, config.broken_shader_name.clone());
        let engine = SubstitutionEngine::new(matcher, config.applies_materials(), config.broken_shader_name.clone())
            .with_debug_structure_dump(config.debug_structure_dump);
        info!("Material policy: {}", config.material_policy.label());
        Self { config, cache, engine, enabled: true, trigger_count: None }
    }

    pub fn config(&self) -> &ReplacerConfig {
        &self.config
    }

    pub fn cache(&self) -> &ReplacementCache {
        &self.cache
    }

    pub fn engine(&self) -> &SubstitutionEngine {
        &self.engine
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!("Switch replacement {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    /// Toggles custom materials under the gated policy. Takes effect on the
    /// next substitution.
    pub fn set_use_custom_materials(&mut self, use_custom: bool) {
        self.config.use_custom_materials = use_custom;
        self.engine.set_apply_materials(self.config.applies_materials());
    }

    /// Host hook for a newly created switch instance.
    pub fn on_instance_created<H: Host + ?Sized>(&mut self, host: &mut H, instance: ObjectId) -> bool {
        if !self.enabled {
            debug!("Replacement disabled; ignoring instance {instance:?}");
            return false;
        }
        self.engine.apply_to_instance(host, &mut self.cache, instance)
    }

    /// Reprocesses every switch in the scene, including already processed ones.
    pub fn apply_all<H: Host + ?Sized>(&mut self, host: &mut H) -> Result<ApplySummary, ReplacerError> {
        self.engine.clear_processed();
        self.engine.apply_to_all(host, &mut self.cache)
    }

    pub fn restore_all<H: Host + ?Sized>(&mut self, host: &mut H) -> usize {
        self.engine.restore_all(host, &mut self.cache)
    }

    pub fn refresh_materials<H: Host + ?Sized>(&mut self, host: &mut H) -> usize {
        self.engine.refresh_materials_if_needed(host, &mut self.cache)
    }

    /// Re-locates the archive, restores everything and reapplies from a clean
    /// cache. Returns `None` when no model is available afterwards.
    pub fn reload<H: Host + ?Sized>(&mut self, host: &mut H) -> Option<ApplySummary> {
        info!("Reloading custom switch model");
        self.restore_all(host);
        self.cache.set_archive_path(self.config.locate_archive());
        self.trigger_count = None;
        if self.cache.mesh(host).is_none() {
            warn!("Reload finished without a usable custom model");
            return None;
        }
        match self.apply_all(host) {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!("Reapply after reload failed: {err}");
                None
            }
        }
    }

    /// Restores every substituted renderer and releases the archive.
    pub fn shutdown<H: Host + ?Sized>(&mut self, host: &mut H) {
        let restored = self.restore_all(host);
        self.trigger_count = None;
        info!("Switch replacer shut down ({restored} switches restored)");
    }

    /// Number of switch triggers in the scene, sampled at most once a second.
    pub fn trigger_count<H: Host + ?Sized>(&mut self, host: &H) -> usize {
        self.trigger_count_at(host, Instant::now())
    }

    pub fn trigger_count_at<H: Host + ?Sized>(&mut self, host: &H, now: Instant) -> usize {
        match &self.trigger_count {
            Some(cached) if now.saturating_duration_since(cached.sampled_at) < TRIGGER_COUNT_INTERVAL => {
                cached.value
            }
            _ => {
                let value = host.switch_triggers().len();
                self.trigger_count = Some(TriggerCount { value, sampled_at: now });
                value
            }
        }
    }
}
