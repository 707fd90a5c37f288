use glam::Vec3;
use log::trace;

use crate::config::MatcherConfig;
use crate::host::{ancestor_names, ObjectId, ResourceTable, SceneGraph};

/// Decides from names alone whether a renderer is switch sign geometry.
pub trait SignClassifier {
    /// `ancestors` starts with the renderer's own object and walks up to the
    /// scene root; `mesh_name` is the name of the mesh it currently shows.
    fn is_switch_sign(&self, ancestors: &[String], mesh_name: Option<&str>) -> bool;
}

impl<F> SignClassifier for F
where
    F: Fn(&[String], Option<&str>) -> bool,
{
    fn is_switch_sign(&self, ancestors: &[String], mesh_name: Option<&str>) -> bool {
        self(ancestors, mesh_name)
    }
}

/// Substring heuristic over case-folded object and mesh names.
#[derive(Debug, Clone)]
pub struct NameHeuristic {
    exclusion_tokens: Vec<String>,
    ancestor_tokens: Vec<String>,
    mesh_tokens: Vec<String>,
    mesh_token_pairs: Vec<[String; 2]>,
}

impl NameHeuristic {
    pub fn from_config(config: &MatcherConfig) -> Self {
        let fold = |tokens: &[String]| tokens.iter().map(|t| t.to_lowercase()).collect::<Vec<_>>();
        Self {
            exclusion_tokens: fold(&config.exclusion_tokens),
            ancestor_tokens: fold(&config.ancestor_tokens),
            mesh_tokens: fold(&config.mesh_tokens),
            mesh_token_pairs: config
                .mesh_token_pairs
                .iter()
                .map(|[a, b]| [a.to_lowercase(), b.to_lowercase()])
                .collect(),
        }
    }

    fn excluded(&self, name: &str) -> bool {
        self.exclusion_tokens.iter().any(|token| name.contains(token.as_str()))
    }
}

impl Default for NameHeuristic {
    fn default() -> Self {
        Self::from_config(&MatcherConfig::default())
    }
}

impl SignClassifier for NameHeuristic {
    fn is_switch_sign(&self, ancestors: &[String], mesh_name: Option<&str>) -> bool {
        for name in ancestors {
            let name = name.to_lowercase();
            if self.excluded(&name) {
                return false;
            }
            if self.ancestor_tokens.iter().any(|token| name.contains(token.as_str())) {
                return true;
            }
        }
        let Some(mesh_name) = mesh_name.map(str::to_lowercase) else {
            return false;
        };
        if self.excluded(&mesh_name) {
            return false;
        }
        self.mesh_tokens.iter().any(|token| mesh_name.contains(token.as_str()))
            || self
                .mesh_token_pairs
                .iter()
                .any(|[a, b]| mesh_name.contains(a.as_str()) && mesh_name.contains(b.as_str()))
    }
}

/// Finds switch sign renderers around a trigger point by brute-force scan.
pub struct SpatialMatcher {
    classifier: Box<dyn SignClassifier>,
    radius: f32,
}

impl SpatialMatcher {
    pub const DEFAULT_RADIUS: f32 = 5.0;

    pub fn new(classifier: Box<dyn SignClassifier>, radius: f32) -> Self {
        Self { classifier, radius }
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn find_candidates<H>(&self, host: &H, point: Vec3) -> Vec<ObjectId>
    where
        H: SceneGraph + ResourceTable + ?Sized,
    {
        self.find_candidates_within(host, point, self.radius)
    }

    pub fn find_candidates_within<H>(&self, host: &H, point: Vec3, radius: f32) -> Vec<ObjectId>
    where
        H: SceneGraph + ResourceTable + ?Sized,
    {
        host.renderers()
            .into_iter()
            .filter(|&id| host.world_position(id).is_some_and(|pos| pos.distance(point) <= radius))
            .filter(|&id| {
                let ancestors = ancestor_names(host, id);
                let mesh_name = host.renderer_mesh(id).and_then(|mesh| host.mesh_name(mesh));
                let accepted = self.classifier.is_switch_sign(&ancestors, mesh_name.as_deref());
                trace!("Renderer {id:?} {ancestors:?} mesh {mesh_name:?}: accepted={accepted}");
                accepted
            })
            .collect()
    }
}

impl Default for SpatialMatcher {
    fn default() -> Self {
        Self::new(Box::new(NameHeuristic::default()), Self::DEFAULT_RADIUS)
    }
}
