pub mod archive;
pub mod bundle;
pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod matcher;
pub mod mesh;
pub mod obj;
pub mod session;
pub mod substitution;

pub use archive::{MeshArchiveLoader, MeshSource, PrefabExtract, ResolvedMesh};
pub use cache::ReplacementCache;
pub use config::{ConfigOverrides, MaterialPolicy, ReplacerConfig};
pub use error::{ArchiveError, HostError, MeshError, ObjParseError, ReplacerError};
pub use host::memory::MemoryHost;
pub use host::{Host, ObjectId};
pub use matcher::{NameHeuristic, SignClassifier, SpatialMatcher};
pub use mesh::TriangleMesh;
pub use obj::parse_obj;
pub use session::ReplacerSession;
pub use substitution::{ApplySummary, SubstitutionEngine};
