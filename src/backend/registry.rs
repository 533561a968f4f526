//! Backend registry
//!
//! Maps backend ids to factories registered at startup and memoizes the
//! instances they produce. Construction may be expensive (opening clients),
//! so each id is built at most once per registry.
use crate::{
    backend::{DiskBackend, MemoryBackend, S3Backend, S3Config, StorageBackend, INLINE_BACKEND_ID},
    config::{BackendConfig, StorageConfig},
    error::{DocError, DocResult},
    metrics,
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const MAX_BACKEND_ID_LEN: usize = 255;

pub type BackendFuture = BoxFuture<'static, DocResult<Arc<dyn StorageBackend>>>;

/// Constructor for a backend instance
pub type BackendFactory = Arc<dyn Fn() -> BackendFuture + Send + Sync>;

/// Where a backend id keeps its payloads
#[derive(Clone)]
pub enum Placement {
    /// Bytes live in the metadata row
    Inline,
    /// Bytes live in an external backend keyed by document id
    External(Arc<dyn StorageBackend>),
}

impl Placement {
    pub fn is_inline(&self) -> bool {
        matches!(self, Placement::Inline)
    }
}

impl std::fmt::Debug for Placement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Placement::Inline => f.write_str("Inline"),
            Placement::External(backend) => write!(f, "External({})", backend.kind()),
        }
    }
}

/// Startup-time registration table for backends
#[derive(Default)]
pub struct BackendRegistryBuilder {
    factories: Vec<(String, BackendFactory)>,
    default_backend: Option<String>,
}

impl BackendRegistryBuilder {
    /// Register an async constructor under `id`
    pub fn register<F, Fut>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DocResult<Arc<dyn StorageBackend>>> + Send + 'static,
    {
        let factory: BackendFactory = Arc::new(move || factory().boxed());
        self.factories.push((id.into(), factory));
        self
    }

    /// Register an already constructed backend under `id`
    pub fn register_instance(self, id: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        self.register(id, move || {
            let backend = Arc::clone(&backend);
            async move { Ok(backend) }
        })
    }

    /// Backend used for new documents
    pub fn default_backend(mut self, id: impl Into<String>) -> Self {
        self.default_backend = Some(id.into());
        self
    }

    /// Validate the table and build the registry
    pub fn build(self) -> DocResult<BackendRegistry> {
        let mut factories = HashMap::with_capacity(self.factories.len());
        for (id, factory) in self.factories {
            if id.is_empty() || id.chars().count() > MAX_BACKEND_ID_LEN {
                return Err(DocError::Config(format!(
                    "Backend id must be 1 to {} characters: {:?}",
                    MAX_BACKEND_ID_LEN, id
                )));
            }
            if id == INLINE_BACKEND_ID {
                return Err(DocError::Config(format!(
                    "Backend id '{}' is reserved for inline storage",
                    INLINE_BACKEND_ID
                )));
            }
            if factories.insert(id.clone(), factory).is_some() {
                return Err(DocError::Config(format!("Duplicate backend id '{}'", id)));
            }
        }

        let registry = BackendRegistry {
            factories,
            instances: Mutex::new(HashMap::new()),
            default_backend: self.default_backend,
        };
        // Fail at startup rather than on the first save
        registry.default_backend_id()?;

        Ok(registry)
    }
}

/// Resolves backend ids to live backend instances
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    instances: Mutex<HashMap<String, Arc<dyn StorageBackend>>>,
    default_backend: Option<String>,
}

impl BackendRegistry {
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// Registry with no external backends; everything is stored inline
    pub fn inline_only() -> Self {
        Self {
            factories: HashMap::new(),
            instances: Mutex::new(HashMap::new()),
            default_backend: None,
        }
    }

    /// Build the registration table from storage configuration
    pub fn from_config(config: &StorageConfig) -> DocResult<Self> {
        config.validate()?;

        let mut builder = Self::builder();
        for named in &config.backends {
            builder = match named.backend.clone() {
                BackendConfig::Disk { location } => builder.register(named.id.clone(), move || {
                    let location = location.clone();
                    async move {
                        Ok(Arc::new(DiskBackend::new(location)) as Arc<dyn StorageBackend>)
                    }
                }),
                BackendConfig::S3 {
                    bucket,
                    region,
                    endpoint,
                    access_key_id,
                    secret_access_key,
                    prefix,
                } => {
                    let s3_config = S3Config {
                        bucket,
                        region,
                        endpoint,
                        access_key_id,
                        secret_access_key,
                        prefix,
                    };
                    builder.register(named.id.clone(), move || {
                        let s3_config = s3_config.clone();
                        async move {
                            let backend = S3Backend::new(s3_config).await?;
                            Ok(Arc::new(backend) as Arc<dyn StorageBackend>)
                        }
                    })
                }
                BackendConfig::Memory => builder.register(named.id.clone(), || async {
                    Ok(Arc::new(MemoryBackend::new()) as Arc<dyn StorageBackend>)
                }),
            };
        }

        if let Some(default) = &config.default_backend {
            builder = builder.default_backend(default.clone());
        }

        builder.build()
    }

    /// The backend id new documents use, the inline sentinel unless configured
    pub fn default_backend_id(&self) -> DocResult<&str> {
        match &self.default_backend {
            None => Ok(INLINE_BACKEND_ID),
            Some(id) if id == INLINE_BACKEND_ID || self.factories.contains_key(id) => Ok(id.as_str()),
            Some(id) => Err(DocError::Config(format!(
                "The default backend '{}' must be defined in the registered backends",
                id
            ))),
        }
    }

    /// Whether `backend_id` names inline storage or a registered backend
    pub fn is_known(&self, backend_id: &str) -> bool {
        backend_id == INLINE_BACKEND_ID || self.factories.contains_key(backend_id)
    }

    /// Registered external backend ids, sorted
    pub fn backend_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve a registered backend, constructing it on first use
    pub async fn resolve(&self, backend_id: &str) -> DocResult<Arc<dyn StorageBackend>> {
        let factory = match self.factories.get(backend_id) {
            Some(factory) => factory,
            None if backend_id == INLINE_BACKEND_ID => {
                return Err(DocError::Config(format!(
                    "'{}' is inline storage and has no backend adapter",
                    backend_id
                )))
            }
            None => {
                return Err(DocError::Config(format!("unknown backend id: {}", backend_id)))
            }
        };

        // One lock over check-then-create so concurrent first resolutions build once
        let mut instances = self.instances.lock().await;
        if let Some(backend) = instances.get(backend_id) {
            return Ok(Arc::clone(backend));
        }

        info!("Constructing storage backend '{}'", backend_id);
        let backend = factory().await?;
        debug!("Backend '{}' ready ({})", backend_id, backend.kind());
        metrics::BACKEND_INSTANCES_TOTAL.inc();

        instances.insert(backend_id.to_string(), Arc::clone(&backend));
        Ok(backend)
    }

    /// Resolve where `backend_id` keeps payloads
    pub async fn placement(&self, backend_id: &str) -> DocResult<Placement> {
        if backend_id == INLINE_BACKEND_ID {
            return Ok(Placement::Inline);
        }
        self.resolve(backend_id).await.map(Placement::External)
    }
}
