//! Configuration management for docvault
use crate::backend::INLINE_BACKEND_ID;
use crate::error::{DocError, DocResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Metadata database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub enable_wal: bool,
}

/// Payload storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend used for new documents. Inline storage when unset.
    pub default_backend: Option<String>,
    /// Configured external backends, in declaration order
    pub backends: Vec<NamedBackend>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedBackend {
    pub id: String,
    pub backend: BackendConfig,
}

/// External backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Disk {
        location: PathBuf,
    },
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
        access_key_id: String,
        secret_access_key: String,
        prefix: String,
    },
    Memory,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Environment variable prefix for a backend id, e.g. `s3-bucket` -> `DOCVAULT_BACKEND_S3_BUCKET_`
fn backend_var_prefix(id: &str) -> String {
    let normalized: String = id
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("DOCVAULT_BACKEND_{}_", normalized)
}

impl VaultConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> DocResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> DocResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = lookup("DOCVAULT_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/docvault.sqlite"));
        let max_connections = match lookup("DOCVAULT_DATABASE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().map_err(|_| {
                DocError::Config(format!("Invalid DOCVAULT_DATABASE_MAX_CONNECTIONS: {}", raw))
            })?,
            None => 10,
        };
        let enable_wal = match lookup("DOCVAULT_DATABASE_WAL") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                DocError::Config(format!("Invalid DOCVAULT_DATABASE_WAL: {}", raw))
            })?,
            None => true,
        };

        let ids: Vec<String> = lookup("DOCVAULT_BACKENDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut backends = Vec::with_capacity(ids.len());
        for id in ids {
            let prefix = backend_var_prefix(&id);
            let var = |name: &str| lookup(&format!("{}{}", prefix, name));

            let kind = var("TYPE").unwrap_or_else(|| "disk".to_string());
            let backend = match kind.to_ascii_lowercase().as_str() {
                "disk" => BackendConfig::Disk {
                    location: var("LOCATION")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from("./data/documents").join(&id)),
                },
                "s3" => BackendConfig::S3 {
                    bucket: var("BUCKET").unwrap_or_default(),
                    region: var("REGION").unwrap_or_else(|| "us-east-1".to_string()),
                    endpoint: var("ENDPOINT"),
                    access_key_id: var("ACCESS_KEY_ID").unwrap_or_default(),
                    secret_access_key: var("SECRET_ACCESS_KEY").unwrap_or_default(),
                    prefix: var("PREFIX").unwrap_or_else(|| "documents/".to_string()),
                },
                "memory" => BackendConfig::Memory,
                other => {
                    return Err(DocError::Config(format!(
                        "Unknown backend type '{}' for backend '{}'",
                        other, id
                    )))
                }
            };
            backends.push(NamedBackend { id, backend });
        }

        let default_backend = lookup("DOCVAULT_DEFAULT_BACKEND").filter(|s| !s.trim().is_empty());

        let level = lookup("RUST_LOG").unwrap_or_else(|| "docvault=info".to_string());
        let json = lookup("DOCVAULT_LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(VaultConfig {
            database: DatabaseConfig {
                path,
                max_connections,
                enable_wal,
            },
            storage: StorageConfig {
                default_backend,
                backends,
            },
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> DocResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(DocError::Config("Database path cannot be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(DocError::Config(
                "Database needs at least one connection".to_string(),
            ));
        }
        self.storage.validate()
    }
}

impl StorageConfig {
    pub fn validate(&self) -> DocResult<()> {
        let mut seen = HashSet::new();
        for named in &self.backends {
            if named.id == INLINE_BACKEND_ID {
                return Err(DocError::Config(format!(
                    "Backend id '{}' is reserved for inline storage",
                    INLINE_BACKEND_ID
                )));
            }
            if !seen.insert(named.id.as_str()) {
                return Err(DocError::Config(format!("Duplicate backend id '{}'", named.id)));
            }
            match &named.backend {
                BackendConfig::Disk { location } if location.as_os_str().is_empty() => {
                    return Err(DocError::Config(format!(
                        "Disk backend '{}' needs a location",
                        named.id
                    )));
                }
                BackendConfig::S3 {
                    bucket,
                    access_key_id,
                    secret_access_key,
                    ..
                } => {
                    if bucket.is_empty() {
                        return Err(DocError::Config(format!(
                            "S3 backend '{}' needs a bucket",
                            named.id
                        )));
                    }
                    if access_key_id.is_empty() || secret_access_key.is_empty() {
                        return Err(DocError::Config(format!(
                            "S3 backend '{}' needs an access key and secret",
                            named.id
                        )));
                    }
                }
                _ => {}
            }
        }

        if let Some(default) = &self.default_backend {
            if default != INLINE_BACKEND_ID && !seen.contains(default.as_str()) {
                return Err(DocError::Config(format!(
                    "The default backend '{}' must be one of the configured backends",
                    default
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> DocResult<VaultConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        VaultConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database.path, PathBuf::from("./data/docvault.sqlite"));
        assert_eq!(config.database.max_connections, 10);
        assert!(config.storage.backends.is_empty());
        assert!(config.storage.default_backend.is_none());
        assert!(!config.logging.json);
        config.validate().unwrap();
    }

    #[test]
    fn test_backends_from_env() {
        let config = config_from(&[
            ("DOCVAULT_BACKENDS", "local-disk, s3-bucket"),
            ("DOCVAULT_BACKEND_LOCAL_DISK_TYPE", "disk"),
            ("DOCVAULT_BACKEND_LOCAL_DISK_LOCATION", "/srv/docs"),
            ("DOCVAULT_BACKEND_S3_BUCKET_TYPE", "s3"),
            ("DOCVAULT_BACKEND_S3_BUCKET_BUCKET", "documents"),
            ("DOCVAULT_BACKEND_S3_BUCKET_ACCESS_KEY_ID", "key"),
            ("DOCVAULT_BACKEND_S3_BUCKET_SECRET_ACCESS_KEY", "secret"),
            ("DOCVAULT_BACKEND_S3_BUCKET_ENDPOINT", "http://localhost:9000"),
            ("DOCVAULT_DEFAULT_BACKEND", "s3-bucket"),
        ])
        .unwrap();

        assert_eq!(config.storage.backends.len(), 2);
        assert_eq!(config.storage.backends[0].id, "local-disk");
        match &config.storage.backends[0].backend {
            BackendConfig::Disk { location } => assert_eq!(location, &PathBuf::from("/srv/docs")),
            other => panic!("unexpected backend {:?}", other),
        }
        match &config.storage.backends[1].backend {
            BackendConfig::S3 {
                bucket,
                region,
                endpoint,
                prefix,
                ..
            } => {
                assert_eq!(bucket, "documents");
                assert_eq!(region, "us-east-1");
                assert_eq!(endpoint.as_deref(), Some("http://localhost:9000"));
                assert_eq!(prefix, "documents/");
            }
            other => panic!("unexpected backend {:?}", other),
        }
        assert_eq!(config.storage.default_backend.as_deref(), Some("s3-bucket"));
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_database_settings_are_rejected() {
        let wal = config_from(&[("DOCVAULT_DATABASE_WAL", "yes please")]);
        assert!(matches!(wal, Err(DocError::Config(msg)) if msg.contains("DOCVAULT_DATABASE_WAL")));

        let connections = config_from(&[("DOCVAULT_DATABASE_MAX_CONNECTIONS", "many")]);
        assert!(matches!(connections, Err(DocError::Config(_))));

        let config = config_from(&[("DOCVAULT_DATABASE_WAL", "false")]).unwrap();
        assert!(!config.database.enable_wal);
    }

    #[test]
    fn test_unknown_backend_type() {
        let result = config_from(&[
            ("DOCVAULT_BACKENDS", "ftp"),
            ("DOCVAULT_BACKEND_FTP_TYPE", "ftp"),
        ]);
        assert!(matches!(result, Err(DocError::Config(_))));
    }

    #[test]
    fn test_default_must_be_configured() {
        let config = config_from(&[("DOCVAULT_DEFAULT_BACKEND", "nowhere")]).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must be one of the configured backends"));
    }

    #[test]
    fn test_inline_id_is_reserved() {
        let config = config_from(&[
            ("DOCVAULT_BACKENDS", "local-sql"),
            ("DOCVAULT_BACKEND_LOCAL_SQL_TYPE", "memory"),
        ])
        .unwrap();
        assert!(matches!(config.validate(), Err(DocError::Config(_))));
    }

    #[test]
    fn test_s3_requires_credentials() {
        let config = config_from(&[
            ("DOCVAULT_BACKENDS", "s3"),
            ("DOCVAULT_BACKEND_S3_TYPE", "s3"),
            ("DOCVAULT_BACKEND_S3_BUCKET", "documents"),
        ])
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("access key"));
    }

    #[test]
    fn test_var_prefix_normalization() {
        assert_eq!(backend_var_prefix("s3-bucket"), "DOCVAULT_BACKEND_S3_BUCKET_");
        assert_eq!(backend_var_prefix("disk.archive"), "DOCVAULT_BACKEND_DISK_ARCHIVE_");
    }
}
