use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::env;

/// Which client serves S3-backed folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ObjectStoreBackend {
    /// Amazon S3 or an S3-compatible endpoint.
    #[default]
    S3,
    /// Objects kept on local disk; signed browser uploads are refused.
    Disk,
}

impl ObjectStoreBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "disk" => Ok(Self::Disk),
            other => bail!("unknown object store backend `{}` (expected s3 or disk)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root directory for files of type `local`.
    pub storage_dir: String,
    pub object_store: ObjectStoreBackend,
    /// Custom S3 endpoint, e.g. a MinIO server. Requests use path-style URLs.
    pub s3_endpoint: Option<String>,
    /// Root directory of the disk object store.
    pub object_store_dir: String,
    pub database_url: String,
    /// External page that performs the signed browser upload.
    pub uploader_url: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Static file service with optional S3 backing")]
pub struct Args {
    /// Host to bind to (overrides STATIC_FILES_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides STATIC_FILES_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where local files are stored (overrides STATIC_FILES_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Object store backend (overrides STATIC_FILES_OBJECT_STORE)
    #[arg(long, value_enum)]
    pub object_store: Option<ObjectStoreBackend>,

    /// Custom S3 endpoint URL (overrides STATIC_FILES_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// Directory backing the disk object store (overrides STATIC_FILES_OBJECT_STORE_DIR)
    #[arg(long)]
    pub object_store_dir: Option<String>,

    /// Database URL (overrides STATIC_FILES_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Uploader page URL (overrides STATIC_FILES_UPLOADER_URL)
    #[arg(long)]
    pub uploader_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args, |name| env::var(name))?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    fn merge<F>(args: Args, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env_or = |name: &str, default: &str| var(name).unwrap_or_else(|_| default.into());

        let env_port = match var("STATIC_FILES_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing STATIC_FILES_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading STATIC_FILES_PORT"),
        };

        let object_store = match (args.object_store, var("STATIC_FILES_OBJECT_STORE")) {
            (Some(backend), _) => backend,
            (None, Ok(value)) => ObjectStoreBackend::parse(&value)
                .context("parsing STATIC_FILES_OBJECT_STORE")?,
            (None, Err(_)) => ObjectStoreBackend::default(),
        };

        Ok(Self {
            host: args
                .host
                .unwrap_or_else(|| env_or("STATIC_FILES_HOST", "0.0.0.0")),
            port: args.port.unwrap_or(env_port),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("STATIC_FILES_STORAGE_DIR", "./data/static")),
            object_store,
            s3_endpoint: args
                .s3_endpoint
                .or_else(|| var("STATIC_FILES_S3_ENDPOINT").ok())
                .filter(|endpoint| !endpoint.is_empty()),
            object_store_dir: args
                .object_store_dir
                .unwrap_or_else(|| env_or("STATIC_FILES_OBJECT_STORE_DIR", "./data/objects")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or(
                    "STATIC_FILES_DATABASE_URL",
                    "sqlite://./data/meta/static_files.db",
                )
            }),
            uploader_url: args.uploader_url.unwrap_or_else(|| {
                env_or(
                    "STATIC_FILES_UPLOADER_URL",
                    "http://localhost:3000/upload.html",
                )
            }),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Result<String, env::VarError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned().ok_or(env::VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_without_env_or_args() {
        let cfg = AppConfig::merge(Args::default(), lookup(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.storage_dir, "./data/static");
        assert_eq!(cfg.object_store, ObjectStoreBackend::S3);
        assert_eq!(cfg.s3_endpoint, None);
        assert_eq!(cfg.object_store_dir, "./data/objects");
        assert_eq!(cfg.uploader_url, "http://localhost:3000/upload.html");
    }

    #[test]
    fn args_override_env() {
        let args = Args {
            port: Some(8080),
            ..Args::default()
        };
        let cfg = AppConfig::merge(
            args,
            lookup(&[("STATIC_FILES_PORT", "9000"), ("STATIC_FILES_HOST", "127.0.0.1")]),
        )
        .unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn disk_backend_is_selectable_from_env() {
        let cfg = AppConfig::merge(
            Args::default(),
            lookup(&[
                ("STATIC_FILES_OBJECT_STORE", "Disk"),
                ("STATIC_FILES_S3_ENDPOINT", "http://localhost:9000"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.object_store, ObjectStoreBackend::Disk);
        assert_eq!(cfg.s3_endpoint.as_deref(), Some("http://localhost:9000"));

        let err = AppConfig::merge(
            Args::default(),
            lookup(&[("STATIC_FILES_OBJECT_STORE", "ftp")]),
        );
        assert!(err.is_err());
    }

    #[test]
    fn bad_port_is_an_error() {
        let err = AppConfig::merge(Args::default(), lookup(&[("STATIC_FILES_PORT", "http")]));
        assert!(err.is_err());
    }
}
