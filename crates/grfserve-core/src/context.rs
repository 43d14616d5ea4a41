use crate::config::ServerConfig;
use crate::overlay::OverlayCache;
use crate::resolver::{ResolverOptions, ResourceResolver};
use crate::CoreError;
use grfserve_archive::{ArchiveRegistry, EngineFactory};
use grfserve_schema::parse_manifest_file;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a request handler needs, built once at startup.
#[derive(Debug, Clone)]
pub struct ClientContext {
    config: ServerConfig,
    registry: Arc<ArchiveRegistry>,
    resolver: ResourceResolver,
}

impl ClientContext {
    /// Parse the manifest and open every archive it lists.
    ///
    /// Individual archive failures are kept in the registry; only a missing or
    /// empty manifest is an error here.
    pub fn init(config: ServerConfig, factory: &dyn EngineFactory) -> Result<Self, CoreError> {
        let manifest_path = config.manifest_path();
        let manifest = parse_manifest_file(&manifest_path)?;
        let names = manifest.require_archives()?;
        info!(
            "opening {} archive(s) from {} with the {} engine",
            names.len(),
            manifest_path.display(),
            factory.name()
        );

        let registry = ArchiveRegistry::open(&config.resources_path(), &names, factory);
        for failed in registry.descriptors().iter().filter(|d| !d.loaded()) {
            warn!(
                "{} will not serve files: {}",
                failed.name(),
                failed.error().unwrap_or("unknown error")
            );
        }
        info!("{}/{} archive(s) loaded", registry.loaded_count(), names.len());

        Ok(Self::with_registry(config, registry))
    }

    pub fn with_registry(config: ServerConfig, registry: ArchiveRegistry) -> Self {
        let registry = Arc::new(registry);
        let resolver = ResourceResolver::new(
            Arc::clone(&registry),
            OverlayCache::new(config.overlay_root()),
            ResolverOptions {
                auto_extract: config.auto_extract,
                enable_search: config.enable_search,
            },
        );
        Self {
            config,
            registry,
            resolver,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ArchiveRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }
}
