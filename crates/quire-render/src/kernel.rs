//! Wiring a renderer from configuration.

use std::sync::Arc;

use crate::cache::TemplateCache;
use crate::config::RenderingConfig;
use crate::engine::{ScriptEngine, TemplateEngine};
use crate::error::ResolutionError;
use crate::processing::TemplateProcessor;
use crate::resolve::{DirectoryResolver, PathResolver};
use crate::service::RenderingService;

/// A ready-to-use renderer built from a [`RenderingConfig`].
///
/// ```rust,no_run
/// use quire_render::{RenderingConfig, RenderingKernel, Renderable};
///
/// let config = RenderingConfig::new("views", "var/cache", "public");
/// let kernel = RenderingKernel::new(&config)?;
/// let html = kernel.service().render(&Renderable::page("pages/home"))?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RenderingKernel {
    resolver: Arc<DirectoryResolver>,
    service: RenderingService,
}

impl RenderingKernel {
    pub fn new(config: &RenderingConfig) -> Result<Self, ResolutionError> {
        Self::with_engine(config, Arc::new(ScriptEngine::new()))
    }

    /// Builds a kernel executing templates with `engine`.
    pub fn with_engine(
        config: &RenderingConfig,
        engine: Arc<dyn TemplateEngine>,
    ) -> Result<Self, ResolutionError> {
        let resolver = Arc::new(
            DirectoryResolver::new(&config.views_dir, &config.assets_dir)?
                .with_assets_url(config.assets_url.as_str())
                .with_extension(config.template_extension.as_str()),
        );
        let cache = TemplateCache::new(&config.cache_dir);
        let processor = TemplateProcessor::new(
            Arc::clone(&resolver) as Arc<dyn PathResolver>,
            cache,
            config.debug,
        );
        let service = RenderingService::new(processor, engine, config.debug);
        Ok(Self { resolver, service })
    }

    pub fn service(&self) -> &RenderingService {
        &self.service
    }

    pub fn processor(&self) -> &TemplateProcessor {
        self.service.processor()
    }

    pub fn cache(&self) -> &TemplateCache {
        self.service.processor().cache()
    }

    /// Names of every template under the views directory.
    pub fn template_names(&self) -> Result<Vec<String>, ResolutionError> {
        self.resolver.template_names()
    }
}
