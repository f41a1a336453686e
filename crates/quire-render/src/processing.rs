//! Turning template names into compiled files.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::cache::TemplateCache;
use crate::compiler::TemplateCompiler;
use crate::error::{CacheError, Result};
use crate::resolve::PathResolver;

/// Resolves a template name to an up-to-date compiled file.
///
/// Sources are recompiled when their compiled form is stale, and on every
/// request in debug mode.
pub struct TemplateProcessor {
    resolver: Arc<dyn PathResolver>,
    compiler: TemplateCompiler,
    cache: TemplateCache,
    debug: bool,
}

impl TemplateProcessor {
    pub fn new(resolver: Arc<dyn PathResolver>, cache: TemplateCache, debug: bool) -> Self {
        Self {
            compiler: TemplateCompiler::new(Arc::clone(&resolver), debug),
            resolver,
            cache,
            debug,
        }
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    pub fn resolver(&self) -> &Arc<dyn PathResolver> {
        &self.resolver
    }

    pub fn compiler(&self) -> &TemplateCompiler {
        &self.compiler
    }

    /// Returns the path of the compiled form of `name`, compiling it first
    /// when needed.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let source = self.resolver.resolve_template(name)?;
        let compiled = self.cache.compiled_path(&source);

        if self.debug || self.cache.is_stale(&source, &compiled) {
            let text = fs::read_to_string(&source).map_err(|err| CacheError::ReadSource {
                path: source.clone(),
                source: err,
            })?;
            let output = self.compiler.compile(&text)?;
            self.cache.write(&compiled, &output)?;
            debug!(template = name, path = %compiled.display(), "compiled template");
        } else {
            trace!(template = name, "compiled template is fresh");
        }
        Ok(compiled)
    }

    /// Compiles each template in `names`, stopping at the first failure.
    pub fn compile_all<I, S>(&self, names: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| self.resolve(name.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RenderError, ResolutionError};
    use crate::resolve::DirectoryResolver;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        processor: TemplateProcessor,
    }

    fn fixture(debug: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let views = dir.path().join("views");
        let assets = dir.path().join("assets");
        fs::create_dir_all(&views).unwrap();
        fs::create_dir_all(&assets).unwrap();
        let resolver = Arc::new(DirectoryResolver::new(&views, &assets).unwrap());
        let cache = TemplateCache::new(dir.path().join("cache"));
        Fixture {
            processor: TemplateProcessor::new(resolver, cache, debug),
            dir,
        }
    }

    impl Fixture {
        fn view(&self, name: &str, source: &str) -> PathBuf {
            let path = self.dir.path().join("views").join(format!("{name}.quire"));
            fs::write(&path, source).unwrap();
            path
        }
    }

    fn age(path: &std::path::Path, secs: u64) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(secs))
            .unwrap();
    }

    #[test]
    fn test_resolve_compiles_source() {
        let fx = fixture(false);
        fx.view("hello", "Hello, {{ $name }}!");
        let compiled = fx.processor.resolve("hello").unwrap();
        assert_eq!(
            fs::read_to_string(compiled).unwrap(),
            "Hello, <%= e($name) %>!"
        );
    }

    #[test]
    fn test_fresh_compiled_file_reused() {
        let fx = fixture(false);
        let source = fx.view("page", "one");
        age(&source, 120);
        let compiled = fx.processor.resolve("page").unwrap();

        // Changing the compiled file directly shows it is not rewritten.
        fs::write(&compiled, "cached").unwrap();
        fx.processor.resolve("page").unwrap();
        assert_eq!(fs::read_to_string(&compiled).unwrap(), "cached");
    }

    #[test]
    fn test_stale_compiled_file_rewritten() {
        let fx = fixture(false);
        fx.view("page", "one");
        let compiled = fx.processor.resolve("page").unwrap();
        age(&compiled, 120);
        fx.view("page", "two");
        fx.processor.resolve("page").unwrap();
        assert_eq!(fs::read_to_string(&compiled).unwrap(), "two");
    }

    #[test]
    fn test_debug_always_recompiles() {
        let fx = fixture(true);
        let source = fx.view("page", "one");
        age(&source, 120);
        let compiled = fx.processor.resolve("page").unwrap();
        fs::write(&compiled, "cached").unwrap();
        fx.processor.resolve("page").unwrap();
        assert_eq!(fs::read_to_string(&compiled).unwrap(), "one");
    }

    #[test]
    fn test_missing_template_error_passes_through() {
        let fx = fixture(false);
        let err = fx.processor.resolve("nope").unwrap_err();
        assert!(matches!(
            err,
            RenderError::Resolution(ResolutionError::NotFound { .. })
        ));
    }

    #[test]
    fn test_compile_all() {
        let fx = fixture(false);
        fx.view("a", "a");
        fx.view("b", "b");
        assert_eq!(fx.processor.compile_all(["a", "b"]).unwrap().len(), 2);
        assert!(fx.processor.compile_all(["a", "missing"]).is_err());
    }
}
