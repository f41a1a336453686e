//! Mapping logical names onto files and web URLs.
//!
//! Templates, stylesheets and scripts are referenced by short names in
//! directives (`@extends('layouts/main')`, `@css('site')`). A [`PathResolver`]
//! turns those names into absolute paths, and asset paths into URLs a browser
//! can fetch.
//!
//! [`DirectoryResolver`] is the filesystem implementation:
//!
//! | Lookup | Name | Path |
//! |--------|------|------|
//! | template | `layouts/main` | `<views>/layouts/main.quire` |
//! | css | `site` | `<assets>/css/site.css` |
//! | js | `app` | `<assets>/js/app.js` |
//! | asset | `logo.png` | `<assets>/images/logo.png` → `/assets/images/logo.png` |
//!
//! Names are restricted to `[A-Za-z0-9_-/.]`, may not contain `..`, and must
//! resolve to an existing file inside the configured root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::ResolutionError;

/// Default extension of template source files.
pub const TEMPLATE_EXTENSION: &str = "quire";

/// Resolves logical names to filesystem paths and web URLs.
pub trait PathResolver: Send + Sync {
    /// Resolves a template name to its source file.
    fn resolve_template(&self, name: &str) -> Result<PathBuf, ResolutionError>;

    /// Resolves a stylesheet name to its file.
    fn resolve_css(&self, name: &str) -> Result<PathBuf, ResolutionError>;

    /// Resolves a script name to its file.
    fn resolve_js(&self, name: &str) -> Result<PathBuf, ResolutionError>;

    /// Maps an asset identifier onto a web URL.
    ///
    /// The identifier may be an external URL (returned unchanged), an
    /// absolute path inside the asset root, or a file name whose extension
    /// selects the asset subdirectory.
    fn resolve_asset(&self, identifier: &str) -> Result<String, ResolutionError>;
}

/// Returns true for identifiers that already point at a web location.
pub fn is_url(identifier: &str) -> bool {
    identifier.starts_with("http://")
        || identifier.starts_with("https://")
        || identifier.starts_with("//")
}

const ASSET_SUBDIRECTORIES: &[(&str, &str)] = &[
    ("js", "js"),
    ("css", "css"),
    ("png", "images"),
    ("jpg", "images"),
    ("jpeg", "images"),
    ("gif", "images"),
    ("svg", "images"),
    ("webp", "images"),
    ("ico", "images"),
    ("woff", "fonts"),
    ("woff2", "fonts"),
    ("ttf", "fonts"),
    ("eot", "fonts"),
];

/// Filesystem-backed [`PathResolver`].
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    views: PathBuf,
    assets: PathBuf,
    assets_url: String,
    extension: String,
}

impl DirectoryResolver {
    /// Creates a resolver rooted at the given views and assets directories.
    ///
    /// Both directories must exist; they are canonicalized once here so that
    /// containment checks compare canonical paths.
    pub fn new(
        views: impl AsRef<Path>,
        assets: impl AsRef<Path>,
    ) -> Result<Self, ResolutionError> {
        Ok(Self {
            views: canonical_root(views.as_ref())?,
            assets: canonical_root(assets.as_ref())?,
            assets_url: "/assets".to_string(),
            extension: TEMPLATE_EXTENSION.to_string(),
        })
    }

    /// Sets the URL prefix under which the asset directory is served.
    pub fn with_assets_url(mut self, url: impl Into<String>) -> Self {
        self.assets_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the template file extension (without the leading dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn views_dir(&self) -> &Path {
        &self.views
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets
    }

    /// Lists every template under the views directory by logical name.
    ///
    /// Names use `/` separators and omit the extension, so each one can be
    /// passed straight back to [`resolve_template`](PathResolver::resolve_template).
    pub fn template_names(&self) -> Result<Vec<String>, ResolutionError> {
        let mut names = Vec::new();
        self.collect_templates(&self.views, &mut names)?;
        names.sort();
        Ok(names)
    }

    fn collect_templates(&self, dir: &Path, names: &mut Vec<String>) -> Result<(), ResolutionError> {
        let entries = fs::read_dir(dir).map_err(|source| ResolutionError::InvalidRoot {
            path: dir.to_path_buf(),
            source,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.collect_templates(&path, names)?;
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if let Ok(relative) = path.with_extension("").strip_prefix(&self.views) {
                names.push(web_join(relative));
            }
        }
        Ok(())
    }

    fn resolve_in(
        &self,
        kind: &'static str,
        root: &Path,
        subdirectory: &str,
        name: &str,
        extension: &str,
    ) -> Result<PathBuf, ResolutionError> {
        if Path::new(name).is_absolute() {
            return contained(root, Path::new(name), kind, name);
        }
        validate_name(kind, name)?;

        let mut file = name.to_string();
        let suffix = format!(".{extension}");
        if !file.ends_with(&suffix) {
            file.push_str(&suffix);
        }

        let mut candidate = root.to_path_buf();
        if !subdirectory.is_empty() {
            candidate.push(subdirectory);
        }
        candidate.push(file.trim_start_matches('/'));
        contained(root, &candidate, kind, name)
    }

    fn web_path(&self, absolute: &Path) -> Result<String, ResolutionError> {
        let relative = absolute
            .strip_prefix(&self.assets)
            .map_err(|_| ResolutionError::OutsideRoot {
                path: absolute.to_path_buf(),
                root: self.assets.clone(),
            })?;
        Ok(format!("{}/{}", self.assets_url, web_join(relative)))
    }
}

impl PathResolver for DirectoryResolver {
    fn resolve_template(&self, name: &str) -> Result<PathBuf, ResolutionError> {
        self.resolve_in("template", &self.views, "", name, &self.extension)
    }

    fn resolve_css(&self, name: &str) -> Result<PathBuf, ResolutionError> {
        self.resolve_in("css", &self.assets, "css", name, "css")
    }

    fn resolve_js(&self, name: &str) -> Result<PathBuf, ResolutionError> {
        self.resolve_in("js", &self.assets, "js", name, "js")
    }

    fn resolve_asset(&self, identifier: &str) -> Result<String, ResolutionError> {
        if is_url(identifier) {
            return Ok(identifier.to_string());
        }
        if Path::new(identifier).is_absolute() {
            let path = contained(&self.assets, Path::new(identifier), "asset", identifier)?;
            return self.web_path(&path);
        }
        validate_name("asset", identifier)?;

        let extension = Path::new(identifier)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let subdirectory = ASSET_SUBDIRECTORIES
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, dir)| *dir)
            .ok_or_else(|| ResolutionError::InvalidName {
                kind: "asset",
                name: identifier.to_string(),
            })?;

        let candidate = self.assets.join(subdirectory).join(identifier);
        let path = contained(&self.assets, &candidate, "asset", identifier)?;
        self.web_path(&path)
    }
}

fn canonical_root(path: &Path) -> Result<PathBuf, ResolutionError> {
    fs::canonicalize(path).map_err(|source| ResolutionError::InvalidRoot {
        path: path.to_path_buf(),
        source,
    })
}

fn validate_name(kind: &'static str, name: &str) -> Result<(), ResolutionError> {
    let valid = !name.trim().is_empty()
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ResolutionError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Canonicalizes `candidate` and checks that it exists inside `root`.
fn contained(
    root: &Path,
    candidate: &Path,
    kind: &'static str,
    name: &str,
) -> Result<PathBuf, ResolutionError> {
    let resolved = fs::canonicalize(candidate).map_err(|_| ResolutionError::NotFound {
        kind,
        name: name.to_string(),
        path: candidate.to_path_buf(),
    })?;
    if !resolved.starts_with(root) || !resolved.is_file() {
        return Err(ResolutionError::OutsideRoot {
            path: resolved,
            root: root.to_path_buf(),
        });
    }
    Ok(resolved)
}

fn web_join(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, DirectoryResolver) {
        let dir = TempDir::new().unwrap();
        let views = dir.path().join("views");
        let assets = dir.path().join("assets");
        fs::create_dir_all(views.join("layouts")).unwrap();
        fs::create_dir_all(assets.join("css")).unwrap();
        fs::create_dir_all(assets.join("js")).unwrap();
        fs::create_dir_all(assets.join("images")).unwrap();
        fs::write(views.join("home.quire"), "home").unwrap();
        fs::write(views.join("layouts/main.quire"), "main").unwrap();
        fs::write(assets.join("css/site.css"), "body{}").unwrap();
        fs::write(assets.join("js/app.js"), "").unwrap();
        fs::write(assets.join("images/logo.png"), "").unwrap();
        fs::write(dir.path().join("secret.quire"), "").unwrap();

        let resolver = DirectoryResolver::new(&views, &assets).unwrap();
        (dir, resolver)
    }

    #[test]
    fn test_resolve_template_appends_extension() {
        let (_dir, resolver) = fixture();
        let path = resolver.resolve_template("layouts/main").unwrap();
        assert!(path.ends_with("views/layouts/main.quire"));

        let same = resolver.resolve_template("layouts/main.quire").unwrap();
        assert_eq!(path, same);
    }

    #[test]
    fn test_resolve_template_missing() {
        let (_dir, resolver) = fixture();
        let err = resolver.resolve_template("nope").unwrap_err();
        assert!(matches!(err, ResolutionError::NotFound { kind: "template", .. }));
    }

    #[test]
    fn test_resolve_template_rejects_traversal() {
        let (_dir, resolver) = fixture();
        let err = resolver.resolve_template("../secret").unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidName { .. }));

        let err = resolver.resolve_template("home page").unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidName { .. }));
    }

    #[test]
    fn test_resolve_template_absolute_outside_root() {
        let (dir, resolver) = fixture();
        let outside = dir.path().join("secret.quire");
        let err = resolver
            .resolve_template(outside.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, ResolutionError::OutsideRoot { .. }));
    }

    #[test]
    fn test_resolve_css_and_js() {
        let (_dir, resolver) = fixture();
        assert!(resolver.resolve_css("site").unwrap().ends_with("css/site.css"));
        assert!(resolver.resolve_js("app.js").unwrap().ends_with("js/app.js"));
        assert!(resolver.resolve_css("missing").is_err());
    }

    #[test]
    fn test_resolve_asset_urls() {
        let (_dir, resolver) = fixture();
        let resolver = resolver.with_assets_url("https://cdn.example.com/static/");

        let css = resolver.resolve_css("site").unwrap();
        assert_eq!(
            resolver.resolve_asset(css.to_str().unwrap()).unwrap(),
            "https://cdn.example.com/static/css/site.css"
        );
        assert_eq!(
            resolver.resolve_asset("logo.png").unwrap(),
            "https://cdn.example.com/static/images/logo.png"
        );
        assert_eq!(
            resolver.resolve_asset("https://other.org/x.js").unwrap(),
            "https://other.org/x.js"
        );
    }

    #[test]
    fn test_resolve_asset_unknown_extension() {
        let (_dir, resolver) = fixture();
        assert!(matches!(
            resolver.resolve_asset("notes.txt"),
            Err(ResolutionError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_template_names() {
        let (_dir, resolver) = fixture();
        assert_eq!(
            resolver.template_names().unwrap(),
            vec!["home".to_string(), "layouts/main".to_string()]
        );
    }
}
