//! Subcommand handlers.

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use console::style;
use quire_render::{Context, RenderKind, Renderable, RenderingKernel};
use serde_json::Value;

use crate::cli::{CacheAction, RenderArgs};

pub fn render(kernel: &RenderingKernel, args: &RenderArgs) -> Result<()> {
    let html = render_to_string(kernel, args)?;
    match &args.output {
        Some(path) => {
            fs::write(path, &html).with_context(|| format!("writing {}", path.display()))?;
            status("Rendered", &format!("{} -> {}", args.template, path.display()));
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(html.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

pub(crate) fn render_to_string(kernel: &RenderingKernel, args: &RenderArgs) -> Result<String> {
    let kind = if args.page {
        RenderKind::Page
    } else {
        RenderKind::Fragment
    };
    let data = match &args.data {
        Some(path) => load_data(path)?,
        None => Context::new(),
    };
    let renderable = args.partials.iter().fold(
        Renderable::new(args.template.as_str(), kind).with_data(data),
        |renderable, (id, template)| {
            renderable.with_partial(id.as_str(), Renderable::fragment(template.as_str()))
        },
    );
    kernel
        .service()
        .render(&renderable)
        .with_context(|| format!("rendering `{}`", args.template))
}

/// Reads a JSON or YAML object; the format follows the file extension.
pub(crate) fn load_data(path: &Path) -> Result<Context> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    let value: Value = match extension {
        "yaml" | "yml" => serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing YAML in {}", path.display()))?,
        _ => serde_json::from_str(&raw)
            .with_context(|| format!("parsing JSON in {}", path.display()))?,
    };
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Context::new()),
        _ => bail!("{} must contain an object at the top level", path.display()),
    }
}

pub fn compile(kernel: &RenderingKernel, templates: &[String]) -> Result<()> {
    let names = if templates.is_empty() {
        kernel.template_names()?
    } else {
        templates.to_vec()
    };
    let compiled = kernel.processor().compile_all(&names)?;
    status(
        "Compiled",
        &format!("{} template(s) into {}", compiled.len(), kernel.cache().root().display()),
    );
    Ok(())
}

pub fn cache(kernel: &RenderingKernel, action: &CacheAction) -> Result<()> {
    let (verb, removed) = match action {
        CacheAction::Clear => ("Cleared", kernel.cache().clear()?),
        CacheAction::Prune { max_age } => (
            "Pruned",
            kernel.cache().prune(Duration::from_secs(*max_age))?,
        ),
    };
    status(verb, &format!("{removed} compiled template(s)"));
    Ok(())
}

fn status(verb: &str, message: &str) {
    eprintln!("{:>10} {message}", style(verb).green().bold());
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_render::RenderingConfig;
    use tempfile::TempDir;

    fn kernel(views: &[(&str, &str)]) -> (TempDir, RenderingKernel) {
        let root = TempDir::new().unwrap();
        let views_dir = root.path().join("views");
        fs::create_dir_all(&views_dir).unwrap();
        fs::create_dir_all(root.path().join("public")).unwrap();
        for (name, source) in views {
            fs::write(views_dir.join(format!("{name}.quire")), source).unwrap();
        }
        let config = RenderingConfig::new(
            views_dir,
            root.path().join("cache"),
            root.path().join("public"),
        );
        let kernel = RenderingKernel::new(&config).unwrap();
        (root, kernel)
    }

    fn args(template: &str) -> RenderArgs {
        RenderArgs {
            template: template.to_string(),
            data: None,
            page: false,
            partials: Vec::new(),
            output: None,
        }
    }

    #[test]
    fn test_load_yaml_and_json() {
        let dir = TempDir::new().unwrap();
        let yaml = dir.path().join("data.yaml");
        fs::write(&yaml, "name: World\ncount: 2\n").unwrap();
        let json = dir.path().join("data.json");
        fs::write(&json, r#"{"name": "World"}"#).unwrap();

        let from_yaml = load_data(&yaml).unwrap();
        assert_eq!(from_yaml["name"], "World");
        assert_eq!(from_yaml["count"], 2);
        assert_eq!(load_data(&json).unwrap()["name"], "World");
    }

    #[test]
    fn test_load_rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("list.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(load_data(&path).is_err());
    }

    #[test]
    fn test_render_page_with_data_and_partial() {
        let (root, kernel) = kernel(&[
            ("layout", "<body>@yield('main')</body>"),
            ("nav", "<nav/>"),
            (
                "home",
                "@extends('layout')\n@section('main')@partial('nav'){{ $name }}@endsection\n",
            ),
        ]);
        let data = root.path().join("home.json");
        fs::write(&data, r#"{"name": "World"}"#).unwrap();

        let mut args = args("home");
        args.page = true;
        args.data = Some(data);
        args.partials = vec![("nav".to_string(), "nav".to_string())];
        assert_eq!(
            render_to_string(&kernel, &args).unwrap(),
            "<body><nav/>World</body>"
        );
    }

    #[test]
    fn test_render_writes_output_file() {
        let (root, kernel) = kernel(&[("hello", "Hello!")]);
        let out = root.path().join("out.html");
        let mut args = args("hello");
        args.output = Some(out.clone());
        render(&kernel, &args).unwrap();
        assert_eq!(fs::read_to_string(out).unwrap(), "Hello!");
    }

    #[test]
    fn test_compile_all_then_clear() {
        let (_root, kernel) = kernel(&[("a", "A"), ("b", "{{ $b }}")]);
        compile(&kernel, &[]).unwrap();
        assert_eq!(kernel.cache().clear().unwrap(), 2);
    }

    #[test]
    fn test_compile_unknown_template_fails() {
        let (_root, kernel) = kernel(&[]);
        assert!(compile(&kernel, &["missing".to_string()]).is_err());
    }
}
