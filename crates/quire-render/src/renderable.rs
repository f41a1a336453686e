//! What gets rendered: a template, its data and named child renderables.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Template data; each key becomes a variable inside the template.
pub type Context = Map<String, Value>;

/// Named child renderables reachable through `@partial(id)`.
pub type Partials = BTreeMap<String, Renderable>;

/// How a renderable is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderKind {
    /// Runs through POPULATE and the layout chain before PRESENT.
    #[default]
    Page,
    /// Rendered directly with the presenting view API.
    Fragment,
}

/// A template together with everything needed to render it.
///
/// Built with consuming builder methods and not changed afterwards.
///
/// ```rust
/// use quire_render::Renderable;
/// use serde_json::json;
///
/// let page = Renderable::page("pages/home")
///     .with("title", json!("Home"))
///     .with_partial("nav", Renderable::fragment("partials/nav"));
/// assert_eq!(page.template(), "pages/home");
/// assert!(page.partial("nav").is_some());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Renderable {
    template: String,
    data: Context,
    partials: Partials,
    kind: RenderKind,
}

impl Renderable {
    pub fn new(template: impl Into<String>, kind: RenderKind) -> Self {
        Self {
            template: template.into(),
            data: Context::new(),
            partials: Partials::new(),
            kind,
        }
    }

    pub fn page(template: impl Into<String>) -> Self {
        Self::new(template, RenderKind::Page)
    }

    pub fn fragment(template: impl Into<String>) -> Self {
        Self::new(template, RenderKind::Fragment)
    }

    /// Replaces the data map.
    pub fn with_data(mut self, data: Context) -> Self {
        self.data = data;
        self
    }

    /// Sets a single variable.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Merges the fields of a serializable struct or map into the data.
    pub fn with_serialized<T: Serialize>(mut self, data: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(data)? {
            Value::Object(map) => {
                self.data.extend(map);
                Ok(self)
            }
            other => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "template data must serialize to a map, got {other}"
            ))),
        }
    }

    pub fn with_partial(mut self, id: impl Into<String>, partial: Renderable) -> Self {
        self.partials.insert(id.into(), partial);
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn data(&self) -> &Context {
        &self.data
    }

    pub fn partials(&self) -> &Partials {
        &self.partials
    }

    pub fn partial(&self, id: &str) -> Option<&Renderable> {
        self.partials.get(id)
    }

    pub fn kind(&self) -> RenderKind {
        self.kind
    }

    pub fn is_page(&self) -> bool {
        self.kind == RenderKind::Page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Post {
        title: String,
        tags: Vec<String>,
    }

    #[test]
    fn test_builder_collects_data() {
        let page = Renderable::page("home")
            .with("a", 1)
            .with_data(Context::from_iter([("b".to_string(), json!(2))]))
            .with("c", "x");
        assert_eq!(Value::Object(page.data().clone()), json!({"b": 2, "c": "x"}));
        assert!(page.is_page());
    }

    #[test]
    fn test_with_serialized_struct() {
        let post = Post {
            title: "Hi".into(),
            tags: vec!["rust".into()],
        };
        let page = Renderable::fragment("post").with_serialized(&post).unwrap();
        assert_eq!(page.data()["title"], json!("Hi"));
        assert_eq!(page.data()["tags"], json!(["rust"]));
        assert_eq!(page.kind(), RenderKind::Fragment);
    }

    #[test]
    fn test_with_serialized_rejects_scalars() {
        assert!(Renderable::page("x").with_serialized(&42).is_err());
    }
}
