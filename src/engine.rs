//! The interface to a highlighting back-end.
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Pass-through rendering options, handed to the engine unchanged.
pub type RenderOptions = serde_json::Map<String, serde_json::Value>;

/// Something that can turn code into styled markup.
///
/// The supported language and theme sets are fixed for the lifetime of
/// an engine.
pub trait Engine: Send + Sync {
    fn render(
        &self,
        code: &str,
        lang: &str,
        theme: &str,
        options: &RenderOptions,
    ) -> anyhow::Result<String>;

    fn languages(&self) -> &BTreeSet<String>;

    fn themes(&self) -> &BTreeSet<String>;

    /// Descriptive metadata for all bundled themes.
    fn theme_info(&self) -> Vec<ThemeInfo>;

    /// A stylesheet for class-based output in the given theme.
    fn css(&self, theme: &str) -> Option<String>;

    /// Release any resources held.  The engine is not used afterwards.
    fn release(&self) {}
}

/// Creates engines.  Loading may block for a while.
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> anyhow::Result<Arc<dyn Engine>>;
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeInfo {
    pub id: String,
    pub display_name: String,
    pub kind: ThemeKind,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeKind {
    Light,
    Dark,
}

impl AsRef<str> for ThemeKind {
    fn as_ref(&self) -> &str {
        match self {
            ThemeKind::Light => "light",
            ThemeKind::Dark => "dark",
        }
    }
}
impl fmt::Display for ThemeKind {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        self.as_ref().fmt(out)
    }
}
