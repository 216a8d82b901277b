//! The syntect back-end.
use crate::engine::{
    Engine, EngineLoader, RenderOptions, ThemeInfo, ThemeKind,
};
use anyhow::{Context, Result};
use pulldown_cmark_escape::escape_html;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{
    css_for_theme_with_class_style, highlighted_html_for_string, ClassStyle,
    ClassedHTMLGenerator,
};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::{debug, info};

const STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "syh-" };

/// Loads the syntaxes and themes bundled with syntect.
pub struct SyntectLoader;

impl EngineLoader for SyntectLoader {
    #[tracing::instrument(skip_all)]
    fn load(&self) -> Result<Arc<dyn Engine>> {
        let time = Instant::now();
        let engine = SyntectEngine::new(
            SyntaxSet::load_defaults_newlines(),
            ThemeSet::load_defaults(),
        );
        info!(
            "Loaded {} syntaxes and {} themes in {:.1?}.",
            engine.syntaxes.syntaxes().len(),
            engine.themeset.themes.len(),
            time.elapsed(),
        );
        Ok(Arc::new(engine))
    }
}

pub struct SyntectEngine {
    syntaxes: SyntaxSet,
    themeset: ThemeSet,
    languages: BTreeSet<String>,
    themes: BTreeSet<String>,
}

impl SyntectEngine {
    pub fn new(syntaxes: SyntaxSet, themeset: ThemeSet) -> Self {
        let languages = syntaxes
            .syntaxes()
            .iter()
            .flat_map(|s| {
                std::iter::once(s.name.to_lowercase())
                    .chain(s.file_extensions.iter().cloned())
            })
            .collect();
        let themes = themeset.themes.keys().cloned().collect();
        SyntectEngine {
            syntaxes,
            themeset,
            languages,
            themes,
        }
    }

    fn classed(&self, code: &str, lang: &str) -> Result<String> {
        let syntax = self
            .syntaxes
            .find_syntax_by_token(lang)
            .with_context(|| format!("Unknown language {lang:?}"))?;
        let mut generator = ClassedHTMLGenerator::new_with_class_style(
            syntax,
            &self.syntaxes,
            STYLE,
        );
        for line in LinesWithEndings::from(code) {
            generator.parse_html_for_line_which_includes_newline(line)?;
        }
        let mut out = String::from("<pre class=\"code\" data-lang=\"");
        escape_html(&mut out, lang)?;
        out.push_str("\">");
        out.push_str(&generator.finalize());
        out.push_str("</pre>\n");
        Ok(out)
    }

    fn theme(&self, theme: &str) -> Result<&Theme> {
        self.themeset
            .themes
            .get(theme)
            .with_context(|| format!("Unknown theme {theme:?}"))
    }
}

impl Engine for SyntectEngine {
    fn render(
        &self,
        code: &str,
        lang: &str,
        theme: &str,
        options: &RenderOptions,
    ) -> Result<String> {
        for key in options.keys().filter(|k| *k != "classed") {
            debug!("Ignoring render option {key:?}.");
        }
        let classed = options
            .get("classed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if classed {
            // The theme is applied by the stylesheet, but must exist.
            self.theme(theme)?;
            return self.classed(code, lang);
        }
        let syntax = self
            .syntaxes
            .find_syntax_by_token(lang)
            .with_context(|| format!("Unknown language {lang:?}"))?;
        Ok(highlighted_html_for_string(
            code,
            &self.syntaxes,
            syntax,
            self.theme(theme)?,
        )?)
    }

    fn languages(&self) -> &BTreeSet<String> {
        &self.languages
    }

    fn themes(&self) -> &BTreeSet<String> {
        &self.themes
    }

    fn theme_info(&self) -> Vec<ThemeInfo> {
        self.themeset
            .themes
            .iter()
            .map(|(id, theme)| ThemeInfo {
                id: id.clone(),
                display_name: theme.name.clone().unwrap_or_else(|| id.clone()),
                kind: kind_of(theme),
            })
            .collect()
    }

    fn css(&self, theme: &str) -> Option<String> {
        let theme = self.themeset.themes.get(theme)?;
        css_for_theme_with_class_style(theme, STYLE).ok()
    }
}

/// Dark or light, judging from the perceived background luminance.
fn kind_of(theme: &Theme) -> ThemeKind {
    match theme.settings.background {
        Some(c) => {
            let luma = 299 * u32::from(c.r)
                + 587 * u32::from(c.g)
                + 114 * u32::from(c.b);
            if luma < 128_000 {
                ThemeKind::Dark
            } else {
                ThemeKind::Light
            }
        }
        None => ThemeKind::Light,
    }
}
