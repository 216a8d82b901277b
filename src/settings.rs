//! Fill the theme dropdowns of a settings document from the bundled
//! theme metadata.
use crate::engine::{EngineLoader, ThemeInfo};
use crate::syntax_hl::SyntectLoader;
use anyhow::{Context, Result};
use clap::Parser;
use serde_yaml::{Mapping, Value};
use std::fs::{read_to_string, write};
use std::path::PathBuf;
use tracing::{info, warn};

/// Fields that select a theme.
const THEME_FIELDS: [&str; 3] = ["lightTheme", "darkTheme", "theme"];

#[derive(Parser)]
pub struct Args {
    /// The settings yaml file to update in place.
    file: PathBuf,

    /// Only forms in this group are updated.
    #[clap(long, default_value = "highlight")]
    group: String,
}

impl Args {
    pub fn run(self) -> Result<()> {
        let source = read_to_string(&self.file)
            .with_context(|| format!("Reading {:?}", self.file))?;
        let mut doc: Value = serde_yaml::from_str(&source)
            .with_context(|| format!("Parsing {:?}", self.file))?;
        let themes = SyntectLoader.load()?.theme_info();
        match update_theme_fields(&mut doc, &self.group, &themes) {
            Some(count) => {
                write(&self.file, serde_yaml::to_string(&doc)?)
                    .with_context(|| format!("Writing {:?}", self.file))?;
                info!("Updated {count} theme fields in {:?}.", self.file);
            }
            None => warn!("No forms found in {:?}.", self.file),
        }
        Ok(())
    }
}

/// Replace the options of every theme field in forms of `group`.
///
/// Returns the number of fields updated, or `None` if the document has
/// no `spec.forms` list at all.
pub fn update_theme_fields(
    doc: &mut Value,
    group: &str,
    themes: &[ThemeInfo],
) -> Option<usize> {
    let forms = doc.get_mut("spec")?.get_mut("forms")?.as_sequence_mut()?;
    let options = Value::Sequence(themes.iter().map(theme_option).collect());
    let mut count = 0;
    for form in forms {
        if form.get("group").and_then(Value::as_str) != Some(group) {
            continue;
        }
        let Some(fields) = form
            .get_mut("formSchema")
            .and_then(Value::as_sequence_mut)
        else {
            continue;
        };
        for field in fields {
            let name = field.get("name").and_then(Value::as_str);
            if !name.is_some_and(|n| THEME_FIELDS.contains(&n)) {
                continue;
            }
            if let Some(field) = field.as_mapping_mut() {
                field.insert("options".into(), options.clone());
                count += 1;
            }
        }
    }
    Some(count)
}

fn theme_option(theme: &ThemeInfo) -> Value {
    let mut option = Mapping::new();
    option.insert(
        "label".into(),
        format!("{} ({})", theme.display_name, theme.kind).into(),
    );
    option.insert("value".into(), theme.id.clone().into());
    Value::Mapping(option)
}

#[cfg(test)]
mod test {
    use super::update_theme_fields;
    use crate::engine::{ThemeInfo, ThemeKind};
    use serde_yaml::Value;

    const SETTINGS: &str = "\
apiVersion: v1alpha1
kind: Setting
spec:
  forms:
  - group: highlight
    label: Code
    formSchema:
    - $formkit: select
      name: theme
      options: []
    - $formkit: text
      name: lineNumbers
      options: [keep]
  - group: other
    formSchema:
    - $formkit: select
      name: darkTheme
      options: [keep]
";

    fn themes() -> Vec<ThemeInfo> {
        vec![
            ThemeInfo {
                id: "nord".into(),
                display_name: "Nord".into(),
                kind: ThemeKind::Dark,
            },
            ThemeInfo {
                id: "min-light".into(),
                display_name: "Min Light".into(),
                kind: ThemeKind::Light,
            },
            ThemeInfo {
                id: "InspiredGitHub".into(),
                display_name: "Inspired GitHub".into(),
                kind: ThemeKind::Light,
            },
        ]
    }

    fn field<'a>(doc: &'a Value, form: usize, field: usize) -> &'a Value {
        &doc["spec"]["forms"][form]["formSchema"][field]
    }

    #[test]
    fn fills_theme_field() {
        let mut doc: Value = serde_yaml::from_str(SETTINGS).unwrap();
        assert_eq!(update_theme_fields(&mut doc, "highlight", &themes()), Some(1));
        let options = field(&doc, 0, 0)["options"].as_sequence().unwrap();
        assert_eq!(options.len(), 3);
        let labels = options
            .iter()
            .map(|o| (o["label"].as_str().unwrap(), o["value"].as_str().unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            [
                ("Nord (dark)", "nord"),
                ("Min Light (light)", "min-light"),
                ("Inspired GitHub (light)", "InspiredGitHub"),
            ],
        );
    }

    #[test]
    fn leaves_the_rest_alone() {
        let mut doc: Value = serde_yaml::from_str(SETTINGS).unwrap();
        let orig = doc.clone();
        update_theme_fields(&mut doc, "highlight", &themes());
        assert_eq!(field(&doc, 0, 1), field(&orig, 0, 1));
        assert_eq!(doc["spec"]["forms"][1], orig["spec"]["forms"][1]);
        assert_eq!(doc["kind"], orig["kind"]);
    }

    #[test]
    fn keeps_key_order() {
        let mut doc: Value = serde_yaml::from_str(SETTINGS).unwrap();
        update_theme_fields(&mut doc, "highlight", &themes());
        let out = serde_yaml::to_string(&doc).unwrap();
        assert!(out.starts_with("apiVersion: v1alpha1\nkind: Setting\nspec:\n"));
        let form = out.find("group: highlight").unwrap();
        assert!(form < out.find("label: Code").unwrap());
        let nord = out.find("label: Nord (dark)\n").unwrap();
        assert!(nord < out.find("value: nord\n").unwrap());
        assert!(nord < out.find("label: Min Light (light)\n").unwrap());
    }

    #[test]
    fn no_forms() {
        let mut doc: Value = serde_yaml::from_str("spec: {}\n").unwrap();
        assert_eq!(update_theme_fields(&mut doc, "highlight", &themes()), None);
    }
}
