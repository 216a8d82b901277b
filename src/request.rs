use crate::engine::RenderOptions;
use crate::error::Error;
use serde::Serialize;
use serde_json::Value;

/// One piece of code to highlight.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HighlightRequest {
    pub code: String,
    pub lang: Option<String>,
    pub theme: Option<String>,
    pub options: RenderOptions,
}

impl HighlightRequest {
    pub fn new(code: impl Into<String>) -> Self {
        HighlightRequest {
            code: code.into(),
            ..Default::default()
        }
    }
    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }
    pub fn theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }
    pub fn option(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Create a request from untyped host arguments.
    ///
    /// `options` may be null or an object with optional `lang` and
    /// `theme` strings; any other keys are passed on to the engine.
    pub fn from_args(code: &Value, options: &Value) -> Result<Self, Error> {
        let code = code
            .as_str()
            .ok_or_else(|| Error::validation("code must be a string"))?;
        let mut options = match options {
            Value::Null => RenderOptions::new(),
            Value::Object(options) => options.clone(),
            _ => return Err(Error::validation("options must be an object")),
        };
        let lang = take_name(&mut options, "lang")?;
        let theme = take_name(&mut options, "theme")?;
        Ok(HighlightRequest {
            code: code.into(),
            lang,
            theme,
            options,
        })
    }

    /// Create a request from a `{code, lang?, theme?, ...}` object.
    pub fn from_value(item: &Value) -> Result<Self, Error> {
        let mut fields = match item {
            Value::Object(fields) => fields.clone(),
            _ => return Err(Error::validation("request must be an object")),
        };
        let code = fields.remove("code").unwrap_or_default();
        Self::from_args(&code, &Value::Object(fields))
    }
}

/// Remove an optional name from the options.  Empty means unspecified.
fn take_name(
    options: &mut RenderOptions,
    key: &str,
) -> Result<Option<String>, Error> {
    match options.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(Error::validation(format!("{key} must be a string"))),
    }
}

/// The result of one item in a batch.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(into = "OutcomeRecord")]
pub enum Outcome {
    Success { markup: String },
    Failure { message: String },
}

impl Outcome {
    #[cfg(test)]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
    pub fn failed(error: &Error) -> Self {
        Outcome::Failure {
            message: error.to_string(),
        }
    }
    #[cfg(test)]
    pub fn markup(&self) -> Option<&str> {
        match self {
            Outcome::Success { markup } => Some(markup),
            Outcome::Failure { .. } => None,
        }
    }
}

impl From<Result<String, Error>> for Outcome {
    fn from(result: Result<String, Error>) -> Self {
        match result {
            Ok(markup) => Outcome::Success { markup },
            Err(e) => Outcome::failed(&e),
        }
    }
}

/// How an [`Outcome`] looks to the host.
#[derive(Serialize)]
struct OutcomeRecord {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<Outcome> for OutcomeRecord {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success { markup } => OutcomeRecord {
                success: true,
                html: Some(markup),
                error: None,
            },
            Outcome::Failure { message } => OutcomeRecord {
                success: false,
                html: None,
                error: Some(message),
            },
        }
    }
}
