//! Highlight from the command line.
use crate::highlighter::Highlighter;
use crate::hlopt::HlOpt;
use crate::request::HighlightRequest;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
pub struct Args {
    #[clap(flatten)]
    hl: HlOpt,

    /// File to highlight.  Standard input if not given.
    file: Option<PathBuf>,

    /// Language of the code.
    #[clap(long, short)]
    lang: Option<String>,

    /// Theme to use.
    #[clap(long, short)]
    theme: Option<String>,

    /// Produce css classes rather than inline styles.
    #[clap(long)]
    classed: bool,
}

impl Args {
    pub async fn run(self) -> Result<()> {
        let hl = self.hl.highlighter();
        let mut request =
            HighlightRequest::new(read_input(self.file.as_deref())?);
        let lang = match self.lang {
            Some(lang) => Some(lang),
            None => supported_guess(&hl, self.file.as_deref()).await?,
        };
        if let Some(lang) = lang {
            request = request.lang(lang);
        }
        if let Some(theme) = self.theme {
            request = request.theme(theme);
        }
        if self.classed {
            request = request.option("classed", true);
        }
        print!("{}", hl.highlight(request).await?);
        Ok(())
    }
}

#[derive(Parser)]
pub struct BatchArgs {
    #[clap(flatten)]
    hl: HlOpt,

    /// Json file with a `{key: {code, lang?, theme?}}` object.
    /// Standard input if not given.
    file: Option<PathBuf>,
}

impl BatchArgs {
    pub async fn run(self) -> Result<()> {
        let input = read_input(self.file.as_deref())?;
        let requests: serde_json::Value =
            serde_json::from_str(&input).context("Parsing requests")?;
        let outcomes = self.hl.highlighter().highlight_batch(&requests).await?;
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        Ok(())
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Reading {path:?}")),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Reading stdin")?;
            Ok(input)
        }
    }
}

/// The language guessed from the file name, if the engine knows it.
async fn supported_guess(
    hl: &Highlighter,
    file: Option<&Path>,
) -> Result<Option<String>> {
    let Some(guess) = guess_lang(file) else {
        return Ok(None);
    };
    if hl.supported_languages().await?.contains(&guess) {
        Ok(Some(guess))
    } else {
        debug!("No language {guess:?}, using the default.");
        Ok(None)
    }
}

/// Use the file extension as language token, if there is one.
fn guess_lang(file: Option<&Path>) -> Option<String> {
    file?.extension()?.to_str().map(str::to_lowercase)
}

#[tokio::test]
async fn unknown_extension_uses_default() {
    use crate::engine::testing::FakeLoader;
    use crate::highlighter::test::highlighter;
    use std::sync::Arc;

    let hl = highlighter(&Arc::new(FakeLoader::new()));
    let guess =
        |name: &'static str| supported_guess(&hl, Some(Path::new(name)));
    assert_eq!(guess("lib.rust").await.unwrap().as_deref(), Some("rust"));
    assert_eq!(guess("notes.foo").await.unwrap(), None);
    assert_eq!(supported_guess(&hl, None).await.unwrap(), None);
}

#[test]
fn guess_lang_from_extension() {
    assert_eq!(
        guess_lang(Some(Path::new("src/main.RS"))).as_deref(),
        Some("rs"),
    );
    assert_eq!(guess_lang(Some(Path::new("Makefile"))), None);
    assert_eq!(guess_lang(None), None);
}
