use crate::hlopt::HlOpt;
use anyhow::Result;
use clap::Parser;

#[derive(Parser)]
pub struct Args {
    #[clap(flatten)]
    hl: HlOpt,
}

impl Args {
    pub async fn languages(self) -> Result<()> {
        for lang in self.hl.highlighter().supported_languages().await? {
            println!("{lang}");
        }
        Ok(())
    }

    pub async fn themes(self) -> Result<()> {
        for theme in self.hl.highlighter().theme_info().await? {
            println!(
                "{:24} {} ({})",
                theme.id, theme.display_name, theme.kind,
            );
        }
        Ok(())
    }
}

#[derive(Parser)]
pub struct CssArgs {
    #[clap(flatten)]
    hl: HlOpt,

    /// The theme to make a stylesheet for.
    theme: String,
}

impl CssArgs {
    pub async fn run(self) -> Result<()> {
        print!("{}", self.hl.highlighter().theme_css(&self.theme).await?);
        Ok(())
    }
}
