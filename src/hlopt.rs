use crate::cache::RenderCache;
use crate::highlighter::{Defaults, Highlighter};
use crate::lifecycle::EngineManager;
use crate::syntax_hl::SyntectLoader;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

/// How to highlight, shared by all subcommands that highlight.
#[derive(Clone, Debug, Parser)]
pub struct HlOpt {
    /// Language used when a request names none.
    #[clap(long, env = "HL_DEFAULT_LANG", default_value = "javascript")]
    default_lang: String,

    /// Theme used when a request names none.
    #[clap(
        long,
        env = "HL_DEFAULT_THEME",
        default_value = "base16-ocean.dark"
    )]
    default_theme: String,

    /// Let the engine reject unknown languages and themes.
    ///
    /// Normally they are checked against the supported sets first, which
    /// gives clearer messages.
    #[clap(long, env = "HL_NO_SUPPORT_CHECK")]
    no_support_check: bool,

    /// Max number of rendered results to keep.  0 disables caching.
    #[clap(long, env = "HL_CACHE_SIZE", default_value_t = 10_000)]
    cache_size: usize,

    /// How long to keep a rendered result, in seconds.
    #[clap(long, env = "HL_CACHE_TTL", default_value_t = 24 * 3600)]
    cache_ttl: u64,

    /// Give up on a single render after this many milliseconds.
    #[clap(long, env = "HL_RENDER_TIMEOUT")]
    render_timeout: Option<u64>,
}

impl HlOpt {
    /// Create a highlighter with a fresh syntect engine manager.
    ///
    /// The engine itself is not loaded until first needed.
    pub fn highlighter(&self) -> Highlighter {
        Highlighter::new(
            EngineManager::new(Arc::new(SyntectLoader)),
            RenderCache::new(
                self.cache_size,
                Duration::from_secs(self.cache_ttl),
            ),
            Defaults {
                lang: self.default_lang.clone(),
                theme: self.default_theme.clone(),
            },
        )
        .check_supported(!self.no_support_check)
        .render_timeout(self.render_timeout.map(Duration::from_millis))
    }
}
