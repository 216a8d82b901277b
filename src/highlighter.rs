use crate::cache::{CacheKey, CacheStats, RenderCache};
use crate::engine::{Engine, ThemeInfo};
use crate::error::Error;
use crate::lifecycle::EngineManager;
use crate::request::HighlightRequest;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Language and theme used when a request names none.
#[derive(Clone, Debug)]
pub struct Defaults {
    pub lang: String,
    pub theme: String,
}

/// Validates highlight requests and hands them to the shared engine.
///
/// Clones share the engine and the cache.
#[derive(Clone)]
pub struct Highlighter {
    engines: EngineManager,
    cache: Arc<RenderCache>,
    defaults: Arc<Defaults>,
    check_supported: bool,
    render_timeout: Option<Duration>,
}

impl std::fmt::Debug for Highlighter {
    fn fmt(&self, out: &mut std::fmt::Formatter) -> std::fmt::Result {
        out.debug_struct("Highlighter")
            .field("engines", &self.engines)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Highlighter {
    pub fn new(
        engines: EngineManager,
        cache: RenderCache,
        defaults: Defaults,
    ) -> Self {
        Highlighter {
            engines,
            cache: Arc::new(cache),
            defaults: Arc::new(defaults),
            check_supported: true,
            render_timeout: None,
        }
    }

    /// Check language and theme against the supported sets before
    /// calling the engine.  When off, the engine rejects them instead.
    pub fn check_supported(mut self, check: bool) -> Self {
        self.check_supported = check;
        self
    }

    /// Give up on any single render that takes longer than this.
    pub fn render_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.render_timeout = timeout;
        self
    }

    /// Highlight one piece of code.
    #[instrument(
        skip_all,
        fields(lang = ?request.lang, theme = ?request.theme),
    )]
    pub async fn highlight(
        &self,
        request: HighlightRequest,
    ) -> Result<String, Error> {
        async {
            let epoch = self.cache.epoch();
            let engine = self.engines.ensure_ready().await?;
            self.render(engine, request, epoch).await
        }
        .await
        .map_err(|e| e.during("highlight"))
    }

    /// The cache key of a request, with defaults resolved.
    pub(crate) fn cache_key(&self, request: &HighlightRequest) -> CacheKey {
        CacheKey::new(
            &request.code,
            request.lang.as_deref().unwrap_or(&self.defaults.lang),
            request.theme.as_deref().unwrap_or(&self.defaults.theme),
            &request.options,
        )
    }

    /// Resolve defaults, check, and render on an already ready engine.
    ///
    /// `epoch` is the cache epoch read before the engine was obtained,
    /// so a result from a since disposed engine is not cached.
    pub(crate) async fn render(
        &self,
        engine: Arc<dyn Engine>,
        request: HighlightRequest,
        epoch: u64,
    ) -> Result<String, Error> {
        let key = self.cache_key(&request);
        let HighlightRequest {
            code,
            lang,
            theme,
            options,
        } = request;
        let lang = lang.unwrap_or_else(|| self.defaults.lang.clone());
        let theme = theme.unwrap_or_else(|| self.defaults.theme.clone());
        if self.check_supported {
            if !engine.languages().contains(&lang) {
                return Err(Error::unsupported(format!(
                    "Unsupported language: {lang}"
                )));
            }
            if !engine.themes().contains(&theme) {
                return Err(Error::unsupported(format!(
                    "Unsupported theme: {theme}"
                )));
            }
        }

        if let Some(markup) = self.cache.get(&key) {
            debug!("Cache hit for {lang} in {theme}.");
            return Ok(markup);
        }

        let job = tokio::task::spawn_blocking(move || {
            engine.render(&code, &lang, &theme, &options)
        });
        let joined = match self.render_timeout {
            Some(limit) => tokio::time::timeout(limit, job).await.map_err(
                |_| Error::render(format!("Render timed out after {limit:?}")),
            )?,
            None => job.await,
        };
        let markup = joined
            .map_err(|e| {
                Error::render("Render task failed").caused_by(e.into())
            })?
            .map_err(|e| Error::render("Render failed").caused_by(e))?;
        self.cache.put(key, markup.clone(), epoch);
        Ok(markup)
    }

    pub async fn supported_languages(&self) -> Result<Vec<String>, Error> {
        let engine = self.engines.ensure_ready().await?;
        Ok(engine.languages().iter().cloned().collect())
    }

    pub async fn supported_themes(&self) -> Result<Vec<String>, Error> {
        let engine = self.engines.ensure_ready().await?;
        Ok(engine.themes().iter().cloned().collect())
    }

    pub async fn theme_info(&self) -> Result<Vec<ThemeInfo>, Error> {
        Ok(self.engines.ensure_ready().await?.theme_info())
    }

    /// A stylesheet for `classed` output in the given theme.
    pub async fn theme_css(&self, theme: &str) -> Result<String, Error> {
        self.engines
            .ensure_ready()
            .await?
            .css(theme)
            .ok_or_else(|| {
                Error::unsupported(format!("Unsupported theme: {theme}"))
            })
    }

    pub async fn warmup(&self) -> Result<(), Error> {
        self.engines.warmup().await.map_err(|e| e.during("warmup"))
    }

    /// Release the engine.  The next request loads a new one.
    pub fn dispose(&self) {
        self.engines.dispose();
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.remove_expired();
        self.cache.stats()
    }

    pub(crate) fn engines(&self) -> &EngineManager {
        &self.engines
    }

    pub(crate) fn cache(&self) -> &RenderCache {
        &self.cache
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::{Defaults, Highlighter};
    use crate::cache::RenderCache;
    use crate::engine::testing::FakeLoader;
    use crate::error::ErrorKind;
    use crate::lifecycle::EngineManager;
    use crate::request::HighlightRequest;
    use std::sync::Arc;
    use std::time::Duration;

    pub fn highlighter(loader: &Arc<FakeLoader>) -> Highlighter {
        Highlighter::new(
            EngineManager::new(loader.clone()),
            RenderCache::new(100, Duration::from_secs(60)),
            Defaults {
                lang: "javascript".into(),
                theme: "nord".into(),
            },
        )
    }

    #[tokio::test]
    async fn highlights_with_defaults() {
        let loader = Arc::new(FakeLoader::new());
        let hl = highlighter(&loader);
        let html = hl
            .highlight(HighlightRequest::new("a < b && c"))
            .await
            .unwrap();
        assert_eq!(
            html,
            "<pre class=\"nord\"><code class=\"javascript\">\
             a &lt; b &amp;&amp; c</code></pre>",
        );
    }

    #[tokio::test]
    async fn unsupported_language_is_checked_first() {
        let loader = Arc::new(FakeLoader::new());
        let hl = highlighter(&loader);
        let err = hl
            .highlight(HighlightRequest::new("x").lang("cobol"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOption);
        assert_eq!(
            err.to_string(),
            "highlight failed: Unsupported language: cobol",
        );
        let err = hl
            .highlight(HighlightRequest::new("x").theme("dracula"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "highlight failed: Unsupported theme: dracula",
        );
        assert_eq!(loader.counters.renders(), 0);
    }

    #[tokio::test]
    async fn unchecked_language_is_rejected_by_engine() {
        let loader = Arc::new(FakeLoader::new());
        let hl = highlighter(&loader).check_supported(false);
        let err = hl
            .highlight(HighlightRequest::new("x").lang("cobol"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
        assert_eq!(
            err.to_string(),
            "highlight failed: Render failed: Language \"cobol\" not loaded",
        );
        assert_eq!(loader.counters.renders(), 1);
    }

    #[tokio::test]
    async fn render_failure_is_wrapped() {
        let loader = Arc::new(FakeLoader::new());
        let hl = highlighter(&loader);
        let err = hl.highlight(HighlightRequest::new("boom")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
        assert_eq!(
            err.to_string(),
            "highlight failed: Render failed: grammar exploded",
        );
    }

    #[tokio::test]
    async fn init_failure_is_wrapped() {
        let loader = Arc::new(FakeLoader::new().failing(1));
        let hl = highlighter(&loader);
        let err = hl.highlight(HighlightRequest::new("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Initialization);
        assert_eq!(
            err.to_string(),
            "highlight failed: Failed to load engine: assets missing",
        );
        assert!(hl.highlight(HighlightRequest::new("x")).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_highlights_load_once() {
        let loader = Arc::new(FakeLoader::new());
        let hl = highlighter(&loader);
        let calls = (0..8)
            .map(|i| {
                let hl = hl.clone();
                tokio::spawn(async move {
                    hl.highlight(HighlightRequest::new(format!("x{i}"))).await
                })
            })
            .collect::<Vec<_>>();
        for call in calls {
            call.await.unwrap().unwrap();
        }
        assert_eq!(loader.counters.loads(), 1);
    }

    #[tokio::test]
    async fn repeated_requests_hit_cache() {
        let loader = Arc::new(FakeLoader::new());
        let hl = highlighter(&loader);
        let a = hl.highlight(HighlightRequest::new("x")).await.unwrap();
        let b = hl.highlight(HighlightRequest::new("x")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(loader.counters.renders(), 1);
        assert_eq!(hl.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn dispose_then_highlight_reloads() {
        let loader = Arc::new(FakeLoader::new());
        let hl = highlighter(&loader);
        hl.highlight(HighlightRequest::new("x")).await.unwrap();
        hl.dispose();
        assert_eq!(hl.cache_stats().entries, 0);
        hl.highlight(HighlightRequest::new("x")).await.unwrap();
        assert_eq!(loader.counters.loads(), 2);
        assert_eq!(loader.counters.renders(), 2);
    }

    #[tokio::test]
    async fn render_running_over_dispose_is_not_cached() {
        let loader = Arc::new(FakeLoader::new());
        let hl = highlighter(&loader);
        let running = tokio::spawn({
            let hl = hl.clone();
            async move { hl.highlight(HighlightRequest::new("slow")).await }
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        hl.dispose();
        assert!(running.await.unwrap().is_ok());
        assert_eq!(hl.cache_stats().entries, 0);

        hl.highlight(HighlightRequest::new("slow")).await.unwrap();
        assert_eq!(loader.counters.renders(), 2);
        assert_eq!(hl.cache_stats().entries, 1);
    }

    #[tokio::test]
    async fn slow_render_times_out() {
        let loader = Arc::new(FakeLoader::new());
        let hl = highlighter(&loader)
            .render_timeout(Some(Duration::from_millis(50)));
        let err = hl.highlight(HighlightRequest::new("slow")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
        assert_eq!(
            err.to_string(),
            "highlight failed: Render timed out after 50ms",
        );
    }

    #[tokio::test]
    async fn lists_and_css() {
        let loader = Arc::new(FakeLoader::new());
        let hl = highlighter(&loader);
        assert_eq!(
            hl.supported_languages().await.unwrap(),
            ["javascript", "python", "rust"],
        );
        assert_eq!(hl.supported_themes().await.unwrap(), ["min-light", "nord"]);
        assert_eq!(hl.theme_css("nord").await.unwrap(), ".nord {}");
        assert!(hl.theme_css("dracula").await.is_err());
        assert_eq!(loader.counters.loads(), 1);
    }
}
