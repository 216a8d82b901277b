//! Highlight many independent requests at once.
use crate::cache::CacheKey;
use crate::error::Error;
use crate::highlighter::Highlighter;
use crate::request::{HighlightRequest, Outcome};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, info, instrument};

impl Highlighter {
    /// Highlight every request in a `{key: {code, lang?, theme?}}` map.
    ///
    /// Only a malformed map or a failing engine initialization fails the
    /// whole call.  Anything wrong with a single item becomes a failure
    /// outcome for that key, and every input key gets exactly one
    /// outcome.
    #[instrument(skip_all)]
    pub async fn highlight_batch(
        &self,
        requests: &Value,
    ) -> Result<BTreeMap<String, Outcome>, Error> {
        self.batch(requests)
            .await
            .map_err(|e| e.during("batch highlight"))
    }

    async fn batch(
        &self,
        requests: &Value,
    ) -> Result<BTreeMap<String, Outcome>, Error> {
        let requests = requests
            .as_object()
            .ok_or_else(|| Error::validation("requests must be an object"))?;
        let epoch = self.cache().epoch();
        let engine = self.engines().ensure_ready().await?;
        let time = Instant::now();

        let mut results: BTreeMap<String, Outcome> = BTreeMap::new();
        // Identical requests are rendered once, by the first key.
        let mut first: HashMap<CacheKey, usize> = HashMap::new();
        let mut same_as: Vec<(String, usize)> = Vec::new();
        let mut tasks = Vec::new();
        for (key, item) in requests {
            let request = match HighlightRequest::from_value(item) {
                Ok(request) => request,
                Err(e) => {
                    debug!("Bad batch item {key:?}: {e}");
                    results.insert(key.clone(), Outcome::failed(&e));
                    continue;
                }
            };
            match first.entry(self.cache_key(&request)) {
                Entry::Occupied(i) => {
                    same_as.push((key.clone(), *i.get()));
                    continue;
                }
                Entry::Vacant(slot) => {
                    slot.insert(tasks.len());
                }
            }
            let hl = self.clone();
            let engine = engine.clone();
            tasks.push((
                key.clone(),
                tokio::spawn(async move {
                    hl.render(engine, request, epoch).await
                }),
            ));
        }
        self.cache().record_deduplicated(same_as.len());

        // All tasks are already running, so awaiting them in turn does
        // not serialize them.
        let mut rendered = Vec::with_capacity(tasks.len());
        for (key, task) in tasks {
            let outcome = match task.await {
                Ok(result) => Outcome::from(result),
                Err(e) => Outcome::failed(
                    &Error::render("Render task failed").caused_by(e.into()),
                ),
            };
            rendered.push(outcome.clone());
            results.insert(key, outcome);
        }
        for (key, i) in same_as {
            results.insert(key, rendered[i].clone());
        }
        info!(
            "Highlighted batch of {} in {:.1?}.",
            results.len(),
            time.elapsed(),
        );
        Ok(results)
    }
}
