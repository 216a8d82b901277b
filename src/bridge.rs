//! Named entry points for an embedding host process.
//!
//! The host talks json lines on stdin/stdout: one call per line in, one
//! answer per line out, correlated by `id`.
use crate::error::{Error, ErrorKind};
use crate::highlighter::Highlighter;
use crate::hlopt::HlOpt;
use crate::request::HighlightRequest;
use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

#[derive(Parser)]
pub struct Args {
    #[clap(flatten)]
    hl: HlOpt,

    /// Load the engine before reading the first call.
    #[clap(long)]
    warmup: bool,
}

impl Args {
    pub async fn run(self) -> Result<()> {
        let bridge = Bridge::new(self.hl.highlighter());
        if self.warmup {
            bridge.highlighter.warmup().await?;
        }
        info!("Bridge listening on stdin.");
        tokio::select! {
            result = bridge.serve(tokio::io::stdin(), tokio::io::stdout()) => {
                result?
            }
            _ = tokio::signal::ctrl_c() => info!("Interrupted."),
        }
        bridge.highlighter.dispose();
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Bridge {
    highlighter: Highlighter,
}

#[derive(Deserialize)]
struct Call {
    #[serde(default)]
    id: Value,
    call: String,
    #[serde(default)]
    args: Vec<Value>,
}

#[derive(Serialize)]
struct Answer {
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl Answer {
    fn new(id: Value, result: Result<Value, Error>) -> Self {
        match result {
            Ok(value) => Answer {
                id,
                result: Some(value),
                error: None,
            },
            Err(e) => Answer {
                id,
                result: None,
                error: Some(e),
            },
        }
    }
}

impl Bridge {
    pub fn new(highlighter: Highlighter) -> Self {
        Bridge { highlighter }
    }

    /// Call an entry point by name.
    #[instrument(skip(self, args))]
    pub async fn call(
        &self,
        name: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        let arg = |i: usize| args.get(i).unwrap_or(&Value::Null);
        let hl = &self.highlighter;
        match name {
            "highlightCode" => {
                let request = HighlightRequest::from_args(arg(0), arg(1))
                    .map_err(|e| e.during("highlight"))?;
                Ok(hl.highlight(request).await?.into())
            }
            "highlightCodeBatch" => {
                Ok(json!(hl.highlight_batch(arg(0)).await?))
            }
            "getSupportedLanguages" => {
                Ok(hl.supported_languages().await?.into())
            }
            "getSupportedThemes" => Ok(hl.supported_themes().await?.into()),
            "getThemeInfo" => Ok(json!(hl.theme_info().await?)),
            "getThemeCss" => {
                let theme = arg(0).as_str().ok_or_else(|| {
                    Error::validation("theme must be a string")
                })?;
                Ok(hl.theme_css(theme).await?.into())
            }
            "warmup" => {
                hl.warmup().await?;
                Ok(Value::Null)
            }
            "disposeHighlighter" => {
                hl.dispose();
                Ok(Value::Null)
            }
            "cacheStats" => Ok(json!(hl.cache_stats())),
            name => Err(Error::validation(format!("No entry point {name:?}"))),
        }
    }

    /// Answer calls from `input` on `output` until `input` ends.
    ///
    /// Calls are handled concurrently, so answers may come in a
    /// different order than the calls.
    pub async fn serve<R, W>(&self, input: R, mut output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Answer>();
        // Dropped at end of input; the answer channel then closes when
        // the last running call has answered.
        let mut tx = Some(tx);
        let mut input = BufReader::new(input);
        // Kept between turns, since a read cancelled by an answer may
        // have left part of a line here.
        let mut buf = Vec::new();
        loop {
            tokio::select! {
                read = input.read_until(b'\n', &mut buf), if tx.is_some() => {
                    let ended = read? == 0;
                    let line = std::mem::take(&mut buf);
                    if let Some(tx) = &tx {
                        if !line.is_empty() {
                            self.accept(line, tx.clone());
                        }
                    }
                    if ended {
                        tx = None;
                    }
                }
                Some(answer) = rx.recv() => {
                    let mut data = serde_json::to_vec(&answer)?;
                    data.push(b'\n');
                    output.write_all(&data).await?;
                    output.flush().await?;
                }
                else => break,
            }
        }
        debug!("Input ended.");
        Ok(())
    }

    fn accept(&self, line: Vec<u8>, tx: mpsc::UnboundedSender<Answer>) {
        match String::from_utf8(line) {
            Ok(line) if line.trim().is_empty() => (),
            Ok(line) => self.dispatch(&line, tx),
            Err(e) => {
                let line = String::from_utf8_lossy(e.as_bytes());
                warn!("Bad call {line:?}: {e}");
                let err = Error::validation(format!("Bad call: {e}"));
                let _ = tx.send(Answer::new(Value::Null, Err(err)));
            }
        }
    }

    fn dispatch(&self, line: &str, tx: mpsc::UnboundedSender<Answer>) {
        let call = match serde_json::from_str::<Call>(line) {
            Ok(call) => call,
            Err(e) => {
                warn!("Bad call {line:?}: {e}");
                let err = Error::validation(format!("Bad call: {e}"));
                let _ = tx.send(Answer::new(Value::Null, Err(err)));
                return;
            }
        };
        let bridge = self.clone();
        tokio::spawn(async move {
            let (name, args) = (call.call.clone(), call.args);
            // Run the call in a task of its own, so a panic in it still
            // gets an answer.
            let result = tokio::spawn(async move {
                bridge.call(&name, &args).await
            })
            .await
            .unwrap_or_else(|e| {
                Err(Error::render("Call failed").caused_by(e.into()))
            });
            match &result {
                Err(e) if e.kind() == ErrorKind::Validation => {
                    debug!("Call {:?} rejected: {e}", call.call)
                }
                Err(e) => warn!("Call {:?} failed: {e}", call.call),
                Ok(_) => (),
            }
            let _ = tx.send(Answer::new(call.id, result));
        });
    }
}
