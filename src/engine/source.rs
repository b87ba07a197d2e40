use crate::core::{BoxError, DatasetId};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Lazily pulled entities of one run. An `Err` item aborts the run.
pub type EntityStream<'a, E> = BoxStream<'a, std::result::Result<E, BoxError>>;

/// Produces the current entities of a dataset, afresh on every call.
pub trait SourceProducer<E>: Send + Sync {
    fn pull(&self, dataset: DatasetId) -> EntityStream<'_, E>;
}

impl<E, F> SourceProducer<E> for F
where
    F: Fn(DatasetId) -> EntityStream<'static, E> + Send + Sync,
{
    fn pull(&self, dataset: DatasetId) -> EntityStream<'_, E> {
        self(dataset)
    }
}

/// Fixed in-memory source, mostly useful in tests and demos.
#[derive(Debug, Clone)]
pub struct VecSource<E> {
    items: Vec<E>,
}

impl<E> VecSource<E> {
    pub fn new(items: Vec<E>) -> Self {
        Self { items }
    }
}

impl<E> SourceProducer<E> for VecSource<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn pull(&self, _dataset: DatasetId) -> EntityStream<'_, E> {
        stream::iter(self.items.iter().cloned().map(Ok)).boxed()
    }
}

/// Newline-delimited JSON read from a file, or stdin when no path is given.
/// Blank lines are skipped; each line is parsed only when pulled.
#[derive(Debug, Clone)]
pub struct NdjsonSource {
    path: Option<PathBuf>,
}

impl NdjsonSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn stdin() -> Self {
        Self { path: None }
    }
}

type LineReader = Box<dyn AsyncBufRead + Unpin + Send>;

impl SourceProducer<JsonValue> for NdjsonSource {
    fn pull(&self, _dataset: DatasetId) -> EntityStream<'_, JsonValue> {
        let path = self.path.clone();
        let opened = async move {
            let reader: LineReader = match path {
                Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
                None => Box::new(BufReader::new(tokio::io::stdin())),
            };
            Ok::<_, BoxError>(reader.lines())
        };

        stream::once(opened)
            .map_ok(|lines| {
                stream::try_unfold(lines, |mut lines| async move {
                    while let Some(line) = lines.next_line().await? {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        let value: JsonValue = serde_json::from_str(line)?;
                        return Ok(Some((value, lines)));
                    }
                    Ok::<_, BoxError>(None)
                })
            })
            .try_flatten()
            .boxed()
    }
}
