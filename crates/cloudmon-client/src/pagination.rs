//! Lazy, marker-based listing.
//!
//! Listing endpoints answer `{"values": [...], "metadata": {"next_marker": ..}}`
//! (or 204 for an empty collection). [`paginate`] turns that into a
//! [`Stream`] that only touches the network when its buffer runs dry, so
//! nothing is fetched before the first poll and a consumer that stops early
//! never pays for later pages.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use cloudmon_core::{CloudmonError, Result};
use futures::stream::{self, Stream};
use reqwest::StatusCode;
use serde_json::Value;

use crate::connection::{Connection, ResponseBody};

/// Query parameter carrying the continuation marker.
pub const MARKER_PARAM: &str = "marker";

/// What to list: a collection path plus parameters sent with every page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl ListRequest {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter sent on every page (e.g. `limit`).
    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    fn params_for(&self, marker: Option<&str>) -> Vec<(String, String)> {
        let mut params = self.params.clone();
        if let Some(marker) = marker {
            params.push((MARKER_PARAM.to_string(), marker.to_string()));
        }
        params
    }
}

type EachFn<T> = dyn Fn(Value) -> Result<T> + Send + Sync;
type WholeFn<T> = dyn Fn(Vec<Value>) -> Result<Vec<T>> + Send + Sync;

/// Turns raw page values into records.
pub enum PageMapper<T> {
    /// Map each value on its own
    Each(Arc<EachFn<T>>),
    /// Map a whole page at once
    Whole(Arc<WholeFn<T>>),
}

impl<T> PageMapper<T> {
    pub fn each<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<T> + Send + Sync + 'static,
    {
        Self::Each(Arc::new(f))
    }

    pub fn whole<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Vec<T>> + Send + Sync + 'static,
    {
        Self::Whole(Arc::new(f))
    }

    fn map(&self, values: Vec<Value>) -> Result<Vec<T>> {
        match self {
            Self::Each(f) => values.into_iter().map(|v| f(v)).collect(),
            Self::Whole(f) => f(values),
        }
    }
}

impl<T> Clone for PageMapper<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Each(f) => Self::Each(Arc::clone(f)),
            Self::Whole(f) => Self::Whole(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for PageMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Each(_) => f.write_str("PageMapper::Each"),
            Self::Whole(_) => f.write_str("PageMapper::Whole"),
        }
    }
}

/// One fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Marker for the next page; `None` means this was the last one.
    pub next_marker: Option<String>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_marker.is_none()
    }
}

/// Fetch a single page.
///
/// `marker` is `None` for the first page. A 204 is an empty last page; any
/// status other than 200 or 204 is an error.
pub async fn fetch_page<T>(
    connection: &Connection,
    request: &ListRequest,
    mapper: &PageMapper<T>,
    marker: Option<&str>,
) -> Result<Page<T>> {
    let response = connection
        .get(&request.path, &request.params_for(marker))
        .await?;

    match response.status {
        StatusCode::NO_CONTENT => {
            return Ok(Page {
                items: Vec::new(),
                next_marker: None,
            })
        }
        StatusCode::OK => {}
        other => return Err(CloudmonError::unexpected_status(other.as_u16(), &response.raw)),
    }

    let mut body = match response.body {
        ResponseBody::Json(value) => value,
        _ => {
            return Err(CloudmonError::malformed(
                "listing response is not JSON",
                &response.raw,
            ))
        }
    };

    let values = match body.get_mut("values").map(Value::take) {
        Some(Value::Array(values)) => values,
        _ => {
            return Err(CloudmonError::malformed(
                "listing response has no 'values' array",
                &response.raw,
            ))
        }
    };

    let next_marker = match body.pointer("/metadata/next_marker") {
        None | Some(Value::Null) => None,
        Some(Value::String(marker)) => Some(marker.clone()),
        Some(other) => Some(other.to_string()),
    };

    tracing::debug!(
        "fetched {} values from {} (next marker: {})",
        values.len(),
        request.path,
        next_marker.as_deref().unwrap_or("-")
    );

    Ok(Page {
        items: mapper.map(values)?,
        next_marker,
    })
}

enum Position {
    Start,
    After(String),
    Exhausted,
}

struct Cursor<T> {
    connection: Arc<Connection>,
    request: ListRequest,
    mapper: PageMapper<T>,
    buffer: VecDeque<T>,
    position: Position,
}

async fn advance<T>(mut cursor: Cursor<T>) -> Result<Option<(T, Cursor<T>)>> {
    loop {
        if let Some(item) = cursor.buffer.pop_front() {
            return Ok(Some((item, cursor)));
        }

        let marker = match &cursor.position {
            Position::Start => None,
            Position::After(marker) => Some(marker.clone()),
            Position::Exhausted => return Ok(None),
        };

        let page = fetch_page(
            &cursor.connection,
            &cursor.request,
            &cursor.mapper,
            marker.as_deref(),
        )
        .await?;

        cursor.position = match page.next_marker {
            Some(marker) => Position::After(marker),
            None => Position::Exhausted,
        };
        cursor.buffer.extend(page.items);
    }
}

/// Lazily list every record of a collection.
///
/// The stream is single-pass. It ends after the last page, or right after
/// yielding the first error. Call again for a fresh cursor.
pub fn paginate<T>(
    connection: Arc<Connection>,
    request: ListRequest,
    mapper: PageMapper<T>,
) -> impl Stream<Item = Result<T>> + Send + 'static
where
    T: Send + 'static,
{
    let cursor = Cursor {
        connection,
        request,
        mapper,
        buffer: VecDeque::new(),
        position: Position::Start,
    };
    stream::try_unfold(cursor, advance)
}
