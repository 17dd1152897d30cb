//! Typed request and response values exchanged between a coordinator and
//! storage nodes.
//!
//! Responses form a closed set of result kinds. Each kind defines how two
//! partial results combine, so aggregation is a `match` over the kind rather
//! than an inspection of whatever value arrived.

use geoshard_types::GeoPolygon;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Inclusive range of epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u64,
    pub end: u64,
}

impl TimeRange {
    /// Create a range, swapping the bounds if given in reverse.
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// The range covering every representable instant.
    pub fn all() -> Self {
        Self {
            start: 0,
            end: u64::MAX,
        }
    }

    pub fn contains(&self, t: u64) -> bool {
        self.start <= t && t <= self.end
    }

    /// Whether the inclusive span `[start, end]` shares an instant with this range.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        start <= self.end && self.start <= end
    }
}

/// What a metadata request asks a node to list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaKind {
    /// Names of the filesystems the node holds.
    Filesystems,
    /// Stored paths of one filesystem.
    Paths { filesystem: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Blocks of `filesystem` whose cell meets `polygon` and whose time bucket
    /// overlaps `time_range`.
    Query {
        filesystem: String,
        polygon: GeoPolygon,
        time_range: TimeRange,
    },
    /// Like `Query`, but answered as text with one block reference per line.
    /// `special_text`, when present, becomes the first line of every partial
    /// answer.
    Join {
        filesystem: String,
        polygon: GeoPolygon,
        time_range: TimeRange,
        special_text: Option<String>,
    },
    Meta {
        kind: MetaKind,
    },
}

impl Request {
    /// The result kind a well-behaved node answers this request with.
    pub fn result_kind(&self) -> ResultKind {
        match self {
            Request::Query { .. } => ResultKind::Query,
            Request::Join { .. } => ResultKind::Join,
            Request::Meta { .. } => ResultKind::Meta,
        }
    }

    pub fn polygon(&self) -> Option<&GeoPolygon> {
        match self {
            Request::Query { polygon, .. } | Request::Join { polygon, .. } => Some(polygon),
            Request::Meta { .. } => None,
        }
    }
}

/// A stored block that matched a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRef {
    pub filesystem: String,
    /// `/`-joined path of the leaf holding the block.
    pub path: String,
    pub block: String,
    pub size: u64,
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.filesystem, self.path, self.block)
    }
}

/// Tag of a [`Response`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultKind {
    Join,
    Query,
    Meta,
    Error,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultKind::Join => "join",
            ResultKind::Query => "query",
            ResultKind::Meta => "meta",
            ResultKind::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Join { text: String },
    Query { blocks: Vec<BlockRef> },
    Meta { entries: BTreeSet<String> },
    Error { messages: Vec<String> },
}

impl Response {
    pub fn kind(&self) -> ResultKind {
        match self {
            Response::Join { .. } => ResultKind::Join,
            Response::Query { .. } => ResultKind::Query,
            Response::Meta { .. } => ResultKind::Meta,
            Response::Error { .. } => ResultKind::Error,
        }
    }

    /// The identity value of `kind` under [`merge`](Self::merge).
    pub fn empty(kind: ResultKind) -> Self {
        match kind {
            ResultKind::Join => Response::Join {
                text: String::new(),
            },
            ResultKind::Query => Response::Query { blocks: Vec::new() },
            ResultKind::Meta => Response::Meta {
                entries: BTreeSet::new(),
            },
            ResultKind::Error => Response::Error {
                messages: Vec::new(),
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            messages: vec![message.into()],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }

    /// Combine two partial results of the same kind.
    ///
    /// Join texts are concatenated with a newline, skipping empty parts. Query
    /// blocks are appended in order. Meta entries are unioned. Merging
    /// different kinds produces an `Error` carrying any messages already
    /// present plus a note naming both kinds.
    pub fn merge(self, other: Response) -> Response {
        match (self, other) {
            (Response::Join { text: a }, Response::Join { text: b }) => {
                let text = match (a.is_empty(), b.is_empty()) {
                    (true, _) => b,
                    (_, true) => a,
                    _ => format!("{a}\n{b}"),
                };
                Response::Join { text }
            }
            (Response::Query { mut blocks }, Response::Query { blocks: more }) => {
                blocks.extend(more);
                Response::Query { blocks }
            }
            (Response::Meta { mut entries }, Response::Meta { entries: more }) => {
                entries.extend(more);
                Response::Meta { entries }
            }
            (Response::Error { mut messages }, Response::Error { messages: more }) => {
                messages.extend(more);
                Response::Error { messages }
            }
            (a, b) => {
                let note = format!("cannot merge a {} result into a {} result", b.kind(), a.kind());
                let mut messages = a.into_messages();
                messages.extend(b.into_messages());
                messages.push(note);
                Response::Error { messages }
            }
        }
    }

    fn into_messages(self) -> Vec<String> {
        match self {
            Response::Error { messages } => messages,
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Response(Response),
}

/// Unit of exchange on the wire. Replies carry the id of the request they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub request_id: Uuid,
    pub body: Message,
}

impl Envelope {
    pub fn request(request_id: Uuid, request: Request) -> Self {
        Self {
            request_id,
            body: Message::Request(request),
        }
    }

    pub fn response(request_id: Uuid, response: Response) -> Self {
        Self {
            request_id,
            body: Message::Response(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(name: &str) -> BlockRef {
        BlockRef {
            filesystem: "fs".into(),
            path: "9q/0".into(),
            block: name.into(),
            size: 1,
        }
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::new(200, 100);
        assert_eq!(range.start, 100);
        assert!(range.contains(100) && range.contains(200));
        assert!(!range.contains(201));
        assert!(range.overlaps(0, 100));
        assert!(range.overlaps(150, 1000));
        assert!(!range.overlaps(201, 300));
        assert!(TimeRange::all().contains(u64::MAX));
    }

    #[test]
    fn test_join_merge_skips_empty_text() {
        let merged = Response::empty(ResultKind::Join)
            .merge(Response::Join { text: "a".into() })
            .merge(Response::Join { text: String::new() })
            .merge(Response::Join { text: "b\nc".into() });
        assert_eq!(merged, Response::Join { text: "a\nb\nc".into() });
    }

    #[test]
    fn test_query_merge_keeps_order() {
        let merged = Response::Query {
            blocks: vec![block("b2")],
        }
        .merge(Response::Query {
            blocks: vec![block("b1")],
        });
        let Response::Query { blocks } = merged else {
            panic!("expected query result");
        };
        let names: Vec<&str> = blocks.iter().map(|b| b.block.as_str()).collect();
        assert_eq!(names, ["b2", "b1"]);
    }

    #[test]
    fn test_meta_merge_is_union() {
        let a = Response::Meta {
            entries: ["x", "y"].iter().map(|s| s.to_string()).collect(),
        };
        let b = Response::Meta {
            entries: ["y", "z"].iter().map(|s| s.to_string()).collect(),
        };
        let Response::Meta { entries } = a.merge(b) else {
            panic!("expected meta result");
        };
        assert_eq!(entries.into_iter().collect::<Vec<_>>(), ["x", "y", "z"]);
    }

    #[test]
    fn test_mismatched_merge_is_error() {
        let merged = Response::error("node down").merge(Response::Join { text: "a".into() });
        let Response::Error { messages } = merged else {
            panic!("expected error result");
        };
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "node down");
        assert!(messages[1].contains("join"));
    }

    #[test]
    fn test_request_kind_and_display() {
        let request = Request::Meta {
            kind: MetaKind::Filesystems,
        };
        assert_eq!(request.result_kind(), ResultKind::Meta);
        assert!(request.polygon().is_none());
        assert_eq!(block("b1").to_string(), "fs/9q/0/b1");
    }

    #[test]
    fn test_envelope_json_shape() {
        let id = Uuid::nil();
        let envelope = Envelope::response(id, Response::Join { text: "x".into() });
        let json = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
        assert!(json.contains("\"Join\""));
    }
}
