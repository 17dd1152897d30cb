use crate::protocol::{Request, Response, ResultKind};

/// Folds partial responses into one aggregate.
pub trait Reducer: 'static + Send + Sync {
    /// Starting value, also the result when no reply arrives.
    fn empty(&self) -> Response;

    fn reduce(&self, acc: Response, reply: Response) -> Response;
}

/// Merges replies of one expected kind with [`Response::merge`].
///
/// Replies of any other kind, including node-side errors, are logged and left
/// out, so the aggregate always has the expected kind.
#[derive(Debug, Clone, Copy)]
pub struct MergeByKind {
    kind: ResultKind,
}

impl MergeByKind {
    pub fn new(kind: ResultKind) -> Self {
        Self { kind }
    }

    pub fn for_request(request: &Request) -> Self {
        Self::new(request.result_kind())
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }
}

impl Reducer for MergeByKind {
    fn empty(&self) -> Response {
        Response::empty(self.kind)
    }

    fn reduce(&self, acc: Response, reply: Response) -> Response {
        match reply {
            reply if reply.kind() == self.kind => acc.merge(reply),
            Response::Error { messages } => {
                log::warn!("Dropping error reply: {}", messages.join("; "));
                acc
            }
            other => {
                log::warn!(
                    "Dropping {} reply while merging {} results",
                    other.kind(),
                    self.kind
                );
                acc
            }
        }
    }
}

/// Reducer built from a starting value and a closure.
pub struct FnReducer<F> {
    empty: Response,
    fold: F,
}

/// Build a [`Reducer`] from a starting value and a folding closure.
pub fn reducer_fn<F>(empty: Response, fold: F) -> FnReducer<F>
where
    F: Fn(Response, Response) -> Response + 'static + Send + Sync,
{
    FnReducer { empty, fold }
}

impl<F> Reducer for FnReducer<F>
where
    F: Fn(Response, Response) -> Response + 'static + Send + Sync,
{
    fn empty(&self) -> Response {
        self.empty.clone()
    }

    fn reduce(&self, acc: Response, reply: Response) -> Response {
        (self.fold)(acc, reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold<R: Reducer>(reducer: &R, replies: Vec<Response>) -> Response {
        replies
            .into_iter()
            .fold(reducer.empty(), |acc, r| reducer.reduce(acc, r))
    }

    #[test]
    fn test_merge_by_kind_joins_text_in_order() {
        let reducer = MergeByKind::new(ResultKind::Join);
        let merged = fold(
            &reducer,
            vec![
                Response::Join { text: "n1".into() },
                Response::Join { text: "n2".into() },
            ],
        );
        assert_eq!(merged, Response::Join { text: "n1\nn2".into() });
    }

    #[test]
    fn test_merge_by_kind_drops_foreign_replies() {
        let reducer = MergeByKind::new(ResultKind::Join);
        let merged = fold(
            &reducer,
            vec![
                Response::error("disk failure"),
                Response::Join { text: "ok".into() },
                Response::Query { blocks: Vec::new() },
            ],
        );
        assert_eq!(merged, Response::Join { text: "ok".into() });
    }

    #[test]
    fn test_merge_by_kind_empty() {
        let reducer = MergeByKind::new(ResultKind::Meta);
        assert_eq!(fold(&reducer, Vec::new()), Response::empty(ResultKind::Meta));
    }

    #[test]
    fn test_closure_reducer() {
        let reducer = reducer_fn(Response::Join { text: String::new() }, |acc, reply| {
            match (acc, reply) {
                (Response::Join { text: a }, Response::Join { text: b }) => Response::Join {
                    text: format!("{a}{b}"),
                },
                (acc, _) => acc,
            }
        });
        let merged = fold(
            &reducer,
            vec![
                Response::Join { text: "a".into() },
                Response::Join { text: "b".into() },
            ],
        );
        assert_eq!(merged, Response::Join { text: "ab".into() });
    }
}
