//! Keyset pagination with opaque, encrypted cursors.
//!
//! Rows are ordered by their numeric key alone. Keys are allocated in
//! insertion order, which is creation order, while `created_at` is stamped
//! after the key is reserved and may disagree under concurrent writes.
//! Sort and cursor filter use the same field so no row is ever skipped.
//! A cursor is the encrypted decimal key of a row.

use mongodb::{
    bson::{doc, Document},
    options::FindOptions,
};
use rocket::futures::TryStreamExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::codec::{FormatError, SymmetricCodec};
use crate::error::{Error, Result};
use crate::model::{
    db::{credential::Credential, question::Question, vote::Vote},
    mongodb::{Coll, MongoCollection, RowId},
};

/// Largest page a client may request.
pub const MAX_PAGE_SIZE: u64 = 100;

/// A row that can be paged through by its numeric key.
pub trait Keyed {
    /// The document field holding [`Keyed::row_id`].
    const KEY_FIELD: &'static str;

    fn row_id(&self) -> RowId;
}

impl Keyed for Vote {
    const KEY_FIELD: &'static str = "row";

    fn row_id(&self) -> RowId {
        self.row
    }
}

impl Keyed for Question {
    const KEY_FIELD: &'static str = "_id";

    fn row_id(&self) -> RowId {
        self.id
    }
}

impl Keyed for Credential {
    const KEY_FIELD: &'static str = "_id";

    fn row_id(&self) -> RowId {
        self.id
    }
}

/// Raw page request, as received in a query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromForm)]
pub struct PageArgs {
    pub first: Option<u64>,
    pub after: Option<String>,
    pub last: Option<u64>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A validated page request with its cursor decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub direction: Direction,
    pub size: u64,
    pub cursor: Option<RowId>,
}

impl PageWindow {
    /// Restrict `filter` to rows beyond the cursor in the paging direction.
    pub fn filter(&self, mut filter: Document, key_field: &str) -> Document {
        if let Some(cursor) = self.cursor {
            let op = match self.direction {
                Direction::Forward => "$gt",
                Direction::Backward => "$lt",
            };
            let mut bound = Document::new();
            bound.insert(op, cursor);
            filter.insert(key_field, bound);
        }
        filter
    }

    /// Sort in the paging direction and fetch one row more than requested.
    pub fn find_options(&self, key_field: &str) -> FindOptions {
        let order = match self.direction {
            Direction::Forward => 1,
            Direction::Backward => -1,
        };
        let mut sort = Document::new();
        sort.insert(key_field, order);
        FindOptions::builder()
            .sort(sort)
            .limit((self.size + 1) as i64)
            .build()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge<T> {
    pub node: T,
    pub cursor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

/// One page of rows, in ascending order, with their cursors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
    pub total_count: u64,
}

impl<T> Connection<T> {
    /// Convert every node, keeping cursors and page info.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Connection<U> {
        Connection {
            edges: self
                .edges
                .into_iter()
                .map(|edge| Edge {
                    node: f(edge.node),
                    cursor: edge.cursor,
                })
                .collect(),
            page_info: self.page_info,
            total_count: self.total_count,
        }
    }
}

pub struct PaginationEngine {
    codec: SymmetricCodec,
}

impl PaginationEngine {
    pub fn new(codec: SymmetricCodec) -> Self {
        Self { codec }
    }

    /// Validate a page request and decode its cursor.
    pub fn window(&self, args: &PageArgs) -> Result<PageWindow> {
        // Empty cursors are treated as absent.
        let after = args.after.as_deref().filter(|c| !c.is_empty());
        let before = args.before.as_deref().filter(|c| !c.is_empty());

        let (direction, size, cursor) = match (args.first, args.last) {
            (Some(_), Some(_)) => {
                return Err(Error::validation("Cannot page with both `first` and `last`"))
            }
            (None, None) => return Err(Error::validation("One of `first` or `last` is required")),
            _ if after.is_some() && before.is_some() => {
                return Err(Error::validation(
                    "Cannot page with both `after` and `before`",
                ))
            }
            (Some(_), None) if before.is_some() => {
                return Err(Error::validation("`before` can only be used with `last`"))
            }
            (None, Some(_)) if after.is_some() => {
                return Err(Error::validation("`after` can only be used with `first`"))
            }
            (Some(first), None) => (Direction::Forward, first, after),
            (None, Some(last)) => (Direction::Backward, last, before),
        };
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(Error::validation(format!(
                "Page size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let cursor = cursor.map(|c| self.decode_cursor(c)).transpose()?;
        Ok(PageWindow {
            direction,
            size,
            cursor,
        })
    }

    pub fn encode_cursor(&self, id: RowId) -> String {
        self.codec.encrypt(&id.to_string())
    }

    pub fn decode_cursor(&self, cursor: &str) -> Result<RowId> {
        let plain = self.codec.decrypt(cursor)?;
        plain
            .parse()
            .map_err(|_| Error::Format(FormatError::Encoding))
    }

    /// Turn fetched rows into a page. `rows` must be in the order the window's
    /// query returns them, including the extra lookahead row if there was one.
    pub fn connection<T: Keyed>(
        &self,
        window: &PageWindow,
        mut rows: Vec<T>,
        total_count: u64,
    ) -> Connection<T> {
        let has_more = rows.len() as u64 > window.size;
        rows.truncate(window.size as usize);
        if window.direction == Direction::Backward {
            rows.reverse();
        }
        let (has_next_page, has_previous_page) = match window.direction {
            Direction::Forward => (has_more, window.cursor.is_some()),
            Direction::Backward => (window.cursor.is_some(), has_more),
        };

        let edges: Vec<Edge<T>> = rows
            .into_iter()
            .map(|node| Edge {
                cursor: self.encode_cursor(node.row_id()),
                node,
            })
            .collect();
        let page_info = PageInfo {
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
            has_next_page,
            has_previous_page,
        };
        Connection {
            edges,
            page_info,
            total_count,
        }
    }

    /// Fetch one page of the rows matching `filter`.
    ///
    /// The request is validated before any query runs.
    pub async fn paginate<T>(
        &self,
        coll: &Coll<T>,
        filter: Document,
        args: &PageArgs,
    ) -> Result<Connection<T>>
    where
        T: Keyed + MongoCollection + DeserializeOwned + Unpin + Send + Sync,
    {
        let window = self.window(args)?;
        let total_count = coll.count_documents(filter.clone(), None).await?;
        let rows: Vec<T> = coll
            .find(
                window.filter(filter, T::KEY_FIELD),
                window.find_options(T::KEY_FIELD),
            )
            .await?
            .try_collect()
            .await?;
        Ok(self.connection(&window, rows, total_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;

    use crate::model::mongodb::VoteId;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(u64);

    impl Keyed for Row {
        const KEY_FIELD: &'static str = "_id";

        fn row_id(&self) -> RowId {
            RowId(self.0)
        }
    }

    fn engine() -> PaginationEngine {
        PaginationEngine::new(SymmetricCodec::example())
    }

    /// Run the window's query against rows 1..=n, as the database would.
    fn fetch(window: &PageWindow, n: u64) -> Vec<Row> {
        let mut rows: Vec<Row> = (1..=n)
            .filter(|id| match (window.direction, window.cursor) {
                (_, None) => true,
                (Direction::Forward, Some(c)) => *id > c.0,
                (Direction::Backward, Some(c)) => *id < c.0,
            })
            .map(Row)
            .collect();
        if window.direction == Direction::Backward {
            rows.reverse();
        }
        rows.truncate(window.size as usize + 1);
        rows
    }

    fn page(args: PageArgs, n: u64) -> Connection<Row> {
        let engine = engine();
        let window = engine.window(&args).unwrap();
        engine.connection(&window, fetch(&window, n), n)
    }

    fn ids(connection: &Connection<Row>) -> Vec<u64> {
        connection.edges.iter().map(|e| e.node.0).collect()
    }

    #[test]
    fn forward_first_page() {
        let connection = page(
            PageArgs {
                first: Some(2),
                ..Default::default()
            },
            5,
        );
        assert_eq!(ids(&connection), vec![1, 2]);
        assert!(connection.page_info.has_next_page);
        assert!(!connection.page_info.has_previous_page);
        assert_eq!(connection.total_count, 5);
    }

    #[test]
    fn forward_after_cursor() {
        let first = page(
            PageArgs {
                first: Some(2),
                ..Default::default()
            },
            5,
        );
        let connection = page(
            PageArgs {
                first: Some(2),
                after: first.page_info.end_cursor.clone(),
                ..Default::default()
            },
            5,
        );
        assert_eq!(ids(&connection), vec![3, 4]);
        assert!(connection.page_info.has_next_page);
        assert!(connection.page_info.has_previous_page);

        let last = page(
            PageArgs {
                first: Some(2),
                after: connection.page_info.end_cursor.clone(),
                ..Default::default()
            },
            5,
        );
        assert_eq!(ids(&last), vec![5]);
        assert!(!last.page_info.has_next_page);
    }

    #[test]
    fn backward_last_page() {
        let connection = page(
            PageArgs {
                last: Some(2),
                ..Default::default()
            },
            5,
        );
        assert_eq!(ids(&connection), vec![4, 5]);
        assert!(connection.page_info.has_previous_page);
        assert!(!connection.page_info.has_next_page);

        let earlier = page(
            PageArgs {
                last: Some(2),
                before: connection.page_info.start_cursor.clone(),
                ..Default::default()
            },
            5,
        );
        assert_eq!(ids(&earlier), vec![2, 3]);
        assert!(earlier.page_info.has_next_page);
        assert!(earlier.page_info.has_previous_page);
    }

    #[test]
    fn cursors_match_edges() {
        let engine = engine();
        let connection = page(
            PageArgs {
                first: Some(3),
                ..Default::default()
            },
            3,
        );
        for edge in &connection.edges {
            assert_eq!(engine.decode_cursor(&edge.cursor).unwrap(), RowId(edge.node.0));
        }
        assert_eq!(
            connection.page_info.start_cursor.as_deref(),
            Some(connection.edges[0].cursor.as_str())
        );
        assert!(!connection.page_info.has_next_page);
    }

    #[test]
    fn empty_page() {
        let connection = page(
            PageArgs {
                first: Some(2),
                ..Default::default()
            },
            0,
        );
        assert!(connection.edges.is_empty());
        assert_eq!(connection.page_info.start_cursor, None);
        assert_eq!(connection.page_info.end_cursor, None);
    }

    #[test]
    fn invalid_requests() {
        let engine = engine();
        let cursor = engine.encode_cursor(RowId(1));
        let invalid = [
            PageArgs {
                first: Some(2),
                last: Some(2),
                ..Default::default()
            },
            PageArgs::default(),
            PageArgs {
                first: Some(2),
                after: Some(cursor.clone()),
                before: Some(cursor.clone()),
                ..Default::default()
            },
            PageArgs {
                last: Some(2),
                after: Some(cursor.clone()),
                ..Default::default()
            },
            PageArgs {
                first: Some(0),
                ..Default::default()
            },
            PageArgs {
                first: Some(MAX_PAGE_SIZE + 1),
                ..Default::default()
            },
        ];
        for args in invalid {
            let err = engine.window(&args).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{args:?}");
        }
    }

    #[test]
    fn bad_cursors_are_format_errors() {
        let engine = engine();
        for cursor in ["%%%", "AAAA", "bm90LWEtbnVtYmVy"] {
            let err = engine
                .window(&PageArgs {
                    first: Some(1),
                    after: Some(cursor.into()),
                    ..Default::default()
                })
                .unwrap_err();
            assert!(matches!(err, Error::Format(_)), "{cursor}");
        }

        // A validly encrypted cursor that is not a row ID.
        let not_a_number = SymmetricCodec::example().encrypt("abc");
        let err = engine.decode_cursor(&not_a_number).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn empty_cursor_means_absent() {
        let window = engine()
            .window(&PageArgs {
                first: Some(1),
                after: Some(String::new()),
                before: Some(String::new()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(window.cursor, None);
    }

    #[test]
    fn window_query_shape() {
        let window = PageWindow {
            direction: Direction::Backward,
            size: 3,
            cursor: Some(RowId(9)),
        };
        let filter = window.filter(doc! { "vote_id": "v" }, "_id");
        assert_eq!(filter, doc! { "vote_id": "v", "_id": { "$lt": 9_i64 } });
        let options = window.find_options("_id");
        assert_eq!(options.limit, Some(4));
        assert_eq!(options.sort, Some(doc! { "_id": -1 }));
    }

    #[backend_test]
    async fn paginate_questions(questions: Coll<Question>) {
        let vote_id = VoteId::new();
        let start = chrono::Utc::now();
        for i in 1..=5_u64 {
            let mut question = Question::new(RowId(i), vote_id, format!("Q{i}"), String::new());
            question.created_at = start + Duration::seconds(i as i64);
            questions.insert_one(question, None).await.unwrap();
        }
        // A question in another vote must not appear.
        questions
            .insert_one(
                Question::new(RowId(6), VoteId::new(), "Other".into(), String::new()),
                None,
            )
            .await
            .unwrap();

        let engine = engine();
        let filter = doc! { "vote_id": vote_id };
        let first = engine
            .paginate(
                &questions,
                filter.clone(),
                &PageArgs {
                    first: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let titles: Vec<_> = first.edges.iter().map(|e| e.node.title.clone()).collect();
        assert_eq!(titles, vec!["Q1", "Q2"]);
        assert_eq!(first.total_count, 5);
        assert!(first.page_info.has_next_page);

        let last = engine
            .paginate(
                &questions,
                filter,
                &PageArgs {
                    last: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let titles: Vec<_> = last.edges.iter().map(|e| e.node.title.clone()).collect();
        assert_eq!(titles, vec!["Q4", "Q5"]);
        assert!(last.page_info.has_previous_page);
        assert!(!last.page_info.has_next_page);
    }

    #[backend_test]
    async fn late_stamps_are_not_skipped(questions: Coll<Question>) {
        // Row 1 reserved its key first but was stamped last.
        let vote_id = VoteId::new();
        let start = chrono::Utc::now();
        for (row, offset) in [(1_u64, 30_i64), (2, 10), (3, 20)] {
            let mut question = Question::new(RowId(row), vote_id, format!("Q{row}"), String::new());
            question.created_at = start + Duration::seconds(offset);
            questions.insert_one(question, None).await.unwrap();
        }

        let engine = engine();
        let mut seen = Vec::new();
        let mut after = None;
        loop {
            let page = engine
                .paginate(
                    &questions,
                    doc! { "vote_id": vote_id },
                    &PageArgs {
                        first: Some(1),
                        after: after.clone(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            seen.extend(page.edges.iter().map(|e| e.node.id.0));
            if !page.page_info.has_next_page {
                break;
            }
            after = page.page_info.end_cursor;
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
