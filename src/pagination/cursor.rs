//! Cursor (keyset) pagination
//!
//! The cursor carries the sort-key values of the last row handed out plus
//! the directions of the sort it was produced under. The next page is the
//! set of rows strictly after that key in the sort order, so rows inserted
//! between requests never shift the page boundaries.
//!
//! Sort fields used with cursors should be immutable. A fan-out path (one
//! crossing an eager-loaded association) is ordered and sought by its first
//! value. The identifier is appended as the final tiebreaker when the sort
//! lacks it.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::query::{Direction, Filter, Query, Sort, sort_key};
use crate::storage::Transaction;

/// Cursor pagination request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorConfig {
    pub limit: u64,
    /// Opaque cursor from a previous page, `None` for the first page
    pub cursor: Option<String>,
}

impl CursorConfig {
    pub fn first(limit: u64) -> Self {
        Self {
            limit,
            cursor: None,
        }
    }

    pub fn after(limit: u64, cursor: impl Into<String>) -> Self {
        Self {
            limit,
            cursor: Some(cursor.into()),
        }
    }
}

/// One slice of a cursor-paginated result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    /// Cursor for the following page, `None` once the result is exhausted
    pub next_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> CursorPage<U> {
        CursorPage {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }

    pub fn try_map<U>(self, f: impl FnMut(T) -> Result<U>) -> Result<CursorPage<U>> {
        Ok(CursorPage {
            items: self.items.into_iter().map(f).collect::<Result<_>>()?,
            next_cursor: self.next_cursor,
        })
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Token {
    keys: Vec<Value>,
    directions: Vec<Direction>,
}

impl Token {
    fn encode(&self) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?))
    }

    fn decode(raw: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw.trim())
            .map_err(|e| Error::validation(format!("malformed cursor: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::validation(format!("malformed cursor: {}", e)))
    }
}

/// Sort clauses of `query` with the identifier tiebreaker appended
fn total_order<E: Entity>(query: &Query<E>) -> Vec<Sort> {
    let mut sorts = query.sorts().to_vec();
    if !sorts.iter().any(|s| s.field == E::ID_FIELD) {
        sorts.push(Sort::asc(E::ID_FIELD));
    }
    sorts
}

/// Rows strictly after `keys` under `sorts`
///
/// `(a, b) > (x, y)` expands to `a > x OR (a = x AND b > y)`, with `>`
/// flipped to `<` for descending clauses. Comparisons go through the row's
/// sort key so the seek agrees with the order rows were fetched in.
fn seek(sorts: &[Sort], keys: &[Value]) -> Filter {
    let mut branches = Vec::with_capacity(sorts.len());
    for (i, sort) in sorts.iter().enumerate() {
        let equal_prefix = sorts[..i]
            .iter()
            .zip(keys)
            .map(|(s, key)| Filter::key_eq(s.field.clone(), key.clone()))
            .fold(Filter::True, Filter::and);
        let step = match sort.direction {
            Direction::Asc => Filter::key_gt(sort.field.clone(), keys[i].clone()),
            Direction::Desc => Filter::key_lt(sort.field.clone(), keys[i].clone()),
        };
        branches.push(equal_prefix.and(step));
    }
    Filter::Or(branches)
}

/// Sorting by an eager-loaded path only works when the entity carries the
/// association, otherwise the cursor would record null for it
fn require_embedded<E: Entity>(query: &Query<E>, sorts: &[Sort], row: &Value) -> Result<()> {
    for sort in sorts {
        let head = sort.field.split('.').next().unwrap_or_default();
        let eager = query.eager_loads().iter().any(|e| e.name == head);
        if eager && row.get(head).is_none() {
            return Err(Error::validation(format!(
                "cursor sort on `{}` needs `{}` to carry the `{}` association",
                sort.field,
                E::SCHEMA,
                head
            )));
        }
    }
    Ok(())
}

/// Next slice of `query` after the position encoded in `config.cursor`
pub async fn paginate_cursor<E: Entity, X: Transaction>(
    tx: &mut X,
    query: &Query<E>,
    config: &CursorConfig,
) -> Result<CursorPage<E>> {
    let limit = config.limit.max(1);
    let sorts = total_order(query);
    let directions: Vec<Direction> = sorts.iter().map(|s| s.direction).collect();

    let mut window = query.unbounded();
    if !query.sorts().iter().any(|s| s.field == E::ID_FIELD) {
        window = window.sort(Sort::asc(E::ID_FIELD));
    }
    if let Some(raw) = &config.cursor {
        let token = Token::decode(raw)?;
        if token.directions != directions || token.keys.len() != sorts.len() {
            return Err(Error::validation(
                "cursor does not belong to the requested sort order",
            ));
        }
        window = window.filter(seek(&sorts, &token.keys));
    }

    let mut items = tx.fetch(&window.limit(limit.saturating_add(1))).await?;
    let next_cursor = if items.len() as u64 > limit {
        items.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        match items.last() {
            Some(last) => {
                let row = serde_json::to_value(last)?;
                require_embedded(query, &sorts, &row)?;
                let token = Token {
                    keys: sorts.iter().map(|s| sort_key(&row, &s.field)).collect(),
                    directions,
                };
                Some(token.encode()?)
            }
            None => None,
        }
    } else {
        None
    };

    tracing::trace!(
        schema = E::SCHEMA,
        returned = items.len(),
        more = next_cursor.is_some(),
        "cursor page fetched"
    );
    Ok(CursorPage { items, next_cursor })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::query::EagerLoad;
    use crate::storage::{Database, MemoryDatabase};

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Item {
        id: Option<i64>,
        rank: i64,
    }

    impl Entity for Item {
        type Id = i64;
        const SCHEMA: &'static str = "items";

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    async fn seeded(ranks: &[i64]) -> MemoryDatabase {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        for &rank in ranks {
            tx.save(&mut Item { id: None, rank }).await.unwrap();
        }
        tx.commit().await.unwrap();
        db
    }

    async fn drain(db: &MemoryDatabase, query: &Query<Item>, limit: u64) -> Vec<i64> {
        let mut tx = db.begin().await.unwrap();
        let mut seen = Vec::new();
        let mut config = CursorConfig::first(limit);
        loop {
            let page = paginate_cursor(&mut tx, query, &config).await.unwrap();
            seen.extend(page.items.iter().map(|i| i.id.unwrap()));
            match page.next_cursor {
                Some(cursor) => config = CursorConfig::after(limit, cursor),
                None => break,
            }
        }
        seen
    }

    #[tokio::test]
    async fn test_pages_are_exhaustive_with_duplicate_sort_keys() {
        let db = seeded(&[3, 1, 3, 2, 1, 3, 2]).await;
        let query = Query::<Item>::new().sort(Sort::desc("rank"));

        let expected = drain(&db, &query, 100).await;
        assert_eq!(expected, vec![1, 3, 6, 4, 7, 2, 5]);

        for limit in 1..=7 {
            assert_eq!(drain(&db, &query, limit).await, expected, "limit {}", limit);
        }
    }

    #[tokio::test]
    async fn test_insert_between_pages_does_not_shift() {
        let db = seeded(&[10, 20, 30, 40]).await;
        let query = Query::<Item>::new().sort(Sort::asc("rank"));

        let mut tx = db.begin().await.unwrap();
        let first = paginate_cursor(&mut tx, &query, &CursorConfig::first(2))
            .await
            .unwrap();
        tx.save(&mut Item { id: None, rank: 5 }).await.unwrap();

        let cursor = first.next_cursor.unwrap();
        let second = paginate_cursor(&mut tx, &query, &CursorConfig::after(2, cursor))
            .await
            .unwrap();
        let ranks: Vec<i64> = second.items.iter().map(|i| i.rank).collect();
        assert_eq!(ranks, vec![30, 40]);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_cursor_from_other_sort_is_rejected() {
        let db = seeded(&[1, 2, 3]).await;
        let mut tx = db.begin().await.unwrap();
        let asc = Query::<Item>::new().sort(Sort::asc("rank"));
        let page = paginate_cursor(&mut tx, &asc, &CursorConfig::first(1))
            .await
            .unwrap();

        let desc = Query::<Item>::new().sort(Sort::desc("rank"));
        let config = CursorConfig::after(1, page.next_cursor.unwrap());
        let err = paginate_cursor(&mut tx, &desc, &config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let garbage = CursorConfig::after(1, "not a cursor!");
        let err = paginate_cursor(&mut tx, &asc, &garbage).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct Crew {
        id: Option<i64>,
        #[serde(default)]
        members: Vec<Member>,
    }

    impl Entity for Crew {
        type Id = i64;
        const SCHEMA: &'static str = "crews";
        const ASSOCIATIONS: &'static [&'static str] = &["members"];

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
    struct Member {
        id: Option<i64>,
        crew_id: Option<i64>,
        name: String,
    }

    impl Entity for Member {
        type Id = i64;
        const SCHEMA: &'static str = "members";

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    #[tokio::test]
    async fn test_pages_advance_over_eager_loaded_sort_path() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        for (crew, names) in [(1, &["Sun", "Zeta"][..]), (2, &["Tau"][..]), (3, &[][..])] {
            tx.save(&mut Crew::default()).await.unwrap();
            for name in names {
                tx.save(&mut Member {
                    crew_id: Some(crew),
                    name: name.to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
            }
        }

        let query = Query::<Crew>::new()
            .with(EagerLoad::children::<Crew, Member>("members", "crew_id"))
            .sort(Sort::asc("members.name"));
        let mut seen = Vec::new();
        let mut config = CursorConfig::first(1);
        for _ in 0..10 {
            let page = paginate_cursor(&mut tx, &query, &config).await.unwrap();
            seen.extend(page.items.iter().map(|c| c.id.unwrap()));
            match page.next_cursor {
                Some(cursor) => config = CursorConfig::after(1, cursor),
                None => break,
            }
        }
        // a crew without members orders as null, ahead of "Sun" and "Tau"
        assert_eq!(seen, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_eager_sort_without_association_field_is_rejected() {
        let db = seeded(&[1, 2]).await;
        let mut tx = db.begin().await.unwrap();
        let query = Query::<Item>::new()
            .with(EagerLoad::children::<Item, Item>("peers", "rank"))
            .sort(Sort::asc("peers.rank"));
        let err = paginate_cursor(&mut tx, &query, &CursorConfig::first(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_unbounded_limit_returns_everything() {
        let db = seeded(&[4, 5, 6]).await;
        let mut tx = db.begin().await.unwrap();
        let page = paginate_cursor(&mut tx, &Query::<Item>::new(), &CursorConfig::first(u64::MAX))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_empty_result() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let page = paginate_cursor(&mut tx, &Query::<Item>::new(), &CursorConfig::first(5))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }
}
