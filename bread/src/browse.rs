//! Browse pipeline: search, order, paginate, render cells.

use serde::Serialize;
use thiserror::Error as ThisError;
use tracing::debug;

use crate::core::ordering::{Direction, OrderKey, build_order, compile_order, parse_order_param};
use crate::core::pagination::{PAGE_PARAM, Page, PageError, PageLinks, Paginator, page_links, url_with_param};
use crate::core::resolve::display_value;
use crate::core::search::SearchPlan;
use crate::error::{BadRequest, ResolveError, StorageError};
use crate::scaffold::{Bread, ViewKind};
use crate::store::{MemoryStore, QuerySet};

pub const SEARCH_PARAM: &str = "q";
pub const ORDER_PARAM: &str = "o";

///
/// BrowseError
///
#[derive(Debug, ThisError)]
pub enum BrowseError {
    #[error(transparent)]
    BadRequest(#[from] BadRequest),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnHeader {
    pub index: usize,
    pub label: String,
    pub sortable: bool,
    /// Direction when this column is the primary sort key.
    pub direction: Option<Direction>,
    /// Link sorting on this column, flipping direction if it is already primary.
    pub sort_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowseRow {
    pub id: i64,
    pub cells: Vec<String>,
    pub read_url: Option<String>,
    pub edit_url: Option<String>,
    pub delete_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BrowsePage {
    pub q: String,
    pub o: String,
    pub has_search: bool,
    pub columns: Vec<ColumnHeader>,
    pub valid_sorting_columns: Vec<usize>,
    pub order: Vec<OrderKey>,
    pub distinct: bool,
    pub rows: Vec<BrowseRow>,
    pub count: usize,
    pub page: Page,
    pub is_paginated: bool,
    #[serde(flatten)]
    pub links: PageLinks,
}

/// First value of `name` among the query parameters.
pub fn query_param<'q>(query: &'q [(String, String)], name: &str) -> Option<&'q str> {
    query
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Search plan for the `q` parameter; empty when the bread has no search fields.
pub fn search_plan(bread: &Bread, q: &str) -> SearchPlan {
    if bread.search().is_empty() {
        return SearchPlan::default();
    }
    bread.search().build(q)
}

/// Ordering for the `o` parameter, or the default ordering when it is absent.
pub fn order_for(
    bread: &Bread,
    store: &MemoryStore,
    o: &str,
) -> Result<Vec<OrderKey>, BadRequest> {
    if o.is_empty() {
        return Ok(bread.ordering().iter().map(|entry| OrderKey::parse(entry)).collect());
    }
    let keys = build_order(bread.columns(), bread.sortable(), o, bread.ordering())?;
    compile_order(store, bread.model(), &keys)?;
    Ok(keys)
}

pub fn browse(
    bread: &Bread,
    store: &MemoryStore,
    path: &str,
    query: &[(String, String)],
) -> Result<BrowsePage, BrowseError> {
    let q = query_param(query, SEARCH_PARAM).unwrap_or_default().to_string();
    let o = query_param(query, ORDER_PARAM).unwrap_or_default().to_string();

    let plan = search_plan(bread, &q);
    let order = order_for(bread, store, &o)?;
    let distinct = plan.distinct;
    let records = store.execute(&QuerySet {
        model: bread.model().to_string(),
        search: plan.predicate,
        distinct,
        order: order.clone(),
    })?;

    let paginator = Paginator::new(bread.paginate_by(), records.len());
    let page = paginator.page(query_param(query, PAGE_PARAM))?;
    let is_paginated = bread.paginate_by().is_some() && page.num_pages > 1;
    let links = if is_paginated {
        page_links(path, query, &page)
    } else {
        PageLinks::default()
    };

    let mut rows = Vec::with_capacity(page.end - page.start);
    for record in &records[page.start..page.end] {
        let cells = bread
            .columns()
            .iter()
            .map(|column| display_value(record, &column.field))
            .collect::<Result<Vec<_>, _>>()?;
        let id = record.id();
        rows.push(BrowseRow {
            id,
            cells,
            read_url: bread.url(ViewKind::Read, Some(id)),
            edit_url: bread.url(ViewKind::Edit, Some(id)),
            delete_url: bread.url(ViewKind::Delete, Some(id)),
        });
    }
    debug!(
        model = bread.model(),
        q = %q,
        o = %o,
        matched = records.len(),
        page = page.number,
        "browse"
    );

    Ok(BrowsePage {
        has_search: !bread.search().is_empty(),
        columns: headers(bread, path, query, &order, &o),
        valid_sorting_columns: bread.sortable().indices().to_vec(),
        q,
        o,
        order,
        distinct,
        count: records.len(),
        rows,
        page,
        is_paginated,
        links,
    })
}

fn headers(
    bread: &Bread,
    path: &str,
    query: &[(String, String)],
    order: &[OrderKey],
    o: &str,
) -> Vec<ColumnHeader> {
    let primary = parse_order_param(o)
        .ok()
        .and_then(|tokens| tokens.first().copied())
        .and_then(|(direction, idx)| usize::try_from(idx).ok().map(|idx| (idx, direction)))
        .filter(|_| !order.is_empty());
    let base: Vec<(String, String)> = query
        .iter()
        .filter(|(key, _)| key != PAGE_PARAM)
        .cloned()
        .collect();

    bread
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let sortable = bread.sortable().contains(index as i64);
            let direction = primary
                .filter(|(idx, _)| *idx == index)
                .map(|(_, direction)| direction);
            let next = match direction {
                Some(Direction::Asc) => format!("-{index}"),
                _ => index.to_string(),
            };
            ColumnHeader {
                index,
                label: column.label.clone(),
                sortable,
                direction,
                sort_url: sortable.then(|| url_with_param(path, &base, ORDER_PARAM, &next)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::columns::Column;
    use crate::scaffold::BreadConfig;
    use crate::test_support::{fields, seeded_store, test_schema};

    fn store() -> MemoryStore {
        let schema = test_schema();
        let mut store = seeded_store(&schema);
        for (name, age) in [("Joe", 30_i64), ("Ann", 30), ("Bob", 25), ("Cat", 41), ("Dan", 19)] {
            store
                .insert("BreadTestModel", fields(&[("name", name.into()), ("age", age.into())]))
                .expect("insert");
        }
        store
    }

    fn bread(store: &MemoryStore, paginate_by: Option<usize>) -> Bread {
        let config = BreadConfig {
            plural_name: Some("testmodels".into()),
            columns: vec![
                Column::new("Name", "name"),
                Column::new("Text", "other__text"),
                Column::new("Age", "age"),
                Column::new("Method", "other__get_text"),
            ],
            search_fields: vec!["name".into(), "other__text".into()],
            paginate_by,
            ordering: Some(vec!["name".into(), "-age".into()]),
            ..BreadConfig::new("BreadTestModel")
        };
        Bread::new(store.schema(), config, store).expect("bread")
    }

    fn query(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn first_cells(page: &BrowsePage) -> Vec<&str> {
        page.rows.iter().map(|row| row.cells[0].as_str()).collect()
    }

    #[test]
    fn default_ordering_applies_without_o() {
        let store = store();
        let page = browse(&bread(&store, None), &store, "/testmodels/", &[]).expect("browse");
        assert_eq!(
            first_cells(&page),
            ["Ann", "Bob", "Cat", "Dan", "Joe", "Rudy Vallee"]
        );
        assert!(!page.is_paginated);
        assert_eq!(page.valid_sorting_columns, [0, 1, 2]);
    }

    #[test]
    fn o_sorts_with_default_tie_breaks() {
        let store = store();
        let bread = bread(&store, None);
        let page = browse(&bread, &store, "/testmodels/", &query(&[("o", "-2")])).expect("browse");
        assert_eq!(
            first_cells(&page),
            ["Rudy Vallee", "Cat", "Ann", "Joe", "Bob", "Dan"]
        );
        assert_eq!(
            page.order,
            vec![OrderKey::desc("age"), OrderKey::asc("name")]
        );
        assert_eq!(page.columns[2].direction, Some(Direction::Desc));
        assert_eq!(page.columns[2].sort_url.as_deref(), Some("/testmodels/?o=2"));
        assert_eq!(page.columns[3].sort_url, None);
    }

    #[test]
    fn bad_o_is_a_bad_request() {
        let store = store();
        let bread = bread(&store, None);
        for o in ["x", "3", "0,-9"] {
            let err = browse(&bread, &store, "/testmodels/", &query(&[("o", o)])).expect_err(o);
            assert!(matches!(err, BrowseError::BadRequest(_)), "{o}");
        }
    }

    #[test]
    fn search_filters_rows() {
        let store = store();
        let bread = bread(&store, None);
        let page = browse(&bread, &store, "/testmodels/", &query(&[("q", "rhino")])).expect("browse");
        assert_eq!(first_cells(&page), ["Rudy Vallee"]);
        assert_eq!(page.rows[0].cells[1], "Rhinocerous");
        assert_eq!(page.rows[0].edit_url.as_deref(), Some("/testmodels/1/edit/"));
        assert!(page.has_search);
    }

    #[test]
    fn pages_and_links() {
        let store = store();
        let bread = bread(&store, Some(2));
        let page = browse(
            &bread,
            &store,
            "/testmodels/",
            &query(&[("test", "1"), ("page", "2")]),
        )
        .expect("browse");
        assert_eq!(first_cells(&page), ["Cat", "Dan"]);
        assert!(page.is_paginated);
        assert_eq!(page.links.next_url, None);
        assert_eq!(page.links.last_url.as_deref(), Some("/testmodels/?test=1&page=3"));
        assert_eq!(page.links.first_url.as_deref(), Some("/testmodels/?test=1&page=1"));

        let last = browse(&bread, &store, "/testmodels/", &query(&[("page", "last")])).expect("last");
        assert_eq!(first_cells(&last), ["Joe", "Rudy Vallee"]);

        let err = browse(&bread, &store, "/testmodels/", &query(&[("page", "9")])).expect_err("404");
        assert!(matches!(err, BrowseError::Page(_)));
    }

    #[test]
    fn header_direction_ignores_padding() {
        let store = store();
        let bread = bread(&store, None);
        let page = browse(&bread, &store, "/testmodels/", &query(&[("o", " 2")])).expect("browse");
        assert_eq!(page.columns[2].direction, Some(Direction::Asc));
        assert_eq!(page.columns[2].sort_url.as_deref(), Some("/testmodels/?o=-2"));
        assert_eq!(page.columns[0].direction, None);
    }

    #[test]
    fn browse_survives_deleting_a_linked_row() {
        let mut store = store();
        store.delete("BreadTestModel2", 1).expect("delete");
        let bread = bread(&store, None);
        for params in [vec![], query(&[("q", "rudy")]), query(&[("o", "1")])] {
            let page = browse(&bread, &store, "/testmodels/", &params).expect("browse");
            assert!(page.rows.iter().all(|row| row.cells[0] != "Rudy Vallee"));
        }
        let page = browse(&bread, &store, "/testmodels/", &[]).expect("browse");
        assert_eq!(first_cells(&page), ["Ann", "Bob", "Cat", "Dan", "Joe"]);
    }

    #[test]
    fn blank_cells_for_empty_links() {
        let store = store();
        let page = browse(&bread(&store, None), &store, "/testmodels/", &[]).expect("browse");
        let ann = &page.rows[0];
        assert_eq!(ann.cells, ["Ann", "", "30", ""]);
    }
}
