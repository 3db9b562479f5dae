use crate::{EditSession, RowKey, statics};
use std::ops::Range;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Source,
    KeyAsc,
    KeyDesc,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewFilter {
    /// Case-insensitive substring of the key text.
    pub query: String,
    /// Hide rows whose effective validated flag is set.
    pub hide_validated: bool,
    pub sort: SortOrder,
}

/// Keys of the rows the table shows, in display order.
pub fn visible_keys(session: &EditSession, filter: &ViewFilter) -> Vec<RowKey> {
    let query = filter.query.trim().to_lowercase();
    let validated = &session.schema().validated_field;

    let mut keys: Vec<RowKey> = session
        .source()
        .keys()
        .iter()
        .filter(|k| query.is_empty() || k.text.to_lowercase().contains(&query))
        .filter(|k| !filter.hide_validated || !session.flag(k, validated))
        .cloned()
        .collect();

    match filter.sort {
        SortOrder::Source => {}
        SortOrder::KeyAsc => keys.sort_by_cached_key(|k| (k.text.to_lowercase(), k.occurrence)),
        SortOrder::KeyDesc => {
            keys.sort_by_cached_key(|k| (k.text.to_lowercase(), k.occurrence));
            keys.reverse();
        }
    }
    keys
}

/// Client-side paging over the visible keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(statics::DEFAULT_PAGE_SIZE)
    }
}

impl Pagination {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 0,
            page_size: page_size.max(1),
        }
    }

    pub fn page_count(&self, total: usize) -> usize {
        total.div_ceil(self.page_size).max(1)
    }

    /// Pulls the page back into range after the row count shrank.
    pub fn clamp(&mut self, total: usize) {
        self.page = self.page.min(self.page_count(total) - 1);
    }

    pub fn range(&self, total: usize) -> Range<usize> {
        let page = self.page.min(self.page_count(total) - 1);
        let start = (page * self.page_size).min(total);
        let end = (start + self.page_size).min(total);
        start..end
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        &items[self.range(items.len())]
    }

    pub fn next(&mut self, total: usize) {
        if self.page + 1 < self.page_count(total) {
            self.page += 1;
        }
    }

    pub fn prev(&mut self) {
        self.page = self.page.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{Pagination, SortOrder, ViewFilter, visible_keys};
    use crate::{EditSession, ReviewSchema, RowKey, RowSet, RowValue, statics};

    fn session() -> EditSession {
        let schema = ReviewSchema::default();
        let rows = RowSet::parse_text(
            "[{ original: 'Omega 10049' }, { original: 'simpson chubby', validated: true }, { original: 'AP Shave Co' }]",
            &schema.key_field,
            &schema.rows_field,
        )
        .unwrap();
        EditSession::new(rows, schema)
    }

    #[test]
    fn filter_is_case_insensitive_and_respects_validated() {
        let s = session();
        let filter = ViewFilter {
            query: "SIMPSON".to_string(),
            ..Default::default()
        };
        assert_eq!(visible_keys(&s, &filter), vec![RowKey::new("simpson chubby")]);

        let filter = ViewFilter {
            hide_validated: true,
            ..Default::default()
        };
        assert_eq!(visible_keys(&s, &filter).len(), 2);
    }

    #[test]
    fn sort_orders_by_key_text() {
        let s = session();
        let filter = ViewFilter {
            sort: SortOrder::KeyAsc,
            ..Default::default()
        };
        let keys = visible_keys(&s, &filter);
        assert_eq!(keys[0], RowKey::new("AP Shave Co"));
        assert_eq!(keys[2], RowKey::new("simpson chubby"));

        let filter = ViewFilter {
            sort: SortOrder::KeyDesc,
            ..Default::default()
        };
        assert_eq!(visible_keys(&s, &filter)[0], RowKey::new("simpson chubby"));
    }

    #[test]
    fn edits_follow_rows_through_resorting() {
        let mut s = session();
        let key = RowKey::new("AP Shave Co");
        s.set_field(&key, statics::FIELD_HANDLE, RowValue::from("AP"))
            .unwrap();

        let sorted = visible_keys(
            &s,
            &ViewFilter {
                sort: SortOrder::KeyAsc,
                ..Default::default()
            },
        );
        assert_eq!(
            s.get_field(&sorted[0], statics::FIELD_HANDLE),
            Some(&RowValue::from("AP"))
        );
        assert_eq!(s.get_field(&sorted[1], statics::FIELD_HANDLE), Some(&RowValue::Null));
    }

    #[test]
    fn pagination_slices_and_clamps() {
        let items: Vec<usize> = (0..7).collect();
        let mut p = Pagination::new(3);
        assert_eq!(p.page_count(items.len()), 3);
        assert_eq!(p.slice(&items), &[0, 1, 2]);

        p.next(items.len());
        p.next(items.len());
        p.next(items.len());
        assert_eq!(p.page, 2);
        assert_eq!(p.slice(&items), &[6]);

        p.clamp(4);
        assert_eq!(p.page, 1);
        assert_eq!(p.range(4), 3..4);

        p.prev();
        p.prev();
        assert_eq!(p.page, 0);
        assert_eq!(Pagination::new(0).page_size, 1);
        assert_eq!(p.slice::<usize>(&[]), &[] as &[usize]);
    }
}
