//! Page arithmetic and navigation links for browse listings.

use serde::Serialize;
use thiserror::Error as ThisError;

/// Query parameter carrying the page number.
pub const PAGE_PARAM: &str = "page";

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum PageError {
    #[error("page number '{0}' is not an integer")]
    NotAnInteger(String),
    #[error("page {page} is out of range (1..={num_pages})")]
    OutOfRange { page: i64, num_pages: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    /// `None` puts every item on one page.
    pub per_page: Option<usize>,
    pub count: usize,
}

impl Paginator {
    pub fn new(per_page: Option<usize>, count: usize) -> Self {
        Self { per_page, count }
    }

    /// At least one page, even for an empty listing.
    pub fn num_pages(&self) -> usize {
        match self.per_page {
            Some(per_page) if per_page > 0 => self.count.div_ceil(per_page).max(1),
            _ => 1,
        }
    }

    /// Resolve the raw `page` parameter (`None`, an integer, or `last`).
    pub fn page(&self, raw: Option<&str>) -> Result<Page, PageError> {
        let num_pages = self.num_pages();
        let number = match raw.map(str::trim) {
            None | Some("") => 1,
            Some("last") => num_pages as i64,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| PageError::NotAnInteger(raw.to_string()))?,
        };
        if number < 1 || number as usize > num_pages {
            return Err(PageError::OutOfRange {
                page: number,
                num_pages,
            });
        }
        let number = number as usize;
        let (start, end) = match self.per_page {
            Some(per_page) if per_page > 0 => {
                let start = (number - 1) * per_page;
                (start, (start + per_page).min(self.count))
            }
            _ => (0, self.count),
        };
        Ok(Page {
            number,
            num_pages,
            start,
            end,
        })
    }
}

/// One resolved page: item bounds `start..end` of the full listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub number: usize,
    pub num_pages: usize,
    pub start: usize,
    pub end: usize,
}

impl Page {
    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

/// Navigation links; each keeps the other query parameters unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PageLinks {
    pub first_url: Option<String>,
    pub previous_url: Option<String>,
    pub next_url: Option<String>,
    pub last_url: Option<String>,
}

/// Build page links for `path` with the current query parameters.
///
/// `next_url` is left out when the next page is the last one (the last link
/// covers it), and `previous_url` when the previous page is the first.
pub fn page_links(path: &str, query: &[(String, String)], page: &Page) -> PageLinks {
    let mut links = PageLinks::default();
    if page.has_next() {
        if page.number + 1 != page.num_pages {
            links.next_url = Some(url_with_param(path, query, PAGE_PARAM, &(page.number + 1).to_string()));
        }
        links.last_url = Some(url_with_param(path, query, PAGE_PARAM, &page.num_pages.to_string()));
    }
    if page.has_previous() {
        links.first_url = Some(url_with_param(path, query, PAGE_PARAM, "1"));
        if page.number - 1 != 1 {
            links.previous_url = Some(url_with_param(path, query, PAGE_PARAM, &(page.number - 1).to_string()));
        }
    }
    links
}

/// `path?query` with `key` set to `value`, replacing any existing entries.
pub fn url_with_param(path: &str, query: &[(String, String)], key: &str, value: &str) -> String {
    let mut pairs: Vec<String> = query
        .iter()
        .filter(|(name, _)| name != key)
        .map(|(name, val)| format!("{}={}", urlencoding::encode(name), urlencoding::encode(val)))
        .collect();
    pairs.push(format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)));
    format!("{path}?{}", pairs.join("&"))
}
