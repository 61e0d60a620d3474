//! Fixed-size page windows over an ordered listing.
//!
//! The paginator only does arithmetic on the row count; callers fetch the
//! rows for the window with `LIMIT`/`OFFSET` so a listing costs one count
//! query and one page query.

use std::num::IntErrorKind;

use serde::{Deserialize, Serialize};

/// Records per listing page.
pub const PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    count: u64,
    per_page: u64,
}

impl Paginator {
    pub fn new(count: u64, per_page: u64) -> Self {
        Self {
            count,
            per_page: per_page.max(1),
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// An empty listing still has a single (empty) first page.
    pub fn num_pages(&self) -> u64 {
        if self.count == 0 {
            1
        } else {
            self.count.div_ceil(self.per_page)
        }
    }

    /// Resolves a raw `?page=` value to a valid window.
    ///
    /// Missing or non-numeric input yields the first page; integers outside
    /// `1..=num_pages`, including ones too large for `i64`, yield the last
    /// page.
    pub fn get_page(&self, raw: Option<&str>) -> PageWindow {
        let num_pages = self.num_pages();
        let number = match raw.map(str::trim).map(str::parse::<i64>) {
            Some(Ok(n)) if n >= 1 && (n as u64) <= num_pages => n as u64,
            Some(Ok(_)) => num_pages,
            Some(Err(e))
                if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) =>
            {
                num_pages
            }
            Some(Err(_)) | None => 1,
        };
        PageWindow {
            number,
            num_pages,
            count: self.count,
            per_page: self.per_page,
        }
    }
}

/// A resolved page: which slice of the listing to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub per_page: u64,
}

impl PageWindow {
    pub fn offset(&self) -> u64 {
        (self.number - 1) * self.per_page
    }

    pub fn limit(&self) -> u64 {
        self.per_page
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    /// Attaches the rows fetched for this window.
    pub fn into_page<T>(self, object_list: Vec<T>) -> Page<T> {
        let (start_index, end_index) = if self.count == 0 {
            (0, 0)
        } else {
            let start = self.offset() + 1;
            (start, start + object_list.len() as u64 - 1)
        };
        Page {
            number: self.number,
            num_pages: self.num_pages,
            count: self.count,
            has_next: self.has_next(),
            has_previous: self.has_previous(),
            next_page_number: self.has_next().then(|| self.number + 1),
            previous_page_number: self.has_previous().then(|| self.number - 1),
            start_index,
            end_index,
            object_list,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_page_number: Option<u64>,
    pub previous_page_number: Option<u64>,
    pub start_index: u64,
    pub end_index: u64,
    pub object_list: Vec<T>,
}

impl<T> Page<T> {
    pub fn len(&self) -> usize {
        self.object_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.object_list.is_empty()
    }
}
