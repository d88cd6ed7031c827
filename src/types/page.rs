/// A 1-based page number as the caller asked for it. Out-of-range values are
/// not errors; they clamp to the nearest page that exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest(i64);

impl PageRequest {
    pub const FIRST: PageRequest = PageRequest(1);

    pub fn new(number: i64) -> Self {
        Self(number)
    }

    /// Query-string form. Missing or non-numeric input means the first page.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<i64>().ok())
            .map(Self)
            .unwrap_or(Self::FIRST)
    }

    /// Clamp against a listing of `total` rows. Returns the page number and
    /// the page count; an empty listing still has one empty page.
    pub fn clamp(&self, total: u64, per_page: u64) -> (u64, u64) {
        let per_page = per_page.max(1);
        let num_pages = total.div_ceil(per_page).max(1);
        let number = if self.0 < 1 {
            1
        } else {
            (self.0 as u64).min(num_pages)
        };
        (number, num_pages)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::FIRST
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total: u64,
    pub per_page: u64,
}

impl<T> Page<T> {
    /// Resolve `request` against `total` rows and fetch the matching slice
    /// with `fetch(limit, offset)`.
    pub fn load<E, F>(request: PageRequest, total: u64, per_page: u64, fetch: F) -> Result<Self, E>
    where
        F: FnOnce(u64, u64) -> Result<Vec<T>, E>,
    {
        let (number, num_pages) = request.clamp(total, per_page);
        let items = if total == 0 {
            Vec::new()
        } else {
            fetch(per_page, (number - 1) * per_page)?
        };
        Ok(Self {
            items,
            number,
            num_pages,
            total,
            per_page,
        })
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}
