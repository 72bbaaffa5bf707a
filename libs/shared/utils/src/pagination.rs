pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Page window after clamping: `page >= 1`, `1 <= page_size <= 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn clamp(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = match page {
            Some(p) if p >= 1 => p.min(u32::MAX as i64) as u32,
            _ => DEFAULT_PAGE,
        };
        let page_size = match page_size {
            Some(s) if s < 1 => DEFAULT_PAGE_SIZE,
            Some(s) if s > MAX_PAGE_SIZE as i64 => MAX_PAGE_SIZE,
            Some(s) => s as u32,
            None => DEFAULT_PAGE_SIZE,
        };
        Self { page, page_size }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    pub fn limit(&self) -> u64 {
        self.page_size as u64
    }
}
