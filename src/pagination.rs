use serde::{Deserialize, Serialize};

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}
fn default_page_size() -> i64 {
    10
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PageQuery {
    /// Page and size clamped to their valid ranges.
    pub fn normalized(self) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(self) -> i64 {
        let p = self.normalized();
        (p.page - 1).saturating_mul(p.page_size)
    }

    pub fn limit(self) -> i64 {
        self.normalized().page_size
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub page_count: i64,
    pub page_size: i64,
    pub count: i64,
}

impl Pagination {
    pub fn build(query: PageQuery, count: i64) -> Self {
        let q = query.normalized();
        Self {
            page: q.page,
            page_count: (count + q.page_size - 1) / q.page_size,
            page_size: q.page_size,
            count,
        }
    }
}
