use serde::Serialize;
use uuid::Uuid;

use super::enums::AppointmentStatus;

#[derive(Debug, Default, Clone)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Default, Clone)]
pub struct BedFilter {
    pub is_available: Option<bool>,
    pub ward: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct InvoiceFilter {
    /// Case-insensitive substring of the invoice number.
    pub search: Option<String>,
}

/// Largest page a list request may ask for.
pub const MAX_PAGE_SIZE: u32 = 100;

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Build from raw query values. Missing, non-numeric or non-positive
    /// values fall back to page 1 and `default_limit`; the limit is capped
    /// at [`MAX_PAGE_SIZE`].
    pub fn from_query(page: Option<&str>, limit: Option<&str>, default_limit: u32) -> Self {
        let positive = |raw: Option<&str>| {
            raw.and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|v| *v > 0)
        };
        Self {
            page: positive(page).unwrap_or(1),
            limit: positive(limit)
                .unwrap_or(default_limit)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Rows to skip. Saturates, so a page far past the end reads nothing.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)).saturating_mul(i64::from(self.limit))
    }
}

/// Pagination metadata attached to every list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_pages: u64,
    pub current_page: u32,
    pub previous_page: Option<u32>,
    pub next_page: Option<u32>,
}

impl Pagination {
    pub fn new(total: u64, request: PageRequest) -> Self {
        let limit = u64::from(request.limit.max(1));
        let page = request.page.max(1);
        Self {
            total_pages: total.div_ceil(limit),
            current_page: page,
            previous_page: (page > 1).then(|| page - 1),
            next_page: (u64::from(page) * limit < total).then(|| page + 1),
        }
    }
}

/// One page of results with the total matching count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub request: PageRequest,
}

impl<T> Page<T> {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.total, self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_falls_back_on_garbage() {
        let req = PageRequest::from_query(Some("abc"), Some("0"), 10);
        assert_eq!(req, PageRequest { page: 1, limit: 10 });
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn offset_skips_previous_pages() {
        let req = PageRequest::from_query(Some("3"), Some("5"), 10);
        assert_eq!(req.offset(), 10);
    }

    #[test]
    fn limit_is_capped() {
        let req = PageRequest::from_query(None, Some("5000"), 10);
        assert_eq!(req.limit, MAX_PAGE_SIZE);
        let req = PageRequest::from_query(None, None, 500);
        assert_eq!(req.limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn huge_page_offset_does_not_overflow() {
        let req = PageRequest::from_query(Some("4294967295"), Some("4294967295"), 10);
        assert_eq!(req, PageRequest { page: u32::MAX, limit: MAX_PAGE_SIZE });
        assert_eq!(req.offset(), i64::from(u32::MAX - 1) * i64::from(MAX_PAGE_SIZE));

        let unclamped = PageRequest { page: u32::MAX, limit: u32::MAX };
        assert!(unclamped.offset() > 0);

        let p = Pagination::new(3, req);
        assert_eq!(p.current_page, u32::MAX);
        assert_eq!(p.next_page, None);
    }

    #[test]
    fn first_page_has_no_previous() {
        let p = Pagination::new(25, PageRequest { page: 1, limit: 10 });
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.previous_page, None);
        assert_eq!(p.next_page, Some(2));
    }

    #[test]
    fn last_page_has_no_next() {
        let p = Pagination::new(25, PageRequest { page: 3, limit: 10 });
        assert_eq!(p.previous_page, Some(2));
        assert_eq!(p.next_page, None);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let p = Pagination::new(0, PageRequest { page: 1, limit: 10 });
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.next_page, None);
    }

    #[test]
    fn exact_multiple_has_no_trailing_page() {
        let p = Pagination::new(20, PageRequest { page: 2, limit: 10 });
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.next_page, None);
    }
}
