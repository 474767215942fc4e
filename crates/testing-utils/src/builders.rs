use chrono::NaiveDate;

use flightcrawl_domain::{RequestCreate, SortOption};

/// The canonical LHR→IST search used throughout the tests.
pub fn sample_request_create() -> RequestCreate {
    RequestCreate {
        dep_port: "LHR".to_string(),
        arr_port: "IST".to_string(),
        dep_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        ret_date: None,
        flex_option: 0,
        sorted_by: SortOption::Price,
        direct: false,
    }
}
