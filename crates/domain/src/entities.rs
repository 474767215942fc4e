use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::Span;

use flightcrawl_core::{CrawlerError, Result};

/// Wire and directory format for dates.
pub const DATE_FMT: &str = "%Y-%m-%d";

/// Flexibility labels keyed by the ±days option (1..=3).
pub fn flex_label(flex_option: i32) -> Option<&'static str> {
    match flex_option {
        1 => Some("flexible-1day"),
        2 => Some("flexible-2days"),
        3 => Some("flexible-3days"),
        _ => None,
    }
}

/// Result ordering requested from the crawl target.
///
/// Accepted on input either by name or by index (0/1/2), matching what
/// producers historically sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOption {
    #[default]
    Bestflight,
    Price,
    Duration,
}

impl SortOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOption::Bestflight => "bestflight",
            SortOption::Price => "price",
            SortOption::Duration => "duration",
        }
    }

    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(SortOption::Bestflight),
            1 => Some(SortOption::Price),
            2 => Some(SortOption::Duration),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        if let Ok(index) = value.parse::<i64>() {
            return Self::from_index(index).ok_or_else(|| {
                CrawlerError::InvalidRequest(format!("unknown sort index: {index}"))
            });
        }

        match value.to_lowercase().as_str() {
            "bestflight" => Ok(SortOption::Bestflight),
            "price" => Ok(SortOption::Price),
            "duration" => Ok(SortOption::Duration),
            _ => Err(CrawlerError::InvalidRequest(format!(
                "sort must be one of bestflight/price/duration or an index 0-2, got: {value}"
            ))),
        }
    }
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SortOption {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SortOption {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Index(i64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Index(index) => SortOption::from_index(index)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown sort index: {index}"))),
            Raw::Name(name) => SortOption::parse(&name).map_err(serde::de::Error::custom),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for SortOption {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl sqlx::Type<sqlx::Sqlite> for SortOption {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for SortOption {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        SortOption::parse(s).map_err(|e| e.to_string().into())
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for SortOption {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        SortOption::parse(s).map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for SortOption {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for SortOption {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// Terminal request outcome. Unset while the request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Failed,
    Finished,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Failed => "failed",
            RequestStatus::Finished => "finished",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "failed" => Ok(RequestStatus::Failed),
            "finished" => Ok(RequestStatus::Finished),
            _ => Err(CrawlerError::InvalidRequest(format!(
                "unknown request status: {value}"
            ))),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Postgres> for RequestStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl sqlx::Type<sqlx::Sqlite> for RequestStatus {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for RequestStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        RequestStatus::parse(s).map_err(|e| e.to_string().into())
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RequestStatus {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        RequestStatus::parse(s).map_err(|e| e.to_string().into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for RequestStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RequestStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// Producer-side search parameters, validated before anything is persisted
/// or queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCreate {
    pub dep_port: String,
    pub arr_port: String,
    pub dep_date: NaiveDate,
    pub ret_date: Option<NaiveDate>,
    #[serde(default)]
    pub flex_option: i32,
    #[serde(default)]
    pub sorted_by: SortOption,
    #[serde(default)]
    pub direct: bool,
}

impl RequestCreate {
    pub fn validate(&self) -> Result<()> {
        for (name, port) in [("dep_port", &self.dep_port), ("arr_port", &self.arr_port)] {
            if port.is_empty() || port.len() > 20 {
                return Err(CrawlerError::InvalidRequest(format!(
                    "{name} must be 1-20 characters of IATA codes, got: {port:?}"
                )));
            }
        }

        if let Some(ret_date) = self.ret_date {
            if ret_date < self.dep_date {
                return Err(CrawlerError::InvalidRequest(format!(
                    "ret_date must be greater than or equal to dep_date: {ret_date} < {}",
                    self.dep_date
                )));
            }
        }

        if !(0..=3).contains(&self.flex_option) {
            return Err(CrawlerError::InvalidRequest(format!(
                "flex_option must be 0-3, got: {}",
                self.flex_option
            )));
        }

        Ok(())
    }

    /// True when a persisted row carries exactly these business fields.
    pub fn matches(&self, request: &Request) -> bool {
        self.dep_port == request.dep_port
            && self.arr_port == request.arr_port
            && self.dep_date == request.dep_date
            && self.ret_date == request.ret_date
            && self.flex_option == request.flex_option
            && self.sorted_by == request.sorted_by
            && self.direct == request.direct
    }

    /// Persisted view of these parameters under the given identity.
    pub fn to_request(&self, id: i64, created_at: DateTime<Utc>) -> Request {
        Request {
            id,
            status: None,
            dep_port: self.dep_port.clone(),
            arr_port: self.arr_port.clone(),
            dep_date: self.dep_date,
            ret_date: self.ret_date,
            flex_option: self.flex_option,
            sorted_by: self.sorted_by,
            direct: self.direct,
            created_at,
        }
    }
}

/// A persisted flight-search request. The identifier is assigned exactly
/// once by the store; everything after creation is status-only mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: i64,
    pub status: Option<RequestStatus>,
    pub dep_port: String,
    pub arr_port: String,
    pub dep_date: NaiveDate,
    pub ret_date: Option<NaiveDate>,
    pub flex_option: i32,
    pub sorted_by: SortOption,
    pub direct: bool,
    pub created_at: DateTime<Utc>,
}

impl Request {
    fn dep_date_str(&self) -> String {
        self.dep_date.format(DATE_FMT).to_string()
    }

    /// Staging directory name:
    /// `<dep>-<arr>-<dep_date>[-<ret_date>]-<sort>[-<flex_label>]-id<N>`.
    pub fn dir_name(&self) -> String {
        let mut params = vec![
            self.dep_port.clone(),
            self.arr_port.clone(),
            self.dep_date_str(),
            self.sorted_by.to_string(),
        ];

        if let Some(ret_date) = self.ret_date {
            params.insert(3, ret_date.format(DATE_FMT).to_string());
        }
        if let Some(label) = flex_label(self.flex_option) {
            params.push(label.to_string());
        }
        params.push(format!("id{}", self.id));

        params.join("-")
    }

    /// Deterministic staging location: `<data_root>/<dep_date>/<dir_name>`.
    pub fn save_path(&self, data_root: &Path) -> PathBuf {
        data_root.join(self.dep_date_str()).join(self.dir_name())
    }

    /// Canonical search path handed to the crawl operation.
    pub fn search_path(&self) -> String {
        let date_str = |date: NaiveDate| {
            let mut s = date.format(DATE_FMT).to_string();
            if let Some(label) = flex_label(self.flex_option) {
                s.push('-');
                s.push_str(label);
            }
            s
        };

        let mut path = format!(
            "{}-{}/{}/",
            self.dep_port,
            self.arr_port,
            date_str(self.dep_date)
        );

        if let Some(ret_date) = self.ret_date {
            path.push_str(&date_str(ret_date));
        }

        path.push_str(&format!("bestflight_a?sort={}_a", self.sorted_by));

        if self.direct {
            path.push_str("&fs=stops=0");
        }

        path
    }

    /// Log scope carrying the request identity.
    pub fn span(&self) -> Span {
        tracing::info_span!("request", id = self.id)
    }
}

/// Recover a request identifier from a staging directory's trailing
/// `id<N>` token.
pub fn id_from_dir(directory: &Path) -> Result<i64> {
    let name = directory
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    name.split('-')
        .next_back()
        .and_then(|token| token.strip_prefix("id"))
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| {
            CrawlerError::InvalidRequest(format!(
                "cannot recover a request id from directory name: {name:?}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: i64) -> Request {
        Request {
            id,
            status: None,
            dep_port: "LHR".to_string(),
            arr_port: "IST".to_string(),
            dep_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            ret_date: None,
            flex_option: 0,
            sorted_by: SortOption::Price,
            direct: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dir_name_one_way() {
        assert_eq!(request(42).dir_name(), "LHR-IST-2025-06-01-price-id42");
    }

    #[test]
    fn dir_name_round_trip_with_flex() {
        let mut req = request(7);
        req.ret_date = NaiveDate::from_ymd_opt(2025, 6, 8);
        req.flex_option = 1;

        assert_eq!(
            req.dir_name(),
            "LHR-IST-2025-06-01-2025-06-08-price-flexible-1day-id7"
        );
    }

    #[test]
    fn save_path_is_deterministic() {
        let root = Path::new("/var/lib/flightcrawl");
        let first = request(42).save_path(root);
        let second = request(42).save_path(root);

        assert_eq!(first, second);
        assert_eq!(
            first,
            root.join("2025-06-01").join("LHR-IST-2025-06-01-price-id42")
        );
    }

    #[test]
    fn id_recovers_from_any_derived_dir_name() {
        for req in [request(1), request(42), {
            let mut r = request(905);
            r.ret_date = NaiveDate::from_ymd_opt(2025, 7, 1);
            r.flex_option = 3;
            r
        }] {
            let path = req.save_path(Path::new("/tmp/data"));
            assert_eq!(id_from_dir(&path).unwrap(), req.id);
        }
    }

    #[test]
    fn id_from_unrelated_dir_fails() {
        assert!(id_from_dir(Path::new("/tmp/not-a-job-dir")).is_err());
    }

    #[test]
    fn search_path_one_way() {
        assert_eq!(
            request(42).search_path(),
            "LHR-IST/2025-06-01/bestflight_a?sort=price_a"
        );
    }

    #[test]
    fn search_path_round_trip_direct_flex() {
        let mut req = request(42);
        req.ret_date = NaiveDate::from_ymd_opt(2025, 6, 8);
        req.flex_option = 2;
        req.direct = true;

        assert_eq!(
            req.search_path(),
            "LHR-IST/2025-06-01-flexible-2days/2025-06-08-flexible-2daysbestflight_a?sort=price_a&fs=stops=0"
        );
    }

    #[test]
    fn return_before_departure_is_rejected() {
        let create = RequestCreate {
            dep_port: "LHR".to_string(),
            arr_port: "IST".to_string(),
            dep_date: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            ret_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            flex_option: 0,
            sorted_by: SortOption::Bestflight,
            direct: false,
        };

        assert!(matches!(
            create.validate(),
            Err(CrawlerError::InvalidRequest(_))
        ));
    }

    #[test]
    fn same_day_return_is_allowed() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let create = RequestCreate {
            dep_port: "LHR".to_string(),
            arr_port: "IST".to_string(),
            dep_date: date,
            ret_date: Some(date),
            flex_option: 0,
            sorted_by: SortOption::Bestflight,
            direct: false,
        };

        create.validate().unwrap();
    }

    #[test]
    fn out_of_range_flex_is_rejected() {
        let mut create = RequestCreate {
            dep_port: "LHR".to_string(),
            arr_port: "IST".to_string(),
            dep_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            ret_date: None,
            flex_option: 4,
            sorted_by: SortOption::Bestflight,
            direct: false,
        };
        assert!(create.validate().is_err());

        create.flex_option = -1;
        assert!(create.validate().is_err());
    }

    #[test]
    fn sort_accepts_index_or_name() {
        assert_eq!(SortOption::parse("1").unwrap(), SortOption::Price);
        assert_eq!(SortOption::parse("duration").unwrap(), SortOption::Duration);
        assert!(SortOption::parse("3").is_err());
        assert!(SortOption::parse("cheapest").is_err());
    }

    #[test]
    fn sort_deserializes_from_index_or_name() {
        let from_index: SortOption = serde_json::from_str("2").unwrap();
        let from_name: SortOption = serde_json::from_str("\"price\"").unwrap();

        assert_eq!(from_index, SortOption::Duration);
        assert_eq!(from_name, SortOption::Price);
    }
}
