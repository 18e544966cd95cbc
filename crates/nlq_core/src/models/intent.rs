//! Query intent models.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Operation the question asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryType {
    /// Plain row retrieval
    #[default]
    Select,
    Count,
    Sum,
    Avg,
    Max,
    Min,
    /// Aggregation per group
    Group,
    /// Distinct values
    Distinct,
}

impl QueryType {
    /// The aggregate function this query type maps to, if any.
    pub fn aggregate(&self) -> Option<AggregateFunction> {
        match self {
            Self::Count => Some(AggregateFunction::Count),
            Self::Sum => Some(AggregateFunction::Sum),
            Self::Avg => Some(AggregateFunction::Avg),
            Self::Max => Some(AggregateFunction::Max),
            Self::Min => Some(AggregateFunction::Min),
            _ => None,
        }
    }
}

/// SQL aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Max,
    Min,
}

impl AggregateFunction {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Max => "MAX",
            Self::Min => "MIN",
        }
    }

    /// Parse a SQL keyword.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "COUNT" => Some(Self::Count),
            "SUM" => Some(Self::Sum),
            "AVG" => Some(Self::Avg),
            "MAX" => Some(Self::Max),
            "MIN" => Some(Self::Min),
            _ => None,
        }
    }

    /// The matching non-grouped query type.
    pub fn query_type(&self) -> QueryType {
        match self {
            Self::Count => QueryType::Count,
            Self::Sum => QueryType::Sum,
            Self::Avg => QueryType::Avg,
            Self::Max => QueryType::Max,
            Self::Min => QueryType::Min,
        }
    }
}

/// Why the user is asking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryPurpose {
    #[default]
    DataRetrieval,
    StatisticalAnalysis,
    TrendAnalysis,
    ComparisonAnalysis,
}

/// Unit of a relative time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    /// Parse a unit word in Chinese or English.
    pub fn parse(word: &str) -> Option<Self> {
        let word = word.trim().trim_end_matches('s');
        match word {
            "分钟" | "minute" | "min" => Some(Self::Minute),
            "小时" | "hour" | "hr" => Some(Self::Hour),
            "天" | "日" | "day" => Some(Self::Day),
            "周" | "星期" | "礼拜" | "week" => Some(Self::Week),
            "月" | "month" => Some(Self::Month),
            "年" | "year" => Some(Self::Year),
            _ => None,
        }
    }
}

/// Time window the question restricts results to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimeRange {
    /// The last `value` units before now
    Relative { unit: TimeUnit, value: u32 },
    /// Between two dates, both inclusive
    Absolute { start: NaiveDate, end: NaiveDate },
    /// A single day
    Point { time: NaiveDate },
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One ORDER BY requirement. `field` is the phrase the user wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortRequirement {
    pub field: String,
    pub direction: SortDirection,
}

/// Row-count restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LimitRequirement {
    /// First `n` rows
    TopN { n: u32 },
    /// One page of rows
    Pagination { size: u32, offset: u32 },
}

impl LimitRequirement {
    /// Build a pagination requirement from a 1-based page number.
    pub fn page(page: u32, size: u32) -> Self {
        Self::Pagination { size, offset: page.saturating_sub(1).saturating_mul(size) }
    }
}

/// Structured interpretation of the question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryIntent {
    pub query_type: QueryType,
    pub query_purpose: QueryPurpose,
    pub time_range: Option<TimeRange>,
    pub sort_requirements: Vec<SortRequirement>,
    pub limit_requirement: Option<LimitRequirement>,
    /// Aggregate to apply per group when `query_type` is `Group`
    pub aggregation: Option<AggregateFunction>,
    /// Grouping phrases in order of appearance
    pub group_by: Vec<String>,
    pub confidence: f64,
}

impl QueryIntent {
    pub fn needs_time_range(&self) -> bool {
        self.time_range.is_some()
    }

    pub fn needs_grouping(&self) -> bool {
        self.query_type == QueryType::Group || !self.group_by.is_empty()
    }

    pub fn needs_sorting(&self) -> bool {
        !self.sort_requirements.is_empty()
    }

    pub fn needs_limit(&self) -> bool {
        self.limit_requirement.is_some()
    }

    /// The aggregate the SELECT list should carry, if any.
    pub fn effective_aggregate(&self) -> Option<AggregateFunction> {
        self.query_type.aggregate().or(self.aggregation)
    }
}

/// Start of the window for a relative range ending at `now`.
pub fn relative_start(now: NaiveDateTime, unit: TimeUnit, value: u32) -> Option<NaiveDateTime> {
    use chrono::{Duration, Months};

    let value = i64::from(value);
    match unit {
        TimeUnit::Minute => now.checked_sub_signed(Duration::minutes(value)),
        TimeUnit::Hour => now.checked_sub_signed(Duration::hours(value)),
        TimeUnit::Day => now.checked_sub_signed(Duration::days(value)),
        TimeUnit::Week => now.checked_sub_signed(Duration::weeks(value)),
        TimeUnit::Month => now.checked_sub_months(Months::new(u32::try_from(value).ok()?)),
        TimeUnit::Year => now.checked_sub_months(Months::new(u32::try_from(value * 12).ok()?)),
    }
}
