use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ledgerline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::entry::AuditLogEntry;

/// Hard ceiling applied to every query page.
pub const MAX_PAGE_SIZE: usize = 500;

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Queryable fields of an audit log entry.
///
/// The set is closed: a filter or sort naming anything else is rejected when
/// the field name is parsed, before any entry is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryField {
    /// Entry identifier.
    Id,
    /// Event type label.
    EventType,
    /// Moment the audited action happened.
    OccurredAt,
    /// Moment the entry was accepted for storage.
    IngestedAt,
    /// Owning organization, absent for system-level entries.
    OrganizationId,
}

impl EntryField {
    /// Returns a stable storage value for this field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::EventType => "event_type",
            Self::OccurredAt => "occurred_at",
            Self::IngestedAt => "ingested_at",
            Self::OrganizationId => "organization_id",
        }
    }

    /// Returns all queryable fields.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[EntryField] = &[
            EntryField::Id,
            EntryField::EventType,
            EntryField::OccurredAt,
            EntryField::IngestedAt,
            EntryField::OrganizationId,
        ];

        ALL
    }
}

impl FromStr for EntryField {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "id" => Ok(Self::Id),
            "event_type" => Ok(Self::EventType),
            "occurred_at" => Ok(Self::OccurredAt),
            "ingested_at" => Ok(Self::IngestedAt),
            "organization_id" => Ok(Self::OrganizationId),
            _ => Err(AppError::Validation(format!(
                "unknown audit entry field '{value}'"
            ))),
        }
    }
}

/// Filter operator for query clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equality comparison.
    Eq,
    /// Inequality comparison.
    Neq,
    /// Greater-than comparison.
    Gt,
    /// Greater-than-or-equal comparison.
    Gte,
    /// Less-than comparison.
    Lt,
    /// Less-than-or-equal comparison.
    Lte,
    /// Substring match for text values.
    Contains,
    /// Membership in provided set.
    In,
}

impl FilterOperator {
    /// Returns a stable storage value for this operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::In => "in",
        }
    }
}

impl FromStr for FilterOperator {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "contains" => Ok(Self::Contains),
            "in" => Ok(Self::In),
            _ => Err(AppError::Validation(format!(
                "unknown filter operator '{value}'"
            ))),
        }
    }
}

/// Sort direction for query sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

impl SortDirection {
    /// Returns a stable storage value for this direction.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(AppError::Validation(format!(
                "unknown sort direction '{value}'"
            ))),
        }
    }
}

/// One filter clause of a query specification.
///
/// Clauses are validated on construction, so evaluation and SQL translation
/// can rely on the operator and value fitting the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    field: EntryField,
    operator: FilterOperator,
    value: Value,
}

impl FilterClause {
    /// Creates a validated filter clause.
    pub fn new(field: EntryField, operator: FilterOperator, value: Value) -> AppResult<Self> {
        match operator {
            FilterOperator::In => {
                let Some(items) = value.as_array() else {
                    return Err(AppError::Validation(format!(
                        "'in' filter on field '{}' expects an array value",
                        field.as_str()
                    )));
                };
                if items.is_empty() {
                    return Err(AppError::Validation(format!(
                        "'in' filter on field '{}' expects at least one value",
                        field.as_str()
                    )));
                }
                for item in items {
                    validate_scalar_value(field, item)?;
                }
            }
            FilterOperator::Contains => {
                if field != EntryField::EventType {
                    return Err(AppError::Validation(format!(
                        "operator 'contains' is not supported for field '{}'",
                        field.as_str()
                    )));
                }
                if !value.is_string() {
                    return Err(AppError::Validation(
                        "'contains' filter expects a string value".to_owned(),
                    ));
                }
            }
            FilterOperator::Gt | FilterOperator::Gte | FilterOperator::Lt | FilterOperator::Lte => {
                if !matches!(field, EntryField::OccurredAt | EntryField::IngestedAt) {
                    return Err(AppError::Validation(format!(
                        "operator '{}' is not supported for field '{}'",
                        operator.as_str(),
                        field.as_str()
                    )));
                }
                validate_scalar_value(field, &value)?;
            }
            FilterOperator::Eq | FilterOperator::Neq => {
                if value.is_null() {
                    if field != EntryField::OrganizationId {
                        return Err(AppError::Validation(format!(
                            "field '{}' cannot be compared against null",
                            field.as_str()
                        )));
                    }
                } else {
                    validate_scalar_value(field, &value)?;
                }
            }
        }

        Ok(Self {
            field,
            operator,
            value,
        })
    }

    /// Returns the filtered field.
    #[must_use]
    pub fn field(&self) -> EntryField {
        self.field
    }

    /// Returns the comparison operator.
    #[must_use]
    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    /// Returns the comparison value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns whether the entry satisfies this clause.
    #[must_use]
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        match self.field {
            EntryField::Id => uuid_matches(Some(entry.id().as_uuid()), self.operator, &self.value),
            EntryField::EventType => {
                text_matches(entry.event_type().as_str(), self.operator, &self.value)
            }
            EntryField::OccurredAt => {
                timestamp_matches(entry.occurred_at(), self.operator, &self.value)
            }
            EntryField::IngestedAt => {
                timestamp_matches(entry.ingested_at(), self.operator, &self.value)
            }
            EntryField::OrganizationId => uuid_matches(
                entry.organization_id().map(|id| id.as_uuid()),
                self.operator,
                &self.value,
            ),
        }
    }
}

/// One sort key of a query specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortClause {
    field: EntryField,
    direction: SortDirection,
}

impl SortClause {
    /// Creates a sort key.
    #[must_use]
    pub fn new(field: EntryField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Returns the sorted field.
    #[must_use]
    pub fn field(&self) -> EntryField {
        self.field
    }

    /// Returns the sort direction.
    #[must_use]
    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    fn compare(&self, left: &AuditLogEntry, right: &AuditLogEntry) -> Ordering {
        let mut ordering = match self.field {
            EntryField::Id => left.id().as_uuid().cmp(&right.id().as_uuid()),
            EntryField::EventType => left
                .event_type()
                .as_str()
                .cmp(right.event_type().as_str()),
            EntryField::OccurredAt => left.occurred_at().cmp(&right.occurred_at()),
            EntryField::IngestedAt => left.ingested_at().cmp(&right.ingested_at()),
            EntryField::OrganizationId => match (left.organization_id(), right.organization_id()) {
                (Some(left), Some(right)) => left.as_uuid().cmp(&right.as_uuid()),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };

        if self.direction == SortDirection::Desc {
            ordering = ordering.reverse();
        }

        ordering
    }
}

/// Declarative audit entry query: filter clauses, sort keys, and a page
/// window.
///
/// The same specification drives the in-memory evaluator and the SQL
/// translation, so every repository answers a given query identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySpecification {
    filters: Vec<FilterClause>,
    sort: Vec<SortClause>,
    limit: usize,
    offset: usize,
}

impl EntrySpecification {
    /// Creates a validated specification. `limit` is capped at
    /// [`MAX_PAGE_SIZE`].
    pub fn new(
        filters: Vec<FilterClause>,
        sort: Vec<SortClause>,
        limit: usize,
        offset: usize,
    ) -> AppResult<Self> {
        if limit == 0 {
            return Err(AppError::Validation(
                "query limit must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            filters,
            sort,
            limit: limit.min(MAX_PAGE_SIZE),
            offset,
        })
    }

    /// Returns the filter clauses, combined with AND.
    #[must_use]
    pub fn filters(&self) -> &[FilterClause] {
        &self.filters
    }

    /// Returns the sort keys in priority order.
    #[must_use]
    pub fn sort(&self) -> &[SortClause] {
        &self.sort
    }

    /// Returns the page size.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the number of matching entries skipped before the page.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns whether the entry satisfies every filter clause.
    #[must_use]
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.filters.iter().all(|clause| clause.matches(entry))
    }

    /// Compares two entries under the sort keys.
    ///
    /// Entries equal under every key fall back to ascending id, so the
    /// ordering is total and pagination is deterministic.
    #[must_use]
    pub fn compare(&self, left: &AuditLogEntry, right: &AuditLogEntry) -> Ordering {
        for sort in &self.sort {
            let ordering = sort.compare(left, right);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        left.id().as_uuid().cmp(&right.id().as_uuid())
    }

    /// Evaluates the specification against a slice of entries.
    #[must_use]
    pub fn apply(&self, entries: &[AuditLogEntry]) -> Vec<AuditLogEntry> {
        let mut listed: Vec<AuditLogEntry> = entries
            .iter()
            .filter(|entry| self.matches(entry))
            .cloned()
            .collect();

        listed.sort_by(|left, right| self.compare(left, right));

        listed
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect()
    }
}

impl Default for EntrySpecification {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            sort: Vec::new(),
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

fn validate_scalar_value(field: EntryField, value: &Value) -> AppResult<()> {
    let valid = match field {
        EntryField::Id | EntryField::OrganizationId => parse_uuid_value(value).is_some(),
        EntryField::EventType => value.is_string(),
        EntryField::OccurredAt | EntryField::IngestedAt => parse_timestamp_value(value).is_some(),
    };

    if valid {
        return Ok(());
    }

    Err(AppError::Validation(match field {
        EntryField::Id | EntryField::OrganizationId => {
            format!("field '{}' expects a UUID string value", field.as_str())
        }
        EntryField::EventType => "field 'event_type' expects a string value".to_owned(),
        EntryField::OccurredAt | EntryField::IngestedAt => {
            format!(
                "field '{}' expects an RFC 3339 timestamp value",
                field.as_str()
            )
        }
    }))
}

fn parse_uuid_value(value: &Value) -> Option<Uuid> {
    value.as_str().and_then(|raw| Uuid::parse_str(raw).ok())
}

fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str().and_then(|raw| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc))
    })
}

fn text_matches(stored: &str, operator: FilterOperator, expected: &Value) -> bool {
    match operator {
        FilterOperator::Eq => expected.as_str() == Some(stored),
        FilterOperator::Neq => expected.as_str().is_some_and(|value| value != stored),
        FilterOperator::Contains => expected.as_str().is_some_and(|value| stored.contains(value)),
        FilterOperator::In => expected.as_array().is_some_and(|values| {
            values
                .iter()
                .any(|candidate| candidate.as_str() == Some(stored))
        }),
        FilterOperator::Gt | FilterOperator::Gte | FilterOperator::Lt | FilterOperator::Lte => {
            false
        }
    }
}

fn timestamp_matches(stored: DateTime<Utc>, operator: FilterOperator, expected: &Value) -> bool {
    if operator == FilterOperator::In {
        return expected.as_array().is_some_and(|values| {
            values
                .iter()
                .any(|candidate| parse_timestamp_value(candidate) == Some(stored))
        });
    }

    let Some(expected) = parse_timestamp_value(expected) else {
        return false;
    };

    match operator {
        FilterOperator::Eq => stored == expected,
        FilterOperator::Neq => stored != expected,
        FilterOperator::Gt => stored > expected,
        FilterOperator::Gte => stored >= expected,
        FilterOperator::Lt => stored < expected,
        FilterOperator::Lte => stored <= expected,
        FilterOperator::Contains | FilterOperator::In => false,
    }
}

fn uuid_matches(stored: Option<Uuid>, operator: FilterOperator, expected: &Value) -> bool {
    match operator {
        FilterOperator::Eq => {
            if expected.is_null() {
                stored.is_none()
            } else {
                stored.is_some() && parse_uuid_value(expected) == stored
            }
        }
        FilterOperator::Neq => {
            if expected.is_null() {
                stored.is_some()
            } else {
                stored.is_some_and(|stored| {
                    parse_uuid_value(expected).is_some_and(|value| value != stored)
                })
            }
        }
        FilterOperator::In => stored.is_some_and(|stored| {
            expected.as_array().is_some_and(|values| {
                values
                    .iter()
                    .any(|candidate| parse_uuid_value(candidate) == Some(stored))
            })
        }),
        _ => false,
    }
}
