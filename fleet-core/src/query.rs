//! List query model.
//!
//! [`ListServersRequest`] is the wire shape a client sends; [`ServerQuery`] is
//! the resolved form every store executes and the cache fingerprints. Resolution
//! parses time bounds, applies the paging rules and whitelists the sort column,
//! so malformed input is rejected before any I/O happens.

use crate::{
    FleetError, FleetResult, ServerRecord, ServerStatus, SortColumn, SortDirection, Timestamp,
    ValidationError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter block of a list request. Time bounds are RFC3339 strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServerStatus>,
}

impl ServerFilter {
    pub fn with_status(status: ServerStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Parse the bounds into typed form.
    pub fn resolve(&self) -> FleetResult<ResolvedFilter> {
        let resolved = ResolvedFilter {
            created_after: parse_bound("created_at_from", self.created_at_from.as_deref())?,
            created_before: parse_bound("created_at_to", self.created_at_to.as_deref())?,
            updated_after: parse_bound("updated_at_from", self.updated_at_from.as_deref())?,
            updated_before: parse_bound("updated_at_to", self.updated_at_to.as_deref())?,
            // NONE on the wire means "no status predicate".
            status: self.status.filter(ServerStatus::is_set),
        };
        check_range("created_at_to", resolved.created_after, resolved.created_before)?;
        check_range("updated_at_to", resolved.updated_after, resolved.updated_before)?;
        Ok(resolved)
    }
}

fn parse_bound(field: &str, value: Option<&str>) -> FleetResult<Option<Timestamp>> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| {
                    FleetError::from(ValidationError::InvalidTimestamp {
                        field: field.to_string(),
                        value: raw.to_string(),
                    })
                })
        })
        .transpose()
}

fn check_range(field: &str, from: Option<Timestamp>, to: Option<Timestamp>) -> FleetResult<()> {
    match (from, to) {
        (Some(from), Some(to)) if to < from => Err(FleetError::invalid(
            field,
            "upper bound is earlier than lower bound",
        )),
        _ => Ok(()),
    }
}

/// Paging block of a list request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort: SortDirection,
}

/// A list request as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListServersRequest {
    /// Substring matched against name or ipv4.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<ServerFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl ListServersRequest {
    pub fn resolve(&self) -> FleetResult<ServerQuery> {
        ServerQuery::try_from(self)
    }
}

/// Typed filter predicates. Bounds are strict (`>` / `<`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_after: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_before: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServerStatus>,
}

impl ResolvedFilter {
    pub fn is_empty(&self) -> bool {
        *self == ResolvedFilter::default()
    }
}

/// ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub column: SortColumn,
    pub direction: SortDirection,
}

/// Resolved list query executed by stores and fingerprinted by the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "ResolvedFilter::is_empty")]
    pub filter: ResolvedFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

impl ServerQuery {
    /// Query returning every live record in default order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match `text` anywhere in the name or the address.
    pub fn searching(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn with_filter(mut self, filter: ResolvedFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn ordered_by(mut self, column: SortColumn, direction: SortDirection) -> Self {
        self.order = Some(SortOrder { column, direction });
        self
    }

    /// True when the result follows the store's natural order key, which is
    /// the only shape the query cache holds.
    pub fn uses_default_order(&self) -> bool {
        self.order.map_or(true, |o| o.column.is_default_order())
    }

    /// Evaluate the predicates against a record. Used by in-memory stores.
    pub fn matches(&self, record: &ServerRecord) -> bool {
        if record.is_deleted() {
            return false;
        }
        if let Some(search) = &self.search {
            if !record.name.contains(search.as_str()) && !record.ipv4.contains(search.as_str()) {
                return false;
            }
        }
        let f = &self.filter;
        let after = |bound: Option<Timestamp>, value: Option<Timestamp>| {
            bound.map_or(true, |b| value.is_some_and(|v| v > b))
        };
        let before = |bound: Option<Timestamp>, value: Option<Timestamp>| {
            bound.map_or(true, |b| value.is_some_and(|v| v < b))
        };
        after(f.created_after, Some(record.created_at))
            && before(f.created_before, Some(record.created_at))
            && after(f.updated_after, record.updated_at)
            && before(f.updated_before, record.updated_at)
            && f.status.map_or(true, |s| record.status == s)
    }

    /// Sort, offset and limit a candidate set the way the SQL store does.
    pub fn apply_window(&self, mut records: Vec<ServerRecord>) -> Vec<ServerRecord> {
        let order = self.order.unwrap_or(SortOrder {
            column: SortColumn::CreatedAt,
            direction: SortDirection::Asc,
        });
        records.sort_by(|a, b| {
            let ord = match order.column {
                SortColumn::Id => a.id.cmp(&b.id),
                SortColumn::Name => a.name.cmp(&b.name),
                SortColumn::Ipv4 => a.ipv4.cmp(&b.ipv4),
                SortColumn::Status => a.status.to_string().cmp(&b.status.to_string()),
                SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
                SortColumn::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            }
            .then_with(|| a.id.cmp(&b.id));
            if order.direction.is_descending() {
                ord.reverse()
            } else {
                ord
            }
        });
        let offset = self.offset.unwrap_or(0).max(0) as usize;
        let iter = records.into_iter().skip(offset);
        match self.limit {
            Some(limit) => iter.take(limit.max(0) as usize).collect(),
            None => iter.collect(),
        }
    }
}

impl TryFrom<&ListServersRequest> for ServerQuery {
    type Error = FleetError;

    fn try_from(req: &ListServersRequest) -> Result<Self, Self::Error> {
        let filter = req
            .filter
            .as_ref()
            .map(ServerFilter::resolve)
            .transpose()?
            .unwrap_or_default();

        let mut query = ServerQuery {
            search: req.query.clone().filter(|q| !q.is_empty()),
            filter,
            ..Default::default()
        };

        if let Some(p) = &req.pagination {
            // A limit of 0 or 1 is ignored.
            query.limit = p.limit.filter(|l| *l > 1);
            if let (Some(page), Some(size)) = (p.page, p.page_size) {
                if page > 0 && size > 0 {
                    query.offset = Some((page - 1) * size);
                }
            }
            if let Some(sort_by) = p.sort_by.as_deref().filter(|s| !s.is_empty()) {
                let column = sort_by
                    .parse::<SortColumn>()
                    .map_err(|reason| FleetError::invalid("sort_by", reason))?;
                query.order = Some(SortOrder {
                    column,
                    direction: p.sort,
                });
            }
        }

        Ok(query)
    }
}
