//! Server inventory records and their typed write payloads.

use crate::{
    new_entity_id, FleetError, FleetResult, ServerId, ServerStatus, Timestamp, UserId,
    ValidationError,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

pub const FIELD_ID: &str = "id";
pub const FIELD_NAME: &str = "name";
pub const FIELD_IPV4: &str = "ipv4";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UPDATED_AT: &str = "updated_at";
pub const FIELD_DELETED_AT: &str = "deleted_at";
pub const FIELD_CREATED_BY: &str = "created_by";
pub const FIELD_UPDATED_BY: &str = "updated_by";
pub const FIELD_DELETED_BY: &str = "deleted_by";

/// Flattened string representation of a record, as held by the query cache.
pub type FieldMap = HashMap<String, String>;

/// A monitored machine in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: ServerId,
    pub name: String,
    pub ipv4: String,
    pub status: ServerStatus,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
    /// Soft-delete tombstone.
    pub deleted_at: Option<Timestamp>,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub deleted_by: Option<UserId>,
}

impl ServerRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// True when `other` differs in a column list queries select on: status
    /// by equality, name and ipv4 through the search text.
    pub fn filtered_fields_differ(&self, other: &ServerRecord) -> bool {
        self.status != other.status || self.name != other.name || self.ipv4 != other.ipv4
    }

    /// Apply a validated patch in place, stamping the update time.
    pub fn apply(&mut self, patch: &ServerPatch, now: Timestamp) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(ipv4) = &patch.ipv4 {
            self.ipv4 = ipv4.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        self.updated_at = Some(now);
        self.updated_by = patch.updated_by.or(self.updated_by);
    }

    /// Flatten into string fields. Absent optionals are omitted.
    pub fn to_field_map(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(FIELD_ID.to_string(), self.id.to_string());
        fields.insert(FIELD_NAME.to_string(), self.name.clone());
        fields.insert(FIELD_IPV4.to_string(), self.ipv4.clone());
        fields.insert(FIELD_STATUS.to_string(), self.status.to_string());
        fields.insert(FIELD_CREATED_AT.to_string(), format_timestamp(&self.created_at));
        let optional_times = [
            (FIELD_UPDATED_AT, self.updated_at),
            (FIELD_DELETED_AT, self.deleted_at),
        ];
        for (field, value) in optional_times {
            if let Some(ts) = value {
                fields.insert(field.to_string(), format_timestamp(&ts));
            }
        }
        let actors = [
            (FIELD_CREATED_BY, self.created_by),
            (FIELD_UPDATED_BY, self.updated_by),
            (FIELD_DELETED_BY, self.deleted_by),
        ];
        for (field, value) in actors {
            if let Some(actor) = value {
                fields.insert(field.to_string(), actor.to_string());
            }
        }
        fields
    }

    /// Rebuild a record from string fields. Unknown fields are ignored.
    pub fn from_field_map(fields: &FieldMap) -> Result<Self, String> {
        let required = |name: &str| {
            fields
                .get(name)
                .ok_or_else(|| format!("missing field {}", name))
        };

        let id = required(FIELD_ID)?
            .parse::<ServerId>()
            .map_err(|e| format!("bad id: {}", e))?;
        let status = match fields.get(FIELD_STATUS).map(String::as_str) {
            None | Some("") => ServerStatus::None,
            Some(other) => other.parse::<ServerStatus>()?,
        };

        Ok(Self {
            id,
            name: required(FIELD_NAME)?.clone(),
            ipv4: required(FIELD_IPV4)?.clone(),
            status,
            created_at: parse_timestamp(required(FIELD_CREATED_AT)?)?,
            updated_at: optional_timestamp(fields, FIELD_UPDATED_AT)?,
            deleted_at: optional_timestamp(fields, FIELD_DELETED_AT)?,
            created_by: optional_actor(fields, FIELD_CREATED_BY)?,
            updated_by: optional_actor(fields, FIELD_UPDATED_BY)?,
            deleted_by: optional_actor(fields, FIELD_DELETED_BY)?,
        })
    }
}

fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(value: &str) -> Result<Timestamp, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {}: {}", value, e))
}

fn optional_timestamp(fields: &FieldMap, name: &str) -> Result<Option<Timestamp>, String> {
    fields.get(name).map(|v| parse_timestamp(v)).transpose()
}

fn optional_actor(fields: &FieldMap, name: &str) -> Result<Option<UserId>, String> {
    fields
        .get(name)
        .map(|v| v.parse::<UserId>().map_err(|e| format!("bad {}: {}", name, e)))
        .transpose()
}

/// Parse a dotted-quad IPv4 address. IPv6 input is rejected explicitly.
pub fn parse_ipv4(field: &str, value: &str) -> FleetResult<Ipv4Addr> {
    match value.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(addr)) => Ok(addr),
        Ok(IpAddr::V6(_)) => Err(FleetError::invalid(field, "IP address is not v4")),
        Err(_) => Err(FleetError::invalid(
            field,
            format!("{:?} is not a valid IP address", value),
        )),
    }
}

fn require_name(name: &str) -> FleetResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: FIELD_NAME.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Payload for a single or batched insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServer {
    /// Caller-supplied id (bulk import); generated when absent.
    pub id: Option<ServerId>,
    pub name: String,
    pub ipv4: String,
    #[serde(default)]
    pub status: ServerStatus,
    pub created_by: Option<UserId>,
}

impl NewServer {
    pub fn new(name: impl Into<String>, ipv4: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            ipv4: ipv4.into(),
            status: ServerStatus::None,
            created_by: None,
        }
    }

    pub fn with_id(mut self, id: ServerId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_status(mut self, status: ServerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn by(mut self, actor: UserId) -> Self {
        self.created_by = Some(actor);
        self
    }

    pub fn validate(&self) -> FleetResult<()> {
        require_name(&self.name)?;
        parse_ipv4(FIELD_IPV4, &self.ipv4)?;
        Ok(())
    }

    /// Materialize as a stored record stamped with `now`.
    pub fn into_record(self, now: Timestamp) -> ServerRecord {
        ServerRecord {
            id: self.id.unwrap_or_else(new_entity_id),
            name: self.name,
            ipv4: self.ipv4,
            status: self.status,
            created_at: now,
            updated_at: None,
            deleted_at: None,
            created_by: self.created_by,
            updated_by: None,
            deleted_by: None,
        }
    }
}

/// Typed partial update. Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPatch {
    pub name: Option<String>,
    pub ipv4: Option<String>,
    pub status: Option<ServerStatus>,
    pub updated_by: Option<UserId>,
}

impl ServerPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_ipv4(mut self, ipv4: impl Into<String>) -> Self {
        self.ipv4 = Some(ipv4.into());
        self
    }

    pub fn with_status(mut self, status: ServerStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn by(mut self, actor: UserId) -> Self {
        self.updated_by = Some(actor);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.ipv4.is_none() && self.status.is_none()
    }

    pub fn validate(&self) -> FleetResult<()> {
        if self.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }
        if let Some(name) = &self.name {
            require_name(name)?;
        }
        if let Some(ipv4) = &self.ipv4 {
            parse_ipv4(FIELD_IPV4, ipv4)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> ServerRecord {
        ServerRecord {
            id: new_entity_id(),
            name: "srv1".to_string(),
            ipv4: "10.0.0.1".to_string(),
            status: ServerStatus::On,
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            updated_at: None,
            deleted_at: None,
            created_by: Some(7),
            updated_by: None,
            deleted_by: None,
        }
    }

    #[test]
    fn test_field_map_roundtrip_preserves_record() {
        let mut record = sample();
        record.updated_at = Some(Utc::now());
        record.updated_by = Some(9);
        let fields = record.to_field_map();
        assert!(!fields.contains_key(FIELD_DELETED_AT));
        assert_eq!(ServerRecord::from_field_map(&fields), Ok(record));
    }

    #[test]
    fn test_field_map_unset_status_is_empty_string() {
        let mut record = sample();
        record.status = ServerStatus::None;
        let fields = record.to_field_map();
        assert_eq!(fields.get(FIELD_STATUS).map(String::as_str), Some(""));
        assert_eq!(
            ServerRecord::from_field_map(&fields).map(|r| r.status),
            Ok(ServerStatus::None)
        );
    }

    #[test]
    fn test_from_field_map_rejects_missing_id() {
        let mut fields = sample().to_field_map();
        fields.remove(FIELD_ID);
        assert!(ServerRecord::from_field_map(&fields).is_err());
    }

    #[test]
    fn test_parse_ipv4_rejects_v6_and_garbage() {
        assert!(parse_ipv4("ipv4", "1.2.3.4").is_ok());
        assert!(parse_ipv4("ipv4", "::1").is_err());
        assert!(parse_ipv4("ipv4", "999.1.1.1").is_err());
        assert!(parse_ipv4("ipv4", "not-an-ip").is_err());
    }

    #[test]
    fn test_patch_validation() {
        assert_eq!(
            ServerPatch::new().validate(),
            Err(ValidationError::EmptyPatch.into())
        );
        assert!(ServerPatch::new().with_ipv4("300.0.0.1").validate().is_err());
        assert!(ServerPatch::new().with_name("  ").validate().is_err());
        assert!(ServerPatch::new().with_status(ServerStatus::Off).validate().is_ok());
    }

    #[test]
    fn test_apply_patch_stamps_update() {
        let mut record = sample();
        let now = Utc::now();
        record.apply(&ServerPatch::new().with_name("renamed").by(3), now);
        assert_eq!(record.name, "renamed");
        assert_eq!(record.ipv4, "10.0.0.1");
        assert_eq!(record.updated_at, Some(now));
        assert_eq!(record.updated_by, Some(3));
    }

    #[test]
    fn test_filtered_fields_differ_on_searchable_columns() {
        let before = sample();
        let mut touched = before.clone();
        touched.apply(&ServerPatch::new().with_ipv4("10.0.0.1").by(2), Utc::now());
        assert!(!before.filtered_fields_differ(&touched));

        for patch in [
            ServerPatch::new().with_name("srv2"),
            ServerPatch::new().with_ipv4("10.0.0.2"),
            ServerPatch::new().with_status(ServerStatus::Off),
        ] {
            let mut after = before.clone();
            after.apply(&patch, Utc::now());
            assert!(before.filtered_fields_differ(&after), "{:?}", patch);
        }
    }

    #[test]
    fn test_new_server_keeps_supplied_id() {
        let id = new_entity_id();
        let record = NewServer::new("a", "1.2.3.4").with_id(id).into_record(Utc::now());
        assert_eq!(record.id, id);
        assert!(NewServer::new("", "1.2.3.4").validate().is_err());
    }
}
