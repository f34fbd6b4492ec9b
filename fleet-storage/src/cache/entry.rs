//! Encoding of one record as a cache entry.

use super::traits::POSITION_FIELD;
use fleet_core::{CacheError, FieldMap, FleetResult, ServerRecord};

/// Flatten a record and stamp its position in the result.
pub fn encode(record: &ServerRecord, position: usize) -> FieldMap {
    let mut fields = record.to_field_map();
    fields.insert(POSITION_FIELD.to_string(), position.to_string());
    fields
}

/// Rebuild `(position, record)` from a stored field map.
pub fn decode(key: &str, mut fields: FieldMap) -> FleetResult<(usize, ServerRecord)> {
    let corrupt = |reason: String| CacheError::CorruptEntry {
        key: key.to_string(),
        reason,
    };
    let position = fields
        .remove(POSITION_FIELD)
        .ok_or_else(|| corrupt("missing position".to_string()))?
        .parse::<usize>()
        .map_err(|e| corrupt(format!("bad position: {}", e)))?;
    let record = ServerRecord::from_field_map(&fields).map_err(corrupt)?;
    Ok((position, record))
}

/// Read the position a stored entry already carries.
pub fn position_of(fields: &FieldMap) -> Option<usize> {
    fields.get(POSITION_FIELD).and_then(|p| p.parse().ok())
}

/// Order decoded entries by position and drop the positions.
pub fn into_ordered(mut entries: Vec<(usize, ServerRecord)>) -> Vec<ServerRecord> {
    entries.sort_by_key(|(position, _)| *position);
    entries.into_iter().map(|(_, record)| record).collect()
}
