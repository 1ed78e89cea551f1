/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `jobs`: job:{job_id} -> Job (JSON)
/// - `dedup`: dedup:{yyyy-mm-dd}:{normalized_url} -> job_id (string)
/// - `locks`: lock:{domain_key} -> DomainLock (JSON)
/// - `pending`: pend:{created_at_ms:020}:{job_id} -> job_id (string)
///
/// The `pending` keys sort by creation time then id, so a forward scan of the
/// partition is exactly the claim order.
use chrono::NaiveDate;
use uuid::Uuid;

/// Encode a job key: job:{job_id}
pub fn encode_job_key(job_id: &Uuid) -> Vec<u8> {
    format!("job:{job_id}").into_bytes()
}

/// Encode a dedup key: dedup:{yyyy-mm-dd}:{normalized_url}
pub fn encode_dedup_key(date: NaiveDate, normalized_url: &str) -> Vec<u8> {
    format!("dedup:{date}:{normalized_url}").into_bytes()
}

/// Encode a domain lock key: lock:{domain_key}
pub fn encode_lock_key(domain_key: &str) -> Vec<u8> {
    format!("lock:{domain_key}").into_bytes()
}

/// Encode a pending-index key: pend:{created_at_ms:020}:{job_id}
pub fn encode_pending_key(created_at_ms: i64, job_id: &Uuid) -> Vec<u8> {
    format!("pend:{:020}:{}", created_at_ms.max(0), job_id).into_bytes()
}

/// Decode a pending-index value back into a job id.
pub fn decode_pending_value(value: &[u8]) -> Option<Uuid> {
    let s = std::str::from_utf8(value).ok()?;
    Uuid::parse_str(s).ok()
}

/// Decode a job id stored as a dedup value.
pub fn decode_dedup_value(value: &[u8]) -> Option<Uuid> {
    let s = std::str::from_utf8(value).ok()?;
    Uuid::parse_str(s).ok()
}
