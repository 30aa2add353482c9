//! Chain Hasher
//!
//! Canonical encoding and SHA-256 hashing of compliance records.
//!
//! Every field is written as `name=<byte length>:<value>;` in a fixed order per
//! kind, so free-text fields can never shift bytes between neighbours.
//! Timestamps are RFC 3339 UTC with nanosecond precision; floats use pinned
//! decimal places so the encoding is reproducible across implementations.
//! A float carrying digits beyond its pinned places does not encode at all,
//! so a stored value can never differ from the value its hash covers.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fmt::Write;

use crate::error::{LedgerError, Result};
use crate::ledger::record::{
    AccessCheckRecord, AppealRecord, ComplianceRecord, GeofenceCheckRecord, ValidationRecord,
};

/// Decimal places for monetary amounts.
pub const MONEY_DECIMALS: usize = 4;
/// Decimal places for the price deviation ratio.
pub const RATIO_DECIMALS: usize = 6;
/// Decimal places for latitude/longitude (about 1 cm).
pub const COORDINATE_DECIMALS: usize = 7;

/// Lower-case hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Deterministic hashing of compliance records.
pub struct ChainHasher;

impl ChainHasher {
    /// Canonical byte encoding of every field except `hash`.
    pub fn canonical_encoding(record: &ComplianceRecord) -> Result<Vec<u8>> {
        if record.id().is_empty() {
            return Err(LedgerError::missing_field("id"));
        }
        if record.user_id().is_empty() {
            return Err(LedgerError::missing_field("user_id"));
        }

        let mut out = CanonicalWriter::new();
        out.field("kind", record.kind().as_str());
        match record {
            ComplianceRecord::Validation(r) => encode_validation(&mut out, r)?,
            ComplianceRecord::Appeal(r) => encode_appeal(&mut out, r),
            ComplianceRecord::AccessCheck(r) => encode_access_check(&mut out, r),
            ComplianceRecord::GeofenceCheck(r) => encode_geofence_check(&mut out, r)?,
        }
        out.field("previous_hash", record.previous_hash());

        Ok(out.into_bytes())
    }

    /// SHA-256 of the canonical encoding, lower-case hex.
    pub fn hash(record: &ComplianceRecord) -> Result<String> {
        let canonical = Self::canonical_encoding(record)?;
        Ok(sha256_hex(&canonical))
    }

    /// Whether the stored hash matches a recomputation over the stored fields.
    pub fn verify(record: &ComplianceRecord) -> bool {
        match Self::hash(record) {
            Ok(hash) => hash == record.hash(),
            Err(_) => false,
        }
    }

    /// Round every decimal field to its pinned precision.
    pub fn normalize(record: &mut ComplianceRecord) -> Result<()> {
        match record {
            ComplianceRecord::Validation(r) => {
                r.materials_cost = round_decimal("materials_cost", r.materials_cost, MONEY_DECIMALS)?;
                r.labor_cost = round_decimal("labor_cost", r.labor_cost, MONEY_DECIMALS)?;
                r.deviation = round_decimal("deviation", r.deviation, RATIO_DECIMALS)?;
                r.median_price = round_decimal("median_price", r.median_price, MONEY_DECIMALS)?;
            }
            ComplianceRecord::GeofenceCheck(r) => {
                r.latitude = round_decimal("latitude", r.latitude, COORDINATE_DECIMALS)?;
                r.longitude = round_decimal("longitude", r.longitude, COORDINATE_DECIMALS)?;
            }
            ComplianceRecord::Appeal(_) | ComplianceRecord::AccessCheck(_) => {}
        }
        Ok(())
    }
}

fn format_decimal(value: f64, places: usize) -> String {
    // -0.0 and 0.0 must encode identically
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{:.*}", places, value)
}

fn round_decimal(name: &str, value: f64, places: usize) -> Result<f64> {
    if !value.is_finite() {
        return Err(LedgerError::non_finite(name));
    }
    let rounded: f64 = format_decimal(value, places)
        .parse()
        .map_err(|_| LedgerError::non_finite(name))?;
    Ok(if rounded == 0.0 { 0.0 } else { rounded })
}

struct CanonicalWriter {
    buf: String,
}

impl CanonicalWriter {
    fn new() -> Self {
        Self { buf: String::new() }
    }

    fn field(&mut self, name: &str, value: &str) {
        // Writing into a String cannot fail.
        let _ = write!(self.buf, "{}={}:{};", name, value.len(), value);
    }

    fn timestamp(&mut self, name: &str, value: &DateTime<Utc>) {
        self.field(name, &value.to_rfc3339_opts(SecondsFormat::Nanos, true));
    }

    fn flag(&mut self, name: &str, value: bool) {
        self.field(name, if value { "true" } else { "false" });
    }

    fn decimal(&mut self, name: &str, value: f64, places: usize) -> Result<()> {
        if !value.is_finite() {
            return Err(LedgerError::non_finite(name));
        }
        let text = format_decimal(value, places);
        if text.parse::<f64>().map_or(true, |encoded| encoded != value) {
            return Err(LedgerError::EncodingError(format!(
                "Field `{}` carries more than {} decimal places",
                name, places
            )));
        }
        self.field(name, &text);
        Ok(())
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf.into_bytes()
    }
}

fn encode_validation(out: &mut CanonicalWriter, r: &ValidationRecord) -> Result<()> {
    out.field("id", &r.id);
    out.field("user_id", &r.user_id);
    out.field("order_id", &r.order_id);
    out.decimal("materials_cost", r.materials_cost, MONEY_DECIMALS)?;
    out.decimal("labor_cost", r.labor_cost, MONEY_DECIMALS)?;
    out.field("currency", &r.currency);
    out.field("status", r.status.as_str());
    out.decimal("deviation", r.deviation, RATIO_DECIMALS)?;
    out.decimal("median_price", r.median_price, MONEY_DECIMALS)?;
    out.flag("audit_required", r.audit_required);
    out.field("reason", &r.reason);
    out.timestamp("timestamp", &r.timestamp);
    Ok(())
}

fn encode_appeal(out: &mut CanonicalWriter, r: &AppealRecord) {
    out.field("id", &r.id);
    out.field("user_id", &r.user_id);
    out.field("order_id", &r.order_id);
    out.field("event_id", &r.event_id);
    out.field("justification", &r.justification);
    out.field("evidence_items", &r.evidence_items.len().to_string());
    for (i, item) in r.evidence_items.iter().enumerate() {
        out.field(&format!("evidence[{}].id", i), &item.id);
        out.field(&format!("evidence[{}].item_type", i), &item.item_type);
        out.field(&format!("evidence[{}].url", i), &item.url);
        // `+` marks a present description so Some("") differs from None
        match &item.description {
            Some(description) => {
                out.field(&format!("evidence[{}].description", i), &format!("+{}", description))
            }
            None => out.field(&format!("evidence[{}].description", i), "-"),
        }
        out.timestamp(&format!("evidence[{}].uploaded_at", i), &item.uploaded_at);
    }
    out.field("status", r.status.as_str());
    out.timestamp("timestamp", &r.timestamp);
}

fn encode_access_check(out: &mut CanonicalWriter, r: &AccessCheckRecord) {
    out.field("id", &r.id);
    out.field("user_id", &r.user_id);
    out.field("order_id", &r.order_id);
    out.flag("access_granted", r.access_granted);
    out.field("reason", &r.reason);
    out.flag("requires_biometrics", r.requires_biometrics);
    out.timestamp("timestamp", &r.timestamp);
}

fn encode_geofence_check(out: &mut CanonicalWriter, r: &GeofenceCheckRecord) -> Result<()> {
    out.field("id", &r.id);
    out.field("user_id", &r.user_id);
    out.field("order_id", &r.order_id);
    out.flag("is_inside", r.is_inside);
    out.decimal("latitude", r.latitude, COORDINATE_DECIMALS)?;
    out.decimal("longitude", r.longitude, COORDINATE_DECIMALS)?;
    out.field("violation_reason", &r.violation_reason);
    out.timestamp("timestamp", &r.timestamp);
    Ok(())
}

impl ComplianceRecord {
    /// Calculate SHA256 hash of this record
    pub fn calculate_hash(&self) -> Result<String> {
        ChainHasher::hash(self)
    }

    /// Verify this record's hash
    pub fn verify_hash(&self) -> bool {
        ChainHasher::verify(self)
    }
}
