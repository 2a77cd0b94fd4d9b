use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// Direction of a metered transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl Direction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            other => Err(format!("unknown direction: {other}")),
        }
    }
}

/// Transfer volume for one tenant on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsageRecord {
    pub tenant_id: TenantId,
    pub day: NaiveDate,
    pub upload_mb: f64,
    pub download_mb: f64,
    /// Always `upload_mb + download_mb`.
    pub total_mb: f64,
    pub last_updated: DateTime<Utc>,
}

impl DailyUsageRecord {
    /// An empty record for `tenant_id` on `day`.
    #[must_use]
    pub fn new(tenant_id: TenantId, day: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            day,
            upload_mb: 0.0,
            download_mb: 0.0,
            total_mb: 0.0,
            last_updated: now,
        }
    }

    /// Add `volume_mb` to the directional counter and recompute the total.
    pub fn add(&mut self, direction: Direction, volume_mb: f64, now: DateTime<Utc>) {
        match direction {
            Direction::Upload => self.upload_mb += volume_mb,
            Direction::Download => self.download_mb += volume_mb,
        }
        self.total_mb = self.upload_mb + self.download_mb;
        self.last_updated = now;
    }

    /// Whether `volume_mb` more still fits under `limit_mb`. The boundary is inclusive.
    #[must_use]
    pub fn fits(&self, volume_mb: f64, limit_mb: f64) -> bool {
        self.total_mb + volume_mb <= limit_mb
    }

    #[must_use]
    pub fn remaining_mb(&self, limit_mb: f64) -> f64 {
        (limit_mb - self.total_mb).max(0.0)
    }
}

/// Usage status query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStatus {
    pub tenant_id: TenantId,
    pub date: NaiveDate,
    pub upload_mb: f64,
    pub download_mb: f64,
    pub total_mb: f64,
    pub daily_limit_mb: f64,
    pub remaining_mb: f64,
    pub usage_percentage: f64,
}

impl UsageStatus {
    #[must_use]
    pub fn from_record(record: &DailyUsageRecord, daily_limit_mb: f64) -> Self {
        Self {
            tenant_id: record.tenant_id.clone(),
            date: record.day,
            upload_mb: record.upload_mb,
            download_mb: record.download_mb,
            total_mb: record.total_mb,
            daily_limit_mb,
            remaining_mb: record.remaining_mb(daily_limit_mb),
            usage_percentage: record.total_mb / daily_limit_mb * 100.0,
        }
    }
}
