//! Pipe-delimited failure report
//!
//! Field order is fixed; downstream reporting splits on `|`:
//!
//! ```text
//! REPORT|email|Holdings|failure||||<reason>|<file>|<id>|<local timestamp>|DEFAULTED
//! ```

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Timezone of the local timestamp field
pub const AUDIT_TIMEZONE: Tz = chrono_tz::Australia::Sydney;

/// Reason code for a filename without an identity token
pub const REASON_IDENTITY_NOT_POPULATED: &str =
    "SFERRORDEFAULTED Landmark BCC External Reference not populated";

const DOMAIN: &str = "Holdings";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub reason_code: String,
    pub file_name: String,
    pub correlation_id: String,
    pub local_time: DateTime<Tz>,
}

impl FailureReport {
    pub fn new(
        reason_code: impl Into<String>,
        file_name: impl Into<String>,
        correlation_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            reason_code: reason_code.into(),
            file_name: file_name.into(),
            correlation_id: correlation_id.into(),
            local_time: at.with_timezone(&AUDIT_TIMEZONE),
        }
    }

    /// `2023-11-29 13:09:00.000000+11:00`
    pub fn local_timestamp(&self) -> String {
        self.local_time.format("%Y-%m-%d %H:%M:%S%.6f%:z").to_string()
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "REPORT|email|{}|failure||||{}|{}|{}|{}|DEFAULTED",
            DOMAIN,
            self.reason_code,
            self.file_name,
            self.correlation_id,
            self.local_timestamp()
        )
    }
}
