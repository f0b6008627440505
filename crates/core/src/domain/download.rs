use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

pub const DEFAULT_VERIFICATION_TTL_HOURS: i64 = 24;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadVerificationId(pub String);

/// Short-lived grant to download a purchased product file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadVerification {
    pub id: DownloadVerificationId,
    pub product_id: ProductId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl DownloadVerification {
    pub fn expiry_from(now: DateTime<Utc>, ttl_hours: i64) -> DateTime<Utc> {
        now + Duration::hours(ttl_hours)
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{DownloadVerification, DownloadVerificationId, DEFAULT_VERIFICATION_TTL_HOURS};
    use crate::domain::product::ProductId;

    #[test]
    fn verification_is_valid_until_its_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let verification = DownloadVerification {
            id: DownloadVerificationId("dv-1".to_string()),
            product_id: ProductId("ebook".to_string()),
            expires_at: DownloadVerification::expiry_from(now, DEFAULT_VERIFICATION_TTL_HOURS),
            created_at: now,
        };

        assert_eq!(verification.expires_at - now, Duration::hours(24));
        assert!(verification.is_valid_at(now + Duration::hours(23)));
        assert!(!verification.is_valid_at(now + Duration::hours(24)));
    }
}
