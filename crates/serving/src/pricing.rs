use campaign_core::config::{PricingConfig, RateTable};
use campaign_core::error::{CampaignError, CampaignResult};
use campaign_core::types::AdType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Computes campaign prices from ad type and booked date range.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    min_duration_days: i64,
    max_duration_days: i64,
    rates: RateTable,
}

impl PricingEngine {
    pub fn new(config: &PricingConfig) -> Self {
        Self {
            min_duration_days: config.min_duration_days,
            max_duration_days: config.max_duration_days,
            rates: config.rates.clone(),
        }
    }

    /// Booked days, rounding any partial day up.
    pub fn duration_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
        let millis = (end - start).num_milliseconds();
        if millis <= 0 {
            return 0;
        }
        (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
    }

    /// Validate the booking window and return its length in days.
    pub fn validate_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CampaignResult<i64> {
        if end <= start {
            return Err(CampaignError::InvalidRange(
                "End date must be after start date".to_string(),
            ));
        }
        let days = Self::duration_days(start, end);
        if days < self.min_duration_days {
            return Err(CampaignError::InvalidDuration(format!(
                "Ad duration must be at least {} days",
                self.min_duration_days
            )));
        }
        if days > self.max_duration_days {
            return Err(CampaignError::InvalidDuration(format!(
                "Ad duration cannot exceed {} days",
                self.max_duration_days
            )));
        }
        Ok(days)
    }

    /// `rate_per_day(type) * days`, or `price_override` when it is non-negative.
    /// A negative override is ignored.
    pub fn price(
        &self,
        ad_type: AdType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        price_override: Option<Decimal>,
    ) -> CampaignResult<Decimal> {
        let days = self.validate_range(start, end)?;
        if let Some(manual) = price_override.filter(|p| !p.is_sign_negative()) {
            return Ok(manual);
        }
        Ok(self.rates.rate_per_day(ad_type) * Decimal::from(days))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn engine() -> PricingEngine {
        PricingEngine::new(&PricingConfig {
            min_duration_days: 3,
            max_duration_days: 90,
            rates: RateTable::default(),
        })
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_base_price_is_rate_times_days() {
        let price = engine()
            .price(AdType::BannerTop, start(), start() + Duration::days(10), None)
            .unwrap();
        assert_eq!(price, Decimal::from(500));
    }

    #[test]
    fn test_partial_day_rounds_up() {
        assert_eq!(PricingEngine::duration_days(start(), start() + Duration::hours(73)), 4);
        assert_eq!(PricingEngine::duration_days(start(), start() + Duration::days(3)), 3);
    }

    #[test]
    fn test_duration_bounds() {
        let e = engine();
        let too_short = e.price(AdType::Inline, start(), start() + Duration::days(2), None);
        match too_short {
            Err(CampaignError::InvalidDuration(msg)) => {
                assert_eq!(msg, "Ad duration must be at least 3 days")
            }
            other => panic!("expected InvalidDuration, got {other:?}"),
        }
        let too_long = e.price(AdType::Inline, start(), start() + Duration::days(91), None);
        assert!(matches!(too_long, Err(CampaignError::InvalidDuration(_))));
        assert!(e.price(AdType::Inline, start(), start() + Duration::days(90), None).is_ok());
    }

    #[test]
    fn test_inverted_or_empty_range() {
        let e = engine();
        assert!(matches!(
            e.price(AdType::Inline, start(), start(), None),
            Err(CampaignError::InvalidRange(_))
        ));
        assert!(matches!(
            e.price(AdType::Inline, start(), start() - Duration::days(5), None),
            Err(CampaignError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_override_replaces_price() {
        let e = engine();
        let end = start() + Duration::days(5);
        let manual = Decimal::new(1999, 2);
        assert_eq!(e.price(AdType::Popup, start(), end, Some(manual)).unwrap(), manual);
        let free = e.price(AdType::Popup, start(), end, Some(Decimal::ZERO)).unwrap();
        assert_eq!(free, Decimal::ZERO);
        // negative overrides fall back to the computed price
        assert_eq!(
            e.price(AdType::Popup, start(), end, Some(Decimal::from(-5))).unwrap(),
            Decimal::from(300)
        );
    }

    #[test]
    fn test_override_does_not_bypass_range_checks() {
        let e = engine();
        let res = e.price(AdType::Popup, start(), start() + Duration::days(1), Some(Decimal::ONE));
        assert!(matches!(res, Err(CampaignError::InvalidDuration(_))));
    }

    #[test]
    fn test_price_monotonic_in_days() {
        let e = engine();
        for ad_type in AdType::ALL {
            let mut last = Decimal::ZERO;
            for days in 3..=90 {
                let p = e.price(ad_type, start(), start() + Duration::days(days), None).unwrap();
                assert!(p >= last, "{ad_type} price dropped at {days} days");
                last = p;
            }
        }
    }
}
