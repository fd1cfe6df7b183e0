//! Target URL construction
//!
//! Pure function boundary: the booking site serves slots in the 10:00-16:00
//! band from a different page than morning/evening slots, so the start hour
//! selects one of two URL templates.

use super::{Court, SlotDuration};
use chrono::{NaiveDate, NaiveTime, Timelike};

const BASE_URL: &str = "https://booking.court-reserve.example";

/// Hours served by the daytime template, upper bound exclusive.
const DAYTIME_BAND: std::ops::Range<u32> = 10..16;

/// Build the reservation page URL for one refresh pass.
///
/// Deterministic and side-effect free: identical inputs always produce the
/// identical string.
pub fn build_target_url(
    date: NaiveDate,
    start_time: NaiveTime,
    duration: SlotDuration,
    court: Court,
) -> String {
    let template = if DAYTIME_BAND.contains(&start_time.hour()) {
        "daytime"
    } else {
        "prime"
    };
    format!(
        "{BASE_URL}/book/{template}?court={}&date={}&start={}&minutes={}",
        court.number(),
        date.format("%Y-%m-%d"),
        urlencoding::encode(&start_time.format("%H:%M").to_string()),
        duration.minutes()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, 14).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn identical_inputs_yield_identical_urls() {
        let a = build_target_url(date(), time(14, 30), SlotDuration::Min90, Court::Court2);
        let b = build_target_url(date(), time(14, 30), SlotDuration::Min90, Court::Court2);
        assert_eq!(a, b);
    }

    #[test]
    fn daytime_band_selects_daytime_template() {
        let url = build_target_url(date(), time(10, 0), SlotDuration::Min60, Court::Court1);
        assert!(url.contains("/book/daytime?"));
        let url = build_target_url(date(), time(15, 30), SlotDuration::Min60, Court::Court1);
        assert!(url.contains("/book/daytime?"));
    }

    #[test]
    fn hours_outside_band_select_prime_template() {
        let url = build_target_url(date(), time(9, 30), SlotDuration::Min60, Court::Court1);
        assert!(url.contains("/book/prime?"));
        let url = build_target_url(date(), time(16, 0), SlotDuration::Min60, Court::Court1);
        assert!(url.contains("/book/prime?"));
        let url = build_target_url(date(), time(20, 0), SlotDuration::Min60, Court::Court1);
        assert!(url.contains("/book/prime?"));
    }

    #[test]
    fn query_parameters_are_encoded() {
        let url = build_target_url(date(), time(14, 30), SlotDuration::Min90, Court::Court3);
        assert_eq!(
            url,
            "https://booking.court-reserve.example/book/daytime?court=3&date=2026-09-14&start=14%3A30&minutes=90"
        );
    }
}
