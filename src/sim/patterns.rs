//! Time-of-day, weekly, seasonal, and weather patterns
//!
//! The hourly curve is a step function so that counter progression can
//! integrate it exactly: whole weeks and days collapse to precomputed
//! sums, leaving at most a few dozen loop steps for any uptime.

use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::DeviceType;

/// Hourly traffic factors: trough near 03:00, business-hours plateau,
/// evening peak, late-evening tail.
const HOURLY_FACTORS: [f64; 24] = [
    0.55, 0.45, 0.35, 0.30, 0.35, 0.45, // 00-05
    0.60, 0.80, 0.95, 1.00, 1.05, 1.05, // 06-11
    1.00, 1.00, 1.05, 1.05, 1.10, 1.15, // 12-17
    1.25, 1.40, 1.40, 1.25, 0.95, 0.70, // 18-23
];

const WEEKEND_RESIDENTIAL: f64 = 1.10;
const WEEKEND_ENTERPRISE: f64 = 0.85;

/// Daily traffic factor for the hour containing `now`, in `[0.3, 1.6]`.
pub fn daily_factor(now: DateTime<Utc>) -> f64 {
    HOURLY_FACTORS[now.hour() as usize]
}

/// Weekday baseline 1.0; weekends dip for enterprise gear and rise
/// slightly for residential.
pub fn weekly_factor(now: DateTime<Utc>, device_type: &DeviceType) -> f64 {
    let weekday = now.weekday().num_days_from_monday();
    if weekday < 5 {
        1.0
    } else if device_type.is_residential() {
        WEEKEND_RESIDENTIAL
    } else {
        WEEKEND_ENTERPRISE
    }
}

/// Seasonal outdoor temperature offset in `[-15, +15]` degrees, peaking
/// in mid-July.
pub fn seasonal_temperature_offset(now: DateTime<Utc>) -> f64 {
    let day_of_year = f64::from(now.ordinal());
    let phase = 2.0 * std::f64::consts::PI * (day_of_year - 196.0) / 365.0;
    15.0 * phase.cos()
}

/// Weather factor in `[0.7, 1.15]`, mostly near 1.0. The same six-hour
/// bucket and device seed always produce the same weather.
pub fn weather_variation(now: DateTime<Utc>, device_seed: u64) -> f64 {
    let bucket = now.timestamp().div_euclid(6 * 3600) as u64;
    let mut rng = StdRng::seed_from_u64(device_seed ^ bucket.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    let roll: f64 = rng.gen();
    let factor = if roll < 0.08 {
        // storm or heavy rain fade
        0.70 + rng.gen::<f64>() * 0.20
    } else if roll > 0.95 {
        // unusually clear conditions
        1.05 + rng.gen::<f64>() * 0.10
    } else {
        0.97 + rng.gen::<f64>() * 0.08
    };
    factor.clamp(0.70, 1.15)
}

/// Integral of `daily_factor × weekly_factor` over `[boot, now]`, in
/// seconds. Monotone in `now` and pure, so counters derived from it never
/// run backwards.
pub fn weighted_traffic_seconds(
    boot: DateTime<Utc>,
    now: DateTime<Utc>,
    device_type: &DeviceType,
) -> f64 {
    if now <= boot {
        return 0.0;
    }

    let daily_integral: f64 = HOURLY_FACTORS.iter().sum::<f64>() * 3600.0;
    let weekend = if device_type.is_residential() {
        WEEKEND_RESIDENTIAL
    } else {
        WEEKEND_ENTERPRISE
    };
    let week_integral = daily_integral * (5.0 + 2.0 * weekend);

    let total_secs = (now - boot).num_seconds();
    let full_weeks = total_secs / (7 * 86_400);
    let mut acc = full_weeks as f64 * week_integral;

    // walk the remainder day by day, then hour by hour
    let mut cursor = boot + chrono::Duration::seconds(full_weeks * 7 * 86_400);
    while cursor < now {
        let hour_start = cursor;
        let next_hour = hour_boundary_after(cursor);
        let segment_end = if next_hour < now { next_hour } else { now };
        let secs = (segment_end - hour_start).num_milliseconds() as f64 / 1000.0;
        acc += secs * daily_factor(hour_start) * weekly_factor(hour_start, device_type);
        cursor = segment_end;
    }
    acc
}

fn hour_boundary_after(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs_into_hour = i64::from(t.minute()) * 60 + i64::from(t.second());
    t + chrono::Duration::seconds(3600 - secs_into_hour)
        - chrono::Duration::nanoseconds(i64::from(t.nanosecond()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        // 2024-06-05 is a Wednesday
        Utc.with_ymd_and_hms(2024, 6, 5, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_daily_factor_bounds_and_shape() {
        for hour in 0..24 {
            let f = daily_factor(at(hour));
            assert!((0.3..=1.6).contains(&f), "hour {hour} factor {f}");
        }
        // trough at 03:00, evening peak, late tail
        assert!(daily_factor(at(3)) < daily_factor(at(10)));
        assert!(daily_factor(at(19)) > daily_factor(at(10)));
        assert!((daily_factor(at(3)) - 0.30).abs() < 1e-9);
        assert!((daily_factor(at(19)) - 1.40).abs() < 1e-9);
        assert!(daily_factor(at(23)) < 0.75);
    }

    #[test]
    fn test_weekly_factor_weekend_split() {
        let wednesday = Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap();
        let saturday = Utc.with_ymd_and_hms(2024, 6, 8, 12, 0, 0).unwrap();

        assert_eq!(weekly_factor(wednesday, &DeviceType::CableModem), 1.0);
        assert_eq!(weekly_factor(wednesday, &DeviceType::Switch), 1.0);
        assert!(weekly_factor(saturday, &DeviceType::CableModem) > 1.0);
        assert!(weekly_factor(saturday, &DeviceType::Switch) < 1.0);
    }

    #[test]
    fn test_seasonal_offset_bounds() {
        for month in 1..=12 {
            let t = Utc.with_ymd_and_hms(2024, month, 15, 12, 0, 0).unwrap();
            let offset = seasonal_temperature_offset(t);
            assert!((-15.0..=15.0).contains(&offset));
        }
        let july = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();
        let january = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        assert!(seasonal_temperature_offset(july) > 10.0);
        assert!(seasonal_temperature_offset(january) < -10.0);
    }

    #[test]
    fn test_weather_variation_bounds_and_determinism() {
        let t = Utc.with_ymd_and_hms(2024, 6, 5, 9, 0, 0).unwrap();
        let mut near_one = 0;
        for seed in 0..200u64 {
            let w = weather_variation(t, seed);
            assert!((0.70..=1.15).contains(&w));
            assert_eq!(w, weather_variation(t, seed));
            if (0.9..=1.1).contains(&w) {
                near_one += 1;
            }
        }
        // mostly clustered near 1.0
        assert!(near_one > 150);

        // same bucket, same weather; different bucket may differ
        let same_bucket = t + chrono::Duration::hours(1);
        assert_eq!(weather_variation(t, 7), weather_variation(same_bucket, 7));
    }

    #[test]
    fn test_weighted_seconds_monotone() {
        let boot = Utc.with_ymd_and_hms(2024, 6, 5, 2, 15, 0).unwrap();
        let mut last = 0.0;
        for minutes in [1i64, 30, 90, 600, 3000, 20_000, 200_000] {
            let now = boot + chrono::Duration::minutes(minutes);
            let w = weighted_traffic_seconds(boot, now, &DeviceType::CableModem);
            assert!(w > last, "minutes={minutes}: {w} <= {last}");
            last = w;
        }
    }

    #[test]
    fn test_weighted_seconds_matches_flat_hour() {
        // entirely inside one hour: integral is factor × elapsed
        let boot = Utc.with_ymd_and_hms(2024, 6, 5, 9, 0, 0).unwrap();
        let now = boot + chrono::Duration::seconds(600);
        let w = weighted_traffic_seconds(boot, now, &DeviceType::Switch);
        let expected = 600.0 * daily_factor(boot);
        assert!((w - expected).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_seconds_full_week_consistency() {
        let boot = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap(); // Monday
        let now = boot + chrono::Duration::days(7);
        let whole = weighted_traffic_seconds(boot, now, &DeviceType::Router);

        // summing day-by-day must agree with the closed-form week hop
        let mut by_day = 0.0;
        for d in 0..7 {
            let a = boot + chrono::Duration::days(d);
            let b = boot + chrono::Duration::days(d + 1);
            by_day += weighted_traffic_seconds(a, b, &DeviceType::Router);
        }
        assert!((whole - by_day).abs() < 1e-3);
    }

    #[test]
    fn test_weighted_seconds_zero_for_reversed_range() {
        let boot = Utc.with_ymd_and_hms(2024, 6, 5, 9, 0, 0).unwrap();
        assert_eq!(
            weighted_traffic_seconds(boot, boot - chrono::Duration::hours(1), &DeviceType::Cmts),
            0.0
        );
    }
}
