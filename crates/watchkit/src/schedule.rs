use chrono::{Datelike, Timelike};

/// True when at least `secs` elapsed between `last` and `now` (unix seconds).
/// Equality counts: a check at the exact boundary is due.
pub fn interval_elapsed(last: i64, now: i64, secs: i64) -> bool {
    now - last >= secs
}

/// Wall-clock schedule: five (min,max) ranges for minute, hour, day of month,
/// month and weekday (0 = Sunday). An open field matches anything. A module
/// carrying one of these ignores plain interval timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cron {
    ranges: [Option<(u32, u32)>; 5],
    /// Ticks to hold the schedule down after a run, so a minute-wide range
    /// cannot re-fire within the same minute.
    pub interval: u32,
    guard_until: i64,
}

fn parse_field(field: &str) -> Option<(u32, u32)> {
    match field.split_once('-') {
        Some((a, b)) => {
            let a: u32 = a.trim().parse().ok()?;
            let b: u32 = b.trim().parse().ok()?;
            Some(if a <= b { (a, b) } else { (b, a) })
        }
        None => {
            let n: u32 = field.trim().parse().ok()?;
            Some((n, n))
        }
    }
}

impl Cron {
    /// Parse five whitespace-separated fields, each `*`, `N` or `N-M`.
    pub fn parse(s: &str) -> Option<Self> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 5 {
            return None;
        }
        let mut ranges = [None; 5];
        for (slot, field) in ranges.iter_mut().zip(fields) {
            *slot = match field {
                "*" => None,
                _ => Some(parse_field(field)?),
            };
        }
        Some(Self { ranges, interval: 1, guard_until: 0 })
    }

    /// Whether the wall-clock instant falls inside every configured range.
    pub fn matches_at<T: Datelike + Timelike>(&self, t: &T) -> bool {
        let fields =
            [t.minute(), t.hour(), t.day(), t.month(), t.weekday().num_days_from_sunday()];
        self.ranges
            .iter()
            .zip(fields)
            .all(|(range, v)| range.is_none_or(|(lo, hi)| v >= lo && v <= hi))
    }

    /// Due when the guard expired and the pattern matches `t`.
    pub fn is_due<T: Datelike + Timelike>(&self, t: &T, now: i64) -> bool {
        now >= self.guard_until && self.matches_at(t)
    }

    /// Arm the guard after a run. Held down for `interval` ticks of `base`
    /// seconds, at least one minute.
    pub fn mark_run(&mut self, now: i64, base: u64) {
        let hold = (i64::from(self.interval.max(1)) * base as i64).max(60);
        self.guard_until = now + hold;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, 0).unwrap()
    }

    #[test]
    fn test_interval_elapsed_boundary() {
        assert!(!interval_elapsed(100, 199, 100));
        assert!(interval_elapsed(100, 200, 100));
        assert!(interval_elapsed(100, 201, 100));
    }

    #[test]
    fn test_parse_wildcards() {
        let cron = Cron::parse("* * * * *").unwrap();
        assert!(cron.matches_at(&at(2026, 8, 25, 3, 59)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Cron::parse("* * * *").is_none());
        assert!(Cron::parse("a * * * *").is_none());
        assert!(Cron::parse("1-2-3 * * * *").is_none());
        assert!(Cron::parse("").is_none());
    }

    #[test]
    fn test_business_hours_pattern() {
        let cron = Cron::parse("0-30 9-17 * * 1-5").unwrap();
        // Tuesday inside the window
        assert!(cron.matches_at(&at(2026, 8, 25, 9, 15)));
        // minute out of range
        assert!(!cron.matches_at(&at(2026, 8, 25, 9, 45)));
        // Sunday
        assert!(!cron.matches_at(&at(2026, 8, 23, 9, 15)));
    }

    #[test]
    fn test_weekday_zero_is_sunday() {
        let cron = Cron::parse("* * * * 0").unwrap();
        assert!(cron.matches_at(&at(2026, 8, 23, 12, 0)));
        assert!(!cron.matches_at(&at(2026, 8, 24, 12, 0)));
    }

    #[test]
    fn test_reversed_range_is_normalized() {
        let cron = Cron::parse("30-10 * * * *").unwrap();
        assert!(cron.matches_at(&at(2026, 8, 25, 0, 20)));
        assert!(!cron.matches_at(&at(2026, 8, 25, 0, 40)));
    }

    #[test]
    fn test_guard_holds_after_run() {
        let mut cron = Cron::parse("* * * * *").unwrap();
        let t = at(2026, 8, 25, 10, 0);
        assert!(cron.is_due(&t, 1000));
        cron.mark_run(1000, 1);
        // one-tick interval still holds for the minimum of a minute
        assert!(!cron.is_due(&t, 1059));
        assert!(cron.is_due(&t, 1060));
    }

    #[test]
    fn test_guard_scales_with_interval() {
        let mut cron = Cron::parse("* * * * *").unwrap();
        cron.interval = 5;
        cron.mark_run(0, 60);
        let t = at(2026, 8, 25, 10, 0);
        assert!(!cron.is_due(&t, 299));
        assert!(cron.is_due(&t, 300));
    }
}
