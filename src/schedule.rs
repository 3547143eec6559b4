use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use time::{Date, Duration, Month, Weekday};

use crate::error::{RebalancerError, Result};

/// Which day of a calendar period a rebalance falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    End,
}

/// Periodic schedule descriptor, written the pandas way (`Q`, `2M`, `W-FRI`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Every `n` calendar days.
    Day(u32),
    /// Every `n` weekdays (Monday to Friday).
    BusinessDay(u32),
    /// Every `n` weeks on the given weekday.
    Week(u32, Weekday),
    /// Every `n` months on the first or last calendar day.
    Month(u32, Anchor),
    /// Every `n` calendar quarters.
    Quarter(u32, Anchor),
    /// Every `n` calendar years.
    Year(u32, Anchor),
}

impl Frequency {
    pub fn multiplier(&self) -> u32 {
        match *self {
            Frequency::Day(n)
            | Frequency::BusinessDay(n)
            | Frequency::Week(n, _)
            | Frequency::Month(n, _)
            | Frequency::Quarter(n, _)
            | Frequency::Year(n, _) => n,
        }
    }
}

fn parse_weekday(code: &str) -> Option<Weekday> {
    match code {
        "MON" => Some(Weekday::Monday),
        "TUE" => Some(Weekday::Tuesday),
        "WED" => Some(Weekday::Wednesday),
        "THU" => Some(Weekday::Thursday),
        "FRI" => Some(Weekday::Friday),
        "SAT" => Some(Weekday::Saturday),
        "SUN" => Some(Weekday::Sunday),
        _ => None,
    }
}

fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Monday => "MON",
        Weekday::Tuesday => "TUE",
        Weekday::Wednesday => "WED",
        Weekday::Thursday => "THU",
        Weekday::Friday => "FRI",
        Weekday::Saturday => "SAT",
        Weekday::Sunday => "SUN",
    }
}

impl FromStr for Frequency {
    type Err = RebalancerError;

    fn from_str(s: &str) -> Result<Self> {
        let descriptor = s.trim().to_ascii_uppercase();
        let split = descriptor
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| RebalancerError::config(format!("invalid rebalance frequency '{}'", s)))?;
        let (count, code) = descriptor.split_at(split);
        let n = if count.is_empty() {
            1
        } else {
            count
                .parse::<u32>()
                .map_err(|_| RebalancerError::config(format!("invalid rebalance frequency '{}'", s)))?
        };
        if n == 0 {
            return Err(RebalancerError::config(format!(
                "rebalance frequency multiplier must be positive, got '{}'",
                s
            )));
        }

        let frequency = match code {
            "D" => Frequency::Day(n),
            "B" => Frequency::BusinessDay(n),
            "W" => Frequency::Week(n, Weekday::Sunday),
            "M" | "ME" => Frequency::Month(n, Anchor::End),
            "MS" => Frequency::Month(n, Anchor::Start),
            "Q" | "QE" => Frequency::Quarter(n, Anchor::End),
            "QS" => Frequency::Quarter(n, Anchor::Start),
            "A" | "Y" | "YE" => Frequency::Year(n, Anchor::End),
            "AS" | "YS" => Frequency::Year(n, Anchor::Start),
            other => match other.strip_prefix("W-").and_then(parse_weekday) {
                Some(weekday) => Frequency::Week(n, weekday),
                None => {
                    return Err(RebalancerError::config(format!(
                        "unknown rebalance frequency '{}'",
                        s
                    )))
                }
            },
        };
        Ok(frequency)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.multiplier();
        if n > 1 {
            write!(f, "{}", n)?;
        }
        match self {
            Frequency::Day(_) => write!(f, "D"),
            Frequency::BusinessDay(_) => write!(f, "B"),
            Frequency::Week(_, weekday) => write!(f, "W-{}", weekday_code(*weekday)),
            Frequency::Month(_, Anchor::End) => write!(f, "ME"),
            Frequency::Month(_, Anchor::Start) => write!(f, "MS"),
            Frequency::Quarter(_, Anchor::End) => write!(f, "QE"),
            Frequency::Quarter(_, Anchor::Start) => write!(f, "QS"),
            Frequency::Year(_, Anchor::End) => write!(f, "YE"),
            Frequency::Year(_, Anchor::Start) => write!(f, "YS"),
        }
    }
}

/// Calendar dates on which the portfolio is due for a rebalance.
///
/// The schedule is purely calendar driven. Whether a date actually triggers a
/// rebalance is decided by the simulator, which only acts on dates that are also
/// observations in the price series.
#[derive(Debug, Clone, Default)]
pub struct RebalanceSchedule {
    dates: BTreeSet<Date>,
}

impl RebalanceSchedule {
    /// Every anchor date of `frequency` within `[start, end]`.
    ///
    /// `start` is rolled forward to the first anchor on or after it, later dates
    /// follow every `multiplier` periods.
    pub fn generate(start: Date, end: Date, frequency: Frequency) -> Self {
        let mut dates = BTreeSet::new();
        if start > end {
            return Self { dates };
        }
        match frequency {
            Frequency::Day(n) => {
                let mut next = Some(start);
                while let Some(date) = next.filter(|d| *d <= end) {
                    dates.insert(date);
                    next = date.checked_add(Duration::days(n as i64));
                }
            }
            Frequency::BusinessDay(n) => {
                let mut next = roll_to_business_day(Some(start));
                while let Some(date) = next.filter(|d| *d <= end) {
                    dates.insert(date);
                    next = (0..n).try_fold(date, |d, _| {
                        roll_to_business_day(d.checked_add(Duration::days(1)))
                    });
                }
            }
            Frequency::Week(n, weekday) => {
                let mut next = Some(start);
                while let Some(date) = next.filter(|d| d.weekday() != weekday) {
                    next = date.checked_add(Duration::days(1));
                }
                while let Some(date) = next.filter(|d| *d <= end) {
                    dates.insert(date);
                    next = date.checked_add(Duration::weeks(n as i64));
                }
            }
            Frequency::Month(n, anchor) => monthly(&mut dates, start, end, 1, n, anchor),
            Frequency::Quarter(n, anchor) => monthly(&mut dates, start, end, 3, n, anchor),
            Frequency::Year(n, anchor) => monthly(&mut dates, start, end, 12, n, anchor),
        }
        Self { dates }
    }

    pub fn from_dates(dates: impl IntoIterator<Item = Date>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    pub fn contains(&self, date: &Date) -> bool {
        self.dates.contains(date)
    }

    pub fn dates(&self) -> impl Iterator<Item = &Date> {
        self.dates.iter()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

fn is_weekend(date: Date) -> bool {
    matches!(date.weekday(), Weekday::Saturday | Weekday::Sunday)
}

/// First weekday on or after `date`, `None` past `Date::MAX`.
fn roll_to_business_day(mut date: Option<Date>) -> Option<Date> {
    while let Some(d) = date.filter(|d| is_weekend(*d)) {
        date = d.checked_add(Duration::days(1));
    }
    date
}

/// Month index counted from year 0, so that period arithmetic stays linear.
fn month_index(date: Date) -> i64 {
    date.year() as i64 * 12 + (u8::from(date.month()) as i64 - 1)
}

fn anchor_date(index: i64, anchor: Anchor) -> Option<Date> {
    let year = index.div_euclid(12) as i32;
    let month = Month::try_from((index.rem_euclid(12) + 1) as u8).ok()?;
    let day = match anchor {
        Anchor::Start => 1,
        Anchor::End => time::util::days_in_year_month(year, month),
    };
    Date::from_calendar_date(year, month, day).ok()
}

fn monthly(
    dates: &mut BTreeSet<Date>,
    start: Date,
    end: Date,
    period_months: i64,
    n: u32,
    anchor: Anchor,
) {
    // Anchor months: Jan/Apr/Jul/Oct for period starts, Mar/Jun/Sep/Dec for period ends.
    let offset = match anchor {
        Anchor::Start => 0,
        Anchor::End => period_months - 1,
    };
    let mut index = month_index(start);
    loop {
        if index.rem_euclid(12).rem_euclid(period_months) == offset {
            match anchor_date(index, anchor) {
                Some(date) if date >= start => break,
                Some(_) => {}
                None => return,
            }
        }
        index += 1;
    }

    let step = period_months * n as i64;
    while let Some(date) = anchor_date(index, anchor) {
        if date > end {
            break;
        }
        dates.insert(date);
        index += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_parse_frequency_codes() {
        assert_eq!("Q".parse::<Frequency>().unwrap(), Frequency::Quarter(1, Anchor::End));
        assert_eq!("qs".parse::<Frequency>().unwrap(), Frequency::Quarter(1, Anchor::Start));
        assert_eq!("2M".parse::<Frequency>().unwrap(), Frequency::Month(2, Anchor::End));
        assert_eq!("W-FRI".parse::<Frequency>().unwrap(), Frequency::Week(1, Weekday::Friday));
        assert_eq!("A".parse::<Frequency>().unwrap(), Frequency::Year(1, Anchor::End));
        assert!("X".parse::<Frequency>().is_err());
        assert!("0D".parse::<Frequency>().is_err());
        assert!("12".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let freq = Frequency::Week(2, Weekday::Monday);
        assert_eq!(freq.to_string(), "2W-MON");
        assert_eq!(freq.to_string().parse::<Frequency>().unwrap(), freq);
    }

    #[test]
    fn test_quarter_end_dates() {
        let schedule = RebalanceSchedule::generate(
            date!(2023 - 01 - 15),
            date!(2023 - 12 - 31),
            Frequency::Quarter(1, Anchor::End),
        );
        let dates: Vec<Date> = schedule.dates().copied().collect();
        assert_eq!(
            dates,
            vec![
                date!(2023 - 03 - 31),
                date!(2023 - 06 - 30),
                date!(2023 - 09 - 30),
                date!(2023 - 12 - 31),
            ]
        );
    }

    #[test]
    fn test_start_on_anchor_is_included() {
        let schedule = RebalanceSchedule::generate(
            date!(2023 - 03 - 31),
            date!(2023 - 07 - 01),
            Frequency::Quarter(1, Anchor::End),
        );
        assert!(schedule.contains(&date!(2023 - 03 - 31)));
        assert!(schedule.contains(&date!(2023 - 06 - 30)));
        assert_eq!(schedule.len(), 2);
    }

    #[test]
    fn test_month_end_handles_leap_year() {
        let schedule = RebalanceSchedule::generate(
            date!(2024 - 01 - 10),
            date!(2024 - 03 - 31),
            Frequency::Month(1, Anchor::End),
        );
        let dates: Vec<Date> = schedule.dates().copied().collect();
        assert_eq!(
            dates,
            vec![date!(2024 - 01 - 31), date!(2024 - 02 - 29), date!(2024 - 03 - 31)]
        );
    }

    #[test]
    fn test_multiplied_month_start() {
        let schedule = RebalanceSchedule::generate(
            date!(2023 - 01 - 02),
            date!(2023 - 12 - 31),
            Frequency::Month(4, Anchor::Start),
        );
        let dates: Vec<Date> = schedule.dates().copied().collect();
        assert_eq!(
            dates,
            vec![date!(2023 - 02 - 01), date!(2023 - 06 - 01), date!(2023 - 10 - 01)]
        );
    }

    #[test]
    fn test_year_start_and_end() {
        let ends = RebalanceSchedule::generate(
            date!(2020 - 06 - 01),
            date!(2022 - 06 - 01),
            Frequency::Year(1, Anchor::End),
        );
        assert_eq!(ends.len(), 2);
        assert!(ends.contains(&date!(2021 - 12 - 31)));

        let starts = RebalanceSchedule::generate(
            date!(2020 - 01 - 01),
            date!(2022 - 06 - 01),
            Frequency::Year(1, Anchor::Start),
        );
        assert_eq!(starts.len(), 3);
        assert!(starts.contains(&date!(2020 - 01 - 01)));
    }

    #[test]
    fn test_weekly_and_business_days() {
        // 2023-01-04 is a Wednesday.
        let weekly = RebalanceSchedule::generate(
            date!(2023 - 01 - 04),
            date!(2023 - 01 - 31),
            Frequency::Week(1, Weekday::Friday),
        );
        let dates: Vec<Date> = weekly.dates().copied().collect();
        assert_eq!(dates[0], date!(2023 - 01 - 06));
        assert_eq!(dates.len(), 4);

        let business = RebalanceSchedule::generate(
            date!(2023 - 01 - 06),
            date!(2023 - 01 - 10),
            Frequency::BusinessDay(1),
        );
        let dates: Vec<Date> = business.dates().copied().collect();
        assert_eq!(
            dates,
            vec![date!(2023 - 01 - 06), date!(2023 - 01 - 09), date!(2023 - 01 - 10)]
        );
    }

    #[test]
    fn test_generation_stops_at_max_date() {
        let end = date!(9999 - 12 - 31);
        let daily = RebalanceSchedule::generate(date!(9999 - 12 - 30), end, Frequency::Day(1));
        assert_eq!(daily.len(), 2);
        assert!(daily.contains(&end));

        // 9999-12-31 is a Friday.
        let business = RebalanceSchedule::generate(date!(9999 - 12 - 29), end, Frequency::BusinessDay(1));
        assert_eq!(business.len(), 3);

        let weekly = RebalanceSchedule::generate(date!(9999 - 12 - 20), end, Frequency::Week(2, Weekday::Monday));
        assert_eq!(weekly.len(), 1);
        assert!(weekly.contains(&date!(9999 - 12 - 20)));

        // No Sunday left on or after the start date.
        let sundays = RebalanceSchedule::generate(date!(9999 - 12 - 27), end, Frequency::Week(1, Weekday::Sunday));
        assert!(sundays.is_empty());

        let month_ends = RebalanceSchedule::generate(date!(9999 - 11 - 15), end, Frequency::Month(1, Anchor::End));
        assert_eq!(month_ends.len(), 2);
    }

    #[test]
    fn test_daily_and_empty_range() {
        let daily = RebalanceSchedule::generate(
            date!(2023 - 01 - 01),
            date!(2023 - 01 - 07),
            Frequency::Day(3),
        );
        assert_eq!(daily.len(), 3);

        let empty = RebalanceSchedule::generate(
            date!(2023 - 02 - 01),
            date!(2023 - 01 - 01),
            Frequency::Day(1),
        );
        assert!(empty.is_empty());
    }
}
