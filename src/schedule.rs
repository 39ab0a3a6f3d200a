use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

/// Scheduling days. Sunday is never a school day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 6] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MONDAY" => Some(Self::Monday),
            "TUESDAY" => Some(Self::Tuesday),
            "WEDNESDAY" => Some(Self::Wednesday),
            "THURSDAY" => Some(Self::Thursday),
            "FRIDAY" => Some(Self::Friday),
            "SATURDAY" => Some(Self::Saturday),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "MONDAY",
            Self::Tuesday => "TUESDAY",
            Self::Wednesday => "WEDNESDAY",
            Self::Thursday => "THURSDAY",
            Self::Friday => "FRIDAY",
            Self::Saturday => "SATURDAY",
        }
    }

    pub fn from_weekday(w: Weekday) -> Option<Self> {
        match w {
            Weekday::Mon => Some(Self::Monday),
            Weekday::Tue => Some(Self::Tuesday),
            Weekday::Wed => Some(Self::Wednesday),
            Weekday::Thu => Some(Self::Thursday),
            Weekday::Fri => Some(Self::Friday),
            Weekday::Sat => Some(Self::Saturday),
            Weekday::Sun => None,
        }
    }

    pub fn day_group(self) -> DayGroup {
        match self {
            Self::Friday => DayGroup::Friday,
            _ => DayGroup::Regular,
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DayOfWeek {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl ToSql for DayOfWeek {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DayOfWeek {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).ok_or_else(|| FromSqlError::Other(format!("bad day_of_week: {s}").into()))
    }
}

const EPOCH_PREFIX: &str = "1970-01-01T";
const EPOCH_SUFFIX: &str = ":00Z";

/// Minute-precision time of day, exchanged as `HH:mm` and stored pinned to
/// the epoch date (`1970-01-01THH:mm:00Z`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WallTime(NaiveTime);

impl WallTime {
    /// Strict `HH:mm`, 00-23 hours, 00-59 minutes.
    pub fn parse(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() != 5 || b[2] != b':' {
            return None;
        }
        if !b[..2].iter().chain(&b[3..]).all(u8::is_ascii_digit) {
            return None;
        }
        let hour: u32 = s[..2].parse().ok()?;
        let minute: u32 = s[3..].parse().ok()?;
        NaiveTime::from_hms_opt(hour, minute, 0).map(WallTime)
    }

    pub fn from_storage(s: &str) -> Option<Self> {
        let hm = s
            .strip_prefix(EPOCH_PREFIX)
            .and_then(|rest| rest.strip_suffix(EPOCH_SUFFIX))
            .unwrap_or(s);
        Self::parse(hm)
    }

    pub fn to_storage(self) -> String {
        format!("{EPOCH_PREFIX}{self}{EPOCH_SUFFIX}")
    }
}

impl fmt::Display for WallTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl Serialize for WallTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WallTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        WallTime::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("time must be HH:mm, got {s:?}")))
    }
}

impl ToSql for WallTime {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_storage()))
    }
}

impl FromSql for WallTime {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::from_storage(s).ok_or_else(|| FromSqlError::Other(format!("bad wall time: {s}").into()))
    }
}

/// Half-open `[start, end)` time range; always `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: WallTime,
    pub end: WallTime,
}

impl Interval {
    pub fn new(start: WallTime, end: WallTime) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Semester {
    #[serde(rename = "SEMESTER_1")]
    First,
    #[serde(rename = "SEMESTER_2")]
    Second,
}

impl Semester {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SEMESTER_1" => Some(Self::First),
            "SEMESTER_2" => Some(Self::Second),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::First => "SEMESTER_1",
            Self::Second => "SEMESTER_2",
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Semester {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Semester {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s).ok_or_else(|| FromSqlError::Other(format!("bad semester: {s}").into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterSpan {
    pub start_month: u32,
    pub start_day: u32,
    pub end_month: u32,
    pub end_day: u32,
}

impl SemesterSpan {
    pub fn resolve(&self, year: i32) -> Option<DateRange> {
        let start = NaiveDate::from_ymd_opt(year, self.start_month, self.start_day)?;
        let end = NaiveDate::from_ymd_opt(year, self.end_month, self.end_day)?;
        (start <= end).then_some(DateRange { start, end })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Semesters {
    #[serde(rename = "SEMESTER_1")]
    pub first: SemesterSpan,
    #[serde(rename = "SEMESTER_2")]
    pub second: SemesterSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayGroup {
    /// Monday-Thursday and Saturday.
    Regular,
    Friday,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionWindow {
    pub day_group: DayGroup,
    pub start: WallTime,
    pub end: WallTime,
}

/// Grid windows and semester calendar for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePolicy {
    pub windows: Vec<SessionWindow>,
    pub semesters: Semesters,
}

const DEFAULT_WINDOWS: [(DayGroup, &str, &str); 10] = [
    (DayGroup::Regular, "07:00", "08:00"),
    (DayGroup::Regular, "08:00", "09:30"),
    // 09:30-10:00 break
    (DayGroup::Regular, "10:00", "11:30"),
    (DayGroup::Regular, "11:30", "12:30"),
    // 12:30-13:00 break
    (DayGroup::Regular, "13:00", "14:00"),
    (DayGroup::Regular, "14:00", "15:00"),
    (DayGroup::Friday, "07:00", "08:00"),
    (DayGroup::Friday, "08:00", "09:30"),
    (DayGroup::Friday, "10:00", "11:00"),
    (DayGroup::Friday, "11:00", "11:30"),
];

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            windows: DEFAULT_WINDOWS
                .iter()
                .filter_map(|&(day_group, start, end)| {
                    Some(SessionWindow {
                        day_group,
                        start: WallTime::parse(start)?,
                        end: WallTime::parse(end)?,
                    })
                })
                .collect(),
            semesters: Semesters {
                first: SemesterSpan {
                    start_month: 7,
                    start_day: 1,
                    end_month: 12,
                    end_day: 31,
                },
                second: SemesterSpan {
                    start_month: 1,
                    start_day: 1,
                    end_month: 6,
                    end_day: 30,
                },
            },
        }
    }
}

impl SchedulePolicy {
    pub fn windows_for(&self, day: DayOfWeek) -> impl Iterator<Item = Interval> + '_ {
        let group = day.day_group();
        self.windows
            .iter()
            .filter(move |w| w.day_group == group)
            .filter_map(|w| Interval::new(w.start, w.end))
    }

    pub fn semester_range(&self, semester: Semester, year: i32) -> Option<DateRange> {
        match semester {
            Semester::First => self.semesters.first.resolve(year),
            Semester::Second => self.semesters.second.resolve(year),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut by_group: Vec<(DayGroup, Interval)> = Vec::with_capacity(self.windows.len());
        for w in &self.windows {
            let Some(iv) = Interval::new(w.start, w.end) else {
                return Err(format!("window {}-{} must end after it starts", w.start, w.end));
            };
            if let Some((_, clash)) = by_group
                .iter()
                .find(|(g, other)| *g == w.day_group && other.overlaps(&iv))
            {
                return Err(format!(
                    "window {}-{} overlaps {}-{}",
                    w.start, w.end, clash.start, clash.end
                ));
            }
            by_group.push((w.day_group, iv));
        }

        let regular = by_group.iter().filter(|(g, _)| *g == DayGroup::Regular).count();
        let friday = by_group.len() - regular;
        if regular == 0 {
            return Err("at least one REGULAR window is required".into());
        }
        if friday >= regular {
            return Err("FRIDAY must have fewer windows than REGULAR".into());
        }

        // Leap and non-leap year, so a Feb 29 boundary cannot slip through.
        for year in [2001, 2004] {
            let (Some(a), Some(b)) = (
                self.semesters.first.resolve(year),
                self.semesters.second.resolve(year),
            ) else {
                return Err(format!("semester dates are not valid in {}", year));
            };
            let (early, late) = if a.start <= b.start { (a, b) } else { (b, a) };
            let covers = Some(early.start) == NaiveDate::from_ymd_opt(year, 1, 1)
                && Some(late.end) == NaiveDate::from_ymd_opt(year, 12, 31)
                && early.end.succ_opt() == Some(late.start);
            if !covers {
                return Err(
                    "semesters must split the calendar year into two adjacent, non-overlapping ranges"
                        .into(),
                );
            }
        }
        Ok(())
    }
}

/// Every `(key, date)` in `range` whose weekday matches the slot's day.
pub fn occurrences<K: Clone>(slots: &[(K, DayOfWeek)], range: DateRange) -> Vec<(K, NaiveDate)> {
    let mut out = Vec::new();
    for date in range.days() {
        let Some(day) = DayOfWeek::from_weekday(date.weekday()) else {
            continue;
        };
        for (key, slot_day) in slots {
            if *slot_day == day {
                out.push((key.clone(), date));
            }
        }
    }
    out
}

/// Proposed keys minus the ones already stored, first occurrence wins.
pub fn missing_keys<K, I>(proposed: I, existing: &HashSet<K>) -> Vec<K>
where
    K: Eq + Hash + Clone,
    I: IntoIterator<Item = K>,
{
    let mut seen = HashSet::new();
    proposed
        .into_iter()
        .filter(|k| !existing.contains(k) && seen.insert(k.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> WallTime {
        WallTime::parse(s).expect("valid time")
    }

    fn window(day_group: DayGroup, start: (u32, u32), end: (u32, u32)) -> SessionWindow {
        let wt = |(h, m): (u32, u32)| WallTime(NaiveTime::from_hms_opt(h, m, 0).expect("valid time"));
        SessionWindow { day_group, start: wt(start), end: wt(end) }
    }

    fn iv(a: &str, b: &str) -> Interval {
        Interval::new(t(a), t(b)).expect("valid interval")
    }

    #[test]
    fn wall_time_parse_is_strict() {
        assert_eq!(t("08:00").to_string(), "08:00");
        assert_eq!(t("23:59").to_string(), "23:59");
        assert!(WallTime::parse("8:00").is_none());
        assert!(WallTime::parse("24:00").is_none());
        assert!(WallTime::parse("12:60").is_none());
        assert!(WallTime::parse("12-30").is_none());
        assert!(WallTime::parse("+1:30").is_none());
    }

    #[test]
    fn wall_time_storage_is_epoch_pinned() {
        let v = t("09:30");
        assert_eq!(v.to_storage(), "1970-01-01T09:30:00Z");
        assert_eq!(WallTime::from_storage("1970-01-01T09:30:00Z"), Some(v));
        assert_eq!(WallTime::from_storage("09:30"), Some(v));
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        assert!(!iv("07:00", "08:00").overlaps(&iv("08:00", "09:00")));
        assert!(iv("07:30", "08:30").overlaps(&iv("07:00", "08:00")));
        assert!(iv("07:30", "08:30").overlaps(&iv("08:00", "09:00")));
        assert!(iv("07:00", "10:00").overlaps(&iv("08:00", "09:00")));
        assert!(Interval::new(t("09:00"), t("09:00")).is_none());
        assert!(Interval::new(t("10:00"), t("09:00")).is_none());
    }

    #[test]
    fn sunday_is_not_a_scheduling_day() {
        assert_eq!(DayOfWeek::from_weekday(Weekday::Sun), None);
        assert_eq!(DayOfWeek::parse("SUNDAY"), None);
        assert_eq!(DayOfWeek::parse("monday"), None);
        assert_eq!(DayOfWeek::parse("FRIDAY"), Some(DayOfWeek::Friday));
    }

    #[test]
    fn default_policy_is_valid_and_friday_is_shorter() {
        let p = SchedulePolicy::default();
        p.validate().expect("default policy valid");
        assert_eq!(p.windows.len(), DEFAULT_WINDOWS.len());
        assert_eq!(p.windows[0].start.to_string(), "07:00");
        assert_eq!(p.windows[9].end.to_string(), "11:30");
        assert_eq!(p.windows_for(DayOfWeek::Monday).count(), 6);
        assert_eq!(p.windows_for(DayOfWeek::Saturday).count(), 6);
        assert_eq!(p.windows_for(DayOfWeek::Friday).count(), 4);
    }

    #[test]
    fn default_semesters_cover_the_year() {
        let p = SchedulePolicy::default();
        let first = p.semester_range(Semester::First, 2025).expect("first");
        let second = p.semester_range(Semester::Second, 2025).expect("second");
        assert_eq!(first.start, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        assert_eq!(first.end, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(second.start, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(second.end, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        assert_eq!(first.days().count() + second.days().count(), 365);
    }

    #[test]
    fn validate_rejects_gap_between_semesters() {
        let mut p = SchedulePolicy::default();
        p.semesters.second.end_day = 29;
        assert!(p.validate().is_err());
    }

    #[test]
    fn validate_rejects_overlapping_windows_in_group() {
        let mut p = SchedulePolicy::default();
        p.windows.push(window(DayGroup::Regular, (7, 30), (8, 30)));
        let e = p.validate().expect_err("overlap");
        assert!(e.contains("overlaps"), "{e}");
    }

    #[test]
    fn validate_rejects_friday_not_shorter() {
        let mut p = SchedulePolicy::default();
        p.windows.retain(|w| w.day_group == DayGroup::Friday);
        p.windows.push(window(DayGroup::Regular, (7, 0), (8, 0)));
        assert!(p.validate().is_err());
    }

    #[test]
    fn policy_json_uses_hh_mm_and_semester_tags() {
        let v = serde_json::to_value(SchedulePolicy::default()).expect("to json");
        assert_eq!(v["windows"][0]["dayGroup"], "REGULAR");
        assert_eq!(v["windows"][0]["start"], "07:00");
        assert_eq!(v["semesters"]["SEMESTER_1"]["startMonth"], 7);
        let back: SchedulePolicy = serde_json::from_value(v).expect("from json");
        assert_eq!(back, SchedulePolicy::default());
    }

    #[test]
    fn occurrences_land_on_matching_weekdays() {
        let range = SchedulePolicy::default()
            .semester_range(Semester::First, 2025)
            .expect("range");
        let hits = occurrences(&[("tue", DayOfWeek::Tuesday)], range);
        assert_eq!(hits.len(), 27);
        assert!(hits.iter().all(|(_, d)| d.weekday() == Weekday::Tue));
        assert_eq!(hits[0].1, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
    }

    #[test]
    fn missing_keys_is_a_set_difference() {
        let existing: HashSet<i32> = [2, 4].into_iter().collect();
        assert_eq!(missing_keys(vec![1, 2, 3, 3, 4, 5], &existing), vec![1, 3, 5]);
        assert!(missing_keys(vec![2, 4], &existing).is_empty());
    }
}
