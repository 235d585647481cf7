use crate::{Level, Variable};
use std::fmt;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, Duration,
    OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

/// GFS runs four cycles a day.
pub const CYCLE_HOURS: u16 = 6;

/// Last forecast hour published for the 0.25° GFS.
pub const MAX_FORECAST_HOUR: u16 = 384;

/// Hourly output stops here, later leads are 3-hourly.
const HOURLY_UNTIL: u16 = 120;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DateError {
    #[error("unrecognised date '{0}', expected an ISO-8601 date or date-time")]
    Unrecognised(String),
}

/// One model initialization and the forecast hour read from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelRun {
    pub init: OffsetDateTime,
    pub fxx: u16,
}

impl ModelRun {
    pub fn valid_time(&self) -> OffsetDateTime {
        self.init + Duration::hours(i64::from(self.fxx))
    }

    /// The same valid time read `steps` cycles earlier.
    fn earlier(&self, steps: u16) -> Option<ModelRun> {
        let extra = steps.checked_mul(CYCLE_HOURS)?;
        Some(ModelRun {
            init: self.init - Duration::hours(i64::from(extra)),
            fxx: self.fxx.checked_add(extra)?,
        })
    }

    /// `YYYYMMDDHH` of the initialization.
    pub fn init_stamp(&self) -> String {
        format!(
            "{:04}{:02}{:02}{:02}",
            self.init.year(),
            u8::from(self.init.month()),
            self.init.day(),
            self.init.hour()
        )
    }

    /// `YYYY-MM-DD HH:MM:SS` reference time written into variable headers.
    pub fn ref_time(&self) -> String {
        format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.init.year(),
            u8::from(self.init.month()),
            self.init.day(),
            self.init.hour(),
            self.init.minute(),
            self.init.second()
        )
    }
}

impl fmt::Display for ModelRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} f{:03}", self.init_stamp(), self.fxx)
    }
}

/// Identifies one cached artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForecastKey {
    pub variable: Variable,
    pub level: Level,
    pub run: ModelRun,
}

impl ForecastKey {
    pub fn new(variable: Variable, level: Level, run: ModelRun) -> Self {
        Self {
            variable,
            level,
            run,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "gfs_{}_{}_{}_f{:03}.json",
            self.variable,
            self.level.descriptor(),
            self.run.init_stamp(),
            self.run.fxx
        )
    }
}

impl fmt::Display for ForecastKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.variable, self.level, self.run)
    }
}

fn truncate_to_hour(t: OffsetDateTime) -> OffsetDateTime {
    t - Duration::minutes(i64::from(t.minute()))
        - Duration::seconds(i64::from(t.second()))
        - Duration::nanoseconds(i64::from(t.nanosecond()))
}

/// Map a requested valid time onto the latest cycle that covers it.
///
/// A target on a cycle hour reads the analysis (f000); otherwise the offset
/// into the cycle becomes the forecast hour. Variables that do not exist at
/// analysis time add their minimum lead on top.
pub fn resolve(target: OffsetDateTime, variable: Variable) -> ModelRun {
    let valid = truncate_to_hour(target.to_offset(UtcOffset::UTC));
    let fxx = u16::from(valid.hour()) % CYCLE_HOURS + variable.min_lead_hours();
    ModelRun {
        init: valid - Duration::hours(i64::from(fxx)),
        fxx,
    }
}

fn is_published(fxx: u16) -> bool {
    fxx <= HOURLY_UNTIL || (fxx <= MAX_FORECAST_HOUR && fxx % 3 == 0)
}

/// The primary run followed by earlier cycles for the same valid time.
///
/// At most `attempts` runs are returned; runs past the model horizon are skipped.
pub fn fallback_runs(target: OffsetDateTime, variable: Variable, attempts: usize) -> Vec<ModelRun> {
    let primary = resolve(target, variable);
    (0..attempts.max(1))
        .map_while(|step| primary.earlier(u16::try_from(step).ok()?))
        .take_while(|run| run.fxx <= MAX_FORECAST_HOUR)
        .filter(|run| is_published(run.fxx))
        .collect()
}

/// Parse the timestamp sent by the extension.
///
/// Accepts RFC 3339, ISO-8601 date-times with a `T` or space separator,
/// optional minutes/seconds/fractions and an offset with or without a colon,
/// and bare dates. Naive values are UTC.
pub fn parse_request_date(raw: &str) -> Result<OffsetDateTime, DateError> {
    let trimmed = raw.trim();
    let unrecognised = || DateError::Unrecognised(raw.to_string());

    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(parsed.to_offset(UtcOffset::UTC));
    }

    let mut normalised = trimmed.replacen(' ', "T", 1);
    if normalised.ends_with('Z') || normalised.ends_with('z') {
        normalised.pop();
    }

    let with_offset = [
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
        ),
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory]:[offset_minute]"
        ),
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute][offset_hour sign:mandatory]:[offset_minute]"
        ),
        format_description!(
            "[year]-[month]-[day]T[hour][offset_hour sign:mandatory]:[offset_minute]"
        ),
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
        ),
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
        ),
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute][offset_hour sign:mandatory][offset_minute]"
        ),
        format_description!(
            "[year]-[month]-[day]T[hour][offset_hour sign:mandatory][offset_minute]"
        ),
    ];
    for format in with_offset {
        if let Ok(parsed) = OffsetDateTime::parse(&normalised, format) {
            return Ok(parsed.to_offset(UtcOffset::UTC));
        }
    }

    let naive = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
        format_description!("[year]-[month]-[day]T[hour]"),
    ];
    for format in naive {
        if let Ok(parsed) = PrimitiveDateTime::parse(&normalised, format) {
            return Ok(parsed.assume_utc());
        }
    }

    Date::parse(&normalised, format_description!("[year]-[month]-[day]"))
        .map(|date| date.midnight().assume_utc())
        .map_err(|_| unrecognised())
}
