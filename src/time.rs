//! Time zone conversion between operator-local and host-local wall clocks
//!
//! All inputs are zone-less `NaiveDateTime` values paired with an IANA zone
//! name. Nothing here touches the network; the host zone is read elsewhere and
//! passed in as a string.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{RelayError, Result};

/// Time expression accepted by `at`
pub const HOST_SCHEDULE_FORMAT: &str = "%H:%M %Y-%m-%d";

/// Timestamp layout printed by `atq`
pub const FACILITY_TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Resolve an IANA zone name; an empty name means UTC
pub fn resolve_zone(name: &str) -> Result<Tz> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(chrono_tz::UTC);
    }

    name.parse::<Tz>().map_err(|_| RelayError::ZoneResolution {
        zone: name.to_string(),
    })
}

/// Attach a zone to a wall-clock time
///
/// Ambiguous times (DST fold) take the earlier instant. Times inside a DST gap
/// do not exist and are rejected.
pub fn localize(naive: NaiveDateTime, zone: Tz) -> Result<DateTime<Tz>> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(RelayError::InvalidLocalTime {
            time: naive.format("%Y-%m-%d %H:%M").to_string(),
            zone: zone.name().to_string(),
        }),
    }
}

/// Operator and host zones, resolved once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonePair {
    pub local: Tz,
    pub host: Tz,
}

impl ZonePair {
    pub fn new(local: Tz, host: Tz) -> Self {
        Self { local, host }
    }

    pub fn resolve(local_zone: &str, host_zone: &str) -> Result<Self> {
        Ok(Self {
            local: resolve_zone(local_zone)?,
            host: resolve_zone(host_zone)?,
        })
    }

    /// Operator wall clock to host wall clock
    pub fn to_host(&self, local: NaiveDateTime) -> Result<DateTime<Tz>> {
        Ok(localize(local, self.local)?.with_timezone(&self.host))
    }

    /// Host wall clock to operator wall clock
    pub fn to_local(&self, host: NaiveDateTime) -> Result<DateTime<Tz>> {
        Ok(localize(host, self.host)?.with_timezone(&self.local))
    }
}

pub fn to_host_time(
    local: NaiveDateTime,
    local_zone: &str,
    host_zone: &str,
) -> Result<DateTime<Tz>> {
    ZonePair::resolve(local_zone, host_zone)?.to_host(local)
}

pub fn to_local_time(
    host: NaiveDateTime,
    host_zone: &str,
    local_zone: &str,
) -> Result<DateTime<Tz>> {
    ZonePair::resolve(local_zone, host_zone)?.to_local(host)
}

/// `HH:MM YYYY-MM-DD`, the expression handed to the facility
pub fn host_schedule_expr(host: &DateTime<Tz>) -> String {
    host.format(HOST_SCHEDULE_FORMAT).to_string()
}

/// `HH:MM on YYYY-MM-DD`
pub fn local_display(local: &DateTime<Tz>) -> String {
    local.format("%H:%M on %Y-%m-%d").to_string()
}

/// `Friday, 2024-05-10 at 14:00`
pub fn listing_display(local: &DateTime<Tz>) -> String {
    local.format("%A, %Y-%m-%d at %H:%M").to_string()
}

/// Facility-style timestamp with zone abbreviation
pub fn host_display(host: &DateTime<Tz>) -> String {
    host.format("%a %b %e %H:%M:%S %Y %Z").to_string()
}

/// Parse a facility timestamp such as `Fri May 10 10:30:00 2024`
pub fn parse_facility_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), FACILITY_TIMESTAMP_FORMAT).ok()
}

/// Build a wall-clock time from operator input (`HH:MM`, optional `YYYY-MM-DD`)
///
/// Without a date, today's date in `zone` is used.
pub fn parse_wall_clock(time: &str, date: Option<&str>, zone: Tz) -> Result<NaiveDateTime> {
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| RelayError::InvalidInput(format!("'{}' is not a HH:MM time", time)))?;

    let date = match date {
        Some(date) => NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
            RelayError::InvalidInput(format!("'{}' is not a YYYY-MM-DD date", date))
        })?,
        None => Utc::now().with_timezone(&zone).date_naive(),
    };

    Ok(date.and_time(time))
}
