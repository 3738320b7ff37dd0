//! Staged query parameters.
//!
//! All form values are validated and stored here as pure data before any
//! browser action happens; [`crate::session::ArchiveSession`] later applies
//! them to the query form in one ordered batch. Fields absent from the
//! configuration stay `None` and leave the form untouched.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::config::ArchiveOptions;
use crate::error::ArchiveError;

/// Target-name resolver offered by the query form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Resolver {
    #[default]
    Simbad,
    Ned,
    None,
}

impl Resolver {
    /// Option value used by the `resolver` select element.
    pub fn form_value(self) -> &'static str {
        match self {
            Resolver::Simbad => "simbad",
            Resolver::Ned => "ned",
            Resolver::None => "none",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ArchiveError> {
        match value {
            "simbad" => Ok(Resolver::Simbad),
            "ned" => Ok(Resolver::Ned),
            "none" => Ok(Resolver::None),
            other => Err(ArchiveError::Config {
                key: "resolver".to_string(),
                reason: format!("expected simbad, ned or none, got {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    /// Instrument name, or several separated by commas (e.g. "VIRCAM").
    instrument: Option<String>,
    /// Night of observation, stored as the space-joined "YYYY MM DD" form value.
    night: Option<String>,
    /// Name of the astronomical object to search for.
    target: Option<String>,
    resolver: Option<Resolver>,
    /// Sky coordinates, right ascension and declination.
    coords: Option<(String, String)>,
    starttime: Option<u8>,
    endtime: Option<u8>,
    rows: Option<u32>,
    /// Output directory template; `{nightobs}` and `{instrument}` are
    /// substituted on every read.
    output: Option<String>,
}

impl QueryParams {
    /// Stage query parameters from a validated option mapping.
    ///
    /// Fails on a malformed night or an out-of-range hour; coercible keys
    /// were already checked by [`ArchiveOptions::from_map`].
    pub fn from_options(options: &ArchiveOptions) -> Result<Self, ArchiveError> {
        let night = options.get("nightobs").map(normalize_night).transpose()?;
        let resolver = options.get("resolver").map(Resolver::parse).transpose()?;
        let coords = match (options.get("ra"), options.get("dec")) {
            (Some(ra), Some(dec)) => Some((ra.to_string(), dec.to_string())),
            _ => None,
        };

        Ok(Self {
            instrument: options.get("instrument").map(str::to_string),
            night,
            target: options.get("target").map(str::to_string),
            resolver,
            coords,
            starttime: options.get("starttime").map(|v| parse_hour("starttime", v)).transpose()?,
            endtime: options.get("endtime").map(|v| parse_hour("endtime", v)).transpose()?,
            rows: options
                .get("rows")
                .map(|v| v.trim().parse().map_err(|_| ArchiveError::Config {
                    key: "rows".to_string(),
                    reason: format!("Not an integer: {v:?}"),
                }))
                .transpose()?,
            output: options.get("output").map(str::to_string),
        })
    }

    pub fn instrument(&self) -> Option<&str> {
        self.instrument.as_deref()
    }

    /// Night value as it is filled into the form ("YYYY MM DD").
    pub fn night_form_value(&self) -> Option<&str> {
        self.night.as_deref()
    }

    /// Night of observation with the internal spacing removed (YYYYMMDD).
    pub fn nightobs(&self) -> String {
        self.night
            .as_deref()
            .map(|n| n.replace(' ', ""))
            .unwrap_or_default()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Explicitly configured resolver, if any; the form default is simbad.
    pub fn staged_resolver(&self) -> Option<Resolver> {
        self.resolver
    }

    pub fn resolver(&self) -> Resolver {
        self.resolver.unwrap_or_default()
    }

    pub fn coords(&self) -> Option<(&str, &str)> {
        self.coords.as_ref().map(|(ra, dec)| (ra.as_str(), dec.as_str()))
    }

    pub fn staged_starttime(&self) -> Option<u8> {
        self.starttime
    }

    pub fn staged_endtime(&self) -> Option<u8> {
        self.endtime
    }

    /// Start of the hour window; the form default when not configured.
    pub fn starttime(&self) -> u8 {
        self.starttime.unwrap_or(12)
    }

    pub fn endtime(&self) -> u8 {
        self.endtime.unwrap_or(12)
    }

    pub fn staged_rows(&self) -> Option<u32> {
        self.rows
    }

    /// Maximum number of records to retrieve.
    pub fn rows(&self) -> u32 {
        self.rows.unwrap_or(200)
    }

    /// Output directory with `{nightobs}` and `{instrument}` resolved against
    /// the current values.
    pub fn output(&self) -> PathBuf {
        let template = self.output.as_deref().unwrap_or(".");
        let resolved = template
            .replace("{nightobs}", &self.nightobs())
            .replace("{instrument}", self.instrument.as_deref().unwrap_or_default());
        PathBuf::from(resolved)
    }
}

/// Split an 8-digit YYYYMMDD night into the space-joined form value.
fn normalize_night(night: &str) -> Result<String, ArchiveError> {
    let valid = night.len() == 8
        && night.chars().all(|c| c.is_ascii_digit())
        && NaiveDate::parse_from_str(night, "%Y%m%d").is_ok();
    if !valid {
        return Err(ArchiveError::Config {
            key: "nightobs".to_string(),
            reason: "night needs to be in format YYYYMMDD".to_string(),
        });
    }
    Ok(format!("{} {} {}", &night[0..4], &night[4..6], &night[6..8]))
}

fn parse_hour(key: &str, value: &str) -> Result<u8, ArchiveError> {
    let out_of_range = || ArchiveError::Config {
        key: key.to_string(),
        reason: format!("hour must be in 0..=23, got {value:?}"),
    };
    let hour: u8 = value.trim().parse().map_err(|_| out_of_range())?;
    if hour > 23 {
        return Err(out_of_range());
    }
    Ok(hour)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn options(pairs: &[(&str, &str)]) -> ArchiveOptions {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>();
        ArchiveOptions::from_map(map).unwrap()
    }

    #[test]
    fn night_round_trips_through_form_value() {
        let query = QueryParams::from_options(&options(&[("nightobs", "20170101")])).unwrap();
        assert_eq!(query.night_form_value(), Some("2017 01 01"));
        assert_eq!(query.nightobs(), "20170101");
    }

    #[test]
    fn malformed_night_rejected() {
        for bad in ["2017011", "201701011", "2017-0101", "abcdefgh", "20171301"] {
            let err = QueryParams::from_options(&options(&[("nightobs", bad)])).unwrap_err();
            assert!(err.to_string().contains("YYYYMMDD"), "night {bad:?}");
        }
    }

    #[test]
    fn defaults_without_explicit_values() {
        let query = QueryParams::from_options(&options(&[])).unwrap();
        assert_eq!(query.resolver(), Resolver::Simbad);
        assert_eq!(query.starttime(), 12);
        assert_eq!(query.endtime(), 12);
        assert_eq!(query.rows(), 200);
        assert!(query.staged_resolver().is_none());
        assert!(query.staged_rows().is_none());
        assert_eq!(query.nightobs(), "");
    }

    #[test]
    fn hour_out_of_range_rejected() {
        let err = QueryParams::from_options(&options(&[("starttime", "24")])).unwrap_err();
        assert!(err.to_string().contains("starttime"));
    }

    #[test]
    fn resolver_values() {
        assert_eq!(Resolver::parse("ned").unwrap(), Resolver::Ned);
        assert_eq!(Resolver::parse("none").unwrap(), Resolver::None);
        assert!(Resolver::parse("gaia").is_err());

        let query = QueryParams::from_options(&options(&[("resolver", "ned")])).unwrap();
        assert_eq!(query.resolver().form_value(), "ned");
    }

    #[test]
    fn coords_require_both_parts() {
        let query = QueryParams::from_options(&options(&[("ra", "11 00 00")])).unwrap();
        assert!(query.coords().is_none());

        let query =
            QueryParams::from_options(&options(&[("ra", "11 00 00"), ("dec", "-60 15 00")]))
                .unwrap();
        assert_eq!(query.coords(), Some(("11 00 00", "-60 15 00")));
    }

    #[test]
    fn output_template_resolved_on_read() {
        let query = QueryParams::from_options(&options(&[
            ("nightobs", "20170101"),
            ("instrument", "VIRCAM"),
            ("output", "/data/{instrument}/{nightobs}"),
        ]))
        .unwrap();
        assert_eq!(query.output(), PathBuf::from("/data/VIRCAM/20170101"));
    }

    #[test]
    fn output_defaults_to_current_directory() {
        let query = QueryParams::from_options(&options(&[])).unwrap();
        assert_eq!(query.output(), PathBuf::from("."));
    }
}
