//! Client parameter validation
//!
//! Pure checks run before any discovery or backend call. Every failure is an
//! `Error::Validation` whose message is returned to the client verbatim.

use axum::http::Method;
use eidafed_common::query::{Format, Level, Quality, Selector};
use eidafed_common::time::{now, parse_fdsn_time};
use eidafed_common::{Error, Result, UserQuery};

/// Parameters shared by both services (canonical names)
const STREAM_PARAMETERS: [&str; 6] = [
    "network",
    "station",
    "location",
    "channel",
    "starttime",
    "endtime",
];

const DATASELECT_PARAMETERS: [&str; 1] = ["quality"];

/// Catalog parameters forwarded to station backends
pub const STATION_PARAMETERS: [&str; 14] = [
    "minlatitude",
    "maxlatitude",
    "minlongitude",
    "maxlongitude",
    "latitude",
    "longitude",
    "minradius",
    "maxradius",
    "startbefore",
    "startafter",
    "endbefore",
    "endafter",
    "level",
    "format",
];

/// Validate a time-series request
pub fn validate_dataselect(method: &Method, query: &UserQuery) -> Result<()> {
    if *method == Method::POST {
        validate_selectors(query)?;
    } else {
        if query.starttime().is_none() {
            return Err(Error::validation("Start time is required."));
        }
        if query.endtime().is_none() {
            return Err(Error::validation("End time is required."));
        }
        validate_time_window(query.starttime(), query.endtime())?;
    }

    if let Some(quality) = query.get("quality") {
        if Quality::parse(quality).is_none() {
            return Err(enum_error(
                "quality",
                quality,
                Quality::ALL.iter().map(Quality::as_str),
            ));
        }
    }

    reject_unsupported(query, &DATASELECT_PARAMETERS)
}

/// Validate a catalog request
pub fn validate_station(method: &Method, query: &UserQuery) -> Result<()> {
    if *method == Method::POST {
        validate_selectors(query)?;
    } else {
        validate_time_window(query.starttime(), query.endtime())?;
    }

    reject_unsupported(query, &STATION_PARAMETERS)?;

    if let Some(level) = query.get("level") {
        if Level::parse(level).is_none() {
            return Err(enum_error("level", level, Level::ALL.iter().map(Level::as_str)));
        }
    }

    if let Some(format) = query.get("format") {
        if Format::parse(format).is_none() {
            return Err(enum_error("format", format, Format::ALL.iter().map(Format::as_str)));
        }
    }

    Ok(())
}

/// Check optional start/end strings: parseable, not in the future, ordered
pub fn validate_time_window(start: Option<&str>, end: Option<&str>) -> Result<()> {
    let start = start
        .map(|s| {
            parse_fdsn_time(s)
                .map_err(|_| Error::validation("The submitted start time is invalid."))
        })
        .transpose()?;
    let end = end
        .map(|s| {
            parse_fdsn_time(s).map_err(|_| Error::validation("The submitted end time is invalid."))
        })
        .transpose()?;

    if let Some(start) = start {
        if start > now() {
            return Err(Error::validation("The submitted start time is in the future."));
        }
        if let Some(end) = end {
            if start > end {
                return Err(Error::validation(
                    "The submitted start time is after the submitted end time.",
                ));
            }
        }
    }

    Ok(())
}

fn validate_selectors(query: &UserQuery) -> Result<()> {
    if query.selectors().is_empty() {
        return Err(Error::validation("No segments given."));
    }
    for line in query.selectors() {
        let selector = Selector::parse(line)?;
        validate_time_window(Some(&selector.start), Some(&selector.end))?;
    }
    Ok(())
}

fn reject_unsupported(query: &UserQuery, extra: &[&str]) -> Result<()> {
    match query
        .keys()
        .find(|key| !STREAM_PARAMETERS.contains(key) && !extra.contains(key))
    {
        Some(key) => Err(Error::validation(format!(
            "The submitted parameter is unsupported: {}",
            key
        ))),
        None => Ok(()),
    }
}

fn enum_error<'a>(name: &str, value: &str, accepted: impl Iterator<Item = &'a str>) -> Error {
    Error::validation(format!(
        "The requested {}: {} is invalid. Expected one of: {}",
        name,
        value,
        accepted.collect::<Vec<_>>().join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(pairs: &[(&str, &str)]) -> UserQuery {
        UserQuery::from_pairs(pairs.iter().copied())
    }

    fn message(result: Result<()>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_dataselect_requires_both_times() {
        let q = get(&[("net", "NL")]);
        assert_eq!(message(validate_dataselect(&Method::GET, &q)), "Start time is required.");

        let q = get(&[("start", "2000-01-01")]);
        assert_eq!(message(validate_dataselect(&Method::GET, &q)), "End time is required.");
    }

    #[test]
    fn test_inverted_window_is_rejected() {
        let q = get(&[("start", "2000-01-02"), ("end", "2000-01-01")]);
        assert_eq!(
            message(validate_dataselect(&Method::GET, &q)),
            "The submitted start time is after the submitted end time."
        );
    }

    #[test]
    fn test_future_and_garbage_times() {
        assert_eq!(
            message(validate_time_window(Some("2999-01-01"), None)),
            "The submitted start time is in the future."
        );
        assert_eq!(
            message(validate_time_window(Some("yesterday"), None)),
            "The submitted start time is invalid."
        );
        assert_eq!(
            message(validate_time_window(None, Some("2000-13-01"))),
            "The submitted end time is invalid."
        );
        assert!(validate_time_window(None, None).is_ok());
    }

    #[test]
    fn test_quality_enum() {
        let q = get(&[("start", "2000-01-01"), ("end", "2000-01-02"), ("quality", "X")]);
        assert_eq!(
            message(validate_dataselect(&Method::GET, &q)),
            "The requested quality: X is invalid. Expected one of: D, R, Q, M, B"
        );
    }

    #[test]
    fn test_unsupported_parameter_is_named() {
        let q = get(&[("start", "2000-01-01"), ("end", "2000-01-02"), ("level", "channel")]);
        assert_eq!(
            message(validate_dataselect(&Method::GET, &q)),
            "The submitted parameter is unsupported: level"
        );

        let q = get(&[("key", "")]);
        assert_eq!(
            message(validate_station(&Method::GET, &q)),
            "The submitted parameter is unsupported: key"
        );
    }

    #[test]
    fn test_station_accepts_geographic_and_enum_parameters() {
        let q = get(&[
            ("net", "NL"),
            ("minlatitude", "50"),
            ("maxlatitude", "54"),
            ("level", "channel"),
            ("format", "text"),
        ]);
        assert!(validate_station(&Method::GET, &q).is_ok());

        let q = get(&[("level", "response")]);
        assert_eq!(
            message(validate_station(&Method::GET, &q)),
            "The requested level: response is invalid. \
             Expected one of: network, station, location, channel"
        );

        let q = get(&[("format", "json")]);
        assert!(message(validate_station(&Method::GET, &q))
            .starts_with("The requested format: json"));
    }

    #[test]
    fn test_post_selectors() {
        let q = UserQuery::from_post_body("quality=D\n");
        assert_eq!(message(validate_dataselect(&Method::POST, &q)), "No segments given.");

        let q = UserQuery::from_post_body("NL HGN * BHZ 2000-01-01\n");
        assert_eq!(message(validate_dataselect(&Method::POST, &q)), "Invalid segment submitted.");

        let q = UserQuery::from_post_body("NL HGN * BHZ 2000-01-02 2000-01-01\n");
        assert_eq!(
            message(validate_station(&Method::POST, &q)),
            "The submitted start time is after the submitted end time."
        );

        let q = UserQuery::from_post_body("NL HGN * BHZ 2000-01-01 2000-01-02\n");
        assert!(validate_dataselect(&Method::POST, &q).is_ok());
    }
}
