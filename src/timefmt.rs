//! `HH:MM` wall-clock times on the wire.
//!
//! Input accepts `HH:MM` or `HH:MM:SS` (24-hour, zero padded); seconds are
//! dropped. Output is always `HH:MM`.

use chrono::{NaiveTime, Timelike};

pub const HHMM: &str = "%H:%M";

fn two_digits(s: &str) -> Option<u32> {
    if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

pub fn parse_hhmm(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim();
    if !s.is_ascii() {
        return None;
    }
    let (hm, seconds) = match s.len() {
        5 => (s, None),
        8 => (&s[..5], Some(&s[5..])),
        _ => return None,
    };
    if let Some(sec) = seconds {
        let sec = sec.strip_prefix(':')?;
        if two_digits(sec)? > 59 {
            return None;
        }
    }
    let (h, m) = hm.split_once(':')?;
    let (h, m) = (two_digits(h)?, two_digits(m)?);
    if h > 23 || m > 59 {
        return None;
    }
    NaiveTime::from_hms_opt(h, m, 0)
}

/// Drops seconds and sub-seconds.
pub fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}

pub fn format_hhmm(t: NaiveTime) -> String {
    t.format(HHMM).to_string()
}

pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_hhmm(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid time {raw:?}, expected HH:MM")))
    }
}

pub mod hhmm_option {
    use chrono::NaiveTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_str(&super::format_hhmm(*t)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(d)? {
            None => Ok(None),
            Some(raw) => super::parse_hhmm(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid time {raw:?}, expected HH:MM"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_minutes_and_seconds_forms() {
        assert_eq!(parse_hhmm("09:30"), Some(t(9, 30)));
        assert_eq!(parse_hhmm("09:30:45"), Some(t(9, 30)));
        assert_eq!(parse_hhmm(" 23:59 "), Some(t(23, 59)));
    }

    #[test]
    fn rejects_malformed_times() {
        for bad in ["9:30", "24:00", "12:60", "12:30:60", "+1:00", "12-30", "", "12:3a", "٠٩:٣٠"] {
            assert_eq!(parse_hhmm(bad), None, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn formats_without_seconds() {
        let with_seconds = NaiveTime::from_hms_opt(14, 5, 59).unwrap();
        assert_eq!(format_hhmm(with_seconds), "14:05");
        assert_eq!(truncate_to_minute(with_seconds), t(14, 5));
    }

    #[derive(serde::Deserialize, serde::Serialize)]
    struct Probe {
        #[serde(with = "hhmm")]
        at: NaiveTime,
        #[serde(default, with = "hhmm_option")]
        until: Option<NaiveTime>,
    }

    #[test]
    fn serde_helpers_use_hhmm() {
        let p: Probe = serde_json::from_str(r#"{"at":"08:00:00"}"#).unwrap();
        assert_eq!(p.at, t(8, 0));
        assert_eq!(p.until, None);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["at"], "08:00");
        assert!(serde_json::from_str::<Probe>(r#"{"at":"8am"}"#).is_err());
    }
}
