//! Content keys: the globally orderable identifier of one stored item.
//!
//! A key is `(time, sequence)`. Keys order by time first, then by the
//! sequence string. The URL form `yyyy/MM/dd/HH/mm/ss/SSS/{sequence}` is
//! fixed-width, so encoded keys sort lexicographically in key order and
//! can be used directly as object names in a listing-only store.

use compact_str::CompactString;
use rand::Rng;
use std::cmp::Ordering;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Sequence that sorts after every generated sequence.
const LAST_SEQUENCE: &str = "~ZZZZZZZZZZ";
/// Sequence that sorts before every generated sequence.
const FIRST_SEQUENCE: &str = "0";
const SEQUENCE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    time: OffsetDateTime,
    sequence: CompactString,
}

impl ContentKey {
    /// Build a key, normalizing `time` to UTC with millisecond precision.
    pub fn new(time: OffsetDateTime, sequence: impl Into<CompactString>) -> Self {
        Self {
            time: truncate_to_millis(time),
            sequence: sequence.into(),
        }
    }

    /// A fresh key at `time` with a random alphanumeric sequence.
    pub fn generate(time: OffsetDateTime) -> Self {
        let sequence: String = rand::rng()
            .sample_iter(rand::distr::Alphanumeric)
            .take(SEQUENCE_LEN)
            .map(char::from)
            .collect();
        Self::new(time, sequence)
    }

    /// The greatest key at `time`; used as an inclusive scan bound.
    pub fn last_key(time: OffsetDateTime) -> Self {
        Self::new(time, LAST_SEQUENCE)
    }

    /// The smallest key at `time`.
    pub fn first_key(time: OffsetDateTime) -> Self {
        Self::new(time, FIRST_SEQUENCE)
    }

    pub fn time(&self) -> OffsetDateTime {
        self.time
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn to_url(&self) -> String {
        format!(
            "{:04}/{:02}/{:02}/{:02}/{:02}/{:02}/{:03}/{}",
            self.time.year(),
            u8::from(self.time.month()),
            self.time.day(),
            self.time.hour(),
            self.time.minute(),
            self.time.second(),
            self.time.millisecond(),
            self.sequence
        )
    }

    /// Decode the URL form. Anything malformed yields `None`.
    pub fn from_url(value: &str) -> Option<Self> {
        let mut parts = value.split('/');
        let year = fixed_number(parts.next()?, 4)?;
        let month = fixed_number(parts.next()?, 2)?;
        let day = fixed_number(parts.next()?, 2)?;
        let hour = fixed_number(parts.next()?, 2)?;
        let minute = fixed_number(parts.next()?, 2)?;
        let second = fixed_number(parts.next()?, 2)?;
        let milli = fixed_number(parts.next()?, 3)?;
        let sequence = parts.next()?;
        if parts.next().is_some() || !is_valid_sequence(sequence) {
            return None;
        }

        let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
        let year = i32::try_from(year).ok()?;
        let date = Date::from_calendar_date(year, month, u8::try_from(day).ok()?)
            .ok()?;
        let time = Time::from_hms_milli(
            u8::try_from(hour).ok()?,
            u8::try_from(minute).ok()?,
            u8::try_from(second).ok()?,
            u16::try_from(milli).ok()?,
        )
        .ok()?;
        Some(Self {
            time: PrimitiveDateTime::new(date, time).assume_utc(),
            sequence: sequence.into(),
        })
    }
}

fn truncate_to_millis(time: OffsetDateTime) -> OffsetDateTime {
    let time = time.to_offset(UtcOffset::UTC);
    let millis = time.millisecond();
    time.replace_millisecond(millis).unwrap_or(time)
}

fn fixed_number(part: &str, width: usize) -> Option<u32> {
    if part.len() != width || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

fn is_valid_sequence(sequence: &str) -> bool {
    !sequence.is_empty()
        && sequence
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'~' | b'_' | b'-'))
}

impl Ord for ContentKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for ContentKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_url())
    }
}

impl serde::Serialize for ContentKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_url())
    }
}

impl<'de> serde::Deserialize<'de> for ContentKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ContentKey::from_url(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid content key: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_time_orders_before_sequence() {
        let early = ContentKey::new(datetime!(2024-01-02 03:04:05.100 UTC), "zzzzzz");
        let late = ContentKey::new(datetime!(2024-01-02 03:04:05.101 UTC), "000000");
        assert!(early < late);
    }

    #[test]
    fn test_equal_times_compare_sequence() {
        let t = datetime!(2024-01-02 03:04:05.100 UTC);
        assert!(ContentKey::new(t, "abc") < ContentKey::new(t, "abd"));
        assert!(ContentKey::first_key(t) < ContentKey::generate(t));
        assert!(ContentKey::generate(t) < ContentKey::last_key(t));
    }

    #[test]
    fn test_url_round_trip() {
        let key = ContentKey::new(datetime!(2024-01-02 03:04:05.678 UTC), "Ab12xY");
        assert_eq!(key.to_url(), "2024/01/02/03/04/05/678/Ab12xY");
        assert_eq!(ContentKey::from_url(&key.to_url()), Some(key));

        let generated = ContentKey::generate(datetime!(2023-12-31 23:59:59.999 UTC));
        assert_eq!(ContentKey::from_url(&generated.to_url()), Some(generated));
    }

    #[test]
    fn test_url_order_matches_key_order() {
        let a = ContentKey::new(datetime!(2024-01-02 03:04:05.678 UTC), "zzz");
        let b = ContentKey::new(datetime!(2024-01-02 03:04:05.679 UTC), "aaa");
        let c = ContentKey::new(datetime!(2024-01-10 00:00:00.000 UTC), "aaa");
        assert!(a.to_url() < b.to_url());
        assert!(b.to_url() < c.to_url());
    }

    #[test]
    fn test_garbage_decodes_to_none() {
        for garbage in [
            "",
            "not-a-key",
            "2024/01/02/03/04/05/678",
            "2024/01/02/03/04/05/678/",
            "2024/1/02/03/04/05/678/abc",
            "2024/13/02/03/04/05/678/abc",
            "2024/02/30/03/04/05/678/abc",
            "2024/01/02/25/04/05/678/abc",
            "2024/01/02/03/04/05/678/abc/extra",
            "2024/01/02/03/04/05/678/a b",
        ] {
            assert_eq!(ContentKey::from_url(garbage), None, "{garbage:?}");
        }
    }

    #[test]
    fn test_new_truncates_to_millis_and_utc() {
        let local = datetime!(2024-01-02 05:04:05.678_999 +02:00);
        let key = ContentKey::new(local, "abc");
        assert_eq!(key.time(), datetime!(2024-01-02 03:04:05.678 UTC));
    }

    #[test]
    fn test_serde_uses_url_form() {
        let key = ContentKey::new(datetime!(2024-01-02 03:04:05.678 UTC), "abc");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2024/01/02/03/04/05/678/abc\"");
        let back: ContentKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<ContentKey>("\"junk\"").is_err());
    }
}
