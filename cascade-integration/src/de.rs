use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::{fmt::Display, str::FromStr, time::Duration};

/// Determine the `DateTime<Utc>` from the provided `Duration` since the epoch.
pub fn datetime_utc_from_epoch_duration(duration: Duration) -> DateTime<Utc> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH + duration)
}

/// Deserialize a `String` as the desired type.
pub fn de_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::de::Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let data: &str = Deserialize::deserialize(deserializer)?;
    data.parse::<T>().map_err(serde::de::Error::custom)
}

/// Deserialize a value that some venues encode as a JSON string and others as a JSON number.
pub fn de_str_or_num<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::de::Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(serde_json::Number),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Str(raw) => raw.parse::<T>().map_err(serde::de::Error::custom),
        Raw::Num(raw) => raw
            .to_string()
            .parse::<T>()
            .map_err(serde::de::Error::custom),
    }
}

/// Deserialize a `u64` milliseconds value as `DateTime<Utc>`.
pub fn de_u64_epoch_ms_as_datetime_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(|epoch_ms| {
        datetime_utc_from_epoch_duration(Duration::from_millis(epoch_ms))
    })
}

/// Deserialize a &str "u64" milliseconds value as `DateTime<Utc>`.
pub fn de_str_u64_epoch_ms_as_datetime_utc<'de, D>(
    deserializer: D,
) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    de_str(deserializer).map(|epoch_ms| {
        datetime_utc_from_epoch_duration(Duration::from_millis(epoch_ms))
    })
}

/// Deserialize an RFC 3339 timestamp (eg/ "2024-01-01T00:00:00.123Z") as `DateTime<Utc>`.
pub fn de_rfc3339_as_datetime_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let data: &str = Deserialize::deserialize(deserializer)?;
    DateTime::parse_from_rfc3339(data)
        .map(|time| time.with_timezone(&Utc))
        .map_err(serde::de::Error::custom)
}

/// Deserialize an optional string as an optional value, treating `""` as `None`.
pub fn de_opt_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::de::Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let value: Option<&str> = Option::deserialize(deserializer)?;
    match value {
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
