//! Common observation shape shared by every upstream adapter

use serde::{Deserialize, Deserializer, Serialize};

/// Placeholder FRED publishes for a period with no data.
pub const MISSING_VALUE_SENTINEL: &str = ".";

/// One reporting period of a series.
///
/// `date` is the upstream period label (`2024-05-01`, `2024-05`, ...) and
/// `value` is kept as text because upstreams disagree on whether values are
/// strings or numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: String,
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
}

impl Observation {
    pub fn new(date: impl Into<String>, value: impl Into<String>) -> Self {
        Observation {
            date: date.into(),
            value: value.into(),
        }
    }

    /// Numeric value, or `None` for the missing-data sentinel and anything
    /// that does not parse to a finite number.
    pub fn numeric_value(&self) -> Option<f64> {
        let raw = self.value.trim();
        if raw == MISSING_VALUE_SENTINEL {
            return None;
        }
        raw.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Sorts most recent first by comparing the period labels as strings.
pub fn sort_descending(observations: &mut [Observation]) {
    observations.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Index of the most recent observation with a usable numeric value.
pub fn latest_valid_index(observations: &[Observation]) -> Option<usize> {
    observations
        .iter()
        .position(|obs| obs.numeric_value().is_some())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
pub(crate) fn is_descending(observations: &[Observation]) -> bool {
    observations
        .windows(2)
        .all(|w| w[0].date >= w[1].date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_value() {
        assert_eq!(
            Observation::new("2024-05-01", "21000.5").numeric_value(),
            Some(21000.5)
        );
        assert_eq!(
            Observation::new("2024-05-01", " 12 ").numeric_value(),
            Some(12.0)
        );
        assert_eq!(Observation::new("2024-05-01", ".").numeric_value(), None);
        assert_eq!(Observation::new("2024-05-01", "").numeric_value(), None);
        assert_eq!(Observation::new("2024-05-01", "NaN").numeric_value(), None);
        assert_eq!(Observation::new("2024-05-01", "inf").numeric_value(), None);
    }

    #[test]
    fn test_deserialize_string_or_number() {
        let obs: Vec<Observation> = serde_json::from_str(
            r#"[{"date": "2024-05", "value": "1.5"}, {"date": "2024-04", "value": 2.25}]"#,
        )
        .unwrap();
        assert_eq!(obs[0].value, "1.5");
        assert_eq!(obs[1].value, "2.25");
    }

    #[test]
    fn test_deserialize_ignores_extra_fields() {
        let obs: Observation = serde_json::from_str(
            r#"{"realtime_start": "2024-06-01", "realtime_end": "2024-06-01", "date": "2024-05-01", "value": "."}"#,
        )
        .unwrap();
        assert_eq!(obs, Observation::new("2024-05-01", "."));
    }

    #[test]
    fn test_sort_descending() {
        let mut obs = vec![
            Observation::new("2023-11", "1"),
            Observation::new("2024-01", "3"),
            Observation::new("2023-12", "2"),
        ];
        sort_descending(&mut obs);
        let dates: Vec<_> = obs.iter().map(|o| o.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-01", "2023-12", "2023-11"]);
        assert!(is_descending(&obs));
    }

    #[test]
    fn test_latest_valid_index_skips_sentinels() {
        let obs = vec![
            Observation::new("2024-03-01", "."),
            Observation::new("2024-02-01", "abc"),
            Observation::new("2024-01-01", "7.1"),
        ];
        assert_eq!(latest_valid_index(&obs), Some(2));
        assert_eq!(latest_valid_index(&obs[..2]), None);
        assert_eq!(latest_valid_index(&[]), None);
    }
}
