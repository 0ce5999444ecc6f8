use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::error::{Error, Result};

pub const STARTTIME: &str = "starttime";
pub const ENDTIME: &str = "endtime";
pub const NETWORK: &str = "network";
pub const STATION: &str = "station";
pub const CHANNEL: &str = "channel";
pub const LOCATION: &str = "location";

/// Every keyword a request may carry.
pub const KNOWN_FIELDS: [&str; 6] = [STARTTIME, ENDTIME, NETWORK, STATION, CHANNEL, LOCATION];

/// Value type for a request keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestValue {
    Str(String),
    StrList(Vec<String>),
    Time(DateTime<Utc>),
}

impl From<&str> for RequestValue {
    fn from(value: &str) -> Self {
        RequestValue::Str(value.to_string())
    }
}

impl From<String> for RequestValue {
    fn from(value: String) -> Self {
        RequestValue::Str(value)
    }
}

impl From<&String> for RequestValue {
    fn from(value: &String) -> Self {
        RequestValue::Str(value.clone())
    }
}

impl From<Vec<String>> for RequestValue {
    fn from(value: Vec<String>) -> Self {
        RequestValue::StrList(value)
    }
}

impl From<Vec<&str>> for RequestValue {
    fn from(value: Vec<&str>) -> Self {
        RequestValue::StrList(value.into_iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for RequestValue {
    fn from(value: [&str; N]) -> Self {
        RequestValue::StrList(value.into_iter().map(|s| s.to_string()).collect())
    }
}

impl From<DateTime<Utc>> for RequestValue {
    fn from(value: DateTime<Utc>) -> Self {
        RequestValue::Time(value)
    }
}

impl From<DateTime<FixedOffset>> for RequestValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        RequestValue::Time(value.with_timezone(&Utc))
    }
}

/// Naive timestamps are taken as UTC.
impl From<NaiveDateTime> for RequestValue {
    fn from(value: NaiveDateTime) -> Self {
        RequestValue::Time(Utc.from_utc_datetime(&value))
    }
}

impl RequestValue {
    /// Convert a JSON value: strings stay strings, arrays of strings become lists.
    pub fn from_json(key: &str, value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(s) => Ok(RequestValue::Str(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(|it| {
                    it.as_str().map(str::to_string).ok_or_else(|| {
                        Error::Validation(format!("{key} list must contain only strings"))
                    })
                })
                .collect::<Result<Vec<_>>>()
                .map(RequestValue::StrList),
            other => Err(Error::Validation(format!(
                "{key} must be a string or a list of strings, got {other}"
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RequestValue::Str(_) => "string",
            RequestValue::StrList(_) => "list",
            RequestValue::Time(_) => "timestamp",
        }
    }
}

/// A partial request: keyword/value pairs, as supplied to `request` or `request_many`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    pub(crate) inner: BTreeMap<String, RequestValue>,
}

impl Fields {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    /// Insert a keyword/value pair (value can be a scalar or list).
    pub fn kw(mut self, key: impl Into<String>, value: impl Into<RequestValue>) -> Self {
        self.inner.insert(key.into(), value.into());
        self
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<RequestValue>,
    {
        let mut f = Self::new();
        for (k, v) in pairs {
            f = f.kw(k, v);
        }
        f
    }

    /// Build from a JSON object such as
    /// `{"station": "MEPAS", "channel": ["HHZ", "EHZ"]}`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Validation("request must be a JSON object".into()))?;
        let mut f = Self::new();
        for (k, v) in obj {
            f.set(k.clone(), RequestValue::from_json(k, v)?);
        }
        Ok(f)
    }

    /// Parse a JSON array of request objects.
    pub fn list_from_json_str(s: &str) -> Result<Vec<Self>> {
        let v: serde_json::Value = serde_json::from_str(s)?;
        let items = v
            .as_array()
            .ok_or_else(|| Error::Validation("request list must be a JSON array".into()))?;
        items.iter().map(Self::from_json).collect()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<RequestValue>) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn starttime(self, v: impl Into<RequestValue>) -> Self {
        self.kw(STARTTIME, v)
    }

    pub fn endtime(self, v: impl Into<RequestValue>) -> Self {
        self.kw(ENDTIME, v)
    }

    pub fn network(self, v: impl Into<RequestValue>) -> Self {
        self.kw(NETWORK, v)
    }

    pub fn station(self, v: impl Into<RequestValue>) -> Self {
        self.kw(STATION, v)
    }

    pub fn channel(self, v: impl Into<RequestValue>) -> Self {
        self.kw(CHANNEL, v)
    }

    pub fn location(self, v: impl Into<RequestValue>) -> Self {
        self.kw(LOCATION, v)
    }

    pub fn get(&self, key: &str) -> Option<&RequestValue> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<RequestValue> {
        self.inner.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RequestValue)> {
        self.inner.iter()
    }

    /// Reject keywords no protocol understands.
    pub(crate) fn check_known(&self) -> Result<()> {
        match self.inner.keys().find(|k| !KNOWN_FIELDS.contains(&k.as_str())) {
            Some(k) => Err(Error::Validation(format!("unknown request field {k}"))),
            None => Ok(()),
        }
    }

    /// Read a timestamp keyword. Strings are parsed; lists are rejected.
    pub(crate) fn time(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        match self.inner.get(key) {
            None => Ok(None),
            Some(RequestValue::Time(t)) => Ok(Some(*t)),
            Some(RequestValue::Str(s)) => crate::date::parse_timestamp(s)
                .map(Some)
                .map_err(|e| Error::Validation(format!("{key}: {e}"))),
            Some(v) => Err(Error::Validation(format!(
                "{key} must be a timestamp, got a {}",
                v.kind()
            ))),
        }
    }

    /// Read a scalar string keyword.
    pub(crate) fn text(&self, key: &str) -> Result<Option<String>> {
        match self.inner.get(key) {
            None => Ok(None),
            Some(RequestValue::Str(s)) => Ok(Some(s.trim().to_string())),
            Some(v) => Err(Error::Validation(format!(
                "{key} must be a string, got a {}",
                v.kind()
            ))),
        }
    }

    /// Read the channel keyword; a scalar becomes a one-element list.
    pub(crate) fn channels(&self) -> Result<Option<Vec<String>>> {
        match self.inner.get(CHANNEL) {
            None => Ok(None),
            Some(RequestValue::Str(s)) => Ok(Some(vec![s.trim().to_string()])),
            Some(RequestValue::StrList(xs)) => {
                Ok(Some(xs.iter().map(|x| x.trim().to_string()).collect()))
            }
            Some(v) => Err(Error::Validation(format!(
                "{CHANNEL} must be a string or list, got a {}",
                v.kind()
            ))),
        }
    }

    /// Split off the shared window keywords, leaving the per-stream ones.
    pub(crate) fn split_window(mut self) -> (Fields, Fields) {
        let mut window = Fields::new();
        for key in [STARTTIME, ENDTIME] {
            if let Some(v) = self.inner.remove(key) {
                window.inner.insert(key.to_string(), v);
            }
        }
        (window, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_collects_keywords() {
        let f = Fields::new()
            .starttime("2019-01-01 00:00:00")
            .station("MEPAS")
            .channel(["HHZ", "EHZ"]);
        assert_eq!(f.get(STATION), Some(&RequestValue::Str("MEPAS".into())));
        assert_eq!(
            f.channels().unwrap(),
            Some(vec!["HHZ".to_string(), "EHZ".to_string()])
        );
        assert!(f.time(STARTTIME).unwrap().is_some());
        assert!(f.time(ENDTIME).unwrap().is_none());
    }

    #[test]
    fn scalar_channel_is_promoted() {
        let f = Fields::new().channel("HHZ");
        assert_eq!(f.channels().unwrap(), Some(vec!["HHZ".to_string()]));
    }

    #[test]
    fn no_cross_type_coercion() {
        let f = Fields::new().station(["A", "B"]);
        assert!(f.text(STATION).unwrap_err().is_validation());

        let t = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        let f = Fields::new().channel(t);
        assert!(f.channels().unwrap_err().is_validation());
    }

    #[test]
    fn unknown_keywords_are_rejected() {
        let f = Fields::from_pairs([("station", "MEPAS"), ("stattion", "oops")]);
        assert!(f.check_known().unwrap_err().is_validation());
    }

    #[test]
    fn parses_json_lists() {
        let list = Fields::list_from_json_str(
            r#"[{"station": "MEPAS", "channel": ["HHZ", "EHZ"]}, {"station": "MELAB"}]"#,
        )
        .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].get(STATION), Some(&RequestValue::from("MELAB")));

        assert!(Fields::from_json(&json!({"station": 5})).is_err());
        assert!(Fields::from_json(&json!(["MEPAS"])).is_err());
    }

    #[test]
    fn split_window_separates_time_keywords() {
        let f = Fields::new()
            .starttime("2019-01-01 00:00:00")
            .endtime("2019-01-01 01:00:00")
            .station("MEPAS");
        let (window, rest) = f.split_window();
        assert!(window.contains(STARTTIME) && window.contains(ENDTIME));
        assert!(!rest.contains(STARTTIME));
        assert!(rest.contains(STATION));
    }
}
