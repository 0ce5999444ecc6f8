use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::defaults::{Protocol, RequestDefaults};
use crate::error::{Error, Result};
use crate::request::{CHANNEL, ENDTIME, Fields, LOCATION, NETWORK, STARTTIME, STATION};

/// One validated station/window/channel unit of a request.
///
/// Streaming entries carry no window of their own (`starttime`/`endtime` are `None`);
/// the window lives on the [`RequestSet`](crate::RequestSet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    pub starttime: Option<DateTime<Utc>>,
    pub endtime: Option<DateTime<Utc>>,
    pub network: String,
    pub station: String,
    /// Ordered channel codes. Empty means "all channels" (streaming only).
    pub channels: Vec<String>,
    /// Location code, archive only.
    pub location: Option<String>,
}

impl RequestRecord {
    /// Build a new record from keyword fields, filling defaults and validating.
    pub fn from_fields(
        fields: &Fields,
        defaults: &RequestDefaults,
        protocol: Protocol,
    ) -> Result<Self> {
        let empty = Self {
            starttime: None,
            endtime: None,
            network: String::new(),
            station: String::new(),
            channels: Vec::new(),
            location: None,
        };
        let mut record = empty.apply(fields, protocol)?;
        record.fill_defaults(defaults, protocol);
        record.validate(protocol)?;
        Ok(record)
    }

    /// Return a copy with `fields` overlaid: present keywords overwrite, absent ones keep
    /// their previous value. `self` is untouched if validation fails.
    pub fn merged(
        &self,
        fields: &Fields,
        defaults: &RequestDefaults,
        protocol: Protocol,
    ) -> Result<Self> {
        let mut record = self.clone().apply(fields, protocol)?;
        record.fill_defaults(defaults, protocol);
        record.validate(protocol)?;
        Ok(record)
    }

    fn apply(mut self, fields: &Fields, protocol: Protocol) -> Result<Self> {
        fields.check_known()?;
        if protocol == Protocol::Stream {
            for key in [STARTTIME, ENDTIME, LOCATION] {
                if fields.contains(key) {
                    return Err(Error::Validation(format!(
                        "{key} is not a per-stream field for the {protocol} protocol"
                    )));
                }
            }
        }

        if let Some(t) = fields.time(STARTTIME)? {
            self.starttime = Some(t);
        }
        if let Some(t) = fields.time(ENDTIME)? {
            self.endtime = Some(t);
        }
        if let Some(n) = fields.text(NETWORK)? {
            self.network = n;
        }
        if let Some(s) = fields.text(STATION)? {
            self.station = s;
        }
        if let Some(c) = fields.channels()? {
            self.channels = c;
        }
        if let Some(l) = fields.text(LOCATION)? {
            self.location = Some(l);
        }
        Ok(self)
    }

    fn fill_defaults(&mut self, defaults: &RequestDefaults, protocol: Protocol) {
        if self.network.is_empty() {
            self.network = defaults.network.clone();
        }
        if protocol == Protocol::Archive && self.location.is_none() {
            self.location = Some(defaults.location.clone());
        }
    }

    /// Check the record against the protocol's required fields.
    pub fn validate(&self, protocol: Protocol) -> Result<()> {
        if self.network.is_empty() {
            return Err(missing(NETWORK));
        }
        if self.station.is_empty() {
            return Err(missing(STATION));
        }
        if self.channels.iter().any(|c| c.is_empty()) {
            return Err(Error::Validation(format!("{CHANNEL} codes must not be empty")));
        }
        let codes = [(NETWORK, &self.network), (STATION, &self.station)]
            .into_iter()
            .chain(self.channels.iter().map(|c| (CHANNEL, c)));
        for (key, value) in codes {
            check_code(key, value, protocol)?;
        }
        if let Some(location) = &self.location {
            if location.is_empty() {
                return Err(Error::Validation(format!("{LOCATION} must not be empty")));
            }
            check_code(LOCATION, location, protocol)?;
        }

        match protocol {
            Protocol::Archive => {
                let start = self.starttime.ok_or_else(|| missing(STARTTIME))?;
                let end = self.endtime.ok_or_else(|| missing(ENDTIME))?;
                check_window(&start, Some(&end))?;
                if self.channels.is_empty() {
                    return Err(missing(CHANNEL));
                }
            }
            Protocol::Stream => {
                if self.starttime.is_some() || self.endtime.is_some() || self.location.is_some() {
                    return Err(Error::Validation(
                        "stream entries must not carry a window or location".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// `NET.STA`, used to name artifacts.
    pub fn identity(&self) -> String {
        format!("{}.{}", self.network, self.station)
    }
}

pub(crate) fn check_window(start: &DateTime<Utc>, end: Option<&DateTime<Utc>>) -> Result<()> {
    match end {
        Some(end) if start >= end => Err(Error::Validation(format!(
            "starttime {start} must be before endtime {end}"
        ))),
        _ => Ok(()),
    }
}

/// Characters that delimit `NET_STA:CHA` selector tokens in a stream list.
const STREAM_DELIMITERS: [char; 3] = [',', ':', '_'];

/// Codes end up as columns of a request line or parts of a selector token.
fn check_code(key: &str, value: &str, protocol: Protocol) -> Result<()> {
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::Validation(format!(
            "{key} must not contain whitespace or control characters: {value:?}"
        )));
    }
    if protocol == Protocol::Stream && value.contains(STREAM_DELIMITERS) {
        return Err(Error::Validation(format!(
            "{key} must not contain ',', ':' or '_' for the {protocol} protocol: {value:?}"
        )));
    }
    Ok(())
}

fn missing(key: &str) -> Error {
    Error::Validation(format!("request parameter {key} is required"))
}
