use chrono::{DateTime, Utc};
use tracing::debug;

use crate::defaults::{Protocol, RequestDefaults};
use crate::error::{Error, Result};
use crate::record::{RequestRecord, check_window};
use crate::request::{ENDTIME, Fields, STARTTIME};

/// Ordered, mutable collection of request records owned by one client.
///
/// For [`Protocol::Archive`] every record carries its own window. For
/// [`Protocol::Stream`] a single `starttime`/`endtime` pair is shared by all entries.
///
/// Every update is all-or-nothing: the new state is built and validated on the side and
/// only then swapped in, so a rejected update leaves the set exactly as it was.
#[derive(Debug, Clone)]
pub struct RequestSet {
    protocol: Protocol,
    defaults: RequestDefaults,
    starttime: Option<DateTime<Utc>>,
    endtime: Option<DateTime<Utc>>,
    records: Vec<RequestRecord>,
}

impl RequestSet {
    pub fn new(protocol: Protocol, defaults: RequestDefaults) -> Self {
        Self {
            protocol,
            defaults,
            starttime: None,
            endtime: None,
            records: Vec::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn defaults(&self) -> &RequestDefaults {
        &self.defaults
    }

    pub fn records(&self) -> &[RequestRecord] {
        &self.records
    }

    /// Direct access for patching individual entries. Changes made here are
    /// re-validated when the set is rendered.
    pub fn records_mut(&mut self) -> &mut Vec<RequestRecord> {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Shared window of a streaming set.
    pub fn starttime(&self) -> Option<DateTime<Utc>> {
        self.starttime
    }

    pub fn endtime(&self) -> Option<DateTime<Utc>> {
        self.endtime
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.starttime = None;
        self.endtime = None;
    }

    /// Create record 0, or merge `fields` into it when it already exists.
    ///
    /// For streaming sets, `starttime`/`endtime` update the shared window and a call
    /// carrying only those keywords creates no entry.
    pub fn request(&mut self, fields: Fields) -> Result<usize> {
        self.update(0, fields)?;
        Ok(0)
    }

    /// Merge `fields` into the record at `index`.
    pub fn request_at(&mut self, index: usize, fields: Fields) -> Result<()> {
        if index >= self.records.len() {
            return Err(Error::Validation(format!(
                "no request at index {index} (have {})",
                self.records.len()
            )));
        }
        self.update(index, fields)
    }

    /// Bulk update.
    ///
    /// A non-empty `records` replaces the whole set and the per-record keywords in
    /// `fields` are ignored for this call. Otherwise `fields` is appended as one new
    /// record. Shared window keywords in `fields` always apply to streaming sets and
    /// persist for later appends until overwritten.
    ///
    /// Returns the number of records after the update.
    pub fn request_many(&mut self, records: Vec<Fields>, fields: Fields) -> Result<usize> {
        let (window, per_record) = match self.protocol {
            Protocol::Stream => fields.split_window(),
            Protocol::Archive => (Fields::new(), fields),
        };
        let (starttime, endtime) = self.next_window(&window)?;

        let next = if !records.is_empty() {
            if !per_record.is_empty() {
                debug!(
                    protocol = %self.protocol,
                    "explicit record list given; ignoring keyword fields"
                );
            }
            records
                .iter()
                .map(|f| RequestRecord::from_fields(f, &self.defaults, self.protocol))
                .collect::<Result<Vec<_>>>()?
        } else if !per_record.is_empty() {
            let record = RequestRecord::from_fields(&per_record, &self.defaults, self.protocol)?;
            let mut next = self.records.clone();
            next.push(record);
            next
        } else if self.protocol == Protocol::Archive {
            return Err(Error::Validation("no request fields given".into()));
        } else {
            self.records.clone()
        };

        self.starttime = starttime;
        self.endtime = endtime;
        self.records = next;
        debug!(protocol = %self.protocol, records = self.records.len(), "request set updated");
        Ok(self.records.len())
    }

    fn update(&mut self, index: usize, fields: Fields) -> Result<()> {
        let (window, per_record) = match self.protocol {
            Protocol::Stream => fields.split_window(),
            Protocol::Archive => (Fields::new(), fields),
        };
        let (starttime, endtime) = self.next_window(&window)?;

        let record = match self.records.get(index) {
            Some(existing) => Some(existing.merged(&per_record, &self.defaults, self.protocol)?),
            None if per_record.is_empty() && self.protocol == Protocol::Stream => None,
            None => Some(RequestRecord::from_fields(
                &per_record,
                &self.defaults,
                self.protocol,
            )?),
        };

        self.starttime = starttime;
        self.endtime = endtime;
        if let Some(record) = record {
            if index < self.records.len() {
                self.records[index] = record;
            } else {
                self.records.push(record);
            }
        }
        debug!(protocol = %self.protocol, index, "request updated");
        Ok(())
    }

    /// Window that results from overlaying `window` on the current shared window.
    fn next_window(
        &self,
        window: &Fields,
    ) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
        let starttime = window.time(STARTTIME)?.or(self.starttime);
        let endtime = window.time(ENDTIME)?.or(self.endtime);
        if let Some(start) = &starttime {
            check_window(start, endtime.as_ref())?;
        }
        Ok((starttime, endtime))
    }

    /// Full consistency check, run before rendering.
    pub fn validate(&self) -> Result<()> {
        if self.records.is_empty() {
            return Err(Error::Validation("request set is empty".into()));
        }
        for record in &self.records {
            record.validate(self.protocol)?;
        }
        if self.protocol == Protocol::Stream {
            let start = self
                .starttime
                .ok_or_else(|| Error::Validation("parameter starttime is required".into()))?;
            check_window(&start, self.endtime.as_ref())?;
        }
        Ok(())
    }

    /// Identity used for artifact naming: the first record's `NET.STA`,
    /// suffixed with the record count when there are several.
    pub fn identity(&self) -> String {
        match self.records.as_slice() {
            [] => "request".to_string(),
            [only] => only.identity(),
            [first, rest @ ..] => format!("{}+{}", first.identity(), rest.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn archive_set() -> RequestSet {
        RequestSet::new(Protocol::Archive, RequestDefaults::default())
    }

    fn stream_set() -> RequestSet {
        RequestSet::new(Protocol::Stream, RequestDefaults::default())
    }

    fn archive_fields(station: &str) -> Fields {
        Fields::new()
            .starttime("2019-01-01 00:00:00")
            .endtime("2019-01-01 01:00:00")
            .network("VG")
            .station(station)
            .channel("HHZ")
    }

    #[test]
    fn request_then_inspect_returns_normalized_record() {
        let mut set = archive_set();
        assert_eq!(set.request(archive_fields("MEPAS")).unwrap(), 0);
        assert_eq!(set.len(), 1);
        let r = &set.records()[0];
        assert_eq!(r.channels, vec!["HHZ".to_string()]);
        assert_eq!(r.location.as_deref(), Some("00"));
    }

    #[test]
    fn second_request_updates_only_given_field() {
        let mut set = archive_set();
        set.request(archive_fields("MEPAS")).unwrap();
        let before = set.records()[0].clone();

        set.request(Fields::new().station("X")).unwrap();
        assert_eq!(set.len(), 1);
        let after = &set.records()[0];
        assert_eq!(after.station, "X");
        assert_eq!(
            RequestRecord {
                station: before.station.clone(),
                ..after.clone()
            },
            before
        );
    }

    #[test]
    fn partial_first_archive_request_is_rejected() {
        let mut set = archive_set();
        assert!(set.request(Fields::new().station("X")).unwrap_err().is_validation());
        assert!(set.is_empty());
    }

    #[test]
    fn failed_update_leaves_set_untouched() {
        let mut set = archive_set();
        set.request(archive_fields("MEPAS")).unwrap();
        let before = set.records().to_vec();

        let bad = Fields::new().endtime("2018-01-01 00:00:00");
        assert!(set.request(bad).is_err());
        assert_eq!(set.records(), before.as_slice());

        let list = vec![archive_fields("MELAB"), Fields::new().station("broken")];
        assert!(set.request_many(list, Fields::new()).is_err());
        assert_eq!(set.records(), before.as_slice());
    }

    #[test]
    fn request_many_sequence_replaces_in_order() {
        let mut set = archive_set();
        set.request(archive_fields("OLD")).unwrap();
        let n = set
            .request_many(
                vec![
                    archive_fields("MEPAS"),
                    archive_fields("MELAB"),
                    archive_fields("MEGRA"),
                ],
                Fields::new(),
            )
            .unwrap();
        assert_eq!(n, 3);
        let stations: Vec<_> = set.records().iter().map(|r| r.station.as_str()).collect();
        assert_eq!(stations, ["MEPAS", "MELAB", "MEGRA"]);
    }

    #[test]
    fn keyword_appends_match_explicit_sequence() {
        let mut by_list = archive_set();
        by_list
            .request_many(
                vec![archive_fields("MEPAS"), archive_fields("MELAB")],
                Fields::new(),
            )
            .unwrap();

        let mut by_kw = archive_set();
        by_kw.request_many(vec![], archive_fields("MEPAS")).unwrap();
        by_kw.request_many(vec![], archive_fields("MELAB")).unwrap();

        assert_eq!(by_list.records(), by_kw.records());
    }

    #[test]
    fn sequence_wins_over_keyword_fields() {
        let mut set = archive_set();
        set.request_many(vec![archive_fields("MEPAS")], archive_fields("IGNORED"))
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.records()[0].station, "MEPAS");
    }

    #[test]
    fn request_at_addresses_explicit_index() {
        let mut set = archive_set();
        set.request_many(
            vec![archive_fields("MEPAS"), archive_fields("MELAB")],
            Fields::new(),
        )
        .unwrap();
        set.request_at(1, Fields::new().channel(["HHZ", "EHZ"])).unwrap();
        assert_eq!(set.records()[0].channels, vec!["HHZ".to_string()]);
        assert_eq!(set.records()[1].channels.len(), 2);
        assert!(set.request_at(5, Fields::new().station("X")).is_err());
    }

    #[test]
    fn stream_window_is_shared_and_persists() {
        let mut set = stream_set();
        set.request_many(
            vec![],
            Fields::new()
                .starttime("2019-01-01 00:00:00")
                .endtime("2019-01-01 01:00:00"),
        )
        .unwrap();
        assert!(set.is_empty());

        set.request_many(vec![], Fields::new().station("MEPAS").channel("HHZ"))
            .unwrap();
        set.request_many(vec![], Fields::new().station("MELAB")).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.starttime(),
            Some(Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap())
        );
        assert!(set.records().iter().all(|r| r.starttime.is_none()));
        set.validate().unwrap();
    }

    #[test]
    fn stream_request_splits_window_from_entry() {
        let mut set = stream_set();
        set.request(
            Fields::new()
                .starttime("2019-01-01 00:00:00")
                .endtime("2019-01-01 01:00:00"),
        )
        .unwrap();
        assert!(set.is_empty());
        set.request(Fields::new().network("VG").station("MEPAS").channel(["HHZ", "EHZ"]))
            .unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.endtime().is_some());
    }

    #[test]
    fn stream_sequence_still_applies_shared_window() {
        let mut set = stream_set();
        set.request_many(
            vec![Fields::new().station("MEPAS"), Fields::new().station("MELAB")],
            Fields::new().starttime("2019-01-01 00:00:00").station("IGNORED"),
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.starttime().is_some());
        assert_eq!(set.identity(), "VG.MEPAS+1");
    }

    #[test]
    fn stream_validate_needs_starttime() {
        let mut set = stream_set();
        set.request(Fields::new().station("MEPAS")).unwrap();
        assert!(set.validate().unwrap_err().is_validation());
    }

    #[test]
    fn clear_resets_everything() {
        let mut set = stream_set();
        set.request(Fields::new().starttime("2019-01-01").station("MEPAS"))
            .unwrap();
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.starttime(), None);
    }
}
