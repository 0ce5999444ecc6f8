//! Rendering of a [`RequestSet`] into the payload each fetch utility consumes.
//!
//! Output depends only on the set's contents, so rendering the same set twice
//! yields byte-identical results.

use crate::date::{format_timestamp, format_window};
use crate::defaults::Protocol;
use crate::error::{Error, Result};
use crate::request_set::RequestSet;

/// Archive request file: one line per record and channel,
/// `<start> <end> <network> <station> <channel> <location>`.
///
/// Timestamps use `RequestDefaults::archive_time_format`, by default the
/// `YYYY,MM,DD,HH,MM,SS` layout `arclink_fetch` reads.
pub fn render_archive(set: &RequestSet) -> Result<String> {
    expect_protocol(set, Protocol::Archive)?;
    set.validate()?;

    let fmt = &set.defaults().archive_time_format;
    let mut out = String::new();
    for record in set.records() {
        // validate() guarantees both ends are present for archive records.
        let (Some(start), Some(end)) = (&record.starttime, &record.endtime) else {
            return Err(Error::Validation("archive record without window".into()));
        };
        let start = format_timestamp(start, fmt);
        let end = format_timestamp(end, fmt);
        let location = record
            .location
            .as_deref()
            .unwrap_or(&set.defaults().location);

        for channel in &record.channels {
            out.push_str(&format!(
                "{start} {end} {} {} {channel} {location}\n",
                record.network, record.station
            ));
        }
    }
    Ok(out)
}

/// Shared streaming window, `start:end` (or `start:` when open-ended).
pub fn render_time_window(set: &RequestSet) -> Result<String> {
    expect_protocol(set, Protocol::Stream)?;
    set.validate()?;
    let start = set
        .starttime()
        .ok_or_else(|| Error::Validation("parameter starttime is required".into()))?;
    Ok(format_window(&start, set.endtime().as_ref()))
}

/// Streaming selector list: `NET_STA[:CHA CHA2],NET_STA2,...`.
///
/// Tokens are comma-separated in insertion order; channel selectors within a token are
/// space-separated in insertion order. An entry without channels selects every channel.
pub fn render_stream_list(set: &RequestSet) -> Result<String> {
    expect_protocol(set, Protocol::Stream)?;
    set.validate()?;

    let tokens: Vec<String> = set
        .records()
        .iter()
        .map(|r| {
            let netsta = format!("{}_{}", r.network, r.station);
            if r.channels.is_empty() {
                netsta
            } else {
                format!("{netsta}:{}", r.channels.join(" "))
            }
        })
        .collect();
    Ok(tokens.join(","))
}

fn expect_protocol(set: &RequestSet, protocol: Protocol) -> Result<()> {
    if set.protocol() != protocol {
        return Err(Error::Validation(format!(
            "cannot render a {} request set as {protocol}",
            set.protocol()
        )));
    }
    Ok(())
}
