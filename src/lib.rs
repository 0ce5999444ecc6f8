#![forbid(unsafe_code)]

//! Request builder and execution engine for ArcLink and SeedLink waveform retrieval.
//!
//! The wire protocols are spoken by external fetch utilities (`arclink_fetch` for the
//! archive protocol, `slinktool` for the streaming protocol). This crate accumulates
//! partially specified requests into a canonical [`RequestSet`], renders it into the
//! exact request file or argument vector each utility expects, runs the utility as a
//! subprocess (no shell involved) and resolves the artifact it produced.
//!
//! **Archive protocol** (one window per record)
//! ```no_run
//! use seislink::{ArchiveClient, ArchiveOptions, Fields};
//!
//! let mut client = ArchiveClient::new(ArchiveOptions {
//!     address: Some("192.168.0.25:18001".to_string()),
//!     user: Some("someone@example.org".to_string()),
//!     ..ArchiveOptions::default()
//! })?;
//! client.request(
//!     Fields::new()
//!         .starttime("2019-07-25 00:00:00")
//!         .endtime("2019-07-25 01:00:00")
//!         .network("VG")
//!         .station("MEPAS")
//!         .channel("HHZ"),
//! )?;
//! println!("{:?}", client.requests());
//! client.execute()?;
//! println!("{:?}", client.output_file());
//! # Ok::<(), seislink::Error>(())
//! ```
//!
//! **Streaming protocol** (one shared window, many streams)
//! ```no_run
//! use seislink::{Fields, StreamClient, StreamOptions};
//!
//! let mut client = StreamClient::new(StreamOptions {
//!     address: Some("192.168.0.25:18000".to_string()),
//!     ..StreamOptions::default()
//! })?;
//! client.request_many(
//!     vec![
//!         Fields::new().station("MEPAS").channel(["HHZ", "EHZ"]),
//!         Fields::new().station("MELAB"),
//!     ],
//!     Fields::new()
//!         .starttime("2019-01-01 00:00:00")
//!         .endtime("2019-01-01 01:00:00"),
//! )?;
//! let exec = client.execute()?;
//! println!("{}", exec.output_file.display());
//! # Ok::<(), seislink::Error>(())
//! ```
//!
//! Notes:
//! - Timestamps are normalized to UTC; naive inputs are taken as UTC.
//! - One `execute()` is one blocking subprocess run; nothing is retried here.
//! - For one-shot use with guaranteed cleanup see [`ScopedFetch`] and [`stream_manager`].

mod archive;
mod date;
mod defaults;
mod error;
mod executor;
mod output;
mod record;
mod request;
mod request_set;
mod scoped;
mod serializer;
mod stream;

pub use crate::archive::{ARCLINK_FETCH, ArchiveClient, ArchiveOptions};
pub use crate::date::{NATIVE_TIME_FORMAT, parse_timestamp};
pub use crate::defaults::{Address, Protocol, RequestDefaults};
pub use crate::error::{Error, Result};
pub use crate::executor::{Execution, ProcessExecutor, ProcessOutput};
pub use crate::output::{ArtifactKey, NamingStrategy, OutputResolver, TimestampNaming};
pub use crate::record::RequestRecord;
pub use crate::request::{Fields, RequestValue};
pub use crate::request_set::RequestSet;
pub use crate::scoped::{ScopedFetch, stream_manager, stream_manager_with};
pub use crate::serializer::{render_archive, render_stream_list, render_time_window};
pub use crate::stream::{SLINKTOOL, StreamClient, StreamOptions};
