use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::defaults::{Address, Protocol, RequestDefaults};
use crate::error::{Error, Result};
use crate::executor::{Execution, ProcessExecutor};
use crate::output::{OutputResolver, remove_if_exists};
use crate::record::RequestRecord;
use crate::request::Fields;
use crate::request_set::RequestSet;
use crate::serializer::{render_stream_list, render_time_window};

pub const SLINKTOOL: &str = "slinktool";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// `host:port` of the SeedLink server.
    pub address: Option<String>,
    /// Seconds to wait before reconnecting (`-nd`).
    pub delay: u64,
    /// Network timeout in seconds (`-nt`).
    pub timeout: u64,
    /// Used as the artifact extension.
    pub data_format: String,
    pub executable: PathBuf,
    /// Optional interpreter or wrapper the utility is run under.
    pub interpreter: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub defaults: RequestDefaults,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            address: None,
            delay: 30,
            timeout: 60,
            data_format: "mseed".to_string(),
            executable: PathBuf::from(SLINKTOOL),
            interpreter: None,
            output_path: None,
            output_file: None,
            defaults: RequestDefaults::default(),
        }
    }
}

impl StreamOptions {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Client for the streaming protocol: one shared window over many streams,
/// fetched by a single `slinktool` run.
///
/// This client is meant for time-window requests, not for continuous recording.
#[derive(Debug, Clone)]
pub struct StreamClient {
    opts: StreamOptions,
    address: Option<Address>,
    resolver: OutputResolver,
    requests: RequestSet,
    output_file: Option<PathBuf>,
}

impl StreamClient {
    pub fn new(opts: StreamOptions) -> Result<Self> {
        let address = opts
            .address
            .as_deref()
            .map(|a| opts.defaults.parse_address(a, Protocol::Stream))
            .transpose()?;
        let resolver = match &opts.output_path {
            Some(dir) => OutputResolver::new(dir),
            None => OutputResolver::in_temp_dir(),
        };
        let requests = RequestSet::new(Protocol::Stream, opts.defaults.clone());

        Ok(Self {
            opts,
            address,
            resolver,
            requests,
            output_file: None,
        })
    }

    pub fn with_resolver(mut self, resolver: OutputResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn options(&self) -> &StreamOptions {
        &self.opts
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    /// Update the shared window and/or create-or-update stream 0.
    pub fn request(&mut self, fields: Fields) -> Result<usize> {
        self.requests.request(fields)
    }

    pub fn request_at(&mut self, index: usize, fields: Fields) -> Result<()> {
        self.requests.request_at(index, fields)
    }

    /// See [`RequestSet::request_many`].
    pub fn request_many(&mut self, records: Vec<Fields>, fields: Fields) -> Result<usize> {
        self.requests.request_many(records, fields)
    }

    pub fn requests(&self) -> &[RequestRecord] {
        self.requests.records()
    }

    pub fn requests_mut(&mut self) -> &mut Vec<RequestRecord> {
        self.requests.records_mut()
    }

    pub fn request_set(&self) -> &RequestSet {
        &self.requests
    }

    pub fn clear_request(&mut self) {
        self.requests.clear();
    }

    pub fn render_time_window(&self) -> Result<String> {
        render_time_window(&self.requests)
    }

    pub fn render_stream_list(&self) -> Result<String> {
        render_stream_list(&self.requests)
    }

    /// `-nd <delay> -nt <timeout> -tw <window> -S <streams> -o <output> [address]`.
    pub fn arguments(&self, output_file: &Path) -> Result<Vec<String>> {
        let mut args = vec![
            "-nd".to_string(),
            self.opts.delay.to_string(),
            "-nt".to_string(),
            self.opts.timeout.to_string(),
            "-tw".to_string(),
            self.render_time_window()?,
            "-S".to_string(),
            self.render_stream_list()?,
            "-o".to_string(),
            output_file.display().to_string(),
        ];
        if let Some(a) = &self.address {
            args.push(a.to_string());
        }
        Ok(args)
    }

    /// Run the utility over the whole set and resolve its output.
    pub fn execute(&mut self) -> Result<Execution> {
        let address = self
            .address
            .as_ref()
            .ok_or_else(|| Error::Validation("parameter address is required".into()))?;
        let identity = self.requests.identity();
        let output_file = self
            .opts
            .output_file
            .clone()
            .unwrap_or_else(|| self.resolver.plan(&identity, &self.opts.data_format));
        let args = self.arguments(&output_file)?;
        debug!(%address, streams = self.requests.len(), "stream request prepared");

        let executor = ProcessExecutor::new(&self.opts.executable)
            .interpreter(self.opts.interpreter.clone())
            .working_dir(self.resolver.dir());
        let result = executor
            .run(&args)
            .and_then(|process| Ok((process, self.resolver.verify(&output_file)?)));

        match result {
            Ok((process, output_file)) => {
                self.output_file = Some(output_file.clone());
                Ok(Execution {
                    process,
                    output_file,
                    request_file: None,
                })
            }
            Err(e) => {
                if self.opts.output_file.is_none() {
                    if let Err(ce) = remove_if_exists(&output_file) {
                        warn!(error = %ce, "cleanup after failed execution");
                    }
                }
                Err(e)
            }
        }
    }

    /// Path of the last resolved artifact.
    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    pub fn cleanup(&mut self) -> Result<()> {
        match self.output_file.take() {
            Some(path) => remove_if_exists(&path).map(|_| ()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_construction_options() {
        let client = StreamClient::new(StreamOptions {
            address: Some("192.168.0.25:18000".into()),
            data_format: "mseed".into(),
            ..StreamOptions::default()
        })
        .unwrap();
        assert_eq!(client.address().unwrap().to_string(), "192.168.0.25:18000");
        assert_eq!(client.options().data_format, "mseed");
    }

    #[test]
    fn builds_cli_arguments() {
        let mut client = StreamClient::new(StreamOptions::default()).unwrap();
        client
            .request(
                Fields::new()
                    .starttime("2019-01-01 00:00:00")
                    .endtime("2019-01-01 01:00:00"),
            )
            .unwrap();
        client
            .request(Fields::new().network("VG").station("MEPAS").channel(["HHZ", "EHZ"]))
            .unwrap();
        assert_eq!(
            client.arguments(Path::new("/tmp/data.mseed")).unwrap(),
            [
                "-nd",
                "30",
                "-nt",
                "60",
                "-tw",
                "2019,01,01,00,00,00:2019,01,01,01,00,00",
                "-S",
                "VG_MEPAS:HHZ EHZ",
                "-o",
                "/tmp/data.mseed",
            ]
        );
    }

    #[test]
    fn window_only_request_needs_streams() {
        let mut client = StreamClient::new(StreamOptions::default()).unwrap();
        client
            .request_many(vec![], Fields::new().starttime("2019-01-01 00:00:00"))
            .unwrap();
        assert!(client.requests().is_empty());
        assert!(client.render_stream_list().unwrap_err().is_validation());
    }

    #[test]
    fn execute_requires_address() {
        let mut client = StreamClient::new(StreamOptions::default()).unwrap();
        client
            .request(Fields::new().starttime("2019-01-01 00:00:00").station("MEPAS"))
            .unwrap();
        assert!(client.execute().unwrap_err().is_validation());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::fs;

        const OK_STUB: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  if [ "$1" = "-S" ]; then streams="$2"; fi
  shift
done
printf '%s' "$streams" > "$out"
"#;

        fn client(dir: &Path, stub: &str) -> StreamClient {
            let program = dir.join("slinktool");
            fs::write(&program, stub).unwrap();
            let mut c = StreamClient::new(StreamOptions {
                address: Some("192.168.0.25:18000".into()),
                executable: program,
                interpreter: Some(PathBuf::from("/bin/sh")),
                output_path: Some(dir.to_path_buf()),
                ..StreamOptions::default()
            })
            .unwrap();
            c.request_many(
                vec![
                    Fields::new().station("MEPAS").channel(["HHZ", "EHZ"]),
                    Fields::new().station("MELAB"),
                ],
                Fields::new()
                    .starttime("2019-01-01 00:00:00")
                    .endtime("2019-01-01 01:00:00"),
            )
            .unwrap();
            c
        }

        #[test]
        fn execute_passes_all_streams_in_one_run() {
            let dir = tempfile::tempdir().unwrap();
            let mut c = client(dir.path(), OK_STUB);
            let exec = c.execute().unwrap();
            assert_eq!(c.output_file(), Some(exec.output_file.as_path()));
            assert_eq!(
                fs::read_to_string(&exec.output_file).unwrap(),
                "VG_MEPAS:HHZ EHZ,VG_MELAB"
            );
            assert_eq!(exec.process.command.last().map(String::as_str), Some("192.168.0.25:18000"));

            c.cleanup().unwrap();
            assert!(!exec.output_file.exists());
        }

        #[test]
        fn failure_carries_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let mut c = client(dir.path(), "#!/bin/sh\nprintf 'server unreachable' >&2\nexit 1\n");
            let before = c.requests().to_vec();
            let err = c.execute().unwrap_err();
            assert!(matches!(err, Error::Execution { status: Some(1), .. }));
            assert_eq!(err.stderr(), Some("server unreachable"));
            assert_eq!(c.requests(), before.as_slice());
        }
    }
}
