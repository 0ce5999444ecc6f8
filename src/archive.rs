use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::defaults::{Address, Protocol, RequestDefaults};
use crate::error::{Error, Result};
use crate::executor::{Execution, ProcessExecutor};
use crate::output::{OutputResolver, REQUEST_FILE_EXTENSION, remove_if_exists};
use crate::record::RequestRecord;
use crate::request::Fields;
use crate::request_set::RequestSet;
use crate::serializer::render_archive;

pub const ARCLINK_FETCH: &str = "arclink_fetch";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArchiveOptions {
    /// `host:port` of the ArcLink server.
    pub address: Option<String>,
    /// Requester identity (usually an e-mail address).
    pub user: Option<String>,
    pub data_format: String,
    pub request_format: String,
    pub preferred_sample_rate: Option<f64>,
    pub label: Option<String>,
    pub no_resp_dict: bool,
    pub rebuild_volume: bool,
    pub proxy: bool,
    pub timeout: u64,
    pub retries: u32,
    /// Utility to run; bare names are looked up on `PATH`.
    pub executable: PathBuf,
    /// Interpreter to run the utility under, e.g. `/usr/bin/python`.
    pub interpreter: Option<PathBuf>,
    /// Directory for generated request and output files (system temp dir if unset).
    pub output_path: Option<PathBuf>,
    /// Fixed output file; generated per execution when unset.
    pub output_file: Option<PathBuf>,
    /// Fixed request file; generated per execution when unset.
    pub request_file: Option<PathBuf>,
    pub defaults: RequestDefaults,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            address: None,
            user: None,
            data_format: "mseed".to_string(),
            request_format: "native".to_string(),
            preferred_sample_rate: None,
            label: None,
            no_resp_dict: false,
            rebuild_volume: false,
            proxy: false,
            timeout: 300,
            retries: 5,
            executable: PathBuf::from(ARCLINK_FETCH),
            interpreter: None,
            output_path: None,
            output_file: None,
            request_file: None,
            defaults: RequestDefaults::default(),
        }
    }
}

impl ArchiveOptions {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Client for the archive protocol: batches per-record windows into one request file
/// and runs `arclink_fetch` over it.
#[derive(Debug, Clone)]
pub struct ArchiveClient {
    opts: ArchiveOptions,
    address: Option<Address>,
    resolver: OutputResolver,
    requests: RequestSet,
    request_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

impl ArchiveClient {
    pub fn new(opts: ArchiveOptions) -> Result<Self> {
        let address = opts
            .address
            .as_deref()
            .map(|a| opts.defaults.parse_address(a, Protocol::Archive))
            .transpose()?;
        let resolver = match &opts.output_path {
            Some(dir) => OutputResolver::new(dir),
            None => OutputResolver::in_temp_dir(),
        };
        let requests = RequestSet::new(Protocol::Archive, opts.defaults.clone());

        Ok(Self {
            opts,
            address,
            resolver,
            requests,
            request_file: None,
            output_file: None,
        })
    }

    /// Replace the artifact naming/location strategy.
    pub fn with_resolver(mut self, resolver: OutputResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.opts
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    /// Create the pending request (index 0) or update it in place.
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

    /// Request file contents for the current set.
    pub fn render_request(&self) -> Result<String> {
        render_archive(&self.requests)
    }

    /// Utility arguments, in fixed order, ending with the request file path.
    pub fn arguments(&self, request_file: &Path, output_file: &Path) -> Vec<String> {
        let o = &self.opts;
        let mut args = Vec::new();
        if let Some(a) = &self.address {
            args.push(format!("--address={a}"));
        }
        if let Some(u) = &o.user {
            args.push(format!("--user={u}"));
        }
        args.push(format!("--request-format={}", o.request_format));
        args.push(format!("--data-format={}", o.data_format));
        if let Some(rate) = o.preferred_sample_rate {
            args.push(format!("--preferred-sample-rate={rate}"));
        }
        if let Some(label) = &o.label {
            args.push(format!("--label={label}"));
        }
        for (flag, on) in [
            ("--no-resp-dict", o.no_resp_dict),
            ("--rebuild-volume", o.rebuild_volume),
            ("--proxy", o.proxy),
        ] {
            if on {
                args.push(flag.to_string());
            }
        }
        args.push(format!("--timeout={}", o.timeout));
        args.push(format!("--retries={}", o.retries));
        args.push(format!("--output-file={}", output_file.display()));
        args.push(request_file.display().to_string());
        args
    }

    fn check_required(&self) -> Result<()> {
        if self.address.is_none() {
            return Err(Error::Validation("parameter address is required".into()));
        }
        if self.opts.user.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Validation("parameter user is required".into()));
        }
        Ok(())
    }

    fn executor(&self) -> ProcessExecutor {
        ProcessExecutor::new(&self.opts.executable)
            .interpreter(self.opts.interpreter.clone())
            .working_dir(self.resolver.dir())
    }

    /// Write the request file, run the utility and resolve its output.
    ///
    /// Validation and executable lookup happen before anything touches disk. On failure
    /// the generated request file and any partial output are removed; the request set
    /// is unchanged.
    pub fn execute(&mut self) -> Result<Execution> {
        self.check_required()?;
        let payload = self.render_request()?;
        let executor = self.executor();
        executor.command(&[])?;

        // The previous generated request file is transient; it is superseded now.
        if let Some(prev) = &self.request_file {
            if self.opts.request_file.is_none() {
                remove_if_exists(prev)?;
            }
            self.request_file = None;
        }

        let identity = self.requests.identity();
        let request_file = self
            .opts
            .request_file
            .clone()
            .unwrap_or_else(|| self.resolver.plan(&identity, REQUEST_FILE_EXTENSION));
        let output_file = self
            .opts
            .output_file
            .clone()
            .unwrap_or_else(|| self.resolver.plan(&identity, &self.opts.data_format));

        fs::write(&request_file, &payload)?;
        debug!(
            path = %request_file.display(),
            lines = payload.lines().count(),
            "request file written"
        );

        let args = self.arguments(&request_file, &output_file);
        let result = executor
            .run(&args)
            .and_then(|process| Ok((process, self.resolver.verify(&output_file)?)));

        match result {
            Ok((process, output_file)) => {
                self.request_file = Some(request_file.clone());
                self.output_file = Some(output_file.clone());
                Ok(Execution {
                    process,
                    output_file,
                    request_file: Some(request_file),
                })
            }
            Err(e) => {
                self.discard(&request_file, &output_file);
                Err(e)
            }
        }
    }

    fn discard(&self, request_file: &Path, output_file: &Path) {
        let generated = [
            (request_file, self.opts.request_file.is_none()),
            (output_file, self.opts.output_file.is_none()),
        ];
        for (path, owned) in generated {
            if owned {
                if let Err(e) = remove_if_exists(path) {
                    warn!(error = %e, "cleanup after failed execution");
                }
            }
        }
    }

    /// Path of the last resolved artifact.
    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    /// Path of the last written request file.
    pub fn request_file(&self) -> Option<&Path> {
        self.request_file.as_deref()
    }

    /// Remove the last request file and artifact. Every removal is attempted; the
    /// first failure is returned.
    pub fn cleanup(&mut self) -> Result<()> {
        let mut first_err = None;
        for path in [self.output_file.take(), self.request_file.take()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = remove_if_exists(&path) {
                warn!(error = %e, "cleanup failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
