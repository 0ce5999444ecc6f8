use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::archive::{ArchiveClient, ArchiveOptions};
use crate::error::{Error, Result};
use crate::output::remove_if_exists;
use crate::request::Fields;

/// Requester identity used when a scope is opened from just an address.
pub const SCOPED_USER: &str = "user";

/// One-shot archive retrieval whose files live exactly as long as the value.
///
/// Opening builds a single-record request, runs the fetch utility and resolves the
/// artifact. The request file and the artifact are removed by [`close`](Self::close),
/// or on drop (including unwinding) if the scope was never closed.
#[derive(Debug)]
pub struct ScopedFetch {
    client: ArchiveClient,
    path: PathBuf,
    closed: bool,
}

impl ScopedFetch {
    /// Fetch with default archive options against `address`.
    pub fn open(address: &str, fields: Fields) -> Result<Self> {
        let opts = ArchiveOptions {
            address: Some(address.to_string()),
            user: Some(SCOPED_USER.to_string()),
            data_format: "mseed".to_string(),
            ..ArchiveOptions::default()
        };
        Self::open_with(opts, fields)
    }

    pub fn open_with(opts: ArchiveOptions, fields: Fields) -> Result<Self> {
        if opts.address.is_none() {
            return Err(Error::Validation("parameter address is required".into()));
        }
        let fixed = [opts.request_file.clone(), opts.output_file.clone()];
        let mut client = ArchiveClient::new(opts)?;
        client.request_many(Vec::new(), fields)?;

        match client.execute() {
            Ok(exec) => {
                debug!(path = %exec.output_file.display(), "scope opened");
                Ok(Self {
                    client,
                    path: exec.output_file,
                    closed: false,
                })
            }
            Err(e) => {
                // Generated files are already gone. Caller-fixed paths are only ours
                // once the fetch has written to them.
                let ran = matches!(e, Error::Execution { .. } | Error::MissingOutput(_));
                let wrote_request = ran || matches!(e, Error::Spawn { .. });
                let [request_file, output_file] = fixed;
                let targets = [(request_file, wrote_request), (output_file, ran)];
                for (path, owned) in targets {
                    let Some(path) = path.filter(|_| owned) else {
                        continue;
                    };
                    if let Err(ce) = remove_if_exists(&path) {
                        warn!(error = %ce, "cleanup after failed scoped fetch");
                    }
                }
                Err(e)
            }
        }
    }

    /// The retrieved artifact, valid until the scope ends.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// End the scope, reporting cleanup failures.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.client.cleanup()
    }
}

impl Drop for ScopedFetch {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.client.cleanup() {
            warn!(error = %e, "scoped fetch cleanup failed");
        }
    }
}

/// Run `f` with the path of a freshly fetched artifact, then remove every file the
/// fetch created.
///
/// An error from `f` wins over a cleanup error; the latter is then only logged.
///
/// ```no_run
/// use seislink::{Fields, stream_manager};
///
/// let bytes = stream_manager(
///     "192.168.0.25:18001",
///     Fields::new()
///         .starttime("2019-01-01 00:00:00")
///         .endtime("2019-01-01 01:00:00")
///         .network("VG")
///         .station("MEPAS")
///         .channel("HHZ"),
///     |path| Ok::<_, seislink::Error>(std::fs::metadata(path)?.len()),
/// )?;
/// # Ok::<(), seislink::Error>(())
/// ```
pub fn stream_manager<T, E, F>(address: &str, fields: Fields, f: F) -> std::result::Result<T, E>
where
    F: FnOnce(&Path) -> std::result::Result<T, E>,
    E: From<Error>,
{
    let scope = ScopedFetch::open(address, fields)?;
    finish(scope, f)
}

/// Like [`stream_manager`] but with explicit archive options.
pub fn stream_manager_with<T, E, F>(
    opts: ArchiveOptions,
    fields: Fields,
    f: F,
) -> std::result::Result<T, E>
where
    F: FnOnce(&Path) -> std::result::Result<T, E>,
    E: From<Error>,
{
    let scope = ScopedFetch::open_with(opts, fields)?;
    finish(scope, f)
}

fn finish<T, E, F>(scope: ScopedFetch, f: F) -> std::result::Result<T, E>
where
    F: FnOnce(&Path) -> std::result::Result<T, E>,
    E: From<Error>,
{
    let outcome = f(scope.path());
    match (outcome, scope.close()) {
        (Ok(v), Ok(())) => Ok(v),
        (Ok(_), Err(ce)) => Err(ce.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(ce)) => {
            warn!(error = %ce, "cleanup failed after caller error");
            Err(e)
        }
    }
}
