use ruft_shared::TransferOp;
use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use std::{env, time::Duration};

const DEFAULT_TIMEOUT_MS: u64 = 2000; // ms
const DEFAULT_WINDOW_SIZE: usize = 4;
const DEFAULT_RETRY_LIMIT: u32 = 10;

pub struct Config {
    host: String,
    port: u16,
    mode: TransferOp,
    filename: String,

    /// Number of DATA packets the upload sender keeps in flight
    window_size: usize,

    /// Duration to wait for a reply before retransmitting
    timeout: Duration,

    /// Number of unanswered retransmissions tolerated before a transfer
    /// is abandoned
    retry_limit: u32,

    /// Overrides the default `downloaded_<basename>` download destination
    output_path: Option<PathBuf>,
}

impl Config {
    pub fn new_from_args() -> Self {
        let mut args = env::args();

        args.next().expect("first argument must be set");

        let host = args.next().expect("host arg (1) must be set");
        let port = args
            .next()
            .expect("port arg (2) must be set")
            .parse::<u16>()
            .expect("could not parse arg (2) as port");
        let mode = args.next().expect("mode arg (3) must be set");
        let mode = TransferOp::try_from(mode.to_uppercase().as_str())
            .expect("mode arg (3) must be 'upload' or 'download'");
        let filename = args.next().expect("filename arg (4) must be set");

        Self::new(&host, port, mode, &filename)
    }

    pub fn new(host: &str, port: u16, mode: TransferOp, filename: &str) -> Self {
        Self {
            host: host.to_owned(),
            port,
            mode,
            filename: filename.to_owned(),
            window_size: DEFAULT_WINDOW_SIZE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retry_limit: DEFAULT_RETRY_LIMIT,
            output_path: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host[..]
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn mode(&self) -> TransferOp {
        self.mode
    }

    pub fn filename(&self) -> &str {
        &self.filename[..]
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn with_window_size(mut self, value: usize) -> Self {
        assert!(value > 0);
        self.window_size = value;

        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn with_timeout(mut self, value: Duration) -> Self {
        self.timeout = value;

        self
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn with_retry_limit(mut self, value: u32) -> Self {
        self.retry_limit = value;

        self
    }

    /// Where a download is written: `downloaded_<basename>` in the working
    /// directory unless overridden.
    pub fn output_path(&self) -> PathBuf {
        match &self.output_path {
            Some(path) => path.clone(),
            None => {
                let basename = Path::new(&self.filename)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| self.filename.clone());

                PathBuf::from(format!("downloaded_{}", basename))
            }
        }
    }

    pub fn with_output_path(mut self, value: PathBuf) -> Self {
        self.output_path = Some(value);

        self
    }
}
