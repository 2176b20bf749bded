// aggregation
pub const DEFAULT_MAX_DIFF_BYTES: usize = 256 * 1024;
pub const DEFAULT_FETCH_WORKERS: usize = 8;
pub const CANCEL_POLL_INTERVAL_MS: u64 = 25;

// diff
pub const DEFAULT_CONTEXT: u32 = 3;
pub const RENAME_THRESHOLD: u16 = 50;

// git binary
pub const GIT_PROGRAM: &str = "git";
pub const GIT_TIMEOUT_SECS: u64 = 30;

// ui
pub const MAX_FILES_TO_SHOW: usize = 10;
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

// config
pub const CONFIG_DIR_NAME: &str = "staged-diff";
pub const CONFIG_FILE_NAME: &str = "config.json";

// exit codes
pub const EXIT_FATAL: i32 = 1;
pub const EXIT_PARTIAL: i32 = 3;
pub const EXIT_CANCELLED: i32 = 130;
