// Consistent exit codes for the threadspace CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error (emitted by clap)
//   3  = workspace not found
//   10 = state directory unreadable or unwritable
//   11 = config file invalid

use std::process;

use threadspace_state::config::ConfigError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    NotFound = 3,
    Storage = 10,
    Config = 11,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.downcast_ref::<WorkspaceNotFound>().is_some() {
                return Self::NotFound;
            }
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::Config;
            }
            if cause.downcast_ref::<std::io::Error>().is_some() {
                return Self::Storage;
            }
        }
        Self::Error
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

/// Raised when a command names a workspace id that is not in the store.
#[derive(Debug)]
pub struct WorkspaceNotFound {
    pub id: String,
}

impl std::fmt::Display for WorkspaceNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "workspace `{}` not found", self.id)
    }
}

impl std::error::Error for WorkspaceNotFound {}
