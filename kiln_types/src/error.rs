use std::fmt;

use serde::{Deserialize, Serialize};

/// The error kinds the runtime reports to its error reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorKind {
    BadParameter,
    BadIndex,
    Io,
    IllegalOperation,
    Parse,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::BadParameter => "bad parameter",
            ErrorKind::BadIndex => "bad index",
            ErrorKind::Io => "i/o failure",
            ErrorKind::IllegalOperation => "illegal operation",
            ErrorKind::Parse => "parse error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
