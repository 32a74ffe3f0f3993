use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use kiln_types::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RtError {
    #[error("bad parameter: {0}")]
    BadParameter(String),
    #[error("index {index} out of range for size {size}")]
    BadIndex { index: usize, size: usize },
    #[error("i/o failure: {0}")]
    Io(String),
    #[error("illegal operation: {0}")]
    IllegalOperation(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Raised by the graph reader; the whole parse is abandoned on the first one.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, RtError>;

impl RtError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RtError::BadParameter(_) => ErrorKind::BadParameter,
            RtError::BadIndex { .. } => ErrorKind::BadIndex,
            RtError::Io(_) => ErrorKind::Io,
            RtError::IllegalOperation(_) => ErrorKind::IllegalOperation,
            RtError::Parse(_) => ErrorKind::Parse,
        }
    }

    pub fn bad_param(msg: impl Into<String>) -> Self {
        RtError::BadParameter(msg.into())
    }

    pub fn bad_index(index: usize, size: usize) -> Self {
        RtError::BadIndex { index, size }
    }

    pub fn illegal(msg: impl Into<String>) -> Self {
        RtError::IllegalOperation(msg.into())
    }
}

impl From<io::Error> for RtError {
    fn from(err: io::Error) -> Self {
        RtError::Io(err.to_string())
    }
}

/// Receives every error the runtime raises, at the point it is raised.
pub trait ErrorReporter {
    fn report(&self, kind: ErrorKind, message: &str);
}

/// Default reporter: hands errors to the `log` facade.
#[derive(Debug, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, kind: ErrorKind, message: &str) {
        log::warn!("runtime error ({}): {}", kind, message);
    }
}

/// Keeps reported errors around, for embedders that poll instead of logging.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    reports: Rc<RefCell<Vec<(ErrorKind, String)>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(ErrorKind, String)> {
        self.reports.borrow().clone()
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.reports.borrow().iter().map(|(k, _)| *k).collect()
    }

    pub fn clear(&self) {
        self.reports.borrow_mut().clear();
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, kind: ErrorKind, message: &str) {
        self.reports.borrow_mut().push((kind, message.to_owned()));
    }
}

thread_local! {
    static REPORTER: RefCell<Rc<dyn ErrorReporter>> = RefCell::new(Rc::new(LogReporter));
}

/// Installs the reporter for this thread, returning the previous one.
pub fn set_reporter(reporter: Rc<dyn ErrorReporter>) -> Rc<dyn ErrorReporter> {
    REPORTER.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), reporter))
}

/// Reports `err` and hands it back to be returned.
pub fn report(err: RtError) -> RtError {
    // cloned out so a reporter can itself touch the runtime
    let reporter = REPORTER.with(|slot| slot.borrow().clone());
    reporter.report(err.kind(), &err.to_string());
    err
}

pub fn fail<T>(err: RtError) -> Result<T> {
    Err(report(err))
}
