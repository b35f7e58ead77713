//! Top-level error and exit handling.

use std::error::Error as StdError;
use std::process::{ExitCode, Termination};

use thiserror::Error;

use crate::cfg;

/// A convenient type alias for [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A top-level error from within the application.
///
/// Core load failure and game open failure are both folded into
/// [`Error::App`] by the call sites that produce them, since by the time
/// they reach `main` there is nothing left to do but report and exit.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Application error (core load, game open, or other fatal setup failure).
    #[error(transparent)]
    App(#[from] anyhow::Error),
    /// Configuration error.
    #[error(transparent)]
    Cfg(#[from] cfg::Error),
}

impl Error {
    /// Prints this error and its full causal chain to stderr.
    fn advise(&self) {
        eprintln!("error: {self}");
        let Some(mut err) = self.source() else {
            return;
        };
        while let Some(src) = err.source() {
            eprintln!("  caused by: {err}");
            err = src;
        }
        eprintln!("  caused by: {err}");
    }
}

impl From<Error> for ExitCode {
    fn from(err: Error) -> Self {
        match err {
            Error::App(_) => ExitCode::FAILURE,
            Error::Cfg(_) => sysexits::ExitCode::Config.into(),
        }
    }
}

/// Application exit condition.
#[derive(Debug)]
pub enum Exit {
    /// Clean exit, including a deliberate quit from the frontend.
    Success,
    /// Fatal failure; the user is shown a "Game failed to start" style
    /// message built from `err`.
    Failure(Error),
}

impl<E: Into<Error>> From<E> for Exit {
    fn from(err: E) -> Self {
        Self::Failure(err.into())
    }
}

impl Termination for Exit {
    fn report(self) -> ExitCode {
        match self {
            Exit::Success => ExitCode::SUCCESS,
            Exit::Failure(err) => {
                err.advise();
                err.into()
            }
        }
    }
}
