//! MD5 fingerprints of local SSH public keys.
//!
//! DigitalOcean associates keys with droplets by their MD5 fingerprint. The
//! fingerprint is read from `ssh-keygen -E md5 -lf <key>` output, which looks
//! like `2048 MD5:ab:cd:... user@host (RSA)`.

use std::ffi::OsString;

use thiserror::Error;

use crate::command::{CommandError, CommandRunner, ProcessCommandRunner};

/// Default `ssh-keygen` binary name.
pub const DEFAULT_SSH_KEYGEN_BIN: &str = "ssh-keygen";

const MD5_PREFIX: &str = "MD5:";

/// Errors raised while fingerprinting a key.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FingerprintError {
    /// The key path was blank.
    #[error("no ssh key provided")]
    MissingKey,
    /// `ssh-keygen` exited unsuccessfully.
    #[error("{program} exited with status {status_text} for {path}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Key path passed to the program.
        path: String,
        /// Human readable exit status.
        status_text: String,
        /// Captured stderr.
        stderr: String,
    },
    /// The output did not contain an MD5 fingerprint.
    #[error("no MD5 fingerprint in ssh-keygen output for {path}")]
    Unparseable {
        /// Key path passed to the program.
        path: String,
    },
    /// The program could not be started.
    #[error(transparent)]
    Runner(#[from] CommandError),
}

/// Computes key fingerprints through a [`CommandRunner`].
#[derive(Clone, Debug)]
pub struct KeyFingerprinter<R: CommandRunner> {
    program: String,
    runner: R,
}

impl KeyFingerprinter<ProcessCommandRunner> {
    /// Creates a fingerprinter wired to the real process runner.
    #[must_use]
    pub fn with_process_runner(program: impl Into<String>) -> Self {
        Self::new(program, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> KeyFingerprinter<R> {
    /// Creates a fingerprinter that runs `program` through `runner`.
    #[must_use]
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Returns the MD5 fingerprint (without the `MD5:` prefix) of the key at
    /// `key_path`. A leading `~/` is expanded.
    ///
    /// # Errors
    ///
    /// Returns [`FingerprintError`] when the path is blank, the command fails,
    /// or its output has no MD5 token.
    pub fn fingerprint(&self, key_path: &str) -> Result<String, FingerprintError> {
        let trimmed = key_path.trim();
        if trimmed.is_empty() {
            return Err(FingerprintError::MissingKey);
        }
        let path = expand_tilde(trimmed);
        let args = [
            OsString::from("-E"),
            OsString::from("md5"),
            OsString::from("-lf"),
            OsString::from(&path),
        ];
        let output = self.runner.run(&self.program, &args)?;
        if !output.is_success() {
            return Err(FingerprintError::CommandFailure {
                program: self.program.clone(),
                path,
                status_text: output.status_text(),
                stderr: output.stderr.trim().to_owned(),
            });
        }

        parse_md5(&output.stdout).ok_or(FingerprintError::Unparseable { path })
    }
}

fn parse_md5(stdout: &str) -> Option<String> {
    stdout
        .split_whitespace()
        .find_map(|token| token.strip_prefix(MD5_PREFIX))
        .filter(|hex| !hex.is_empty())
        .map(str::to_owned)
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// When `HOME` is unset the input is returned unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => format!("{}/{rest}", home.to_string_lossy()),
        _ => path.to_owned(),
    }
}
