// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job requests from the reactive queue and the registration context.

use crate::metadata::RunnerMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;

/// Host that marks a job URL as belonging to the code-host variant.
const CODE_HOST_DOMAIN: &str = "github.com";

/// Path segment separating a job-manager base URL from the job number.
const JOB_MANAGER_JOBS_SEGMENT: &str = "/v1/jobs/";

/// Opaque payload returned by the platform when a runner is registered.
///
/// Injected verbatim into the VM's boot user data; the core never
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerContext {
    pub payload: String,
}

impl RunnerContext {
    pub fn new(payload: impl Into<String>) -> Self {
        Self { payload: payload.into() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobRequestError {
    #[error("invalid job request payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("job url has no path")]
    EmptyPath,
    #[error("unrecognized job url: {0}")]
    UnrecognizedUrl(Url),
}

/// One message from the reactive job queue.
///
/// Unknown fields in the payload are ignored; the URL must carry a
/// non-empty path so the job can be addressed later.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobRequest {
    pub labels: BTreeSet<String>,
    pub url: Url,
}

impl JobRequest {
    /// Parse a raw queue payload.
    pub fn parse(payload: &str) -> Result<Self, JobRequestError> {
        let request: JobRequest = serde_json::from_str(payload)?;
        if request.url.path().is_empty() {
            return Err(JobRequestError::EmptyPath);
        }
        Ok(request)
    }

    /// Decide which platform variant owns this job and derive its metadata.
    ///
    /// A code-host URL yields default metadata. Anything else must look like
    /// `<base>/v1/jobs/<n>`; the base (path stripped back to `<base>`)
    /// becomes the job-manager base URL.
    pub fn derive_metadata(&self) -> Result<RunnerMetadata, JobRequestError> {
        let host = self.url.host_str().unwrap_or_default();
        if host == CODE_HOST_DOMAIN || host.ends_with(&format!(".{CODE_HOST_DOMAIN}")) {
            return Ok(RunnerMetadata::default());
        }

        let path = self.url.path();
        let Some(split) = path.rfind(JOB_MANAGER_JOBS_SEGMENT) else {
            return Err(JobRequestError::UnrecognizedUrl(self.url.clone()));
        };
        let job_number = &path[split + JOB_MANAGER_JOBS_SEGMENT.len()..];
        if job_number.is_empty() || !job_number.bytes().all(|b| b.is_ascii_digit()) {
            return Err(JobRequestError::UnrecognizedUrl(self.url.clone()));
        }

        let mut base = self.url.clone();
        base.set_path(&path[..split]);
        base.set_query(None);
        base.set_fragment(None);
        Ok(RunnerMetadata::job_manager(base))
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
