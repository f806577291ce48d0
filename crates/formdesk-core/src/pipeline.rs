//! # Entry Pipeline
//!
//! Orchestrates the handling of one inbound entry:
//!
//! 1. verify the handshake key
//! 2. identify the form hash and entry id
//! 3. assemble the canonical [`Entry`]
//! 4. load and apply the form's template
//! 5. render the request set
//! 6. dispatch every request document
//!
//! Steps 1 through 5 fail fast: nothing is dispatched unless the whole
//! request set was produced. Dispatch failures never fail the pipeline;
//! they are reported in the [`DispatchReport`].

use crate::auth::{HandshakeError, HandshakeVerifier};
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::entry::{Entry, EntryAssembler, ENTRY_ID_PARAMETER};
use crate::params::Parameters;
use crate::request::{RenderError, RequestSet};
use crate::schema::StructureError;
use crate::template::{load_template, TemplateError, TemplateStore, TransformError};
use crate::{EntryId, FormHash};
use std::sync::Arc;
use tracing::{debug, info, instrument, Level, Span};

/// One inbound entry as received by the gateway.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Request path below the endpoint prefix; slashes are stripped to form the hash
    pub path: String,
    pub params: Parameters,
}

impl Submission {
    pub fn new(path: impl Into<String>, params: Parameters) -> Self {
        Self {
            path: path.into(),
            params,
        }
    }
}

/// Errors identifying the form or entry of a submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("Request path does not identify a form")]
    MissingHash,

    #[error("Entry id parameter 'EntryId' is missing from request")]
    MissingEntryId,
}

/// Any failure that prevents an entry from producing its request set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Everything produced for one entry.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub entry: Entry,
    pub request_set: RequestSet,
    /// Pretty-printed XML of the request set
    pub rendered: String,
    pub report: DispatchReport,
}

/// Transform-and-dispatch pipeline shared by all requests.
///
/// Holds only read-only collaborators, so one instance serves concurrent
/// requests.
#[derive(Clone)]
pub struct EntryPipeline {
    verifier: HandshakeVerifier,
    assembler: EntryAssembler,
    templates: Arc<dyn TemplateStore>,
    dispatcher: Dispatcher,
}

impl EntryPipeline {
    pub fn new(
        verifier: HandshakeVerifier,
        templates: Arc<dyn TemplateStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            verifier,
            assembler: EntryAssembler::new(),
            templates,
            dispatcher,
        }
    }

    pub fn verifier(&self) -> &HandshakeVerifier {
        &self.verifier
    }

    /// Process one submission end to end.
    #[instrument(skip_all, fields(form_hash, entry_id))]
    pub async fn process(&self, submission: &Submission) -> Result<PipelineOutput, PipelineError> {
        let params = &submission.params;
        self.verifier.verify(params)?;

        let hash = FormHash::from_path(&submission.path).map_err(|_| SubmissionError::MissingHash)?;
        let entry_id = params
            .get(ENTRY_ID_PARAMETER)
            .filter(|id| !id.is_empty())
            .map(EntryId::new)
            .ok_or(SubmissionError::MissingEntryId)?;

        let span = Span::current();
        span.record("form_hash", hash.as_str());
        span.record("entry_id", entry_id.as_str());

        let entry = self
            .assembler
            .assemble(hash.clone(), entry_id.clone(), params)?;
        if tracing::enabled!(Level::DEBUG) {
            let fields = entry.fields().len();
            match entry.to_xml() {
                Ok(xml) => debug!(fields, entry = %xml, "Entry assembled"),
                Err(e) => debug!(fields, error = %e, "Entry assembled"),
            }
        }

        let template = load_template(self.templates.as_ref(), &hash).await?;
        let requests = template.transform(&entry)?;
        let request_set = RequestSet::new(hash, entry_id, requests);
        let rendered = request_set.to_pretty_xml()?;

        let report = self.dispatcher.dispatch_all(&request_set.requests).await;
        info!(
            requests = request_set.len(),
            delivered = report.delivered_count(),
            failed = report.failed_count(),
            "Entry processed"
        );

        Ok(PipelineOutput {
            entry,
            request_set,
            rendered,
            report,
        })
    }
}

impl std::fmt::Debug for EntryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPipeline")
            .field("verifier", &self.verifier)
            .field("templates", &"<TemplateStore>")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
