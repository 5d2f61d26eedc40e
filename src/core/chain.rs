//! ArtifactChain: per-session pointer to the latest artifact.
//!
//! A chain is replaced, never mutated: [`ArtifactChain::commit`] returns the
//! successor and leaves `self` untouched, so a failed request simply never
//! commits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::EngineError;
use crate::spec::OperationSpec;
use crate::types::Artifact;

/// Where a new request starts from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Continuation {
    /// Build on the last generated artifact (or the upload if there is none)
    #[default]
    Continue,
    /// Start over from the original upload and discard the chain
    Restart,
}

impl fmt::Display for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::Continue => write!(f, "continue"),
            Continuation::Restart => write!(f, "restart"),
        }
    }
}

impl FromStr for Continuation {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(Continuation::Continue),
            "restart" => Ok(Continuation::Restart),
            other => Err(EngineError::BaseResolution(format!(
                "unknown continuation '{}' (expected continue or restart)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactChain {
    pub session_id: String,
    upload: Arc<Artifact>,
    /// True until a commit consumes the latest upload
    upload_pending: bool,
    last: Option<Arc<Artifact>>,
    history: Vec<OperationSpec>,
    /// Artifact id → written workbook, for every artifact of the session
    downloads: Vec<(String, PathBuf)>,
}

impl ArtifactChain {
    pub fn new(session_id: impl Into<String>, upload: Artifact) -> Self {
        Self {
            session_id: session_id.into(),
            upload: Arc::new(upload),
            upload_pending: true,
            last: None,
            history: Vec::new(),
            downloads: Vec::new(),
        }
    }

    /// The same chain with `upload` as its newest upload.
    /// The last generated artifact and the history are kept.
    pub fn with_new_upload(&self, upload: Artifact) -> Self {
        Self {
            upload: Arc::new(upload),
            upload_pending: true,
            ..self.clone()
        }
    }

    pub fn upload(&self) -> &Arc<Artifact> {
        &self.upload
    }

    /// The upload arrived after the last generated artifact
    pub fn has_pending_upload(&self) -> bool {
        self.upload_pending
    }

    pub fn last_generated(&self) -> Option<&Arc<Artifact>> {
        self.last.as_ref()
    }

    pub fn history(&self) -> &[OperationSpec] {
        &self.history
    }

    /// The artifact a new request builds on.
    /// Under `Continue` the prior artifact's data is the base as-is.
    pub fn resolve_base(&self, continuation: Continuation) -> Arc<Artifact> {
        match (continuation, &self.last) {
            (Continuation::Continue, Some(last)) => Arc::clone(last),
            _ => Arc::clone(&self.upload),
        }
    }

    /// The successor chain with `artifact` as its head
    pub fn commit(
        &self,
        artifact: Arc<Artifact>,
        spec: OperationSpec,
        continuation: Continuation,
    ) -> Self {
        let mut history = match continuation {
            Continuation::Continue => self.history.clone(),
            Continuation::Restart => Vec::new(),
        };
        history.push(spec);
        let mut downloads = self.downloads.clone();
        if let Some(file) = &artifact.file {
            downloads.push((artifact.id.clone(), file.clone()));
        }

        Self {
            session_id: self.session_id.clone(),
            upload: Arc::clone(&self.upload),
            upload_pending: false,
            last: Some(artifact),
            history,
            downloads,
        }
    }

    /// Workbook path of a generated artifact of this session
    pub fn find(&self, artifact_id: &str) -> Option<&Path> {
        self.downloads
            .iter()
            .find(|(id, _)| id == artifact_id)
            .map(|(_, path)| path.as_path())
    }

    pub fn downloads(&self) -> &[(String, PathBuf)] {
        &self.downloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sheet, SourceKind, Table};

    fn artifact(name: &str, source: SourceKind) -> Artifact {
        let mut artifact = Artifact::new(vec![Sheet::new(name, Table::new())], source);
        if source == SourceKind::Generated {
            artifact.file = Some(PathBuf::from(format!("{}.xlsx", name)));
        }
        artifact
    }

    #[test]
    fn test_base_is_upload_until_first_commit() {
        let chain = ArtifactChain::new("s1", artifact("Upload", SourceKind::Upload));
        assert_eq!(chain.resolve_base(Continuation::Continue).sheets[0].name, "Upload");
        assert!(chain.last_generated().is_none());
    }

    #[test]
    fn test_commit_returns_successor_without_mutating() {
        let chain = ArtifactChain::new("s1", artifact("Upload", SourceKind::Upload));
        let next = chain.commit(
            Arc::new(artifact("Gen", SourceKind::Generated)),
            OperationSpec::empty(),
            Continuation::Continue,
        );
        assert!(chain.last_generated().is_none());
        assert_eq!(next.resolve_base(Continuation::Continue).sheets[0].name, "Gen");
        assert_eq!(next.resolve_base(Continuation::Restart).sheets[0].name, "Upload");
        assert_eq!(next.history().len(), 1);
    }

    #[test]
    fn test_restart_discards_history_but_keeps_downloads() {
        let chain = ArtifactChain::new("s1", artifact("Upload", SourceKind::Upload));
        let first = Arc::new(artifact("One", SourceKind::Generated));
        let first_id = first.id.clone();
        let chain = chain.commit(first, OperationSpec::empty(), Continuation::Continue);
        let chain = chain.commit(
            Arc::new(artifact("Two", SourceKind::Generated)),
            OperationSpec::empty(),
            Continuation::Restart,
        );
        assert_eq!(chain.history().len(), 1);
        assert_eq!(chain.downloads().len(), 2);
        assert_eq!(chain.find(&first_id), Some(Path::new("One.xlsx")));
        assert!(chain.find("nope").is_none());
    }

    #[test]
    fn test_new_upload_keeps_last_generated() {
        let chain = ArtifactChain::new("s1", artifact("Upload", SourceKind::Upload));
        assert!(chain.has_pending_upload());
        let chain = chain.commit(
            Arc::new(artifact("Gen", SourceKind::Generated)),
            OperationSpec::empty(),
            Continuation::Continue,
        );
        assert!(!chain.has_pending_upload());

        let chain = chain.with_new_upload(artifact("More", SourceKind::Upload));
        assert!(chain.has_pending_upload());
        assert_eq!(chain.upload().sheets[0].name, "More");
        assert_eq!(chain.resolve_base(Continuation::Continue).sheets[0].name, "Gen");
        assert_eq!(chain.history().len(), 1);
        assert_eq!(chain.downloads().len(), 1);
    }

    #[test]
    fn test_continuation_parsing() {
        assert_eq!("Restart".parse::<Continuation>().unwrap(), Continuation::Restart);
        assert_eq!(Continuation::Continue.to_string(), "continue");
        assert!("later".parse::<Continuation>().is_err());
    }
}
