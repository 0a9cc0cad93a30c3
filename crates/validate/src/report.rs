//! Aggregated outcome of a consistency check.

use serde::Serialize;
use toolgraph_model::{CheckError, ErrorKind, McpServerKey};

/// One failing reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceIssue {
    pub server: McpServerKey,
    /// Position in the server's tool list.
    pub index: usize,
    pub kind: ErrorKind,
    pub message: String,
}

impl ReferenceIssue {
    pub fn new(server: McpServerKey, index: usize, error: &CheckError) -> Self {
        Self {
            server,
            index,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ReferenceIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} tools[{}]: {}", self.server, self.index, self.message)
    }
}

/// Every failure found across the checked servers; never truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub scope: String,
    pub servers_checked: usize,
    pub references_checked: usize,
    pub issues: Vec<ReferenceIssue>,
}

impl ConsistencyReport {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            servers_checked: 0,
            references_checked: 0,
            issues: Vec::new(),
        }
    }

    pub fn add_issue(&mut self, issue: ReferenceIssue) {
        self.issues.push(issue);
    }

    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.issues.len()
    }

    pub fn count_of(&self, kind: ErrorKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// `Ok` when consistent, otherwise one [`CheckError::Consistency`]
    /// carrying every issue.
    pub fn into_result(self) -> Result<(), CheckError> {
        if self.issues.is_empty() {
            return Ok(());
        }
        Err(CheckError::Consistency {
            scope: self.scope,
            failures: self.issues.iter().map(ToString::to_string).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgraph_model::ToolKey;

    #[test]
    fn report_keeps_every_issue() {
        let server = McpServerKey::new("n1", "s1");
        let mut report = ConsistencyReport::new("server n1/s1");
        report.add_issue(ReferenceIssue::new(
            server.clone(),
            0,
            &CheckError::dependency_not_found(ToolKey::new("n1", "g1", "a"), "not found"),
        ));
        report.add_issue(ReferenceIssue::new(
            server,
            2,
            &CheckError::Format {
                reference: "n1.g1.".into(),
                violations: vec!["toolName must be a non-empty string".into()],
            },
        ));

        assert!(!report.is_consistent());
        assert_eq!(report.count_of(ErrorKind::Format), 1);

        let err = report.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
        let text = err.to_string();
        assert!(text.contains("2 failure(s)"));
        assert!(text.contains("tools[0]"));
        assert!(text.contains("tools[2]"));
    }

    #[test]
    fn empty_report_is_ok() {
        assert!(ConsistencyReport::new("all tracked servers").into_result().is_ok());
    }
}
