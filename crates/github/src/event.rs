use serde::Deserialize;
use thiserror::Error;

/// Pull-request actions that indicate new code requiring a build. Everything
/// else ("closed", "labeled", ...) is acknowledged without dispatching.
pub const DISPATCHABLE_ACTIONS: [&str; 2] = ["opened", "synchronize"];

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// The webhook body, decoded leniently: push and pull-request events share
/// one shape on the wire, and absent fields decode to their defaults. The
/// classifier is where required fields are enforced per event kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub action: String,
    #[serde(default, rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub repository: PayloadRepository,
    #[serde(default)]
    pub pull_request: PayloadPullRequest,
    #[serde(default)]
    pub head_commit: PayloadCommit,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadRepository {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub clone_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadPullRequest {
    #[serde(default)]
    pub head: PayloadHead,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadHead {
    #[serde(default, rename = "ref")]
    pub branch: String,
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadCommit {
    #[serde(default)]
    pub id: String,
}

/// A classified webhook delivery. Exactly one of three things: a branch
/// push, a dispatchable pull-request update, or something to acknowledge
/// and drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Push { repo_full_name: String, clone_url: String, branch: String, head_sha: String },
    PullRequest {
        action: String,
        repo_full_name: String,
        clone_url: String,
        branch: String,
        head_sha: String,
    },
    Ignored { reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// The ref of a push event did not name a branch (e.g. a tag ref).
    #[error("ref `{0}` does not name a branch")]
    MalformedRef(String),
    /// A declared push/pull_request event is missing a field the source host
    /// always sends. Surfaced distinctly from Ignored: it means the
    /// integration is broken, not that there is nothing to do.
    #[error("{event} event is missing `{field}`")]
    MalformedPayload { event: &'static str, field: &'static str },
}

fn require(event: &'static str, field: &'static str, value: &str) -> Result<(), ClassifyError> {
    if value.is_empty() {
        Err(ClassifyError::MalformedPayload { event, field })
    } else {
        Ok(())
    }
}

/// Determine what an inbound delivery is, and extract the branch and commit
/// identifying the code to build.
pub fn classify(event_type: &str, payload: &WebhookPayload) -> Result<Event, ClassifyError> {
    match event_type {
        "push" => {
            require("push", "repository.full_name", &payload.repository.full_name)?;
            require("push", "repository.clone_url", &payload.repository.clone_url)?;
            require("push", "ref", &payload.git_ref)?;
            require("push", "head_commit.id", &payload.head_commit.id)?;
            let branch = payload
                .git_ref
                .strip_prefix(BRANCH_REF_PREFIX)
                .filter(|branch| !branch.is_empty())
                .ok_or_else(|| ClassifyError::MalformedRef(payload.git_ref.clone()))?;
            Ok(Event::Push {
                repo_full_name: payload.repository.full_name.clone(),
                clone_url: payload.repository.clone_url.clone(),
                branch: branch.to_string(),
                head_sha: payload.head_commit.id.clone(),
            })
        }
        "pull_request" => {
            require("pull_request", "action", &payload.action)?;
            if !DISPATCHABLE_ACTIONS.contains(&payload.action.as_str()) {
                return Ok(Event::Ignored {
                    reason: format!(
                        "pull request action `{}` does not require a build",
                        payload.action
                    ),
                });
            }
            require("pull_request", "repository.full_name", &payload.repository.full_name)?;
            require("pull_request", "repository.clone_url", &payload.repository.clone_url)?;
            require("pull_request", "pull_request.head.ref", &payload.pull_request.head.branch)?;
            require("pull_request", "pull_request.head.sha", &payload.pull_request.head.sha)?;
            Ok(Event::PullRequest {
                action: payload.action.clone(),
                repo_full_name: payload.repository.full_name.clone(),
                clone_url: payload.repository.clone_url.clone(),
                branch: payload.pull_request.head.branch.clone(),
                head_sha: payload.pull_request.head.sha.clone(),
            })
        }
        other => Ok(Event::Ignored { reason: format!("unsupported event type `{other}`") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_payload() -> WebhookPayload {
        serde_json::from_value(serde_json::json!({
            "ref": "refs/heads/main",
            "repository": {
                "id": 1,
                "full_name": "alice/app",
                "clone_url": "https://github.com/alice/app.git"
            },
            "head_commit": {
                "id": "4f2d0cb6a1b9e8d7c5f3a2b1c0d9e8f7a6b5c4d3"
            }
        }))
        .unwrap()
    }

    fn pull_request_payload(action: &str) -> WebhookPayload {
        serde_json::from_value(serde_json::json!({
            "action": action,
            "repository": {
                "full_name": "alice/app",
                "clone_url": "https://github.com/alice/app.git"
            },
            "pull_request": {
                "head": {
                    "ref": "feature/x",
                    "sha": "9c1f3a2b0d8e7f6a5b4c3d2e1f0a9b8c7d6e5f4a"
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_push_resolves_branch() {
        let event = classify("push", &push_payload()).unwrap();
        assert_eq!(event, Event::Push {
            repo_full_name: "alice/app".to_string(),
            clone_url: "https://github.com/alice/app.git".to_string(),
            branch: "main".to_string(),
            head_sha: "4f2d0cb6a1b9e8d7c5f3a2b1c0d9e8f7a6b5c4d3".to_string(),
        });
    }

    #[test]
    fn test_tag_ref_is_malformed() {
        let mut payload = push_payload();
        payload.git_ref = "refs/tags/v1".to_string();
        assert_eq!(
            classify("push", &payload),
            Err(ClassifyError::MalformedRef("refs/tags/v1".to_string()))
        );
        // A bare branch name without the prefix is also not a branch ref.
        payload.git_ref = "main".to_string();
        assert!(matches!(classify("push", &payload), Err(ClassifyError::MalformedRef(_))));
        // The prefix alone names nothing.
        payload.git_ref = "refs/heads/".to_string();
        assert!(matches!(classify("push", &payload), Err(ClassifyError::MalformedRef(_))));
    }

    #[test]
    fn test_push_missing_fields_are_malformed() {
        let mut payload = push_payload();
        payload.git_ref = String::new();
        assert_eq!(
            classify("push", &payload),
            Err(ClassifyError::MalformedPayload { event: "push", field: "ref" })
        );

        let mut payload = push_payload();
        payload.repository.full_name = String::new();
        assert_eq!(
            classify("push", &payload),
            Err(ClassifyError::MalformedPayload { event: "push", field: "repository.full_name" })
        );

        let mut payload = push_payload();
        payload.head_commit.id = String::new();
        assert_eq!(
            classify("push", &payload),
            Err(ClassifyError::MalformedPayload { event: "push", field: "head_commit.id" })
        );
    }

    #[test]
    fn test_pull_request_dispatchable_actions() {
        for action in ["opened", "synchronize"] {
            let event = classify("pull_request", &pull_request_payload(action)).unwrap();
            let Event::PullRequest { action: got, branch, head_sha, .. } = event else {
                panic!("expected a pull request event for `{action}`");
            };
            assert_eq!(got, action);
            // Branch and SHA come from the head, not the base.
            assert_eq!(branch, "feature/x");
            assert_eq!(head_sha, "9c1f3a2b0d8e7f6a5b4c3d2e1f0a9b8c7d6e5f4a");
        }
    }

    #[test]
    fn test_pull_request_other_actions_are_ignored() {
        for action in ["closed", "labeled", "reopened", "edited"] {
            let event = classify("pull_request", &pull_request_payload(action)).unwrap();
            assert!(matches!(event, Event::Ignored { .. }), "action `{action}` should be ignored");
        }
    }

    #[test]
    fn test_pull_request_missing_head_is_malformed() {
        let mut payload = pull_request_payload("opened");
        payload.pull_request.head.sha = String::new();
        assert_eq!(
            classify("pull_request", &payload),
            Err(ClassifyError::MalformedPayload {
                event: "pull_request",
                field: "pull_request.head.sha"
            })
        );
    }

    #[test]
    fn test_pull_request_empty_action_is_malformed() {
        let mut payload = pull_request_payload("opened");
        payload.action = String::new();
        assert_eq!(
            classify("pull_request", &payload),
            Err(ClassifyError::MalformedPayload { event: "pull_request", field: "action" })
        );
    }

    #[test]
    fn test_other_event_types_are_ignored() {
        for event_type in ["ping", "issues", "release", ""] {
            let event = classify(event_type, &WebhookPayload::default()).unwrap();
            assert!(matches!(event, Event::Ignored { .. }));
        }
    }
}
