//! The webhook ingestion pipeline: authenticate, classify, gate, dispatch.
//!
//! Each stage returns a typed outcome; mapping to HTTP happens only in the
//! handler. The raw body is buffered once by the handler and the same bytes
//! feed both signature verification and JSON decoding. No job is published
//! unless every prior stage succeeded, so a rejection here guarantees zero
//! side effects for the request.

use std::{future::Future, time::Duration};

use anyhow::anyhow;
use gantry_core::{
    store::ControlPlaneStore,
    trigger::{self, Decision, SkipReason},
};
use gantry_github::{
    event::{ClassifyError, Event, WebhookPayload, classify},
    signature::{SignatureError, verify_signature},
};
use gantry_jobs::{BuildJob, JobSink};

/// One inbound delivery, as received: path login, the two relevant headers,
/// and the raw body bytes.
pub struct Delivery<'a> {
    pub login: &'a str,
    pub event_type: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub body: &'a [u8],
}

/// A delivery the pipeline accepted, whether or not it produced a build.
#[derive(Debug)]
pub enum Outcome {
    Dispatched,
    Ignored(String),
    Skipped(SkipReason),
}

/// A delivery the pipeline refused. `Transport` is the only variant where
/// retrying can help, and the only one answered with a 5xx.
#[derive(Debug)]
pub enum Rejection {
    UnknownAccount,
    Signature(SignatureError),
    UnparsableBody(serde_json::Error),
    Malformed(ClassifyError),
    Transport(anyhow::Error),
}

/// Bounds on the pipeline's two kinds of network calls. Exceeding either is
/// a transport failure; the sender retries.
pub struct Timeouts {
    pub lookup: Duration,
    pub publish: Duration,
}

/// Run one delivery through the pipeline.
///
/// The account, repository, and branch-config lookups each happen at most
/// once per delivery.
pub async fn process(
    store: &dyn ControlPlaneStore,
    sink: &dyn JobSink,
    timeouts: &Timeouts,
    delivery: Delivery<'_>,
) -> Result<Outcome, Rejection> {
    // Authenticating
    let account = lookup(timeouts.lookup, store.find_account_by_login(delivery.login))
        .await?
        .ok_or(Rejection::UnknownAccount)?;
    verify_signature(&account.webhook_secret, delivery.body, delivery.signature)
        .map_err(Rejection::Signature)?;

    // Classifying — decode the same bytes that were signature-checked
    let payload: WebhookPayload =
        serde_json::from_slice(delivery.body).map_err(Rejection::UnparsableBody)?;
    let event =
        classify(delivery.event_type.unwrap_or(""), &payload).map_err(Rejection::Malformed)?;
    let (repo_full_name, clone_url, branch, head_sha) = match event {
        Event::Ignored { reason } => return Ok(Outcome::Ignored(reason)),
        Event::Push { repo_full_name, clone_url, branch, head_sha } => {
            tracing::info!(
                "Received push to `{branch}` of `{repo_full_name}` for account `{}`",
                account.login
            );
            (repo_full_name, clone_url, branch, head_sha)
        }
        Event::PullRequest { action, repo_full_name, clone_url, branch, head_sha } => {
            tracing::info!(
                "Received pull request `{action}` on `{branch}` of `{repo_full_name}` for account `{}`",
                account.login
            );
            (repo_full_name, clone_url, branch, head_sha)
        }
    };

    // PolicyChecking
    let repository =
        lookup(timeouts.lookup, store.find_repository_by_full_name(&repo_full_name)).await?;
    let config = match &repository {
        Some(repository) => {
            lookup(timeouts.lookup, store.find_branch_config(repository.id, &branch)).await?
        }
        None => None,
    };
    let repository = match trigger::decide(repository, config.as_ref()) {
        Decision::Proceed(repository) => repository,
        Decision::Skip(reason) => return Ok(Outcome::Skipped(reason)),
    };

    // Dispatching
    let job = BuildJob {
        repo_url: clone_url,
        branch,
        head_sha,
        login: account.login,
        access_token: account.access_token,
        repo_id: repository.id,
    };
    match tokio::time::timeout(timeouts.publish, sink.publish(job)).await {
        Ok(Ok(())) => Ok(Outcome::Dispatched),
        Ok(Err(err)) => Err(Rejection::Transport(err)),
        Err(_) => Err(Rejection::Transport(anyhow!("publishing the build job timed out"))),
    }
}

async fn lookup<T>(
    timeout: Duration,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, Rejection> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Rejection::Transport(err)),
        Err(_) => Err(Rejection::Transport(anyhow!("data store lookup timed out"))),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use gantry_core::models::{Account, BranchConfig, Repository};
    use gantry_github::signature::{sign_sha1, sign_sha256};
    use serde_json::json;

    use super::*;

    const HEAD_SHA: &str = "4f2d0cb6a1b9e8d7c5f3a2b1c0d9e8f7a6b5c4d3";

    #[derive(Default)]
    struct FakeStore {
        accounts: Vec<Account>,
        repositories: Vec<Repository>,
        configs: Vec<BranchConfig>,
        account_lookups: AtomicUsize,
        repository_lookups: AtomicUsize,
        config_lookups: AtomicUsize,
    }

    #[async_trait]
    impl ControlPlaneStore for FakeStore {
        async fn find_account_by_login(&self, login: &str) -> anyhow::Result<Option<Account>> {
            self.account_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.accounts.iter().find(|a| a.login == login).cloned())
        }

        async fn find_repository_by_full_name(
            &self,
            full_name: &str,
        ) -> anyhow::Result<Option<Repository>> {
            self.repository_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.repositories.iter().find(|r| r.full_name == full_name).cloned())
        }

        async fn find_branch_config(
            &self,
            repository_id: i64,
            branch: &str,
        ) -> anyhow::Result<Option<BranchConfig>> {
            self.config_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .configs
                .iter()
                .find(|c| c.repository_id == repository_id && c.branch == branch)
                .cloned())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        published: Mutex<Vec<BuildJob>>,
        fail: bool,
    }

    impl FakeSink {
        fn failing() -> Self { Self { published: Mutex::new(Vec::new()), fail: true } }

        fn published_count(&self) -> usize { self.published.lock().unwrap().len() }
    }

    #[async_trait]
    impl JobSink for FakeSink {
        async fn publish(&self, job: BuildJob) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("broker connection severed");
            }
            job.ensure_complete()?;
            self.published.lock().unwrap().push(job);
            Ok(())
        }
    }

    fn store() -> FakeStore {
        FakeStore {
            accounts: vec![Account {
                id: 1,
                login: "alice".to_string(),
                webhook_secret: "s3cr3t".to_string(),
                access_token: "gho_token".to_string(),
                is_admin: false,
            }],
            repositories: vec![Repository {
                id: 42,
                full_name: "alice/app".to_string(),
                account_id: 1,
            }],
            configs: vec![BranchConfig {
                repository_id: 42,
                branch: "main".to_string(),
                ci_enabled: true,
            }],
            ..Default::default()
        }
    }

    fn timeouts() -> Timeouts {
        Timeouts { lookup: Duration::from_secs(1), publish: Duration::from_secs(1) }
    }

    fn push_body(git_ref: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "ref": git_ref,
            "repository": {
                "full_name": "alice/app",
                "clone_url": "https://github.com/alice/app.git"
            },
            "head_commit": { "id": HEAD_SHA }
        }))
        .unwrap()
    }

    fn pull_request_body(action: &str, branch: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "action": action,
            "repository": {
                "full_name": "alice/app",
                "clone_url": "https://github.com/alice/app.git"
            },
            "pull_request": {
                "head": { "ref": branch, "sha": HEAD_SHA }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_signed_push_dispatches_one_job() {
        let store = store();
        let sink = FakeSink::default();
        let body = push_body("refs/heads/main");
        let signature = sign_sha1("s3cr3t", &body);

        let outcome = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: Some(&signature),
            body: &body,
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Dispatched));
        let published = sink.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        let job = &published[0];
        assert_eq!(job.repo_id, 42);
        assert_eq!(job.branch, "main");
        assert_eq!(job.head_sha, HEAD_SHA);
        assert_eq!(job.login, "alice");
        assert_eq!(job.access_token, "gho_token");
        assert_eq!(job.repo_url, "https://github.com/alice/app.git");
        // Each lookup happens exactly once per delivery.
        assert_eq!(store.account_lookups.load(Ordering::SeqCst), 1);
        assert_eq!(store.repository_lookups.load(Ordering::SeqCst), 1);
        assert_eq!(store.config_lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sha256_signature_accepted() {
        let store = store();
        let sink = FakeSink::default();
        let body = push_body("refs/heads/main");
        let signature = sign_sha256("s3cr3t", &body);

        let outcome = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: Some(&signature),
            body: &body,
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Dispatched));
        assert_eq!(sink.published_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_signature_publishes_nothing() {
        let store = store();
        let sink = FakeSink::default();
        let body = push_body("refs/heads/main");

        let result = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: None,
            body: &body,
        })
        .await;

        assert!(matches!(
            result,
            Err(Rejection::Signature(SignatureError::MissingSignature))
        ));
        assert_eq!(sink.published_count(), 0);
        // Rejected before any repository resolution.
        assert_eq!(store.repository_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tampered_body_publishes_nothing() {
        let store = store();
        let sink = FakeSink::default();
        let body = push_body("refs/heads/main");
        let signature = sign_sha1("s3cr3t", &body);
        let tampered = push_body("refs/heads/other");

        let result = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: Some(&signature),
            body: &tampered,
        })
        .await;

        assert!(matches!(
            result,
            Err(Rejection::Signature(SignatureError::SignatureMismatch))
        ));
        assert_eq!(sink.published_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_secret_skips_verification() {
        let mut store = store();
        store.accounts[0].webhook_secret = String::new();
        let sink = FakeSink::default();
        let body = push_body("refs/heads/main");

        let outcome = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: None,
            body: &body,
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Dispatched));
        assert_eq!(sink.published_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_account_rejected() {
        let store = store();
        let sink = FakeSink::default();
        let body = push_body("refs/heads/main");

        let result = process(&store, &sink, &timeouts(), Delivery {
            login: "mallory",
            event_type: Some("push"),
            signature: None,
            body: &body,
        })
        .await;

        assert!(matches!(result, Err(Rejection::UnknownAccount)));
        assert_eq!(sink.published_count(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_branch_skips() {
        let store = store();
        let sink = FakeSink::default();
        let body = push_body("refs/heads/feature/x");
        let signature = sign_sha1("s3cr3t", &body);

        let outcome = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: Some(&signature),
            body: &body,
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Skipped(SkipReason::BranchNotEnabled)));
        assert_eq!(sink.published_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_branch_skips() {
        let mut store = store();
        store.configs[0].ci_enabled = false;
        let sink = FakeSink::default();
        let body = push_body("refs/heads/main");
        let signature = sign_sha1("s3cr3t", &body);

        let outcome = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: Some(&signature),
            body: &body,
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Skipped(SkipReason::BranchNotEnabled)));
        assert_eq!(sink.published_count(), 0);
    }

    #[tokio::test]
    async fn test_unbound_repository_skips_without_config_lookup() {
        let mut store = store();
        store.repositories.clear();
        let sink = FakeSink::default();
        let body = push_body("refs/heads/main");
        let signature = sign_sha1("s3cr3t", &body);

        let outcome = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: Some(&signature),
            body: &body,
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Skipped(SkipReason::UnknownRepository)));
        assert_eq!(sink.published_count(), 0);
        assert_eq!(store.config_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unsupported_event_acknowledged_without_resolution() {
        let store = store();
        let sink = FakeSink::default();
        let body = serde_json::to_vec(&json!({ "zen": "Keep it logically awesome." })).unwrap();
        let signature = sign_sha1("s3cr3t", &body);

        let outcome = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("ping"),
            signature: Some(&signature),
            body: &body,
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Ignored(_)));
        assert_eq!(sink.published_count(), 0);
        assert_eq!(store.repository_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tag_push_is_malformed_ref() {
        let store = store();
        let sink = FakeSink::default();
        let body = push_body("refs/tags/v1");
        let signature = sign_sha1("s3cr3t", &body);

        let result = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: Some(&signature),
            body: &body,
        })
        .await;

        assert!(matches!(
            result,
            Err(Rejection::Malformed(ClassifyError::MalformedRef(_)))
        ));
        assert_eq!(sink.published_count(), 0);
    }

    #[tokio::test]
    async fn test_unparsable_body_rejected() {
        let store = store();
        let sink = FakeSink::default();
        let body = b"not json at all";
        let signature = sign_sha1("s3cr3t", body);

        let result = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: Some(&signature),
            body,
        })
        .await;

        assert!(matches!(result, Err(Rejection::UnparsableBody(_))));
        assert_eq!(sink.published_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_is_transport() {
        let store = store();
        let sink = FakeSink::failing();
        let body = push_body("refs/heads/main");
        let signature = sign_sha1("s3cr3t", &body);

        let result = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("push"),
            signature: Some(&signature),
            body: &body,
        })
        .await;

        assert!(matches!(result, Err(Rejection::Transport(_))));
        assert_eq!(sink.published_count(), 0);
    }

    #[tokio::test]
    async fn test_pull_request_builds_head() {
        let mut store = store();
        store.configs.push(BranchConfig {
            repository_id: 42,
            branch: "feature/x".to_string(),
            ci_enabled: true,
        });
        let sink = FakeSink::default();
        let body = pull_request_body("synchronize", "feature/x");
        let signature = sign_sha1("s3cr3t", &body);

        let outcome = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("pull_request"),
            signature: Some(&signature),
            body: &body,
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Dispatched));
        let published = sink.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].branch, "feature/x");
        assert_eq!(published[0].head_sha, HEAD_SHA);
    }

    #[tokio::test]
    async fn test_closed_pull_request_acknowledged() {
        let store = store();
        let sink = FakeSink::default();
        let body = pull_request_body("closed", "feature/x");
        let signature = sign_sha1("s3cr3t", &body);

        let outcome = process(&store, &sink, &timeouts(), Delivery {
            login: "alice",
            event_type: Some("pull_request"),
            signature: Some(&signature),
            body: &body,
        })
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Ignored(_)));
        assert_eq!(sink.published_count(), 0);
    }
}
