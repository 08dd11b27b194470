use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use deploy_proto::InboundEvent;
use deploy_transport::{ConnectionState, SessionLink};
use deploy_transport::mock::{MockConnector, MockLink};
use easy_deploy::build::{
    BuildArtifact, BuildError, BuildFailure, BuildPipeline, BuildSettings, Phase,
};
use easy_deploy::gateway::{BuildCredential, CredentialGateway, GatewayError};
use easy_deploy::transcript::Tag;
use serde_json::json;

struct FixedGateway {
    credential: Option<BuildCredential>,
    calls: AtomicUsize,
}

impl FixedGateway {
    fn logged_in() -> Arc<Self> {
        Arc::new(Self {
            credential: Some(BuildCredential {
                id: 1,
                username: "ci-bot".into(),
                is_default: true,
            }),
            calls: AtomicUsize::new(0),
        })
    }

    fn logged_out() -> Arc<Self> {
        Arc::new(Self {
            credential: None,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CredentialGateway for FixedGateway {
    async fn default_build_credential(&self) -> Result<BuildCredential, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.credential.clone().ok_or(GatewayError::MissingCredential)
    }
}

fn pipeline(connector: &Arc<MockConnector>, gateway: Arc<FixedGateway>) -> BuildPipeline {
    BuildPipeline::new(
        connector.clone(),
        gateway,
        BuildSettings {
            ws_base: "localhost:53801".into(),
            token: "tok".into(),
        },
    )
}

fn artifact() -> BuildArtifact {
    BuildArtifact::new(7, "app:latest")
}

async fn started() -> (BuildPipeline, Arc<MockConnector>, Arc<MockLink>) {
    let connector = Arc::new(MockConnector::new());
    let mut pipeline = pipeline(&connector, FixedGateway::logged_in());
    pipeline.start(artifact()).await.expect("build starts");
    let link = connector.last_link().expect("session opened");
    (pipeline, connector, link)
}

fn steps(link: &MockLink) -> Vec<String> {
    link.sent_json()
        .iter()
        .filter_map(|frame| frame["docker_build_step"].as_str().map(str::to_owned))
        .collect()
}

#[tokio::test]
async fn start_opens_docker_session_and_requests_clone() {
    let (pipeline, _connector, link) = started().await;

    assert_eq!(pipeline.phase(), Phase::Cloning);
    assert_eq!(link.endpoint().url.path(), "/ws/docker");
    assert_eq!(link.endpoint().url.query(), Some("token=tok"));
    assert_eq!(
        link.written()[0],
        r#"{"docker_build_step":"init","data":{}}"#
    );
    assert_eq!(
        link.sent_json(),
        [json!({
            "docker_build_step": "clone_repository",
            "data": {"id": 7, "docker_image_name": "app:latest"}
        })]
    );
    assert_eq!(
        pipeline.credential().map(|c| c.username.as_str()),
        Some("ci-bot")
    );
}

#[tokio::test]
async fn clone_success_requests_dockerfile_generation() {
    let (mut pipeline, _connector, link) = started().await;

    link.push(&InboundEvent::success("git clone success"));
    assert_eq!(pipeline.next_event().await, Some(Phase::Generating));
    assert_eq!(
        link.sent_json().last(),
        Some(&json!({
            "docker_build_step": "generate_dockerfile",
            "data": {"id": 7, "docker_image_name": "app:latest"}
        }))
    );
}

#[tokio::test]
async fn markers_walk_the_build_to_completion() {
    let (mut pipeline, _connector, link) = started().await;

    link.push(&InboundEvent::success("git clone success"));
    link.push(&InboundEvent::success("#4 [2/3] RUN npm ci"));
    link.push(&InboundEvent::success("Dockerfile build success"));
    link.push(&InboundEvent::success("docker build & push success"));

    assert_eq!(pipeline.run().await, Phase::Completed);
    assert_eq!(
        steps(&link),
        ["clone_repository", "generate_dockerfile", "build_image"]
    );
    let tags: Vec<Tag> = pipeline
        .transcript()
        .entries()
        .iter()
        .map(|entry| entry.tag)
        .collect();
    assert_eq!(
        tags,
        [
            Tag::CloneComplete,
            Tag::BuildLog,
            Tag::DockerfileComplete,
            Tag::BuildComplete
        ]
    );
    assert_eq!(link.close_calls(), 0);
}

#[tokio::test]
async fn out_of_order_markers_never_skip_phases() {
    let (mut pipeline, _connector, link) = started().await;

    link.push(&InboundEvent::success("docker build & push success"));
    link.push(&InboundEvent::success("Dockerfile build success"));
    link.push(&InboundEvent::success("cloning into /workspace"));
    for _ in 0..3 {
        assert_eq!(pipeline.next_event().await, Some(Phase::Cloning));
    }
    assert_eq!(steps(&link), ["clone_repository"]);
    assert_eq!(pipeline.transcript().len(), 3);
}

#[tokio::test]
async fn remote_failure_while_building_fails_once_and_closes() {
    let (mut pipeline, _connector, link) = started().await;
    link.push(&InboundEvent::success("git clone success"));
    link.push(&InboundEvent::success("Dockerfile build success"));
    pipeline.next_event().await;
    assert_eq!(pipeline.next_event().await, Some(Phase::Building));
    let sent_before = link.sent().len();

    link.push(&InboundEvent::failure("denied: registry login failed"));
    assert_eq!(pipeline.next_event().await, Some(Phase::Failed));
    assert_eq!(
        pipeline.failure(),
        Some(&BuildFailure::Remote("denied: registry login failed".into()))
    );
    assert_eq!(link.close_calls(), 1);
    assert_eq!(link.sent().len(), sent_before);
    assert_eq!(
        pipeline.transcript().last().map(|entry| entry.tag),
        Some(Tag::Error)
    );

    // Nothing is listened to after the failure.
    link.push(&InboundEvent::success("docker build & push success"));
    assert_eq!(pipeline.next_event().await, None);
    assert_eq!(pipeline.phase(), Phase::Failed);

    pipeline.cancel().await;
    assert_eq!(link.close_calls(), 1);
}

#[tokio::test]
async fn remote_failure_fails_every_running_phase_once() {
    let cases: [(Phase, &[&str]); 3] = [
        (Phase::Cloning, &[]),
        (Phase::Generating, &["git clone success"]),
        (
            Phase::Building,
            &["git clone success", "Dockerfile build success"],
        ),
    ];
    for (phase, markers) in cases {
        let (mut pipeline, _connector, link) = started().await;
        for marker in markers {
            link.push(&InboundEvent::success(*marker));
            pipeline.next_event().await;
        }
        assert_eq!(pipeline.phase(), phase);
        let sent_before = link.sent().len();

        link.push(&InboundEvent::failure("executor error"));
        assert_eq!(pipeline.next_event().await, Some(Phase::Failed), "{phase}");
        assert_eq!(
            pipeline.failure(),
            Some(&BuildFailure::Remote("executor error".into()))
        );
        assert_eq!(link.close_calls(), 1, "{phase}");
        assert_eq!(link.sent().len(), sent_before, "{phase}");

        link.push(&InboundEvent::failure("executor error"));
        assert_eq!(pipeline.next_event().await, None, "{phase}");
        assert_eq!(link.close_calls(), 1, "{phase}");
    }
}

#[tokio::test]
async fn dropped_session_fails_the_build() {
    for ended in [ConnectionState::Failed, ConnectionState::Closed] {
        let (mut pipeline, _connector, link) = started().await;

        link.drop_connection(ended);
        assert_eq!(pipeline.next_event().await, Some(Phase::Failed));
        assert_eq!(
            pipeline.failure(),
            Some(&BuildFailure::Connection(ended))
        );
        assert!(!pipeline.has_session());
        assert_eq!(pipeline.snapshot().phase, Phase::Failed);
    }
}

#[tokio::test]
async fn malformed_frames_are_recorded_without_a_transition() {
    let (mut pipeline, _connector, link) = started().await;

    link.push_text("<html>502</html>");
    assert_eq!(pipeline.next_event().await, Some(Phase::Cloning));
    assert_eq!(
        pipeline.transcript().last().map(|entry| entry.tag),
        Some(Tag::Malformed)
    );
    assert_eq!(link.close_calls(), 0);
}

#[tokio::test]
async fn second_build_is_rejected_while_running() {
    let (mut pipeline, connector, _link) = started().await;

    let err = pipeline.start(artifact()).await.unwrap_err();
    assert!(matches!(err, BuildError::AlreadyInProgress(Phase::Cloning)));
    assert_eq!(connector.attempts(), 1);
    assert_eq!(pipeline.phase(), Phase::Cloning);
}

#[tokio::test]
async fn missing_account_blocks_before_connecting() {
    let connector = Arc::new(MockConnector::new());
    let gateway = FixedGateway::logged_out();
    let mut pipeline = pipeline(&connector, gateway.clone());

    let err = pipeline.start(artifact()).await.unwrap_err();
    assert!(matches!(
        err,
        BuildError::Credential(GatewayError::MissingCredential)
    ));
    assert_eq!(pipeline.phase(), Phase::AwaitingAccount);
    assert!(pipeline.notice().is_some_and(|notice| notice.contains("profile page")));
    assert_eq!(connector.attempts(), 0);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connection_failure_can_be_retried_immediately() {
    let connector = Arc::new(MockConnector::new());
    connector.fail_next("connection refused");
    let mut pipeline = pipeline(&connector, FixedGateway::logged_in());

    let err = pipeline.start(artifact()).await.unwrap_err();
    assert!(matches!(err, BuildError::Transport(_)));
    assert_eq!(pipeline.phase(), Phase::AwaitingAccount);

    pipeline.start(artifact()).await.expect("retry starts");
    assert_eq!(pipeline.phase(), Phase::Cloning);
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn empty_image_name_is_rejected_up_front() {
    let connector = Arc::new(MockConnector::new());
    let gateway = FixedGateway::logged_in();
    let mut pipeline = pipeline(&connector, gateway.clone());

    let err = pipeline
        .start(BuildArtifact::new(7, "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::InvalidArtifact(_)));
    assert_eq!(pipeline.phase(), Phase::Idle);
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_closes_session_and_resets() {
    let (mut pipeline, _connector, link) = started().await;
    link.push(&InboundEvent::success("git clone success"));
    pipeline.next_event().await;

    pipeline.cancel().await;
    assert_eq!(pipeline.phase(), Phase::Idle);
    assert!(pipeline.transcript().is_empty());
    assert_eq!(link.close_calls(), 1);
    assert_eq!(link.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn completed_build_can_be_restarted() {
    let (mut pipeline, connector, first) = started().await;
    for marker in [
        "git clone success",
        "Dockerfile build success",
        "docker build & push success",
    ] {
        first.push(&InboundEvent::success(marker));
    }
    assert_eq!(pipeline.run().await, Phase::Completed);

    pipeline
        .start(BuildArtifact::new(8, "api:v2"))
        .await
        .expect("restart");
    let second = connector.last_link().expect("second session");
    assert_eq!(first.close_calls(), 1);
    assert_eq!(pipeline.phase(), Phase::Cloning);
    assert!(pipeline.transcript().is_empty());
    assert_eq!(
        second.sent_json()[0]["data"],
        json!({"id": 8, "docker_image_name": "api:v2"})
    );
}
