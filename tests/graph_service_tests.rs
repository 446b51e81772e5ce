//! Graph transport tests against a local mock server

use bulk_assign::error::Error;
use bulk_assign::remote::{assignment_request, AssignmentService, GraphService, SubRequest};
use bulk_assign::types::{ArtifactKind, ArtifactRef, AssignmentTarget, Intent, WorkItem};
use mockito::Matcher;
use serde_json::json;
use std::time::Duration;

const GROUP: &str = "0f3c2b1a-1111-4222-8333-944455556666";

fn service(server: &mockito::Server) -> GraphService {
    GraphService::new("t0ken", &server.url(), Duration::from_secs(5)).unwrap()
}

fn app(id: &str) -> ArtifactRef {
    ArtifactRef::new(id, id.to_uppercase(), ArtifactKind::App)
}

fn request(artifact_id: &str, id: &str) -> SubRequest {
    let item = WorkItem::new(
        &app(artifact_id),
        AssignmentTarget::Group(GROUP.into()),
        Intent::Required,
    );
    assignment_request(&item, id)
}

#[tokio::test]
async fn test_submit_batch_parses_sub_responses() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/$batch")
        .match_header("authorization", "Bearer t0ken")
        .match_body(Matcher::Regex(
            r#""url":"/deviceAppManagement/mobileApps/app-1/assignments""#.into(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "responses": [
                    { "id": "2", "status": 429, "headers": { "Retry-After": "3" } },
                    { "id": "1", "status": 201, "body": { "id": "new-assignment" } }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let responses = service(&server)
        .submit_batch(&[request("app-1", "1"), request("app-2", "2")])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].id, "2");
    assert_eq!(responses[0].retry_after(), Some(Duration::from_secs(3)));
    assert_eq!(responses[1].status, 201);
}

#[tokio::test]
async fn test_throttled_envelope_applies_to_every_sub_request() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/$batch")
        .with_status(429)
        .with_header("Retry-After", "7")
        .create_async()
        .await;

    let responses = service(&server)
        .submit_batch(&[request("app-1", "1"), request("app-2", "2")])
        .await
        .unwrap();

    let ids: Vec<&str> = responses.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert!(responses.iter().all(|r| r.status == 429));
    assert!(responses
        .iter()
        .all(|r| r.retry_after() == Some(Duration::from_secs(7))));
}

#[tokio::test]
async fn test_failed_envelope_is_an_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/$batch")
        .with_status(502)
        .with_body("bad gateway")
        .create_async()
        .await;

    let result = service(&server).submit_batch(&[request("app-1", "1")]).await;

    match result {
        Err(Error::GraphApi(message)) => assert!(message.contains("bad gateway")),
        other => panic!("expected GraphApi error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_batch_makes_no_call() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/$batch")
        .expect(0)
        .create_async()
        .await;

    let responses = service(&server).submit_batch(&[]).await.unwrap();

    assert!(responses.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_submit_one_captures_status_headers_and_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/deviceAppManagement/mobileApps/app-1/assignments")
        .match_body(Matcher::PartialJson(json!({
            "intent": "required",
            "target": { "groupId": GROUP }
        })))
        .with_status(503)
        .with_header("Retry-After", "4")
        .with_body(json!({ "error": { "message": "Service unavailable" } }).to_string())
        .create_async()
        .await;

    let response = service(&server)
        .submit_one(&request("app-1", "1"))
        .await
        .unwrap();

    assert_eq!(response.id, "1");
    assert_eq!(response.status, 503);
    assert_eq!(response.retry_after(), Some(Duration::from_secs(4)));
    assert_eq!(
        response.body.unwrap()["error"]["message"],
        "Service unavailable"
    );
}

#[tokio::test]
async fn test_list_assignments_follows_next_link() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("GET", "/deviceAppManagement/mobileApps/app-1/assignments")
        .with_status(200)
        .with_body(
            json!({
                "value": [{
                    "id": "a1",
                    "intent": "required",
                    "target": {
                        "@odata.type": "#microsoft.graph.groupAssignmentTarget",
                        "groupId": GROUP
                    }
                }],
                "@odata.nextLink": format!("{}/next-page", server.url())
            })
            .to_string(),
        )
        .create_async()
        .await;
    let second = server
        .mock("GET", "/next-page")
        .with_status(200)
        .with_body(
            json!({
                "value": [
                    {
                        "id": "a2",
                        "intent": "available",
                        "target": { "@odata.type": "#microsoft.graph.allLicensedUsersAssignmentTarget" }
                    },
                    {
                        "id": "a3",
                        "target": { "@odata.type": "#microsoft.graph.someFutureTarget" }
                    }
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let assignments = service(&server)
        .list_assignments(&app("app-1"))
        .await
        .unwrap();

    first.assert_async().await;
    second.assert_async().await;
    // Unknown target types are ignored.
    assert_eq!(assignments.len(), 2);
    assert_eq!(assignments[0].target, AssignmentTarget::Group(GROUP.into()));
    assert_eq!(assignments[0].intent, Intent::Required);
    assert_eq!(assignments[1].target, AssignmentTarget::AllUsers);
    assert_eq!(assignments[1].intent, Intent::Available);
}

#[tokio::test]
async fn test_list_assignments_error_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/deviceAppManagement/mobileApps/missing/assignments")
        .with_status(404)
        .create_async()
        .await;

    let result = service(&server).list_assignments(&app("missing")).await;

    assert!(matches!(result, Err(Error::GraphApi(_))));
}
