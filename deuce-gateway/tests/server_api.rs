//! HTTP surface over an ephemeral port.

mod common;

use common::{Behaviour, Harness, test_settings};
use deuce_gateway::server::create_router;
use serde_json::{Value, json};

async fn serve(harness: &Harness) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(harness.state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn conversation_over_http() {
    let harness = Harness::new(test_settings());
    let base = serve(&harness).await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("{base}/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let session_id = created["session_id"].as_str().unwrap().to_string();
    assert_eq!(session_id.len(), 36);

    let response = client
        .post(format!("{base}/sessions/{session_id}/messages"))
        .json(&json!({"text": "When will I ovulate if my last period started 2025-05-01 with a 5-day duration?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["session_id"], session_id.as_str());
    assert_eq!(reply["tool_calls"][0]["tool"], "cycle_prediction");
    assert_eq!(reply["clarification"], false);

    let history: Value = client
        .get(format!("{base}/sessions/{session_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["turns"].as_array().unwrap().len(), 3);

    let reset: Value = client
        .delete(format!("{base}/sessions/{session_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reset["reset"], true);

    let missing = client
        .get(format!("{base}/sessions/{session_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn turn_errors_map_to_status_codes() {
    let harness = Harness::new(test_settings());
    let base = serve(&harness).await;
    let client = reqwest::Client::new();

    let empty = client
        .post(format!("{base}/sessions/s1/messages"))
        .json(&json!({"text": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(empty.status(), 400);

    harness.provider.set(Behaviour::Fail);
    let unavailable = client
        .post(format!("{base}/sessions/s1/messages"))
        .json(&json!({"text": "hello"}))
        .send()
        .await
        .unwrap();
    assert_eq!(unavailable.status(), 503);
    let body: Value = unavailable.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("try again"));
    assert!(!body["error"].as_str().unwrap().contains("model not loaded"));
}

#[tokio::test]
async fn tools_health_and_rebuild() {
    let harness = Harness::new(test_settings());
    harness.write_library();
    let base = serve(&harness).await;
    let client = reqwest::Client::new();

    let tools: Value = client
        .get(format!("{base}/tools"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = tools
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec![
            "cycle_prediction",
            "health_score",
            "kidney_function",
            "lipid_profile",
            "liver_function",
            "symptom_checker"
        ]
    );
    assert_eq!(tools[0]["input_schema"]["type"], "object");

    let report: Value = client
        .post(format!("{base}/knowledge/rebuild"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["documents"], 4);

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["models"], json!(["scripted"]));
    assert_eq!(health["index_generation"], report["generation"]);
    assert!(health["index_chunks"].as_u64().unwrap() >= 4);
    assert!(harness.dir.path().join("index.json").exists());
}
