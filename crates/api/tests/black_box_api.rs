use std::collections::HashSet;
use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use taskrelay_api::app::{build_app, services::AppServices};
use taskrelay_core::LifecyclePolicy;
use taskrelay_infra::SqliteStore;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(AppServices::in_memory(LifecyclePolicy::default())).await
    }

    async fn spawn_with(services: AppServices) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = build_app(Arc::new(services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn submit(client: &reqwest::Client, srv: &TestServer, body: Value) -> reqwest::Response {
    client.post(srv.url("/api/job")).json(&body).send().await.unwrap()
}

async fn poll(client: &reqwest::Client, srv: &TestServer, agent_id: i64) -> Vec<Value> {
    let res = client
        .get(srv.url(&format!("/api/tasking/{agent_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    body["jobs"].as_array().expect("jobs array").clone()
}

async fn get_job(client: &reqwest::Client, srv: &TestServer, id: i64) -> Value {
    let res = client
        .get(srv.url(&format!("/api/job/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn ping_job_full_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = submit(&client, &srv, json!({"jobType": "Ping", "jobData": {"n": 1}, "agentId": 7})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["jobId"], 1);
    assert_eq!(created["jobResultStatus"], "Created");

    let jobs = poll(&client, &srv, 7).await;
    assert_eq!(jobs, vec![json!({"jobId": 1, "jobType": "Ping", "jobData": {"n": 1}})]);
    assert_eq!(get_job(&client, &srv, 1).await["jobResultStatus"], "Sent");

    assert!(poll(&client, &srv, 7).await.is_empty());

    let res = client
        .put(srv.url("/api/job/1"))
        .json(&json!({"correlationId": 1, "status": "Success", "outputData": {"ok": true}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let job = get_job(&client, &srv, 1).await;
    assert_eq!(job["jobResultStatus"], "Success");
    assert_eq!(job["jobOutput"], json!({"ok": true}));
    assert_eq!(job["jobData"], json!({"n": 1}));
}

#[tokio::test]
async fn invalid_submissions_are_400_and_not_persisted() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let cases = [
        (json!({"jobType": "Ping", "jobData": {}, "agentId": 0}), "agent id required"),
        (json!({"jobType": "", "jobData": {}, "agentId": 7}), "job type required"),
        (json!({"jobType": "Ping", "agentId": 7}), "job data required"),
        (Value::Null, "missing body"),
    ];

    for (body, message) in cases {
        let res = submit(&client, &srv, body).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let err: Value = res.json().await.unwrap();
        assert_eq!(err["error"], "invalid_input");
        assert_eq!(err["message"], message);
    }

    let res = client.post(srv.url("/api/job")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert!(poll(&client, &srv, 7).await.is_empty());
    let res = client.get(srv.url("/api/job/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn report_errors_map_to_status_codes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .put(srv.url("/api/job/99"))
        .json(&json!({"status": "Success"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    submit(&client, &srv, json!({"jobType": "Ping", "jobData": {}, "agentId": 3})).await;
    poll(&client, &srv, 3).await;

    let res = client.put(srv.url("/api/job/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .put(srv.url("/api/job/1"))
        .json(&json!({"status": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/api/job/1/result"))
        .json(&json!({"status": 4, "errorMessage": "operator abort"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let job: Value = res.json().await.unwrap();
    assert_eq!(job["jobResultStatus"], "Cancelled");
    assert_eq!(job["errorMessage"], "operator abort");
    assert_eq!(job["jobOutput"], Value::Null);

    let res = client
        .put(srv.url("/api/job/1"))
        .json(&json!({"status": "InProgress"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client.get(srv.url("/api/job/abc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn batch_tasking_creates_jobs_and_reports_partial_failure() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/tasking"))
        .json(&json!({"jobs": [
            {"jobType": "Ping", "jobData": {"n": 1}, "agentId": 5},
            {"jobType": "Scan", "jobData": {"n": 2}, "agentId": 5}
        ]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let created: Vec<Value> = res.json().await.unwrap();
    assert_eq!(created.len(), 2);

    let res = client
        .post(srv.url("/api/tasking"))
        .json(&json!({"jobs": [
            {"jobType": "Ping", "jobData": {"n": 3}, "agentId": 5},
            {"jobType": "Ping", "jobData": {"n": 4}, "agentId": -1}
        ]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["index"], 1);
    assert_eq!(err["persisted"], json!([3]));

    let res = client
        .post(srv.url("/api/tasking"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(poll(&client, &srv, 5).await.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_polls_partition_pending_jobs() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for n in 0..20 {
        submit(&client, &srv, json!({"jobType": "Ping", "jobData": {"n": n}, "agentId": 7})).await;
    }

    let polls: Vec<_> = (0..6)
        .map(|_| {
            let client = client.clone();
            let url = srv.url("/api/tasking/7");
            tokio::spawn(async move {
                let body: Value = client.get(url).send().await.unwrap().json().await.unwrap();
                body["jobs"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|j| j["jobId"].as_i64().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in polls {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "job {id} delivered twice");
            total += 1;
        }
    }
    assert_eq!(total, 20);
    assert_eq!(seen, (1..=20).collect::<HashSet<i64>>());
}

#[tokio::test]
async fn hello_registers_once_per_guid() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let hello = |body: Value| {
        let client = client.clone();
        let url = srv.url("/api/agent/hello");
        async move { client.post(url).json(&body).send().await.unwrap() }
    };

    let first: Value = hello(json!({"agentGuid": "edge-01", "version": "1.4.2", "plugins": ["ping"]}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first["message"], "Agent Hello Received");
    let agent_id = first["agentId"].as_i64().unwrap();

    let again: Value = hello(json!({"agentGuid": "edge-01"})).await.json().await.unwrap();
    assert_eq!(again["agentId"].as_i64().unwrap(), agent_id);

    let res = hello(json!({"agentGuid": ""})).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url(&format!("/api/agent/{agent_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let agent: Value = res.json().await.unwrap();
    assert_eq!(agent["agentGuid"], "edge-01");
    assert_eq!(agent["status"], "Online");
    assert_eq!(agent["version"], "1.4.2");
    assert_eq!(agent["plugins"], json!(["ping"]));

    let res = client.get(srv.url("/api/agent/999")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sqlite_backed_server_runs_the_same_lifecycle() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let services = AppServices::new(store, LifecyclePolicy::default());
    let srv = TestServer::spawn_with(services).await;
    let client = reqwest::Client::new();

    let res = submit(&client, &srv, json!({"jobType": "Ping", "jobData": [1, "two", null], "agentId": 2})).await;
    assert_eq!(res.status(), StatusCode::OK);

    let jobs = poll(&client, &srv, 2).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["jobData"], json!([1, "two", null]));
    assert!(poll(&client, &srv, 2).await.is_empty());

    let res = client
        .put(srv.url("/api/job/1"))
        .json(&json!({"status": "failed", "outputData": "exit 2", "errorMessage": "non-zero exit"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let job = get_job(&client, &srv, 1).await;
    assert_eq!(job["jobResultStatus"], "Failed");
    assert_eq!(job["jobOutput"], "exit 2");
    assert_eq!(job["errorMessage"], "non-zero exit");
}
