use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serial_test::serial;

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_miniprof")
}

fn spawn_server(temp: &Path) -> (Child, u16) {
    let port = free_port();
    let child = Command::new(bin())
        .arg("run")
        .arg("--db-path")
        .arg(temp.join("miniprof.duckdb"))
        .arg("--listen-addr")
        .arg(format!("127.0.0.1:{port}"))
        .env("MINIPROF_CONFIG", temp.join("absent.toml"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    (child, port)
}

async fn wait_ready(port: u16, child: &mut Child) {
    let client = reqwest::Client::new();
    let mut ready = false;
    for _ in 0..100 {
        assert!(child.try_wait().unwrap().is_none(), "miniprof exited early");
        if client
            .get(format!("http://127.0.0.1:{port}/mini_profile/results"))
            .send()
            .await
            .is_ok()
        {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(ready, "miniprof did not start listening");
}

fn results_cmd(port: u16, ids: &str, json: bool) -> std::process::Output {
    let mut cmd = Command::new(bin());
    if json {
        cmd.arg("--json");
    }
    cmd.arg("results")
        .arg(ids)
        .arg("--addr")
        .arg(format!("127.0.0.1:{port}"))
        .env("MINIPROF_CONFIG", "/nonexistent/miniprof.toml")
        .output()
        .unwrap()
}

#[tokio::test]
#[serial]
async fn e2e_redirect_chain_is_reported_together() {
    let temp = tempfile::tempdir().unwrap();
    let (mut child, port) = spawn_server(temp.path());
    wait_ready(port, &mut child).await;

    let resp = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{port}/chain?hops=2"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert!(resp.url().query().unwrap_or_default().contains("_mprid_="));
    let chain = resp
        .headers()
        .get("x-mini-profile-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(chain, "1,2,3,4");
    let page = resp.text().await.unwrap();
    assert!(page.contains("requestId: '4'"));

    let output = results_cmd(port, &chain, true);
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["ok"], true);
    let requests = value["requests"].as_array().unwrap();
    assert_eq!(requests.len(), 4);
    let redirects: Vec<bool> = requests
        .iter()
        .map(|r| r["redirect"].as_bool().unwrap())
        .collect();
    assert_eq!(redirects, vec![true, true, true, false]);
    assert_eq!(requests[0]["requestURL"], "/chain?hops=2");
    assert_eq!(requests[0]["profile"]["children"][0]["name"], "hop 2");

    let output = results_cmd(port, &chain, false);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("REQUEST 1 /chain?hops=2"));
    assert!(stdout.contains("  Request ("));
    assert!(stdout.contains("-- 4 results --"));

    let _ = child.kill();
    let _ = child.wait();
}

#[tokio::test]
#[serial]
async fn e2e_work_carries_call_stats() {
    let temp = tempfile::tempdir().unwrap();
    let (mut child, port) = spawn_server(temp.path());
    wait_ready(port, &mut child).await;

    let resp = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{port}/work"))
        .send()
        .await
        .unwrap();
    let id = resp
        .headers()
        .get("x-mini-profile-request-id")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(resp.headers().get("x-traceurl").is_some());

    let body: serde_json::Value = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{port}/mini_profile/results"))
        .query(&[("ids", id.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let request = &body["requests"][0];
    assert_eq!(request["id"], id.as_str());
    assert_eq!(request["profile"]["children"][0]["name"], "cache lookup");
    let rpc = &request["appstats"]["rpcStats"];
    assert_eq!(rpc["datastore_v3.RunQuery"]["totalCalls"], 1);
    assert_eq!(request["appstats"]["rpcCalls"].as_array().unwrap().len(), 3);

    let script = reqwest::Client::new()
        .get(format!(
            "http://127.0.0.1:{port}/mini_profile/resource?id=mini_profiler.js"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(script.headers()["content-type"], "text/javascript");
    assert!(!script.text().await.unwrap().contains("@@prefix@@"));

    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn results_without_server_fails() {
    let output = results_cmd(1, "1", false);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect"));
}
