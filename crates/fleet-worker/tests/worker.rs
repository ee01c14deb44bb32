//! Worker lifecycle against a canned gateway and a real hub

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleet_hub::Hub;
use fleet_worker::{ReadinessSender, StateCell, Worker, WorkerOptions, WorkerState};
use libfleet_ipc::{ControlHandler, ControlMessage, IpcClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Readiness pipe stand-in
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct Operator;

impl ControlHandler for Operator {
    fn latency(&self) -> Option<Duration> {
        None
    }

    fn eval(&self, _content: &str) -> Result<String, String> {
        Err("operator".to_string())
    }
}

/// Gateway answering every request with `status`
async fn gateway(status: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let body = r#"{"shards":7}"#;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    base
}

async fn hub() -> (String, oneshot::Sender<()>, JoinHandle<()>) {
    let hub = Hub::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", hub.local_addr().unwrap());
    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        hub.run(async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });
    (url, tx, task)
}

async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

/// Accepts TCP connections and never answers the WebSocket upgrade
async fn silent_hub_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    url
}

fn options(api_base: String, hub_url: String, allow_eval: bool) -> WorkerOptions {
    WorkerOptions {
        cluster_name: "Beta".to_string(),
        shard_ids: vec![3, 4, 5],
        shard_count: 7,
        api_base,
        token: "secret".to_string(),
        hub_url,
        allow_eval,
        ipc_timeout: Duration::from_secs(5),
        heartbeat: Duration::from_secs(30),
        retry_backoff: Duration::from_millis(50),
        max_retry_backoff: Duration::from_millis(200),
    }
}

struct RunningWorker {
    state: Arc<StateCell>,
    ready: SharedBuf,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), fleet_worker::WorkerError>>,
}

fn start_worker(options: WorkerOptions) -> RunningWorker {
    let worker = Worker::new(options).unwrap();
    let state = worker.state();
    let ready = SharedBuf::default();
    let (shutdown, rx) = oneshot::channel::<()>();

    let sender = ReadinessSender::new(ready.clone());
    let task = tokio::spawn(worker.run(sender, async {
        let _ = rx.await;
    }));

    RunningWorker {
        state,
        ready,
        shutdown,
        task,
    }
}

async fn wait_for_state(state: &StateCell, expected: WorkerState) {
    for _ in 0..100 {
        if state.get() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("state never reached {}, is {}", expected, state.get());
}

#[tokio::test]
async fn test_ready_then_serves_control_plane() {
    let api = gateway("200 OK").await;
    let (hub_url, _hub_shutdown, _hub_task) = hub().await;
    let worker = start_worker(options(api, hub_url.clone(), true));

    wait_for_state(&worker.state, WorkerState::IpcActive).await;
    assert_eq!(worker.ready.contents(), b"1");

    let operator = IpcClient::connect(&hub_url, "operator").await.unwrap();
    let (handle, _task) = operator.spawn(Arc::new(Operator));

    let replies = handle
        .broadcast(&ControlMessage::Ping, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].author, "Beta");
    assert!(replies[0].response.ends_with("ms"), "{}", replies[0].response);

    let replies = handle
        .broadcast(&ControlMessage::eval("shards"), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(replies[0].response, "3,4,5");

    let replies = handle
        .broadcast(&ControlMessage::eval("state"), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(replies[0].response, "ipc_active");

    worker.shutdown.send(()).unwrap();
    assert!(worker.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_eval_disabled_by_default() {
    let api = gateway("200 OK").await;
    let (hub_url, _hub_shutdown, _hub_task) = hub().await;
    let worker = start_worker(options(api, hub_url.clone(), false));
    wait_for_state(&worker.state, WorkerState::IpcActive).await;

    let operator = IpcClient::connect(&hub_url, "operator").await.unwrap();
    let (handle, _task) = operator.spawn(Arc::new(Operator));
    let replies = handle
        .broadcast(&ControlMessage::eval("pid"), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].response.contains("eval is disabled"));
}

#[tokio::test]
async fn test_missing_hub_disables_ipc_only() {
    let api = gateway("200 OK").await;
    let worker = start_worker(options(api, closed_port_url().await, true));

    wait_for_state(&worker.state, WorkerState::IpcDisabled).await;
    assert_eq!(worker.ready.contents(), b"1");

    // Still serving shards
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!worker.task.is_finished());

    worker.shutdown.send(()).unwrap();
    assert!(worker.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_hub_shutdown_keeps_worker_running() {
    let api = gateway("200 OK").await;
    let (hub_url, hub_shutdown, hub_task) = hub().await;
    let worker = start_worker(options(api, hub_url, true));
    wait_for_state(&worker.state, WorkerState::IpcActive).await;

    hub_shutdown.send(()).unwrap();
    hub_task.await.unwrap();

    wait_for_state(&worker.state, WorkerState::IpcDisabled).await;
    assert!(!worker.task.is_finished());

    worker.shutdown.send(()).unwrap();
    assert!(worker.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_not_ready_while_gateway_fails() {
    let api = gateway("503 Service Unavailable").await;
    let worker = start_worker(options(api, closed_port_url().await, true));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(worker.state.get(), WorkerState::Booting);
    assert!(worker.ready.contents().is_empty());

    worker.shutdown.send(()).unwrap();
    assert!(worker.task.await.unwrap().is_ok());
    assert!(worker.ready.contents().is_empty());
}

#[tokio::test]
async fn test_silent_hub_times_out_to_disabled() {
    let api = gateway("200 OK").await;
    let mut opts = options(api, silent_hub_url().await, true);
    opts.ipc_timeout = Duration::from_millis(200);
    let worker = start_worker(opts);

    wait_for_state(&worker.state, WorkerState::IpcDisabled).await;
    assert_eq!(worker.ready.contents(), b"1");
    assert!(!worker.task.is_finished());

    worker.shutdown.send(()).unwrap();
    assert!(worker.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_shutdown_while_joining_hub() {
    let api = gateway("200 OK").await;
    let mut opts = options(api, silent_hub_url().await, true);
    opts.ipc_timeout = Duration::from_secs(30);
    let worker = start_worker(opts);

    wait_for_state(&worker.state, WorkerState::IpcConnecting).await;
    worker.shutdown.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), worker.task)
        .await
        .expect("worker ignored shutdown while joining the hub");
    assert!(result.unwrap().is_ok());
}
