// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scripted stand-in for the print daemon, used by the unit tests.
//
// Listens on an ephemeral loopback port, records every request, and answers
// each operation from a per-operation script (default: success, empty info).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use attendo_core::config::{Backoff, ClientConfig, RetryPolicy};

use crate::protocol::{ApiName, InboundMessage, PUSH_API_NAME, Request, ResultAck};

/// How the fake daemon answers one operation.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Ack(ResultAck),
    /// Never answer.
    Silent,
    Delayed(Duration, ResultAck),
    /// Answer, then emit these pushes.
    AckThenPush(ResultAck, Vec<ResultAck>),
}

#[derive(Default)]
struct Shared {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<Request>>,
    connections: AtomicUsize,
    current: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

pub(crate) struct FakeDaemon {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept_task: JoinHandle<()>,
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl FakeDaemon {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared::default());

        let accept_shared = Arc::clone(&shared);
        let accept_task = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                tokio::spawn(serve(Arc::clone(&accept_shared), tcp));
            }
        });

        Self {
            addr,
            shared,
            accept_task,
        }
    }

    /// A daemon scripted for a full badge print against one printer.
    pub(crate) async fn with_printer(name: &str, port: i64) -> Self {
        let daemon = Self::start().await;
        daemon.reply(
            ApiName::GetAllPrinters,
            Reply::Ack(ResultAck {
                info: serde_json::Value::String(format!("{{\"{name}\":{port}}}")),
                ..ResultAck::ok()
            }),
        );
        daemon.reply(
            ApiName::CommitJob,
            Reply::AckThenPush(ResultAck::ok(), vec![completion_push()]),
        );
        daemon
    }

    pub(crate) fn endpoint(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Client config pointed at this daemon, with short test timings.
    pub(crate) fn config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint(),
            connect_timeout_ms: 1_000,
            request_timeout_ms: 300,
            job_timeout_ms: 600,
            stabilization_delay_ms: 0,
            step_settle_ms: 0,
            reconnect: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 50,
                max_delay_ms: 50,
                backoff: Backoff::Fixed,
            },
            select: RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 10,
                max_delay_ms: 20,
                backoff: Backoff::Exponential,
            },
            ..ClientConfig::default()
        }
    }

    pub(crate) fn reply(&self, api: ApiName, reply: Reply) {
        self.shared
            .replies
            .lock()
            .unwrap()
            .insert(api.as_str().to_string(), reply);
    }

    /// Operation names received so far, in arrival order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.shared
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.api_name.clone())
            .collect()
    }

    pub(crate) fn count(&self, api: ApiName) -> usize {
        self.requests().iter().filter(|r| *r == api.as_str()).count()
    }

    /// Requests received for one operation, in arrival order.
    pub(crate) fn requests_for(&self, api: ApiName) -> Vec<Request> {
        self.shared
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.api_name == api.as_str())
            .cloned()
            .collect()
    }

    pub(crate) fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Emit an unsolicited push on the current connection.
    pub(crate) fn push(&self, ack: ResultAck) {
        if let Some(tx) = self.shared.current.lock().unwrap().as_ref() {
            let _ = tx.send(frame(PUSH_API_NAME, ack));
        }
    }

    /// Emit a frame under an arbitrary operation name.
    pub(crate) fn send_raw(&self, api_name: &str, ack: ResultAck) {
        if let Some(tx) = self.shared.current.lock().unwrap().as_ref() {
            let _ = tx.send(frame(api_name, ack));
        }
    }

    /// Close the current connection from the daemon side.
    pub(crate) fn drop_connection(&self) {
        if let Some(tx) = self.shared.current.lock().unwrap().take() {
            let _ = tx.send(Message::Close(None));
        }
    }
}

/// Push reporting one copy and one page printed.
pub(crate) fn completion_push() -> ResultAck {
    ResultAck {
        print_copies: Some(1),
        print_pages: Some(1),
        ..ResultAck::ok()
    }
}

/// An address nothing listens on.
pub(crate) async fn unreachable_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}")
}

fn frame(api_name: &str, ack: ResultAck) -> Message {
    let message = InboundMessage {
        api_name: api_name.to_string(),
        result_ack: ack,
    };
    Message::Text(serde_json::to_string(&message).unwrap())
}

async fn serve(shared: Arc<Shared>, tcp: TcpStream) {
    let Ok(ws) = accept_async(tcp).await else {
        return;
    };
    shared.connections.fetch_add(1, Ordering::SeqCst);

    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    *shared.current.lock().unwrap() = Some(tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(request) = serde_json::from_str::<Request>(&text) else {
            continue;
        };
        let api = request.api_name.clone();
        shared.requests.lock().unwrap().push(request);

        let reply = shared
            .replies
            .lock()
            .unwrap()
            .get(&api)
            .cloned()
            .unwrap_or(Reply::Ack(ResultAck::ok()));

        match reply {
            Reply::Ack(ack) => {
                let _ = tx.send(frame(&api, ack));
            }
            Reply::Silent => {}
            Reply::Delayed(delay, ack) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(frame(&api, ack));
                });
            }
            Reply::AckThenPush(ack, pushes) => {
                let _ = tx.send(frame(&api, ack));
                for push in pushes {
                    let _ = tx.send(frame(PUSH_API_NAME, push));
                }
            }
        }
    }

    writer.abort();
}
