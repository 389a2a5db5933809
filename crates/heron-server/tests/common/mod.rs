//! Helpers shared by the server integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use heron_core::{envelope, HandlerResult, Request, RequestContext};
use heron_server::{Server, ServerBuilder, ServerResult};
use http::StatusCode;
use tokio::task::JoinHandle;

/// A started server and the task running its accept loop.
pub struct Running {
    pub server: Server,
    pub addr: SocketAddr,
    pub task: JoinHandle<ServerResult<()>>,
}

impl Running {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Shuts down and waits for the accept loop to return.
    pub async fn stop(self) {
        self.server.shutdown(Duration::from_secs(5)).await.unwrap();
        self.task.await.unwrap().unwrap();
    }
}

/// Builder bound to an ephemeral local port.
pub fn local() -> ServerBuilder {
    Server::builder().host("127.0.0.1").port(0)
}

pub async fn start(server: Server) -> Running {
    let serving = server.clone();
    let task = tokio::spawn(async move { serving.start().await });
    let addr = server.wait_until_listening().await.unwrap();
    Running { server, addr, task }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

pub async fn pong(_ctx: RequestContext, _req: Request) -> HandlerResult {
    Ok(envelope::text(StatusCode::OK, "pong"))
}
