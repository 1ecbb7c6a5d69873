// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 集成测试共用的服务器夹具与原始 TCP 客户端

#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{atomic::AtomicU32, Arc},
    time::Duration,
};

use routecore::{App, Config};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
};

pub struct TestServer {
    pub addr: SocketAddr,
    pub active: Arc<AtomicU32>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), routecore::Exception>>,
}

impl TestServer {
    /// 在随机端口上启动服务器
    pub async fn start(app: App, config: Config) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = app.into_server(config);
        let active = server.active_counter();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
        });

        Self {
            addr,
            active,
            shutdown: Some(tx),
            handle,
        }
    }

    pub async fn stop(mut self) -> Result<(), routecore::Exception> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap()
    }

    pub async fn send(&self, raw: &[u8]) -> String {
        RawClient::new(self.addr).send(raw).await
    }
}

pub struct RawClient {
    addr: SocketAddr,
}

impl RawClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// 发送原始字节并读取直到服务端关闭连接
    pub async fn send(&self, raw: &[u8]) -> String {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(raw).await.unwrap();

        let mut buffer = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer))
            .await
            .expect("server did not close the connection in time")
            .unwrap();
        String::from_utf8_lossy(&buffer).to_string()
    }
}

pub fn extract_status_code(response: &str) -> u16 {
    response
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0)
}

pub fn split_response(response: &str) -> (&str, &str) {
    response.split_once("\r\n\r\n").unwrap_or((response, ""))
}
