// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # TCP 服务模块
//!
//! 把 tokio 的 `TcpStream` 接到连接状态机上：
//! - 读半部分由连接任务持有，读到的字节交给 `Connection::data_received`；
//! - 写半部分由独立的写出任务持有，`ChannelTransport` 通过无界通道把字节与关闭指令交给它；
//! - 读到 EOF、读出错或写出任务结束时调用 `connection_lost`。

use std::{
    future::Future,
    net::{Ipv4Addr, SocketAddrV4},
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use bytes::{Bytes, BytesMut};
use log::{debug, error, info};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{tcp::OwnedWriteHalf, TcpListener, TcpStream},
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};

use crate::{
    app::Lifecycle,
    config::Config,
    connection::{Connection, Transport},
    dispatcher::Dispatcher,
    exception::Exception,
};

const READ_BUFFER_SIZE: usize = 4096;

enum Outbound {
    Data(Bytes),
    Close,
}

/// 基于通道的传输层，写入不会阻塞调用方
pub struct ChannelTransport {
    tx: UnboundedSender<Outbound>,
}

impl Transport for ChannelTransport {
    fn write(&mut self, data: Bytes) -> Result<(), Exception> {
        self.tx
            .send(Outbound::Data(data))
            .map_err(|_| Exception::TransportClosed)
    }

    fn close(&mut self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

/// 写出任务：依次写出排队的字节，收到关闭指令或通道断开后关闭写半部分
async fn drain(mut writer: OwnedWriteHalf, mut rx: UnboundedReceiver<Outbound>, id: u128) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Data(data) => {
                if let Err(e) = writer.write_all(&data).await {
                    error!("[ID{}]写入TCPStream时遇到错误: {}", id, e);
                    return;
                }
            }
            Outbound::Close => break,
        }
    }
    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
    debug!("[ID{}]写出任务结束", id);
}

pub struct Server {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    lifecycle: Lifecycle,
    active: Arc<AtomicU32>,
}

impl Server {
    pub fn new(config: Config, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
            lifecycle: Lifecycle::default(),
            active: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// 按配置绑定端口：`local` 为真时只监听回环地址
    pub async fn bind(&self) -> Result<TcpListener, Exception> {
        let address = match self.config.local() {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };
        let socket = SocketAddrV4::new(address, self.config.port());
        info!("服务端将在{}上监听Socket连接", socket);
        let listener = TcpListener::bind(socket).await?;
        info!("端口{}绑定完成", listener.local_addr()?.port());
        Ok(listener)
    }

    /// 执行启动钩子后接受连接，直到 `shutdown` 完成，再执行停机钩子
    pub async fn serve<S>(&self, listener: TcpListener, shutdown: S) -> Result<(), Exception>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        self.lifecycle.startup().await;
        let mut id: u128 = 0;

        loop {
            let (stream, addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("主循环接收到停机指令，正在退出...");
                    self.lifecycle.shutdown().await;
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("接受连接失败：{}", e);
                        continue;
                    }
                },
            };
            debug!("[ID{}]新的连接：{}", id, addr);

            let dispatcher = Arc::clone(&self.dispatcher);
            let active = Arc::clone(&self.active);
            let max_request_size = self.config.max_request_size();
            tokio::spawn(async move {
                active.fetch_add(1, Ordering::SeqCst);
                handle_connection(stream, id, dispatcher, max_request_size).await;
                active.fetch_sub(1, Ordering::SeqCst);
            });
            id += 1;
        }
    }

    /// 绑定并服务，直到收到 Ctrl-C 或 SIGTERM
    pub async fn run(&self) -> Result<(), Exception> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_signal()).await
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn active_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.active)
    }

    pub fn active_connections(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }
}

/// 等待 Ctrl-C，在 Unix 上同时等待 SIGTERM
pub async fn shutdown_signal() {
    tokio::select! {
        _ = ctrl_c() => info!("收到Ctrl-C"),
        _ = terminate() => info!("收到SIGTERM"),
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("无法监听Ctrl-C：{}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            error!("无法监听SIGTERM：{}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// # 连接处理器
///
/// 驱动单个 TCP 流：把读到的字节喂给连接状态机，直到对端关闭或响应写完。
async fn handle_connection(
    stream: TcpStream,
    id: u128,
    dispatcher: Arc<Dispatcher>,
    max_request_size: usize,
) {
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut writer_task = tokio::spawn(drain(writer, rx, id));

    let mut connection =
        Connection::new(id, dispatcher, Handle::current()).with_max_request_size(max_request_size);
    connection.connection_made(Box::new(ChannelTransport { tx }));

    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);
    let mut writer_done = false;
    loop {
        tokio::select! {
            read = reader.read_buf(&mut buffer) => match read {
                Ok(0) => {
                    debug!("[ID{}]客户端关闭了连接", id);
                    break;
                }
                Ok(_) => {
                    let chunk = buffer.split();
                    connection.data_received(&chunk);
                }
                Err(e) => {
                    error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
                    break;
                }
            },
            _ = &mut writer_task, if !writer_done => {
                writer_done = true;
                break;
            }
        }
    }

    connection.connection_lost();
    if !writer_done {
        let _ = writer_task.await;
    }
}
