// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接状态机模块
//!
//! `Connection` 负责单个客户端连接的完整生命周期：
//! 接收解析器回调、组装 `Request`、调度分发任务、写回 `Response`、关闭并清理。
//!
//! ## 状态转换
//! ```text
//! Idle ──connection_made──▶ Open ──首个数据块──▶ Receiving ──报文结束──▶ Dispatching ──写出并关闭──▶ Closed
//!   任意状态 ──connection_lost──▶ Closed
//! ```
//!
//! 每个连接只写出一次响应，写完立即关闭，不支持 keep-alive。
//! 客户端提前断开时，传输层引用被立即释放；仍在进行的分发任务会在写回时发现这一点并跳过写入。

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::{Bytes, BytesMut};
use log::{debug, error, info, warn};
use tokio::runtime::Handle;

use crate::{
    dispatcher::Dispatcher,
    exception::Exception,
    parser::{HttpParser, ParserListener, DEFAULT_MAX_REQUEST_SIZE},
    request::Request,
    response::Response,
};

/// 对一个已打开网络连接的抽象
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// 将字节放入发送队列
    fn write(&mut self, data: Bytes) -> Result<(), Exception>;
    /// 终止连接
    fn close(&mut self);
}

pub type BoxedTransport = Box<dyn Transport + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 连接已接受，尚未绑定传输层
    Idle,
    /// 传输层已绑定，等待数据
    Open,
    /// 解析器已开始接收一条报文
    Receiving,
    /// 报文完整，分发任务已调度或正在运行
    Dispatching,
    /// 传输层已释放，终态
    Closed,
}

/// 与分发任务共享的部分：状态与传输层槽位
struct Slot {
    state: ConnectionState,
    transport: Option<BoxedTransport>,
}

/// 当前报文的缓冲区，每条报文结束后清空
#[derive(Default)]
struct MessageBuffer {
    url: Vec<u8>,
    headers: Vec<(String, String)>,
    body: BytesMut,
    completed: VecDeque<Result<Request, Exception>>,
}

impl MessageBuffer {
    fn build(
        method: &str,
        url: &[u8],
        headers: Vec<(String, String)>,
        body: &[u8],
    ) -> Result<Request, Exception> {
        let path = std::str::from_utf8(url).map_err(|_| Exception::RequestIsNotUtf8)?;
        let body = std::str::from_utf8(body).map_err(|_| Exception::RequestIsNotUtf8)?;
        Ok(Request::from_parts(method, path, body).with_headers(headers))
    }
}

impl ParserListener for MessageBuffer {
    fn on_url(&mut self, url: &[u8]) {
        self.url.extend_from_slice(url);
    }

    fn on_header(&mut self, name: &str, value: &[u8]) {
        self.headers
            .push((name.to_string(), String::from_utf8_lossy(value).into_owned()));
    }

    fn on_body(&mut self, fragment: &[u8]) {
        self.body.extend_from_slice(fragment);
    }

    fn on_message_complete(&mut self, method: &str) {
        let url = std::mem::take(&mut self.url);
        let headers = std::mem::take(&mut self.headers);
        let body = self.body.split();
        self.completed.push_back(Self::build(method, &url, headers, &body));
    }
}

pub struct Connection {
    id: u128,
    dispatcher: Arc<Dispatcher>,
    scheduler: Handle,
    parser: HttpParser,
    message: MessageBuffer,
    slot: Arc<Mutex<Slot>>,
}

impl Connection {
    /// 创建一个处于 `Idle` 状态的连接。
    ///
    /// 分发器与调度器句柄都由调用方显式注入。
    pub fn new(id: u128, dispatcher: Arc<Dispatcher>, scheduler: Handle) -> Self {
        Self {
            id,
            dispatcher,
            scheduler,
            parser: HttpParser::new(DEFAULT_MAX_REQUEST_SIZE),
            message: MessageBuffer::default(),
            slot: Arc::new(Mutex::new(Slot {
                state: ConnectionState::Idle,
                transport: None,
            })),
        }
    }

    pub fn with_max_request_size(mut self, max_request_size: usize) -> Self {
        self.parser = HttpParser::new(max_request_size);
        self
    }

    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.slot).state
    }

    /// 连接建立：绑定传输层，`Idle → Open`
    pub fn connection_made(&mut self, transport: BoxedTransport) {
        let mut slot = lock(&self.slot);
        if slot.state != ConnectionState::Idle {
            warn!("[ID{}]连接状态为{:?}，忽略重复的传输层绑定", self.id, slot.state);
            return;
        }
        slot.transport = Some(transport);
        slot.state = ConnectionState::Open;
        debug!("[ID{}]TCP连接已建立", self.id);
    }

    /// 收到一段字节：交给解析器，完整的报文会被立即调度分发
    pub fn data_received(&mut self, chunk: &[u8]) {
        {
            let mut slot = lock(&self.slot);
            match slot.state {
                ConnectionState::Idle => {
                    warn!("[ID{}]传输层尚未绑定，丢弃{}字节", self.id, chunk.len());
                    return;
                }
                ConnectionState::Closed => {
                    debug!("[ID{}]连接已关闭，丢弃{}字节", self.id, chunk.len());
                    return;
                }
                ConnectionState::Open => slot.state = ConnectionState::Receiving,
                ConnectionState::Receiving | ConnectionState::Dispatching => {}
            }
        }

        if let Err(e) = self.parser.feed(chunk, &mut self.message) {
            self.reject(e);
            return;
        }

        while let Some(built) = self.message.completed.pop_front() {
            match built {
                Ok(request) => self.schedule(request),
                Err(e) => {
                    self.reject(e);
                    return;
                }
            }
        }
    }

    /// 客户端断开：立即释放传输层，`* → Closed`
    pub fn connection_lost(&mut self) {
        let mut slot = lock(&self.slot);
        if slot.transport.take().is_some() {
            debug!("[ID{}]客户端在响应写出前断开连接", self.id);
        }
        slot.state = ConnectionState::Closed;
    }

    /// 报文结束：`Receiving → Dispatching`，在调度器上启动分发并写回。
    ///
    /// 每个连接只应答第一条报文，之后到达的报文在构造完成后被丢弃。
    fn schedule(&self, request: Request) {
        {
            let mut slot = lock(&self.slot);
            match slot.state {
                ConnectionState::Closed => {
                    debug!("[ID{}]连接已关闭，忽略报文结束信号", self.id);
                    return;
                }
                ConnectionState::Dispatching => {
                    debug!(
                        "[ID{}]已有请求在处理中，不支持流水线，丢弃：{} {}",
                        self.id,
                        request.method(),
                        request.path()
                    );
                    return;
                }
                _ => slot.state = ConnectionState::Dispatching,
            }
        }
        debug!("[ID{}]HTTP请求接收完毕：{} {}", self.id, request.method(), request.path());

        let id = self.id;
        let dispatcher = Arc::clone(&self.dispatcher);
        let slot = Arc::clone(&self.slot);
        self.scheduler.spawn(async move {
            let method = request.method().to_string();
            let path = request.path().to_string();
            let response = dispatcher.dispatch(request).await;
            info!("[ID{}] {}, {}, {}, {}", id, method, path, response.status_code(), response.information());
            write_response(&slot, id, &response);
        });
    }

    /// 报文无法解析：直接写回 400 并关闭
    fn reject(&self, e: Exception) {
        if lock(&self.slot).state == ConnectionState::Dispatching {
            debug!("[ID{}]第一条请求仍在处理中，丢弃后续无法解析的报文：{}", self.id, e);
            return;
        }
        warn!("[ID{}]解析HTTP请求失败，返回400：{}", self.id, e);
        write_response(&self.slot, self.id, &Response::bad_request());
    }
}

/// 写出序列化后的响应并关闭传输层。传输层已释放时跳过写入。
fn write_response(slot: &Mutex<Slot>, id: u128, response: &Response) {
    let bytes = match response.as_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("[ID{}]响应序列化失败，改为返回500：{}", id, e);
            match Response::internal_error().as_bytes() {
                Ok(bytes) => bytes,
                Err(_) => return,
            }
        }
    };

    let mut slot = lock(slot);
    let mut transport = match slot.transport.take() {
        Some(transport) => transport,
        None => {
            debug!("[ID{}]传输层已释放，跳过写入", id);
            slot.state = ConnectionState::Closed;
            return;
        }
    };

    debug!("[ID{}]发送全量响应，长度: {}", id, bytes.len());
    if let Err(e) = transport.write(Bytes::from(bytes)) {
        warn!("[ID{}]写入响应失败：{}", id, e);
    }
    transport.close();
    slot.state = ConnectionState::Closed;
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        body::Body,
        path::Params,
        router::{HandlerError, HandlerResult, Router},
    };
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::sync::Notify;

    /// 记录写出的字节与关闭次数
    #[derive(Clone, Default)]
    struct Sink {
        written: Arc<Mutex<Vec<Bytes>>>,
        closes: Arc<AtomicUsize>,
    }

    impl Sink {
        fn transport(&self) -> BoxedTransport {
            let mut mock = MockTransport::new();
            let written = Arc::clone(&self.written);
            mock.expect_write().returning(move |data| {
                written.lock().unwrap().push(data);
                Ok(())
            });
            let closes = Arc::clone(&self.closes);
            mock.expect_close().returning(move || {
                closes.fetch_add(1, Ordering::SeqCst);
            });
            Box::new(mock)
        }

        fn text(&self) -> String {
            let written = self.written.lock().unwrap();
            written
                .iter()
                .map(|b| String::from_utf8_lossy(b).to_string())
                .collect()
        }

        fn writes(&self) -> usize {
            self.written.lock().unwrap().len()
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    async fn hello(_req: Request, params: Params) -> HandlerResult {
        let name = params.get("name").cloned().unwrap_or_default();
        Ok(Response::json(200, json!({"msg": format!("Hello {}", name)})))
    }

    async fn failing(_req: Request, _params: Params) -> HandlerResult {
        Err("boom".into())
    }

    fn dispatcher(router: Router) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(Arc::new(router)))
    }

    fn hello_dispatcher() -> Arc<Dispatcher> {
        let mut router = Router::new();
        router.register("/hello/{name}", "GET", hello).unwrap();
        router.register("/fail", "GET", failing).unwrap();
        dispatcher(router)
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let sink = Sink::default();
        let mut conn = Connection::new(1, hello_dispatcher(), Handle::current());
        assert_eq!(conn.state(), ConnectionState::Idle);

        conn.connection_made(sink.transport());
        assert_eq!(conn.state(), ConnectionState::Open);

        conn.data_received(b"GET /hello/Ada HTTP/1.1\r\n");
        assert_eq!(conn.state(), ConnectionState::Receiving);

        conn.data_received(b"Host: localhost\r\n\r\n");
        assert_eq!(conn.state(), ConnectionState::Dispatching);

        wait_for(|| conn.state() == ConnectionState::Closed).await;
        assert_eq!(sink.writes(), 1);
        assert_eq!(sink.closes(), 1);

        let text = sink.text();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"msg\":\"Hello Ada\"}"));
    }

    #[tokio::test]
    async fn test_not_found_response() {
        let sink = Sink::default();
        let mut conn = Connection::new(2, hello_dispatcher(), Handle::current());
        conn.connection_made(sink.transport());
        conn.data_received(b"GET /nowhere HTTP/1.1\r\n\r\n");

        wait_for(|| conn.state() == ConnectionState::Closed).await;
        let text = sink.text();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.ends_with("{\"message\":\"Not Found\"}"));
    }

    #[tokio::test]
    async fn test_handler_failure_closes_once() {
        let sink = Sink::default();
        let mut conn = Connection::new(3, hello_dispatcher(), Handle::current());
        conn.connection_made(sink.transport());
        conn.data_received(b"GET /fail HTTP/1.1\r\n\r\n");

        wait_for(|| conn.state() == ConnectionState::Closed).await;
        let text = sink.text();
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(text.ends_with("{\"message\":\"Unexpected error\"}"));
        assert_eq!(sink.writes(), 1);
        assert_eq!(sink.closes(), 1);
    }

    #[tokio::test]
    async fn test_malformed_request_is_400() {
        let sink = Sink::default();
        let mut conn = Connection::new(4, hello_dispatcher(), Handle::current());
        conn.connection_made(sink.transport());
        conn.data_received(b"POST /a HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n");

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(sink.text().starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert_eq!(sink.closes(), 1);

        conn.data_received(b"GET /hello/Ada HTTP/1.1\r\n\r\n");
        assert_eq!(sink.writes(), 1);
    }

    #[tokio::test]
    async fn test_connection_lost_skips_write() {
        let gate = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());
        let handler_gate = Arc::clone(&gate);
        let handler_started = Arc::clone(&started);

        let mut router = Router::new();
        router
            .register("/slow", "GET", move |_req: Request, _params: Params| {
                let gate = Arc::clone(&handler_gate);
                let started = Arc::clone(&handler_started);
                async move {
                    started.notify_one();
                    gate.notified().await;
                    Ok::<_, HandlerError>(Response::json(200, json!({"slow": true})))
                }
            })
            .unwrap();

        let sink = Sink::default();
        let mut conn = Connection::new(5, dispatcher(router), Handle::current());
        conn.connection_made(sink.transport());
        conn.data_received(b"GET /slow HTTP/1.1\r\n\r\n");

        started.notified().await;
        conn.connection_lost();
        assert_eq!(conn.state(), ConnectionState::Closed);
        gate.notify_one();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.writes(), 0);
        assert_eq!(sink.closes(), 0);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_sequential_messages_do_not_leak() {
        let mut parser = HttpParser::default();
        let mut message = MessageBuffer::default();
        parser
            .feed(
                b"POST /first HTTP/1.1\r\nX-Step: 1\r\nContent-Length: 8\r\n\r\n{\"a\": 1}",
                &mut message,
            )
            .unwrap();
        parser
            .feed(b"POST /second HTTP/1.1\r\nContent-Length: 0\r\n\r\n", &mut message)
            .unwrap();

        let first = message.completed.pop_front().unwrap().unwrap();
        let second = message.completed.pop_front().unwrap().unwrap();
        assert!(message.completed.is_empty());

        assert_eq!(first.path(), "/first");
        assert_eq!(first.body(), &Body::Json(json!({"a": 1})));
        assert_eq!(first.header("x-step"), Some("1"));
        assert_eq!(second.path(), "/second");
        assert_eq!(second.body(), &Body::Empty);
        assert_eq!(second.header("x-step"), None);
        assert!(message.url.is_empty() && message.body.is_empty() && message.headers.is_empty());
    }

    #[tokio::test]
    async fn test_response_answers_first_request() {
        let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let first_calls = Arc::clone(&calls);
        let second_calls = Arc::clone(&calls);

        let mut router = Router::new();
        router
            .register("/first", "GET", move |_req: Request, _params: Params| {
                first_calls.lock().unwrap().push("first".to_string());
                async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, HandlerError>(Response::json(200, json!({"req": "first"})))
                }
            })
            .unwrap();
        router
            .register("/second", "GET", move |_req: Request, _params: Params| {
                second_calls.lock().unwrap().push("second".to_string());
                async { Ok::<_, HandlerError>(Response::json(200, json!({"req": "second"}))) }
            })
            .unwrap();

        let sink = Sink::default();
        let mut conn = Connection::new(9, dispatcher(router), Handle::current());
        conn.connection_made(sink.transport());
        conn.data_received(b"GET /first HTTP/1.1\r\n\r\nGET /second HTTP/1.1\r\n\r\n");

        wait_for(|| conn.state() == ConnectionState::Closed).await;
        assert!(sink.text().ends_with("\r\n\r\n{\"req\":\"first\"}"));
        assert_eq!(sink.writes(), 1);
        assert_eq!(sink.closes(), 1);
        assert_eq!(*calls.lock().unwrap(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_followup_does_not_preempt_first_response() {
        let sink = Sink::default();
        let mut conn = Connection::new(10, hello_dispatcher(), Handle::current());
        conn.connection_made(sink.transport());
        conn.data_received(b"GET /hello/Ada HTTP/1.1\r\n\r\n");
        conn.data_received(b"\x00garbage\r\n\r\n");
        assert_eq!(conn.state(), ConnectionState::Dispatching);

        wait_for(|| conn.state() == ConnectionState::Closed).await;
        assert!(sink.text().starts_with("HTTP/1.1 200 OK\r\n"));
        assert_eq!(sink.writes(), 1);
    }

    #[tokio::test]
    async fn test_headers_reach_handler() {
        let mut router = Router::new();
        router
            .register("/whoami", "GET", |req: Request, _params: Params| {
                let auth = req.header("authorization").unwrap_or("").to_string();
                async move { Ok::<_, HandlerError>(Response::json(200, json!({"auth": auth}))) }
            })
            .unwrap();

        let sink = Sink::default();
        let mut conn = Connection::new(11, dispatcher(router), Handle::current());
        conn.connection_made(sink.transport());
        conn.data_received(b"GET /whoami HTTP/1.1\r\nAuthorization: Bearer abc\r\n\r\n");

        wait_for(|| conn.state() == ConnectionState::Closed).await;
        assert!(sink.text().ends_with("{\"auth\":\"Bearer abc\"}"));
    }

    #[tokio::test]
    async fn test_data_before_transport_is_dropped() {
        let mut conn = Connection::new(7, hello_dispatcher(), Handle::current());
        conn.data_received(b"GET /hello/Ada HTTP/1.1\r\n\r\n");
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_non_utf8_target_is_400() {
        let sink = Sink::default();
        let mut conn = Connection::new(8, hello_dispatcher(), Handle::current());
        conn.connection_made(sink.transport());
        conn.data_received(b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\n\xff\xfe");

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(sink.text().starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }
}
