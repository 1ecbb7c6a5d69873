// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 增量请求解析模块
//!
//! 基于 `httparse` 的增量解析器。它只负责报文边界：请求行、头部与 `Content-Length` 定长报文体，
//! 并通过 `ParserListener` 回调把结果交给连接状态机：
//!
//! ```text
//! feed(chunk) → on_url(url) → on_header(name, value)* → on_body(fragment)* → on_message_complete(method)
//! ```
//!
//! 每条逻辑报文恰好触发一次 `on_message_complete`。
//! 分块传输编码（`Transfer-Encoding: chunked`）属于流式请求体，直接拒绝。

use bytes::{Buf, BytesMut};
use log::debug;

use crate::exception::Exception;

/// 允许的最大头部数量，httparse 需要预先分配该大小的数组
pub const MAX_HEADERS_NUM: usize = 64;

const CHUNKED: &[u8] = b"chunked";

/// 默认的单个请求（头部 + 报文体）最大字节数
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// 解析器回调接口，由连接状态机实现
pub trait ParserListener {
    /// 观察到请求目标
    fn on_url(&mut self, url: &[u8]);
    /// 观察到一个请求头
    fn on_header(&mut self, name: &str, value: &[u8]);
    /// 观察到一段报文体
    fn on_body(&mut self, fragment: &[u8]);
    /// 一条报文结束，附带该报文的请求方法
    fn on_message_complete(&mut self, method: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// 等待完整的请求头
    Head,
    /// 还剩 `remaining` 字节报文体未收到
    Body { remaining: usize },
}

/// 解析完成的请求头中我们关心的部分
struct Head {
    len: usize,
    method: String,
    target: Vec<u8>,
    headers: Vec<(String, Vec<u8>)>,
    content_length: usize,
}

#[derive(Debug)]
pub struct HttpParser {
    buffer: BytesMut,
    state: State,
    method: Option<String>,
    max_request_size: usize,
}

impl HttpParser {
    pub fn new(max_request_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            state: State::Head,
            method: None,
            max_request_size,
        }
    }

    /// 最近一次解析到的请求方法
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// 喂入一段字节，按需触发回调。
    ///
    /// 报文格式错误、请求过大或使用分块编码时返回错误，此后解析器不应再被使用。
    pub fn feed<L: ParserListener>(&mut self, chunk: &[u8], listener: &mut L) -> Result<(), Exception> {
        self.buffer.extend_from_slice(chunk);

        loop {
            match self.state {
                State::Head => {
                    let head = match self.parse_head()? {
                        Some(head) => head,
                        None => {
                            if self.buffer.len() > self.max_request_size {
                                return Err(Exception::RequestTooLarge(self.max_request_size));
                            }
                            return Ok(());
                        }
                    };
                    match head.len.checked_add(head.content_length) {
                        Some(total) if total <= self.max_request_size => {}
                        _ => return Err(Exception::RequestTooLarge(self.max_request_size)),
                    }

                    self.buffer.advance(head.len);
                    debug!(
                        "请求头解析完成：{} {}，报文体 {} 字节",
                        head.method,
                        String::from_utf8_lossy(&head.target),
                        head.content_length
                    );
                    listener.on_url(&head.target);
                    for (name, value) in &head.headers {
                        listener.on_header(name, value);
                    }
                    self.method = Some(head.method);

                    if head.content_length == 0 {
                        self.complete(listener);
                    } else {
                        self.state = State::Body {
                            remaining: head.content_length,
                        };
                    }
                }
                State::Body { remaining } => {
                    if self.buffer.is_empty() {
                        return Ok(());
                    }
                    let n = remaining.min(self.buffer.len());
                    let fragment = self.buffer.split_to(n);
                    listener.on_body(&fragment);

                    if remaining == n {
                        self.complete(listener);
                    } else {
                        self.state = State::Body {
                            remaining: remaining - n,
                        };
                        return Ok(());
                    }
                }
            }
        }
    }

    fn complete<L: ParserListener>(&mut self, listener: &mut L) {
        self.state = State::Head;
        listener.on_message_complete(self.method.as_deref().unwrap_or_default());
    }

    fn parse_head(&self) -> Result<Option<Head>, Exception> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_NUM];
        let mut request = httparse::Request::new(&mut headers);

        let len = match request.parse(&self.buffer) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(e) => return Err(Exception::MalformedRequest(e.to_string())),
        };

        let method = request
            .method
            .ok_or_else(|| Exception::MalformedRequest("missing method".to_string()))?;
        let target = request
            .path
            .ok_or_else(|| Exception::MalformedRequest("missing request target".to_string()))?;

        let mut content_length = 0;
        let mut parsed = Vec::with_capacity(request.headers.len());
        for header in request.headers.iter() {
            parsed.push((header.name.to_string(), header.value.to_vec()));
            if header.name.eq_ignore_ascii_case("content-length") {
                content_length = std::str::from_utf8(header.value)
                    .ok()
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .ok_or_else(|| {
                        Exception::MalformedRequest("invalid Content-Length".to_string())
                    })?;
            } else if header.name.eq_ignore_ascii_case("transfer-encoding")
                && header
                    .value
                    .windows(CHUNKED.len())
                    .any(|w| w.eq_ignore_ascii_case(CHUNKED))
            {
                return Err(Exception::UnsupportedTransferEncoding);
            }
        }

        Ok(Some(Head {
            len,
            method: method.to_string(),
            target: target.as_bytes().to_vec(),
            headers: parsed,
            content_length,
        }))
    }
}

impl Default for HttpParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUEST_SIZE)
    }
}
