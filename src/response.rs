// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应模块
//!
//! `Response` 由处理器（或分发器在失败/未命中时）构造，并被序列化器恰好消费一次。
//!
//! 序列化后的报文依次包含：
//! 1. 状态行：固定版本 `HTTP/1.1`、状态码与标准原因短语；
//! 2. `Content-Type: application/json`；
//! 3. `Content-Length`：按最终写出的字节数计算；
//! 4. `Connection: close`；
//! 5. 空行与可选的报文体。

use serde_json::{json, Value};

use crate::{body::Body, exception::Exception, param::*};

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status_code: u16,
    body: Body,
}

impl Response {
    pub fn new(status_code: u16, body: impl Into<Body>) -> Self {
        Self {
            status_code,
            body: body.into(),
        }
    }

    pub fn json(status_code: u16, value: Value) -> Self {
        Self::new(status_code, Body::Json(value))
    }

    pub fn text(status_code: u16, text: &str) -> Self {
        Self::new(status_code, Body::Text(text.to_string()))
    }

    pub fn empty(status_code: u16) -> Self {
        Self::new(status_code, Body::Empty)
    }

    /// 路由未命中时的固定响应
    pub fn not_found() -> Self {
        Self::json(404, json!({ "message": "Not Found" }))
    }

    /// 处理器失败或违反契约时的固定响应
    pub fn internal_error() -> Self {
        Self::json(500, json!({ "message": "Unexpected error" }))
    }

    /// 请求报文无法解析时的固定响应
    pub fn bad_request() -> Self {
        Self::json(400, json!({ "message": "Bad Request" }))
    }

    /// 检查响应能否被序列化：状态码必须有标准原因短语
    pub fn validate(&self) -> Result<(), Exception> {
        reason_phrase(self.status_code)
            .map(|_| ())
            .ok_or(Exception::UnknownStatusCode(self.status_code))
    }

    pub fn as_bytes(&self) -> Result<Vec<u8>, Exception> {
        let information =
            reason_phrase(self.status_code).ok_or(Exception::UnknownStatusCode(self.status_code))?;
        let content = self.body.to_bytes()?;

        let header = [
            "HTTP/",
            HTTP_VERSION,
            " ",
            &self.status_code.to_string(),
            " ",
            information,
            CRLF,
            "Content-Type: ",
            CONTENT_TYPE,
            CRLF,
            "Content-Length: ",
            &content.len().to_string(),
            CRLF,
            "Connection: close",
            CRLF,
            CRLF,
        ]
        .concat();

        Ok([header.as_bytes(), &content].concat())
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// 状态码对应的原因短语，未知状态码返回空串
    pub fn information(&self) -> &str {
        reason_phrase(self.status_code).unwrap_or("")
    }

    pub fn body(&self) -> &Body {
        &self.body
    }
}
