// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求模块
//!
//! `Request` 是一条完整 HTTP 报文在分发阶段的不可变表示。
//! 它在解析器发出"报文结束"信号时被构造一次，之后只读。
//!
//! 线路层的解析（请求行、头部、报文体边界）由 `parser` 模块负责，
//! 本模块只关心方法、原始请求目标、只读的请求头与报文体。

use serde_json::Value;

use crate::body::Body;

/// 表示一个完整的 HTTP 请求。
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// 大写的 HTTP 请求方法（GET, POST 等）
    method: String,
    /// 原始请求目标（可能包含查询字符串）
    path: String,
    /// 按到达顺序保存的请求头
    headers: Vec<(String, String)>,
    /// 请求体
    body: Body,
}

impl Request {
    pub fn new(method: &str, path: &str, body: Body) -> Self {
        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// 由解析器累积的各部分构造请求。
    ///
    /// 请求体文本在这里才被解释为结构化数据：空文本为 `Empty`，
    /// 合法 JSON 为 `Json`，其它内容原样保留为 `Text`。
    pub fn from_parts(method: &str, path: &str, raw_body: &str) -> Self {
        Self::new(method, path, Body::from_raw(raw_body))
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取请求方法
    pub fn method(&self) -> &str {
        &self.method
    }

    /// 获取原始请求目标（含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 获取参与路由匹配的路径部分（去掉查询字符串）
    pub fn route_path(&self) -> &str {
        match self.path.split_once('?') {
            Some((path, _)) => path,
            None => &self.path,
        }
    }

    /// 获取查询字符串（不含 `?`）
    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, query)| query)
    }

    /// 按名称（不区分大小写）查找第一个匹配的请求头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 获取请求体
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// 请求体为 JSON 时返回其结构化值
    pub fn json(&self) -> Option<&Value> {
        self.body.as_json()
    }
}
