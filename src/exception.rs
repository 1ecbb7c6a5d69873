// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务器在路由注册、请求分发与连接处理过程中可能出现的各类异常情况。
//!
//! ## 分类
//! - **配置期错误**：路由模板非法、参数名重复。它们在注册阶段立即失败，不会进入服务阶段。
//! - **请求期错误**：路由未命中、处理器失败、契约违例。这些错误都会在分发器内部被消化为 404/500 响应。
//! - **连接期错误**：报文无法解析、传输层已关闭。前者返回 400，后者只记录日志。

use std::fmt;

/// 服务器运行过程中发生的异常类型。
///
/// 该枚举通常作为 `Result` 的 `Err` 部分返回。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exception {
    /// 同一个路由模板中出现了两个同名的 `{name}` 占位符。
    DuplicateParameterName(String),
    /// 路由模板格式非法，例如空占位符 `{}` 或不成对的花括号。
    MalformedTemplate(String),
    /// 没有任何路由同时匹配请求路径与请求方法。对应 `404 Not Found`。
    RouteNotFound,
    /// 状态码没有标准原因短语，无法构造状态行。
    UnknownStatusCode(u16),
    /// 处理器（或中间件）执行失败。
    HandlerFailed(String),
    /// 处理器的产出不是一个合法的 `Response`。
    ContractViolation(String),
    /// 响应体无法被序列化。
    BodyEncoding(String),
    /// 请求报文格式错误。对应 `400 Bad Request`。
    MalformedRequest(String),
    /// 请求目标无法按 UTF-8 解码。
    RequestIsNotUtf8,
    /// 请求头与请求体的总长度超过了配置上限。
    RequestTooLarge(usize),
    /// 客户端使用了分块传输编码，当前不支持流式请求体。
    UnsupportedTransferEncoding,
    /// 写入时传输层已经关闭（客户端提前断开）。
    TransportClosed,
    /// 配置文件无法读取。
    ConfigUnreadable(String),
    /// 底层 I/O 错误。
    Io(String),
}

use Exception::*;

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateParameterName(name) => {
                write!(f, "Duplicate parameter name `{}` in route template", name)
            }
            MalformedTemplate(template) => write!(f, "Malformed route template: {}", template),
            RouteNotFound => write!(f, "Route not found (404)"),
            UnknownStatusCode(code) => write!(f, "Unknown status code: {}", code),
            HandlerFailed(reason) => write!(f, "Handler failed: {}", reason),
            ContractViolation(reason) => write!(f, "Handler contract violated: {}", reason),
            BodyEncoding(reason) => write!(f, "Response body can't be encoded: {}", reason),
            MalformedRequest(reason) => write!(f, "Malformed request (400): {}", reason),
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            RequestTooLarge(limit) => write!(f, "Request exceeds {} bytes", limit),
            UnsupportedTransferEncoding => write!(f, "Chunked request bodies are not supported"),
            TransportClosed => write!(f, "Transport already closed"),
            ConfigUnreadable(reason) => write!(f, "Couldn't read config file: {}", reason),
            Io(reason) => write!(f, "I/O error: {}", reason),
        }
    }
}

impl std::error::Error for Exception {}

impl From<std::io::Error> for Exception {
    fn from(e: std::io::Error) -> Self {
        Io(e.to_string())
    }
}
