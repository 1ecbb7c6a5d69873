// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 报文体模块
//!
//! 请求与响应共用的报文体表示：空、原始文本或结构化的 JSON 值。

use serde_json::Value;

use crate::exception::Exception;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    /// 没有报文体
    #[default]
    Empty,
    /// 原样保存的文本
    Text(String),
    /// 结构化数据，序列化时输出为 JSON 对象表示法
    Json(Value),
}

impl Body {
    /// 将请求中累积的原始文本解释为报文体。
    ///
    /// 空文本视为没有报文体；能解析为 JSON 的文本保存为 `Json`，否则原样保存为 `Text`。
    pub fn from_raw(raw: &str) -> Self {
        if raw.is_empty() {
            return Body::Empty;
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Body::Json(value),
            Err(_) => Body::Text(raw.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Text(text) => text.is_empty(),
            Body::Json(_) => false,
        }
    }

    /// 渲染为最终写入网络的字节
    pub fn to_bytes(&self) -> Result<Vec<u8>, Exception> {
        match self {
            Body::Empty => Ok(Vec::new()),
            Body::Text(text) => Ok(text.as_bytes().to_vec()),
            Body::Json(value) => {
                serde_json::to_vec(value).map_err(|e| Exception::BodyEncoding(e.to_string()))
            }
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::Empty
    }
}
