// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路径模板编译模块
//!
//! 将形如 `/users/{id}/posts/{post}` 的路由模板编译为带命名捕获组的正则表达式。
//!
//! ## 编译规则
//! 1. 先记录模板是否以 `/` 开头、是否以 `/` 结尾，再去掉两端的斜杠。
//! 2. 按 `/` 切分，丢弃重复斜杠产生的空段。
//! 3. `{name}` 段替换为 `(?P<name>[^/]+?)`，其它段按字面量转义。
//! 4. 用 `/` 重新拼接，恢复首尾斜杠，并以 `^...$` 锚定整串匹配。
//!
//! 因此 `/a/{x}` 与 `/a/{x}/` 是两个不同的模式，且参数值永远不会跨越 `/`。

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::exception::Exception;

/// 路径参数：参数名到参数值的映射
pub type Params = HashMap<String, String>;

/// 单个参数段匹配的表达式：至少一个非斜杠字符，非贪婪
const PARAM_EXPR: &str = "[^/]+?";

/// 模板中的一个路径段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// 需要逐字匹配的字面量
    Literal(String),
    /// `{name}` 占位符
    Param(String),
}

/// 编译后的路由模式。创建后不可变。
#[derive(Debug, Clone)]
pub struct Pattern {
    template: String,
    segments: Vec<Segment>,
    leading_slash: bool,
    trailing_slash: bool,
    regex: Regex,
}

impl Pattern {
    /// 编译路由模板。
    ///
    /// # 错误处理
    /// - 同名占位符出现两次时返回 `DuplicateParameterName`。
    /// - 空占位符、非法参数名或字面量中混入花括号时返回 `MalformedTemplate`。
    pub fn compile(template: &str) -> Result<Self, Exception> {
        let leading_slash = template.starts_with('/');
        let trailing_slash = template.ends_with('/');

        let mut segments = Vec::new();
        let mut seen = HashSet::new();
        for part in template.trim_matches('/').split('/').filter(|p| !p.is_empty()) {
            let segment = parse_segment(part, template)?;
            if let Segment::Param(name) = &segment {
                if !seen.insert(name.clone()) {
                    return Err(Exception::DuplicateParameterName(name.clone()));
                }
            }
            segments.push(segment);
        }

        let source = regex_source(&segments, leading_slash, trailing_slash);
        let regex = Regex::new(&source)
            .map_err(|e| Exception::MalformedTemplate(format!("{}: {}", template, e)))?;

        Ok(Self {
            template: template.to_string(),
            segments,
            leading_slash,
            trailing_slash,
            regex,
        })
    }

    /// 对整个路径做完整匹配，成功时返回所有命名捕获。
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let params = self
            .param_names()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Some(params)
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// 按模板中出现的顺序返回参数名
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }
}

impl Pattern {
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn leading_slash(&self) -> bool {
        self.leading_slash
    }

    pub fn trailing_slash(&self) -> bool {
        self.trailing_slash
    }

    /// 编译得到的正则表达式源码
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str()
    }
}

fn parse_segment(part: &str, template: &str) -> Result<Segment, Exception> {
    if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
        if !is_identifier(inner) {
            return Err(Exception::MalformedTemplate(template.to_string()));
        }
        return Ok(Segment::Param(inner.to_string()));
    }
    if part.contains('{') || part.contains('}') {
        return Err(Exception::MalformedTemplate(template.to_string()));
    }
    Ok(Segment::Literal(part.to_string()))
}

// 参数名会成为正则的捕获组名，这里限制为普通标识符
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn regex_source(segments: &[Segment], leading_slash: bool, trailing_slash: bool) -> String {
    let joined = segments
        .iter()
        .map(|s| match s {
            Segment::Literal(lit) => regex::escape(lit),
            Segment::Param(name) => format!("(?P<{}>{})", name, PARAM_EXPR),
        })
        .collect::<Vec<_>>()
        .join("/");

    let mut path = if leading_slash {
        format!("/{}", joined)
    } else {
        joined
    };
    if trailing_slash && !path.ends_with('/') {
        path.push('/');
    }
    format!("^{}$", path)
}
