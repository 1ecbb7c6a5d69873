// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由表模块
//!
//! 路由表是一个按注册顺序排列的 `(模式, 方法, 处理器)` 序列。
//!
//! ## 匹配策略：先注册者优先（first-match-wins）
//! 解析时按注册顺序逐条尝试，第一条"路径完整匹配且方法相同"的路由胜出。
//! 如果两条路由可能匹配同一请求，调用方需要先注册更具体的那一条。
//!
//! 路径未命中与方法不匹配在这一层不做区分，统一返回 `RouteNotFound`（对外表现为 404）。
//!
//! 路由表只在启动前的注册阶段被修改，服务阶段以 `Arc<Router>` 只读共享，无需加锁。

use std::{fmt, future::Future, pin::Pin, sync::Arc};

use log::debug;

use crate::{
    exception::Exception,
    path::{Params, Pattern},
    request::Request,
    response::Response,
};

/// 处理器可返回的任意错误
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

pub type HandlerResult = Result<Response, HandlerError>;

pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// 请求处理器。接收请求与路径参数，异步地产出一个 `Response`。
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request, params: Params) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, request: Request, params: Params) -> HandlerFuture {
        Box::pin((self)(request, params))
    }
}

/// 路由表中的一条记录
pub struct Route {
    pattern: Pattern,
    method: String,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn template(&self) -> &str {
        self.pattern.template()
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// 一次成功解析的结果：命中的处理器与提取出的路径参数
pub struct RouteMatch {
    pub handler: Arc<dyn Handler>,
    pub params: Params,
}

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// 编译模板并追加一条路由。
    ///
    /// 模板非法时立即失败，这属于配置错误而不是运行期错误。
    pub fn register<F, Fut>(&mut self, template: &str, method: &str, handler: F) -> Result<(), Exception>
    where
        F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register_handler(template, method, Arc::new(handler))
    }

    pub fn register_handler(
        &mut self,
        template: &str,
        method: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<(), Exception> {
        let pattern = Pattern::compile(template)?;
        debug!("注册路由：{} {} => {}", method.to_uppercase(), template, pattern.as_str());
        self.routes.push(Route {
            pattern,
            method: method.to_uppercase(),
            handler,
        });
        Ok(())
    }

    /// 按注册顺序解析路由。
    pub fn resolve(&self, path: &str, method: &str) -> Result<RouteMatch, Exception> {
        for route in &self.routes {
            if route.method != method {
                continue;
            }
            if let Some(params) = route.pattern.captures(path) {
                return Ok(RouteMatch {
                    handler: Arc::clone(&route.handler),
                    params,
                });
            }
        }
        Err(Exception::RouteNotFound)
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
