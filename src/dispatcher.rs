// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求分发模块
//!
//! 分发器把一个已经组装好的 `Request` 变成一个 `Response`，并且**总能**产出某个响应：
//! 任何失败都不会越过它的边界。
//!
//! ## 两层隔离
//! 1. **路由解析**：未命中时直接返回 404 `{"message": "Not Found"}`。
//! 2. **内层边界**：中间件与处理器在独立的 tokio 任务中执行。
//!    返回的错误与发生的 panic 都会被转换成一段诊断信息。
//! 3. **外层边界（契约检查）**：内层的产出必须是一个可以序列化的 `Response`，
//!    诊断信息本身不是合法响应，同样视为契约违例。
//! 4. 违例时返回 500 `{"message": "Unexpected error"}`，保证连接永远能拿到响应。
//!
//! 分发器不接触网络，写回响应由连接状态机负责。

use std::{any::Any, sync::Arc};

use log::{debug, error, warn};

use crate::{
    exception::Exception,
    path::Params,
    request::Request,
    response::Response,
    router::{Handler, HandlerError, HandlerResult, RouteMatch, Router},
};

/// 前置中间件：在处理器之前按注册顺序执行，返回错误即视为处理器失败
pub type Middleware = Arc<dyn Fn(&Request) -> Result<(), HandlerError> + Send + Sync>;

/// 内层边界的产出
#[derive(Debug)]
enum Outcome {
    Response(Response),
    /// 处理器失败后得到的诊断信息
    Failed(Exception),
}

pub struct Dispatcher {
    router: Arc<Router>,
    middlewares: Arc<Vec<Middleware>>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>) -> Self {
        Self::with_middlewares(router, Vec::new())
    }

    pub fn with_middlewares(router: Arc<Router>, middlewares: Vec<Middleware>) -> Self {
        Self {
            router,
            middlewares: Arc::new(middlewares),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// 解析路由并调用处理器，永不失败。
    pub async fn dispatch(&self, request: Request) -> Response {
        let matched = match self.router.resolve(request.route_path(), request.method()) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("{} {}：{}", request.method(), request.path(), e);
                return Response::not_found();
            }
        };
        debug!("{} {} 命中路由，参数：{:?}", request.method(), request.path(), matched.params);

        let method = request.method().to_string();
        let path = request.path().to_string();
        let outcome = self.invoke(matched, request).await;

        match check_contract(outcome) {
            Ok(response) => response,
            Err(e) => {
                error!("{} {} 处理失败，返回500：{}", method, path, e);
                Response::internal_error()
            }
        }
    }

    /// 内层边界：在独立任务中执行中间件与处理器
    async fn invoke(&self, matched: RouteMatch, request: Request) -> Outcome {
        let middlewares = Arc::clone(&self.middlewares);
        let RouteMatch { handler, params } = matched;

        let task = tokio::spawn(async move {
            match run_handler(&middlewares, handler, request, params).await {
                Ok(response) => Outcome::Response(response),
                Err(e) => Outcome::Failed(Exception::HandlerFailed(e.to_string())),
            }
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                Outcome::Failed(Exception::HandlerFailed(panic_message(e.into_panic())))
            }
            Err(e) => Outcome::Failed(Exception::HandlerFailed(e.to_string())),
        }
    }
}

async fn run_handler(
    middlewares: &[Middleware],
    handler: Arc<dyn Handler>,
    request: Request,
    params: Params,
) -> HandlerResult {
    for middleware in middlewares {
        middleware(&request)?;
    }
    handler.call(request, params).await
}

/// 外层边界：只有可序列化的 `Response` 才能通过
fn check_contract(outcome: Outcome) -> Result<Response, Exception> {
    match outcome {
        Outcome::Response(response) => {
            response
                .validate()
                .map_err(|e| Exception::ContractViolation(e.to_string()))?;
            Ok(response)
        }
        Outcome::Failed(diagnostic) => Err(Exception::ContractViolation(format!(
            "expected a Response but got a failure ({})",
            diagnostic
        ))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked with a non-string payload".to_string()
    }
}
