// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 应用装配：在启动前注册路由、中间件与生命周期钩子，然后冻结成一个只读的 `Dispatcher`。

use std::{future::Future, pin::Pin, sync::Arc};

use log::debug;

use crate::{
    config::Config,
    dispatcher::{Dispatcher, Middleware},
    exception::Exception,
    path::Params,
    request::Request,
    router::{HandlerError, HandlerResult, Router},
    server::Server,
};

pub type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// 生命周期钩子：启动前或停机后被调用一次
pub type Hook = Box<dyn Fn() -> HookFuture + Send + Sync>;

/// 启动与停机钩子，按注册顺序逐个等待完成
#[derive(Default)]
pub struct Lifecycle {
    on_startup: Vec<Hook>,
    on_shutdown: Vec<Hook>,
}

impl Lifecycle {
    pub async fn startup(&self) {
        debug!("执行{}个启动钩子", self.on_startup.len());
        for hook in &self.on_startup {
            hook().await;
        }
    }

    pub async fn shutdown(&self) {
        debug!("执行{}个停机钩子", self.on_shutdown.len());
        for hook in &self.on_shutdown {
            hook().await;
        }
    }
}

fn boxed_hook<F, Fut>(hook: F) -> Hook
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move || -> HookFuture { Box::pin(hook()) })
}

#[derive(Default)]
pub struct App {
    router: Router,
    middlewares: Vec<Middleware>,
    lifecycle: Lifecycle,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F, Fut>(&mut self, method: &str, template: &str, handler: F) -> Result<&mut Self, Exception>
    where
        F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.router.register(template, method, handler)?;
        Ok(self)
    }

    pub fn get<F, Fut>(&mut self, template: &str, handler: F) -> Result<&mut Self, Exception>
    where
        F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route("GET", template, handler)
    }

    pub fn post<F, Fut>(&mut self, template: &str, handler: F) -> Result<&mut Self, Exception>
    where
        F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route("POST", template, handler)
    }

    pub fn put<F, Fut>(&mut self, template: &str, handler: F) -> Result<&mut Self, Exception>
    where
        F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route("PUT", template, handler)
    }

    pub fn delete<F, Fut>(&mut self, template: &str, handler: F) -> Result<&mut Self, Exception>
    where
        F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route("DELETE", template, handler)
    }

    pub fn patch<F, Fut>(&mut self, template: &str, handler: F) -> Result<&mut Self, Exception>
    where
        F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.route("PATCH", template, handler)
    }

    /// 追加一个前置中间件，按注册顺序执行
    pub fn middleware<M>(&mut self, middleware: M) -> &mut Self
    where
        M: Fn(&Request) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// 注册一个启动钩子，在服务器开始接受连接前执行
    pub fn on_startup<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lifecycle.on_startup.push(boxed_hook(hook));
        self
    }

    /// 注册一个停机钩子，在服务器停止接受连接后执行
    pub fn on_shutdown<F, Fut>(&mut self, hook: F) -> &mut Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.lifecycle.on_shutdown.push(boxed_hook(hook));
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// 只取出分发器，生命周期钩子被丢弃
    pub fn into_dispatcher(self) -> Dispatcher {
        self.into_parts().0
    }

    pub fn into_parts(self) -> (Dispatcher, Lifecycle) {
        let dispatcher = Dispatcher::with_middlewares(Arc::new(self.router), self.middlewares);
        (dispatcher, self.lifecycle)
    }

    pub fn into_server(self, config: Config) -> Server {
        let (dispatcher, lifecycle) = self.into_parts();
        Server::new(config, dispatcher).with_lifecycle(lifecycle)
    }
}
