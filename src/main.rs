// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # JSON 路由服务器
//!
//! 启动一个基于 Tokio 多线程运行时的小型 HTTP 服务器：
//! - 按注册顺序匹配的路径模板路由
//! - 处理器失败时的两层隔离，客户端总能收到响应
//! - 每个连接一请求一响应，写完即关闭
//! - 后台管理控制台（CLI 指令交互）

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use log::{error, info, warn};
use log4rs;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    runtime::Builder,
    sync::Notify,
};

use routecore::{param::SERVER_NAME, App, Body, Config, Exception, HandlerError, HandlerResult, Params, Request, Response, Server};
use routecore::server::shutdown_signal;

/// # 程序入口点
///
/// 初始化日志、加载配置、注册路由并启动主事件循环。
fn main() {
    // 1. 初始化日志系统：通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 环境配置加载
    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => {
            info!("配置文件已载入");
            config
        }
        Err(e) => {
            warn!("{}，使用默认配置", e);
            Config::new()
        }
    };

    // 3. 路由注册：启动前完成，服务阶段只读
    let app = match build_app() {
        Ok(app) => app,
        Err(e) => {
            error!("路由注册失败：{}", e);
            std::process::exit(1);
        }
    };
    for route in app.router().routes() {
        info!("路由：{} {}", route.method(), route.template());
    }

    // 4. 异步运行时定制：根据配置文件分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            std::process::exit(1);
        }
    };

    info!("{} 启动，工作线程数：{}", SERVER_NAME, config.worker_threads());
    let server = app.into_server(config);
    let result = runtime.block_on(run(server));
    // 控制台任务可能仍阻塞在标准输入上
    runtime.shutdown_background();
    if let Err(e) = result {
        error!("服务器异常退出：{}", e);
        std::process::exit(1);
    }
}

async fn run(server: Server) -> Result<(), Exception> {
    let listener = server.bind().await?;

    // 启动交互式管理控制台任务
    let shutdown = Arc::new(Notify::new());
    tokio::spawn(console(
        Arc::clone(&shutdown),
        server.active_counter(),
        route_listing(&server),
    ));

    server
        .serve(listener, async move {
            tokio::select! {
                _ = shutdown_signal() => {}
                _ = shutdown.notified() => {}
            }
        })
        .await
}

fn route_listing(server: &Server) -> Vec<String> {
    server
        .dispatcher()
        .router()
        .routes()
        .map(|route| format!("{} {}", route.method(), route.template()))
        .collect()
}

async fn console(shutdown: Arc<Notify>, active_connection: Arc<AtomicU32>, routes: Vec<String>) {
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let cmd = input.trim();
        match cmd {
            "stop" => {
                shutdown.notify_one();
                println!("停机指令已激活，服务器将停止接受新连接...");
                break;
            }
            "help" => {
                println!("== Routecore Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("routes - 列出已注册的路由");
                println!("help   - 显示此帮助信息");
                println!("====================");
            }
            "status" => {
                println!("== Routecore 状态 ==");
                println!("当前活跃连接数: {}", active_connection.load(Ordering::SeqCst));
                println!("====================");
            }
            "routes" => {
                println!("== 已注册路由 ==");
                for route in &routes {
                    println!("{}", route);
                }
                println!("====================");
            }
            _ => {
                println!("无效的命令：{}", cmd);
            }
        }
    }
}

fn build_app() -> Result<App, Exception> {
    let mut app = App::new();
    app.get("/hello_world", hello_world)?
        .post("/hello_world", hello_back)?
        .get("/hello_world/{name}", hello_name)?;
    app.middleware(|request: &Request| -> Result<(), HandlerError> {
        info!("{} {}", request.method(), request.path());
        Ok(())
    })
    .on_startup(|| async { info!("路由表已冻结，开始接受连接") })
    .on_shutdown(|| async { info!("停机流程执行完毕") });
    Ok(app)
}

async fn hello_world(_request: Request, _params: Params) -> HandlerResult {
    Ok(Response::json(200, json!({ "hello": "world" })))
}

/// 把请求体中的对象原样返回，并附加 `"hello": "back"`
async fn hello_back(request: Request, _params: Params) -> HandlerResult {
    match request.body() {
        Body::Json(Value::Object(fields)) => {
            let mut fields = fields.clone();
            fields.insert("hello".to_string(), json!("back"));
            Ok(Response::json(200, Value::Object(fields)))
        }
        _ => Ok(Response::json(400, json!({ "message": "Missing body" }))),
    }
}

async fn hello_name(_request: Request, params: Params) -> HandlerResult {
    let name = params.get("name").cloned().unwrap_or_default();
    Ok(Response::json(200, json!({ "msg": format!("Hello {}", name) })))
}
