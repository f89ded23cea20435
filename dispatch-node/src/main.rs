//! Thin composition root: load config, build a router with a couple of illustrative
//! pods, construct the reactor, and run it until a shutdown signal arrives. This binary
//! demonstrates the core is load-bearing; it is not a complete node — no consensus, no
//! SQL, no gossip (out of scope for the dispatch core itself).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use dispatch_core::config::DispatchConfig;
use dispatch_core::handler::CommandTableHandler;
use dispatch_core::notification::protocol::NotificationProtocol;
use dispatch_core::notification::subscriber::SubscriberRegistry;
use dispatch_core::worker::FnResourceFactory;
use dispatch_core::{Reactor, RequestPodBuilder, Router};

#[derive(Parser)]
#[command(name = "dispatch-node", version, about = "Request-dispatch core demo node")]
struct Cli {
    /// Path to a TOML config file; defaults/env vars apply regardless of whether it exists.
    #[arg(long, default_value = "dispatch.toml")]
    config: PathBuf,

    /// tracing EnvFilter directive string, e.g. "info" or "dispatch_core=debug,warn".
    #[arg(long, default_value = "info")]
    log_filter: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dispatch_core::logging::init(&cli.log_filter);

    let config = DispatchConfig::load(&cli.config)?;
    let router = Arc::new(build_demo_router(&config));

    // The demo binary wires up the subscribe/unsubscribe protocol so WebSocket clients
    // can register, but has no block source of its own to feed a `BlockProcessorPool` —
    // that belongs to whatever indexes the chain, not to this core.
    let subscribers = Arc::new(SubscriberRegistry::new());
    let notification = Arc::new(NotificationProtocol::new(Arc::clone(&subscribers)));

    let mut reactor = Reactor::new(&config, Arc::clone(&router), notification)?;
    let reactor_shutdown = reactor.shutdown_signal();

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    {
        let shutdown_requested = Arc::clone(&shutdown_requested);
        ctrlc_handler(move || shutdown_requested.store(true, Ordering::SeqCst));
    }

    router.pods().iter().for_each(|pod| {
        pod.start(Arc::new(FnResourceFactory::new(|| ())));
    });

    tracing::info!("dispatch-node running");

    // The canonical shutdown sequence: interrupt all pods, stop all pods (joins every
    // worker so in-flight replies have already been posted back to the reactor), then
    // flip the reactor's own shutdown flag so it stops accepting and drains. `reactor.run()`
    // below blocks the main thread, so this has to happen from a watcher thread instead.
    {
        let router = Arc::clone(&router);
        let shutdown_requested = Arc::clone(&shutdown_requested);
        std::thread::spawn(move || {
            while !shutdown_requested.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            tracing::info!("shutdown requested, interrupting pods");
            router.interrupt_all();
            router.stop_all();
            reactor_shutdown.store(true, Ordering::SeqCst);
        });
    }

    reactor.run()?;

    tracing::info!("dispatch-node stopped");
    Ok(())
}

fn build_demo_router(config: &DispatchConfig) -> Router {
    let mut rpc_table = CommandTableHandler::new();
    rpc_table.register(
        "ping",
        Arc::new(|_params, _resource| Ok(serde_json::json!("pong"))),
    );
    let rpc_handler: Arc<dyn dispatch_core::handler::Handler> = Arc::new(rpc_table);

    let rpc_pod_config = config.pods.get("rpc");
    let rpc_pod = RequestPodBuilder::new("rpc")
        .route("/", false, rpc_handler)
        .max_depth(rpc_pod_config.and_then(|c| c.max_depth).unwrap_or(256))
        .thread_count(rpc_pod_config.map(|c| c.thread_count).unwrap_or(4))
        .build();

    let static_handler: Arc<dyn dispatch_core::handler::Handler> =
        Arc::new(dispatch_core::handler::StaticHandler::new(|_path, _method, _headers, _body, reply, _resource| {
            reply.write_reply(404, b"static assets are not bundled in this demo binary".to_vec());
        }));
    let static_pod_config = config.pods.get("static");
    let static_pod = RequestPodBuilder::new("static")
        .route("/static/", false, static_handler)
        .max_depth(static_pod_config.and_then(|c| c.max_depth).unwrap_or(64))
        .thread_count(static_pod_config.map(|c| c.thread_count).unwrap_or(2))
        .build();

    Router::new(vec![rpc_pod, static_pod])
}

/// No signal-handling crate is in this core's dependency set, so the demo binary treats
/// stdin EOF (Ctrl-D, or the parent process closing our stdin) as its shutdown trigger.
fn ctrlc_handler(on_signal: impl Fn() + Send + 'static) {
    std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = std::io::stdin().read_line(&mut buf);
        on_signal();
    });
}
