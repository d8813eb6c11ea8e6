#![doc = include_str!("../README.md")]

mod config;
mod interfaces;
mod telemetry;

use clap::Parser;
use config::{CliArgs, NodeConfig};
use interfaces::{AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse};
use portable_atomic::{AtomicU64, Ordering};
use rclcore::{
    Allocator, AnyServiceCallback, BoundedResource, Client, Context, LoopbackTransport,
    LoopbackWaitSet, MultiThreadedExecutor, Node, RequestId, ServiceAllocators, Shared,
};
use std::sync::Arc;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = NodeConfig::try_from(args)?;

    telemetry::init_tracing()?;

    let context = Arc::new(Context::new());
    let transport = Arc::new(LoopbackTransport::new());
    let wait_set = Arc::new(LoopbackWaitSet::new(transport.clone(), &context));
    let node = Node::new(&config.node_name, transport.clone(), wait_set.clone());

    let allocators = config.service_memory_limit.map(|limit| {
        ServiceAllocators::from_allocator(&Allocator::<()>::from_resource(BoundedResource::new(
            limit,
        )))
    });
    let _service = node.create_service::<AddTwoInts>(
        &config.service_name,
        AnyServiceCallback::with_header(add_two_ints),
        allocators,
    )?;
    let client = node.create_client::<AddTwoInts>(&config.service_name, None)?;

    let answered = Arc::new(AtomicU64::new(0));
    let _timer = node.create_wall_timer(
        config.request_period,
        request_loop(client, Arc::clone(&context), Arc::clone(&answered), config.max_requests),
    )?;

    let executor = MultiThreadedExecutor::with_config(
        Arc::clone(&context),
        wait_set,
        config.executor,
    )?;
    log_startup_info(&config, executor.number_of_threads());

    let mut spinner = tokio::task::spawn_blocking(move || {
        executor.spin().map(|()| executor.failure_count())
    });

    tokio::select! {
        joined = &mut spinner => {
            // The request limit was reached.
            let _failures = joined??;
            #[cfg(feature = "tracing")]
            tracing::info!("Executor stopped with {} failed dispatches", _failures);
        },
        signalled = shutdown_signal() => {
            signalled?;
            #[cfg(feature = "tracing")]
            tracing::info!("Shutdown signal received, terminating gracefully...");
            context.shutdown();
            let _failures = spinner.await??;
            #[cfg(feature = "tracing")]
            tracing::info!("Executor stopped with {} failed dispatches", _failures);
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Answered {} requests ({} responses sent)",
        answered.load(Ordering::Acquire),
        transport.responses_sent()
    );
    Ok(())
}

fn add_two_ints(
    _header: Shared<RequestId>,
    request: Shared<AddTwoIntsRequest>,
    response: &mut AddTwoIntsResponse,
) {
    response.sum = request.a.wrapping_add(request.b);

    #[cfg(feature = "tracing")]
    tracing::info!(
        "Incoming request #{} from {}: a={} b={}",
        _header.sequence_number,
        _header.writer_guid,
        request.a,
        request.b
    );
}

/// The timer callback: sends one request per tick and shuts the context
/// down once `max_requests` responses have arrived.
fn request_loop(
    client: Arc<Client<AddTwoInts>>,
    context: Arc<Context>,
    answered: Arc<AtomicU64>,
    max_requests: Option<u64>,
) -> impl Fn() + Send + Sync + 'static {
    let issued = AtomicU64::new(0);
    move || {
        let n = issued.fetch_add(1, Ordering::Relaxed);
        if max_requests.is_some_and(|max| n >= max) {
            return;
        }

        let request = AddTwoIntsRequest {
            a: n as i64,
            b: 2 * n as i64,
        };
        let answered = Arc::clone(&answered);
        let context = Arc::clone(&context);
        let sent = client.async_send_request_with_callback(&request, move |_response| {
            let done = answered.fetch_add(1, Ordering::AcqRel) + 1;

            #[cfg(feature = "tracing")]
            tracing::info!("Result of add_two_ints: {}", _response.sum);

            if max_requests.is_some_and(|max| done >= max) {
                context.shutdown();
            }
        });
        if let Err(_e) = sent {
            #[cfg(feature = "tracing")]
            tracing::warn!("Failed to send request #{}: {}", n, _e);
        }
    }
}

fn log_startup_info(_config: &NodeConfig, _threads: usize) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting node `{}` on {} threads with full config: {:#?}",
            _config.node_name,
            _threads,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting node `{}` on {} threads, calling `{}` every {:?}",
            _config.node_name,
            _threads,
            _config.service_name,
            _config.request_period
        );
    }
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())?
            .recv()
            .await;
        Ok::<_, std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        received = signal::ctrl_c() => {
            received?;
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        received = terminate => {
            received?;
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }
    Ok(())
}
