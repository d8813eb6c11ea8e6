use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use rclcore::ExecutorConfig;

/// Runtime configuration for the `rclcore-node` binary.
///
/// The node serves `add_two_ints` and calls it from a wall timer, all on one
/// multi-threaded executor. Every value can come from a CLI flag or an
/// environment variable.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rclcore-node",
    version,
    about = "Serves and calls add_two_ints on a multi-threaded executor"
)]
pub struct CliArgs {
    /// Name of the node, used in log output.
    ///
    /// Environment variable: `NODE_NAME`
    #[arg(long, env = "NODE_NAME", default_value_t = String::from("add_two_ints_node"))]
    pub node_name: String,

    /// Service name the server answers on and the client calls.
    ///
    /// Environment variable: `SERVICE_NAME`
    #[arg(long, env = "SERVICE_NAME", default_value_t = String::from("add_two_ints"))]
    pub service_name: String,

    /// Executor worker threads. Defaults to the hardware parallelism.
    ///
    /// Environment variable: `NUM_THREADS`
    #[arg(long, env = "NUM_THREADS")]
    pub num_threads: Option<usize>,

    /// Milliseconds between client requests.
    ///
    /// Environment variable: `REQUEST_PERIOD_MS`
    #[arg(long, env = "REQUEST_PERIOD_MS", default_value_t = 500)]
    pub request_period_ms: u64,

    /// Stop after this many requests have been answered. `0` runs until
    /// interrupted.
    ///
    /// Environment variable: `MAX_REQUESTS`
    #[arg(long, env = "MAX_REQUESTS", default_value_t = 0)]
    pub max_requests: u64,

    /// Bytes the service may hold in live requests, responses and headers.
    /// `0` uses the global allocator without a limit.
    ///
    /// Environment variable: `SERVICE_MEMORY_LIMIT`
    #[arg(long, env = "SERVICE_MEMORY_LIMIT", default_value_t = 0)]
    pub service_memory_limit: usize,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_name: String,
    pub service_name: String,
    pub executor: ExecutorConfig,
    pub request_period: Duration,
    pub max_requests: Option<u64>,
    pub service_memory_limit: Option<usize>,
}

impl TryFrom<CliArgs> for NodeConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_threads == Some(0) {
            bail!("NUM_THREADS must be greater than 0");
        }

        if args.request_period_ms == 0 {
            bail!("REQUEST_PERIOD_MS must be greater than 0");
        }

        if args.service_name.is_empty() {
            bail!("SERVICE_NAME must not be empty");
        }

        Ok(Self {
            node_name: args.node_name,
            service_name: args.service_name,
            executor: ExecutorConfig {
                number_of_threads: args.num_threads,
            },
            request_period: Duration::from_millis(args.request_period_ms),
            max_requests: (args.max_requests > 0).then_some(args.max_requests),
            service_memory_limit: (args.service_memory_limit > 0)
                .then_some(args.service_memory_limit),
        })
    }
}
