use anyhow::bail;
use clap::{Parser, ValueEnum, builder::BoolishValueParser};
use snowdrift::{BufferStrategy, ClockMode, GeneratorConfig, Layout};

/// Buffer strategy as spelled on the command line and in `BUFFER_STRATEGY`.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    /// One shared pool of two queues, refilled in the background.
    DoubleBuffer,
    /// One private batch per runtime worker thread.
    BatchCache,
}

impl From<StrategyArg> for BufferStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::DoubleBuffer => Self::DoubleBuffer,
            StrategyArg::BatchCache => Self::BatchCache,
        }
    }
}

/// Runtime configuration for the `snowdrift-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first when present). Everything is validated once at
/// startup; an invalid value aborts the process.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "snowdrift-server",
    version,
    about = "An HTTP service for Snowflake-like IDs"
)]
pub struct CliArgs {
    /// Datacenter id stamped into every ID (0..=31).
    ///
    /// Environment variable: `DATACENTER_ID`
    #[arg(long, env = "DATACENTER_ID", default_value_t = 1)]
    pub datacenter_id: u64,

    /// Worker id stamped into every ID (0..=31). Two processes must never
    /// share a `(datacenter, worker)` pair.
    ///
    /// Environment variable: `WORKER_ID`
    #[arg(long, env = "WORKER_ID", default_value_t = 1)]
    pub worker_id: u64,

    /// Issue timestamps from a logical clock that runs ahead of the wall
    /// clock under load instead of sharing each millisecond's sequence space.
    ///
    /// Environment variable: `LOGICAL_CLOCK`
    #[arg(
        long,
        env = "LOGICAL_CLOCK",
        default_value_t = false,
        value_parser = BoolishValueParser::new(),
        action = clap::ArgAction::Set,
    )]
    pub logical_clock: bool,

    /// How pre-built IDs are buffered between batch builds.
    ///
    /// Environment variable: `BUFFER_STRATEGY`
    #[arg(long, env = "BUFFER_STRATEGY", value_enum, default_value_t = StrategyArg::DoubleBuffer)]
    pub buffer_strategy: StrategyArg,

    /// Size of each queue in the double-buffer pool. At most the sequence
    /// space (4096).
    ///
    /// Environment variable: `BUFFER_CAPACITY`
    #[arg(long, env = "BUFFER_CAPACITY", default_value_t = 2000)]
    pub buffer_capacity: usize,

    /// IDs built per refill of a batch cache. At most the sequence space
    /// (4096).
    ///
    /// Environment variable: `CACHE_BATCH_SIZE`
    #[arg(long, env = "CACHE_BATCH_SIZE", default_value_t = 1000)]
    pub cache_batch_size: usize,

    /// Maximum number of IDs a single `POST /ids` may request.
    ///
    /// Environment variable: `MAX_ALLOWED_IDS`
    #[arg(long, env = "MAX_ALLOWED_IDS", default_value_t = 100_000)]
    pub max_allowed_ids: usize,

    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8000"))]
    pub server_addr: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub generator: GeneratorConfig,
    pub max_allowed_ids: usize,
    pub server_addr: String,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let layout = Layout::DEFAULT;
        let max_sequence = layout.sequence_space();

        if args.datacenter_id > layout.max_datacenter_id() {
            bail!(
                "DATACENTER_ID ({}) exceeds the datacenter id space (max = {})",
                args.datacenter_id,
                layout.max_datacenter_id()
            );
        }

        if args.worker_id > layout.max_worker_id() {
            bail!(
                "WORKER_ID ({}) exceeds the worker id space (max = {})",
                args.worker_id,
                layout.max_worker_id()
            );
        }

        if args.buffer_capacity == 0 || args.buffer_capacity > max_sequence {
            bail!(
                "BUFFER_CAPACITY ({}) must be within 1..={}",
                args.buffer_capacity,
                max_sequence
            );
        }

        if args.cache_batch_size == 0 || args.cache_batch_size > max_sequence {
            bail!(
                "CACHE_BATCH_SIZE ({}) must be within 1..={}",
                args.cache_batch_size,
                max_sequence
            );
        }

        if args.max_allowed_ids == 0 {
            bail!("MAX_ALLOWED_IDS must be greater than 0");
        }

        let clock = if args.logical_clock {
            ClockMode::Logical
        } else {
            ClockMode::Wall
        };

        let generator = GeneratorConfig::default()
            .with_layout(layout)
            .with_identity(args.datacenter_id, args.worker_id)
            .with_clock(clock)
            .with_strategy(args.buffer_strategy.into())
            .with_capacity(args.buffer_capacity)
            .with_batch_size(args.cache_batch_size);

        Ok(Self {
            generator,
            max_allowed_ids: args.max_allowed_ids,
            server_addr: args.server_addr,
        })
    }
}
