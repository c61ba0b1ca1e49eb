use std::path;
use std::time::Duration;

use dirs::home_dir;
use log::Level;
use structopt::StructOpt;

use bitcoin::Network;
use bitcoincore_rpc::Auth as RpcAuth;

use crate::error::{OptionExt, Result};

/// CLI/env-driven configuration, parsed once at startup in `main` and handed
/// by reference to each subsystem (RPC client, block-hash feed, publisher,
/// estimator). See SPEC_FULL.md §6 for the recognized option table.
#[derive(StructOpt, Debug)]
pub struct Config {
    #[structopt(
        short = "n",
        long,
        help = "One of 'bitcoin', 'testnet' or 'regtest'",
        default_value = "bitcoin",
        env,
        hide_env_values(true),
        display_order(1)
    )]
    pub network: Network,

    #[structopt(
        short = "v",
        long,
        help = "Increase verbosity level (up to 4 times)",
        parse(from_occurrences),
        display_order(98)
    )]
    pub verbose: usize,

    #[structopt(
        short = "t",
        long,
        help = "Show timestamps in log messages",
        display_order(99)
    )]
    pub timestamp: bool,

    #[structopt(
        short = "d",
        long = "rpc-dir",
        help = "Path to bitcoind directory (used for the cookie file) [default: ~/.bitcoin]",
        env,
        hide_env_values(true),
        display_order(10)
    )]
    pub rpc_dir: Option<path::PathBuf>,

    #[structopt(
        short = "u",
        long = "rpc-url",
        help = "URL for the bitcoind RPC server [default: http://localhost:<network-rpc-port>]",
        env,
        hide_env_values(true),
        display_order(11)
    )]
    pub rpc_url: Option<String>,

    #[structopt(
        short = "c",
        long = "rpc-cred",
        help = "Credentials for the bitcoind RPC server (as <username>:<password>, instead of reading the cookie file)",
        env,
        hide_env_values(true),
        display_order(12)
    )]
    pub rpc_cred: Option<String>,

    #[structopt(
        short = "C",
        long = "rpc-cookie",
        help = "Cookie file for the bitcoind RPC server [default: <rpc-dir>/.cookie]",
        env,
        hide_env_values(true),
        display_order(13)
    )]
    pub rpc_cookie: Option<path::PathBuf>,

    #[structopt(
        short = "z",
        long = "zmq-url",
        help = "ZMQ endpoint publishing 'hashblock' notifications",
        default_value = "tcp://127.0.0.1:28332",
        env,
        hide_env_values(true),
        display_order(20)
    )]
    pub zmq_url: String,

    #[structopt(
        long = "wamp-url",
        help = "Base URL of the pub/sub endpoint recommendations are published to (disabled if unset)",
        env,
        hide_env_values(true),
        display_order(30)
    )]
    pub wamp_url: Option<String>,

    #[structopt(
        long = "wamp-realm",
        help = "Pub/sub namespace the fee-estimation topics are published under",
        default_value = "com.fee",
        env,
        hide_env_values(true),
        display_order(31)
    )]
    pub wamp_realm: String,

    #[structopt(
        long = "block-size",
        help = "Nominal block size/weight used to derive the effective block capacity",
        default_value = "4000000",
        env,
        hide_env_values(true),
        display_order(40)
    )]
    pub block_size: u64,

    #[structopt(
        long = "miners-reserved-block-ratio",
        help = "Fraction of the block reserved by miners and not fee-accessible, in [0, 1)",
        default_value = "0.0",
        env,
        hide_env_values(true),
        display_order(41)
    )]
    pub miners_reserved_block_ratio: f64,

    #[structopt(
        long = "time-res",
        help = "Mempool polling period, in milliseconds",
        default_value = "1000",
        parse(try_from_str = parse_millis),
        env, hide_env_values(true),
        display_order(42)
    )]
    pub time_res: Duration,

    #[structopt(
        long = "int-time-added",
        help = "Width of the added-transactions velocity window, in milliseconds",
        default_value = "600000",
        parse(try_from_str = parse_millis),
        env, hide_env_values(true),
        display_order(43)
    )]
    pub int_time_added: Duration,

    #[structopt(
        long = "int-blocks-removed",
        help = "Number of trailing block events coalesced into the removed-transactions velocity window",
        default_value = "6",
        env,
        hide_env_values(true),
        display_order(44)
    )]
    pub int_blocks_removed: usize,

    #[structopt(
        long = "min-savings-rate",
        help = "Minimum relative fee-rate improvement required for a longer target to count as a valid recommendation",
        default_value = "0.1",
        env,
        hide_env_values(true),
        display_order(45)
    )]
    pub min_savings_rate: f64,
}

impl Config {
    pub fn dotenv() {
        home_dir().map(|home| dotenv::from_path(home.join("feevelocity.env")).ok());
    }

    pub fn rpc_url(&self) -> String {
        self.rpc_url.as_ref().map_or_else(
            || {
                format!(
                    "http://localhost:{}",
                    match self.network {
                        Network::Bitcoin => 8332,
                        Network::Testnet => 18332,
                        Network::Regtest => 18443,
                    }
                )
            },
            |url| url.trim_end_matches('/').into(),
        )
    }

    pub fn rpc_auth(&self) -> Result<RpcAuth> {
        self.rpc_cred
            .as_ref()
            .and_then(|cred| {
                let mut parts = cred.splitn(2, ':');
                Some(RpcAuth::UserPass(parts.next()?.into(), parts.next()?.into()))
            })
            .or_else(|| {
                let cookie = self.rpc_cookie.clone().or_else(|| get_cookie(self))?;
                Some(RpcAuth::CookieFile(cookie))
            })
            .or_err("no available authentication for the bitcoind rpc, please specify credentials or a cookie file")
    }

    /// Snapshot of the `constants.*` tuning knobs, handed to the `Estimator`.
    pub fn constants(&self) -> Constants {
        Constants {
            block_size: self.block_size,
            miners_reserved_block_ratio: self.miners_reserved_block_ratio,
            time_res: self.time_res,
            int_time_added: self.int_time_added,
            int_blocks_removed: self.int_blocks_removed,
            min_savings_rate: self.min_savings_rate,
        }
    }

    pub fn setup_logger(&self) {
        if self.timestamp {
            pretty_env_logger::formatted_timed_builder()
        } else {
            pretty_env_logger::formatted_builder()
        }
        .filter_module(
            "feevelocity",
            match self.verbose {
                0 => Level::Info,
                1 => Level::Debug,
                _ => Level::Trace,
            }
            .to_level_filter(),
        )
        .filter_module(
            "bitcoincore_rpc",
            match self.verbose {
                0 | 1 => Level::Warn,
                2 => Level::Debug,
                _ => Level::Trace,
            }
            .to_level_filter(),
        )
        .filter_level(
            match self.verbose {
                0 | 1 => Level::Warn,
                2 | 3 => Level::Info,
                4 => Level::Debug,
                _ => Level::Trace,
            }
            .to_level_filter(),
        )
        .init();
    }
}

/// The `constants.*` tuning knobs, detached from the CLI/env plumbing so the
/// estimator doesn't need to depend on `structopt`.
#[derive(Clone, Debug)]
pub struct Constants {
    pub block_size: u64,
    pub miners_reserved_block_ratio: f64,
    pub time_res: Duration,
    pub int_time_added: Duration,
    pub int_blocks_removed: usize,
    pub min_savings_rate: f64,
}

impl Constants {
    /// `blockSize * (1 - minersReservedBlockRatio)` (SPEC_FULL.md §3).
    pub fn block_effective_size(&self) -> u64 {
        (self.block_size as f64 * (1.0 - self.miners_reserved_block_ratio)) as u64
    }
}

fn parse_millis(s: &str) -> Result<Duration> {
    Ok(Duration::from_millis(s.parse()?))
}

fn get_cookie(config: &Config) -> Option<path::PathBuf> {
    let mut dir = config
        .rpc_dir
        .clone()
        .or_else(|| Some(home_dir()?.join(".bitcoin")))?;
    match config.network {
        Network::Bitcoin => (),
        Network::Testnet => dir.push("testnet3"),
        Network::Regtest => dir.push("regtest"),
    }
    let cookie = dir.join(".cookie");
    if cookie.exists() {
        Some(cookie)
    } else {
        println!("cookie file not found in {:?}", cookie);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_effective_size_applies_reserved_ratio() {
        let constants = Constants {
            block_size: 4_000_000,
            miners_reserved_block_ratio: 0.1,
            time_res: Duration::from_secs(1),
            int_time_added: Duration::from_secs(600),
            int_blocks_removed: 6,
            min_savings_rate: 0.1,
        };
        assert_eq!(constants.block_effective_size(), 3_600_000);
    }
}
