// src/network/longpoll.rs
//! Long-poll client for the legacy getwork protocol
//!
//! When a getwork response advertises an `X-Long-Polling` header, this
//! thread parks a request on the advertised URL so the pool can push new
//! blocks instead of being polled. The thread idles on its own queue
//! until the work I/O thread hands it a path, and falls back to plain
//! polling (by disabling itself) when the long-poll endpoint misbehaves.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{Value, json};
use url::Url;

use crate::config::Config;
use crate::miner::algorithm::AlgoCaps;
use crate::miner::work::{MinerState, unix_time};
use crate::network::rpc::{RpcClient, work_decode};
use crate::utils::{CommandQueue, MinerError, Pop, guard};

/// Seconds a parked long-poll request is allowed to wait for a block.
pub const LP_SCANTIME: i64 = 60;

/// Slack added on top of the server hold window before a parked request
/// is abandoned client-side.
const LP_TIMEOUT_MARGIN: u64 = 30;

/// Request timeout for the long-poll client. The configured timeout is
/// honored, but never shrunk below the server hold window plus slack, so
/// an aggressive operator timeout cannot turn every round into a local
/// timeout.
fn lp_timeout(cfg: &Config) -> u64 {
    cfg.timeout.max(LP_SCANTIME as u64 + LP_TIMEOUT_MARGIN)
}

/// Outcome classification for one long-poll round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LpFailure {
    /// The parked request expired without a new block; benign.
    Timeout,
    /// The endpoint failed; long polling is abandoned until a fresh
    /// path is advertised.
    Broken,
}

fn classify(err: &MinerError) -> LpFailure {
    match err {
        MinerError::HttpError(e) if e.is_timeout() => LpFailure::Timeout,
        _ => LpFailure::Broken,
    }
}

/// Resolves the advertised path against the configured RPC base URL.
///
/// Absolute URLs are taken as-is.
pub fn resolve_lp_url(base: &str, path: &str) -> Result<String, MinerError> {
    if path.contains("://") {
        return Ok(path.to_string());
    }
    let base = Url::parse(base)?;
    Ok(base.join(path)?.to_string())
}

/// Long-poll thread entry point.
pub fn run(
    cfg: Arc<Config>,
    caps: AlgoCaps,
    ctx: Arc<MinerState>,
    queue: Arc<CommandQueue<String>>,
) {
    let client = match RpcClient::with_timeout(&cfg, lp_timeout(&cfg)) {
        Ok(client) => client,
        Err(e) => {
            warn!("long-poll client unavailable: {}", e);
            return;
        }
    };
    let request = json!({"method": "getwork", "params": [], "id": 0});

    'waiting: loop {
        let path = match queue.pop(None) {
            Pop::Item(path) => path,
            Pop::TimedOut => continue,
            Pop::Closed => return,
        };
        let lp_url = match resolve_lp_url(&cfg.url, &path) {
            Ok(url) => url,
            Err(e) => {
                warn!("ignoring unusable long-poll path '{}': {}", path, e);
                ctx.have_longpoll.store(false, Ordering::SeqCst);
                continue;
            }
        };
        info!("long polling activated on {}", lp_url);

        loop {
            if ctx.have_stratum.load(Ordering::SeqCst) {
                return;
            }

            match client.call_url(&lp_url, &request) {
                Ok((reply, _)) => {
                    if !cfg.quiet {
                        info!("long poll detected a new block");
                    }
                    let result = reply.get("result").cloned().unwrap_or(Value::Null);
                    let submit_old = result
                        .get("submitold")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    ctx.submit_old.store(submit_old, Ordering::SeqCst);

                    match work_decode(&result, &caps) {
                        Ok(work) => {
                            let mut global = guard(&ctx.global);
                            global.work = work;
                            global.acquired_at = unix_time();
                            drop(global);
                            ctx.restart_workers();
                        }
                        Err(e) => warn!("discarding undecodable long-poll work: {}", e),
                    }
                }
                Err(e) => {
                    // Make the current job look old so workers refresh it.
                    ctx.rewind_work_time(LP_SCANTIME);
                    match classify(&e) {
                        LpFailure::Timeout => {
                            debug!("long poll expired, re-parking");
                            ctx.restart_workers();
                        }
                        LpFailure::Broken => {
                            warn!("long poll failed ({}), falling back to polling", e);
                            ctx.have_longpoll.store(false, Ordering::SeqCst);
                            ctx.restart_workers();
                            thread::sleep(Duration::from_secs(cfg.fail_pause));
                            continue 'waiting;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_pass_through() {
        let url = resolve_lp_url("http://pool:8332/", "http://other:9999/lp").unwrap();
        assert_eq!(url, "http://other:9999/lp");
    }

    #[test]
    fn relative_paths_join_the_base() {
        let url = resolve_lp_url("http://pool:8332/", "/lp").unwrap();
        assert_eq!(url, "http://pool:8332/lp");

        let url = resolve_lp_url("http://pool:8332", "lp").unwrap();
        assert_eq!(url, "http://pool:8332/lp");
    }

    #[test]
    fn lp_timeout_never_undercuts_the_hold_window() {
        let mut cfg = Config::default();
        cfg.timeout = 10;
        assert_eq!(lp_timeout(&cfg), LP_SCANTIME as u64 + LP_TIMEOUT_MARGIN);

        cfg.timeout = 270;
        assert_eq!(lp_timeout(&cfg), 270);
    }

    #[test]
    fn protocol_errors_break_the_poll_loop() {
        let err = MinerError::ProtocolError("bad reply".into());
        assert_eq!(classify(&err), LpFailure::Broken);
    }

    #[test]
    fn timeout_rewinds_but_keeps_polling() {
        // The timeout branch only rewinds the stamp and restarts; model
        // the state transition directly.
        let ctx = MinerState::new(1);
        ctx.have_longpoll.store(true, Ordering::SeqCst);
        guard(&ctx.global).acquired_at = 500;

        ctx.rewind_work_time(LP_SCANTIME);
        ctx.restart_workers();

        assert_eq!(ctx.work_time(), 500 - LP_SCANTIME);
        assert!(ctx.restart_requested(0));
        // Unlike the broken-endpoint branch, long polling stays on.
        assert!(ctx.have_longpoll.load(Ordering::SeqCst));
    }
}
