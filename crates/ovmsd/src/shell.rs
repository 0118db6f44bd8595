//! Console shell
//!
//! Commands:
//! - `stat`: charge summary
//! - `server v2 status`
//! - `metrics list [prefix]`
//! - `notify raise <info|error|alert|data> <text>`

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use ovms_core::metrics::standard::*;
use ovms_core::{CommandShell, Metrics, NotifyStore, NotifyType};
use ovms_v2::registry;

pub struct ConsoleShell {
    metrics: Arc<Metrics>,
    notify: Arc<NotifyStore>,
}

impl ConsoleShell {
    pub fn new(metrics: Arc<Metrics>, notify: Arc<NotifyStore>) -> Self {
        Self { metrics, notify }
    }

    /// Multi-line charge summary
    fn stat(&self) -> String {
        let m = &self.metrics;
        let mut out = String::new();
        let state = m.as_string(V_CHARGE_STATE, "stopped", None, None);
        let mode = m.as_string(V_CHARGE_MODE, "standard", None, None);
        if m.as_bool(V_CHARGE_INPROGRESS, false) {
            let _ = writeln!(
                out,
                "{} - {} {}V/{}A",
                state,
                mode,
                m.as_int(V_CHARGE_VOLTAGE, 0, None),
                m.as_int(V_CHARGE_CURRENT, 0, None)
            );
        } else {
            let _ = writeln!(out, "Not charging ({}, {})", state, mode);
        }
        let _ = writeln!(out, "SOC: {}%", m.as_string(V_BAT_SOC, "0", None, Some(1)));
        let _ = writeln!(
            out,
            "Ideal range: {}km",
            m.as_int(V_BAT_RANGE_IDEAL, 0, None)
        );
        let _ = write!(out, "Est. range: {}km", m.as_int(V_BAT_RANGE_EST, 0, None));
        out
    }

    fn metrics_list(&self, prefix: &str) -> String {
        self.metrics
            .list(prefix)
            .into_iter()
            .map(|(name, value)| format!("{:<24} {}", name, value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn notify_raise(&self, rest: &str) -> String {
        let Some((kind, text)) = rest.split_once(' ') else {
            return "Usage: notify raise <type> <text>".to_string();
        };
        match kind.parse::<NotifyType>() {
            Ok(ty) => {
                let id = self.notify.raise(ty, "console", text);
                format!("Raised {} notification {}", ty, id)
            }
            Err(e) => e,
        }
    }
}

#[async_trait]
impl CommandShell for ConsoleShell {
    async fn execute(&self, line: &str) -> String {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["stat"] => self.stat(),
            ["server", "v2", "status"] => registry::status(),
            ["metrics", "list"] => self.metrics_list(""),
            ["metrics", "list", prefix] => self.metrics_list(prefix),
            ["notify", "raise", ..] => {
                let rest = line
                    .trim_start()
                    .splitn(3, char::is_whitespace)
                    .nth(2)
                    .unwrap_or("")
                    .trim_start();
                self.notify_raise(rest)
            }
            _ => format!("Unrecognised command: {}", line.trim()),
        }
    }
}
