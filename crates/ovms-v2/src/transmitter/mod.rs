//! Metric transmitter
//!
//! Decides which metric groups are due and renders them. Each group owns a
//! modifier id in the metric store, so a metric shared by two groups (say
//! `v.b.power`, used by stat and location) makes each of them due once.
//!
//! Due flags are atomics: the metric listener sets them from whatever task
//! changed the metric and the worker takes them.

pub mod doors;
pub mod messages;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ovms_core::metrics::standard::*;
use ovms_core::{MetricError, Metrics, ModifierId};
use tracing::debug;

use crate::config::LinkSettings;

/// A transmittable metric group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Stat,
    Gps,
    Tpms,
    Firmware,
    Environment,
    Group,
    Capabilities,
}

impl Group {
    /// Order used for the out-of-cycle pass
    pub const ALL: [Group; 7] = [
        Group::Stat,
        Group::Environment,
        Group::Gps,
        Group::Group,
        Group::Tpms,
        Group::Firmware,
        Group::Capabilities,
    ];

    fn index(self) -> usize {
        match self {
            Group::Stat => 0,
            Group::Gps => 1,
            Group::Tpms => 2,
            Group::Firmware => 3,
            Group::Environment => 4,
            Group::Group => 5,
            Group::Capabilities => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Group::Stat => "stat",
            Group::Gps => "gps",
            Group::Tpms => "tpms",
            Group::Firmware => "firmware",
            Group::Environment => "environment",
            Group::Group => "group",
            Group::Capabilities => "capabilities",
        }
    }

    /// Metrics whose modification makes this group due
    pub fn constituents(self) -> &'static [&'static str] {
        match self {
            Group::Stat => messages::STAT_METRICS,
            Group::Gps => messages::GPS_METRICS,
            Group::Tpms => messages::TPMS_METRICS,
            Group::Firmware => messages::FIRMWARE_METRICS,
            Group::Environment => messages::ENVIRONMENT_METRICS,
            Group::Group => messages::GROUP_METRICS,
            Group::Capabilities => &[],
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

const STAT_TRIGGERS: &[&str] = &[
    V_CHARGE_CLIMIT,
    V_CHARGE_STATE,
    V_CHARGE_SUBSTATE,
    V_CHARGE_MODE,
    V_CHARGE_INPROGRESS,
    V_ENV_COOLING,
    V_BAT_CAC,
    V_BAT_SOH,
];

const ENVIRONMENT_TRIGGERS: &[&str] = &[
    V_DOOR_FL,
    V_DOOR_FR,
    V_DOOR_CHARGEPORT,
    V_CHARGE_PILOT,
    V_CHARGE_INPROGRESS,
    V_ENV_HANDBRAKE,
    V_ENV_ON,
    V_ENV_LOCKED,
    V_ENV_VALET,
    V_DOOR_HOOD,
    V_DOOR_TRUNK,
    V_ENV_AWAKE,
    V_ENV_COOLING,
    V_ENV_ALARM,
    V_DOOR_RL,
    V_DOOR_RR,
    V_ENV_CHARGING12V,
    V_ENV_HVAC,
];

const GPS_TRIGGERS: &[&str] = &[V_ENV_DRIVEMODE, V_POS_GPSLOCK];

/// Groups to send right away when `metric` changes while apps are watching
pub fn triggered_groups(metric: &str) -> Vec<Group> {
    let mut groups = Vec::new();
    if STAT_TRIGGERS.contains(&metric) {
        groups.push(Group::Stat);
    }
    if ENVIRONMENT_TRIGGERS.contains(&metric) {
        groups.push(Group::Environment);
    }
    if GPS_TRIGGERS.contains(&metric) {
        groups.push(Group::Gps);
    }
    groups
}

/// "Send now" flags, one per group
#[derive(Debug, Default)]
pub struct GroupFlags {
    flags: [AtomicBool; 7],
}

impl GroupFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, group: Group) {
        self.flags[group.index()].store(true, Ordering::Release);
    }

    pub fn is_set(&self, group: Group) -> bool {
        self.flags[group.index()].load(Ordering::Acquire)
    }

    /// Clear a flag, returning whether it was set
    pub fn take(&self, group: Group) -> bool {
        self.flags[group.index()].swap(false, Ordering::AcqRel)
    }
}

/// Renders metric groups and tracks what changed since each was last sent
pub struct MetricTransmitter {
    metrics: Arc<Metrics>,
    flags: Arc<GroupFlags>,
    modifiers: [Option<ModifierId>; 7],
    last_stale: [Option<u8>; 7],
}

impl MetricTransmitter {
    /// Register one modifier per metric group
    pub fn new(metrics: Arc<Metrics>, flags: Arc<GroupFlags>) -> Result<Self, MetricError> {
        let mut modifiers = [None; 7];
        for group in Group::ALL {
            if group.constituents().is_empty() {
                continue;
            }
            let id = metrics.register_modifier(&format!("ovms-server-v2.{}", group.name()))?;
            modifiers[group.index()] = Some(id);
        }
        Ok(Self {
            metrics,
            flags,
            modifiers,
            last_stale: [None; 7],
        })
    }

    pub fn flags(&self) -> &Arc<GroupFlags> {
        &self.flags
    }

    /// Read and clear the group's modification bits
    ///
    /// Every constituent is visited so none keeps a stale bit.
    fn take_modified(&self, group: Group) -> bool {
        let Some(modifier) = self.modifiers[group.index()] else {
            return false;
        };
        group
            .constituents()
            .iter()
            .fold(false, |acc, name| {
                self.metrics.is_modified_and_clear(name, modifier) | acc
            })
    }

    /// Stale bits the group's message reports
    fn stale_signature(&self, group: Group) -> Option<u8> {
        let metrics = &self.metrics;
        match group {
            Group::Gps | Group::Group => Some(u8::from(messages::any_stale(
                metrics,
                messages::GPS_STALE_METRICS,
            ))),
            Group::Tpms => Some(u8::from(messages::any_stale(
                metrics,
                messages::TPMS_METRICS,
            ))),
            Group::Environment => {
                let temps = messages::all_stale(metrics, messages::TEMP_STALE_METRICS);
                let ambient = metrics.is_stale(V_ENV_TEMP);
                Some(u8::from(temps) | (u8::from(ambient) << 1))
            }
            _ => None,
        }
    }

    /// Render `group` if it is due
    ///
    /// A group is due when `always` is set, when any constituent changed
    /// since it was last rendered, or when the stale state it reports moved.
    /// The group's send-now flag is cleared either way.
    pub fn build(&mut self, group: Group, always: bool, settings: &LinkSettings) -> Vec<String> {
        self.flags.take(group);

        let modified = self.take_modified(group);
        let signature = self.stale_signature(group);
        let stale_moved = signature != self.last_stale[group.index()];
        self.last_stale[group.index()] = signature;

        if !always && !modified && !stale_moved {
            return Vec::new();
        }
        debug!(%group, always, modified, stale_moved, "Rendering metric group");

        let metrics = &self.metrics;
        let units = settings.units;
        match group {
            Group::Stat => vec![messages::stat(metrics, units)],
            Group::Gps => vec![messages::location(metrics, units)],
            Group::Tpms => vec![messages::tpms(metrics)],
            Group::Firmware => vec![messages::firmware(metrics)],
            Group::Environment => vec![messages::environment(metrics, units)],
            Group::Group => messages::groups(metrics, units, &settings.groups),
            Group::Capabilities => vec![messages::capabilities()],
        }
    }

    /// Render every group whose send-now flag is set
    pub fn build_flagged(&mut self, settings: &LinkSettings) -> Vec<String> {
        let mut out = Vec::new();
        for group in Group::ALL {
            if self.flags.is_set(group) {
                out.extend(self.build(group, false, settings));
            }
        }
        out
    }

    /// Periodic pass; `first` forces every group out
    pub fn build_periodic(&mut self, first: bool, settings: &LinkSettings) -> Vec<String> {
        let mut out = Vec::new();
        for group in Group::ALL {
            let always = first || matches!(group, Group::Stat | Group::Environment);
            out.extend(self.build(group, always, settings));
        }
        out
    }
}

impl std::fmt::Debug for MetricTransmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricTransmitter")
            .field("modifiers", &self.modifiers)
            .field("last_stale", &self.last_stale)
            .finish()
    }
}
